//! Ephemeral single-file sharing over the local network.
//!
//! One file, one PIN, one download: a [`TransferSession`] binds a TCP
//! listener, serves a PIN-entry page over plain HTTP, and streams the file
//! exactly once to the first client that submits the correct PIN. Every PIN
//! submission is terminal for the session, and an unused session shuts
//! itself down after 60 seconds.
//!
//! [`SharePublisher`] wraps the session with local-IP resolution and QR
//! rendering so a second device can join by scanning a code.

pub mod config;
pub mod publisher;
pub mod server;

pub use config::ShareSettings;
pub use publisher::{ShareLink, ShareOutcome, SharePublisher};
pub use server::{StartError, TransferSession};
