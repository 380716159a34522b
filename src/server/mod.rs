//! Ephemeral HTTP transfer server
//!
//! A TCP listener that serves exactly one file to exactly one client,
//! gated by a single-use PIN.

mod http;
mod mime;
mod session;

pub use session::{GRACE_DELAY, IDLE_TIMEOUT, StartError, TransferSession};
