//! Share a single file on the local network from the terminal.
//!
//! Prints the share URL and a scannable QR code, then waits for the
//! one-shot download (or the idle timeout) before exiting.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Result, bail};
use clap::Parser;
use qrdrop::{ShareOutcome, SharePublisher, ShareSettings};

#[derive(Parser)]
#[command(name = "qrdrop")]
#[command(about = "Share one file over the local network, gated by a single-use PIN")]
struct Cli {
    /// File to share
    file: PathBuf,

    /// Port to bind (0 picks a free port)
    #[arg(long)]
    port: Option<u32>,

    /// PIN the downloader must enter
    #[arg(long)]
    pin: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .with_target(false)
        .init();

    let cli = Cli::parse();
    if !cli.file.exists() {
        bail!("file not found: {}", cli.file.display());
    }

    // CLI flags override the persisted settings; running the CLI at all
    // implies the feature is wanted.
    let mut settings = ShareSettings::load();
    settings.enabled = true;
    if let Some(port) = cli.port {
        settings.port = port;
    }
    if let Some(pin) = cli.pin {
        settings.pin = pin;
    }

    let mut publisher = SharePublisher::new();
    match publisher.start(Some(&cli.file), &settings).await {
        ShareOutcome::Success => {}
        ShareOutcome::PortInUse(port) => bail!("port {port} is already in use"),
        outcome => bail!("could not start share: {outcome:?}"),
    }

    if let Some(link) = publisher.link() {
        if let Ok(code) = qrcode::QrCode::new(link.url.as_bytes()) {
            let art = code
                .render::<qrcode::render::unicode::Dense1x2>()
                .quiet_zone(true)
                .build();
            println!("{art}");
        }
        println!("Scan to download: {}", link.url);
        println!("PIN: {}", settings.pin);
    }

    // The session ends itself after one download, a wrong PIN, or the idle
    // timeout; Ctrl-C stops it early.
    let session = publisher.session().clone();
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                publisher.stop().await;
                break;
            }
            _ = tokio::time::sleep(Duration::from_millis(250)) => {
                if !session.is_running().await {
                    break;
                }
            }
        }
    }

    Ok(())
}
