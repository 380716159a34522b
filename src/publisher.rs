//! Share-link publishing: local URL resolution and QR rendering on top of a
//! [`TransferSession`].

use std::path::Path;

use image::GrayImage;
use qrcode::QrCode;

use crate::config::ShareSettings;
use crate::server::{StartError, TransferSession};

/// Result of [`SharePublisher::start`], surfaced to the host UI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShareOutcome {
    SettingsDisabled,
    NoFileDropped,
    ServerStartFailed,
    QrGenerationFailed,
    PortInUse(u16),
    Success,
}

/// The published link: the URL a second device should open, plus the same
/// string rendered as a scannable QR image.
#[derive(Clone)]
pub struct ShareLink {
    pub url: String,
    pub qr: GrayImage,
}

/// Owns the start/stop lifecycle of one share from the caller's side.
///
/// The dropped file comes from the tray collaborator, the port/PIN/enabled
/// flag from [`ShareSettings`]; this type wires them into the session and
/// hands back a [`ShareLink`] for display.
pub struct SharePublisher {
    session: TransferSession,
    link: Option<ShareLink>,
}

impl SharePublisher {
    pub fn new() -> Self {
        Self::with_session(TransferSession::new())
    }

    pub fn with_session(session: TransferSession) -> Self {
        Self {
            session,
            link: None,
        }
    }

    pub fn session(&self) -> &TransferSession {
        &self.session
    }

    /// Currently published link, if the last start succeeded.
    pub fn link(&self) -> Option<&ShareLink> {
        self.link.as_ref()
    }

    /// Start sharing `dropped_file` according to `settings`.
    ///
    /// The QR image is only rendered once the listener is confirmed bound;
    /// if rendering itself fails the session is stopped again so no
    /// unreachable-but-listening state lingers.
    pub async fn start(
        &mut self,
        dropped_file: Option<&Path>,
        settings: &ShareSettings,
    ) -> ShareOutcome {
        if !settings.enabled {
            return ShareOutcome::SettingsDisabled;
        }
        let Some(file) = dropped_file else {
            tracing::info!("no file dropped to serve");
            return ShareOutcome::NoFileDropped;
        };
        let Some(filename) = file.file_name().and_then(|n| n.to_str()).map(str::to_owned)
        else {
            tracing::info!(file = %file.display(), "dropped path has no usable filename");
            return ShareOutcome::NoFileDropped;
        };

        if let Err(e) = self
            .session
            .start(settings.port, file.to_path_buf(), settings.pin.clone())
            .await
        {
            tracing::error!(error = %e, "failed to start transfer session");
            return match e {
                StartError::PortInUse(port) => ShareOutcome::PortInUse(port),
                StartError::InvalidPort(_) | StartError::Bind(_) => {
                    ShareOutcome::ServerStartFailed
                }
            };
        }

        // Port 0 binds ephemerally; build the URL from the port that
        // actually got bound.
        let Some(port) = self.session.port().await else {
            return ShareOutcome::ServerStartFailed;
        };
        let ip = local_ipv4().unwrap_or_else(|| "localhost".to_string());
        let url = format!("http://{ip}:{port}/{filename}");

        match render_qr(&url) {
            Some(qr) => {
                tracing::info!(%url, "share link ready");
                self.link = Some(ShareLink { url, qr });
                ShareOutcome::Success
            }
            None => {
                tracing::error!(%url, "failed to render QR code");
                self.session.stop().await;
                ShareOutcome::QrGenerationFailed
            }
        }
    }

    /// Discard the published link and stop the underlying session.
    pub async fn stop(&mut self) {
        self.clear();
        self.session.stop().await;
    }

    /// Discard the published link without touching the session.
    pub fn clear(&mut self) {
        self.link = None;
    }
}

impl Default for SharePublisher {
    fn default() -> Self {
        Self::new()
    }
}

/// Pick a LAN-reachable IPv4, preferring the private ranges a phone on the
/// same network would see this machine under. `192.168.*` wins outright;
/// `10.*` and `172.*` are kept as fallback.
fn local_ipv4() -> Option<String> {
    let ifaces = local_ip_address::list_afinet_netifas().ok()?;
    let mut best_ip = None;
    for (_name, ip) in ifaces {
        if ip.is_loopback() || !ip.is_ipv4() {
            continue;
        }
        let ip_str = ip.to_string();
        if ip_str.starts_with("192.168.") {
            return Some(ip_str);
        }
        if (ip_str.starts_with("10.") || ip_str.starts_with("172.")) && best_ip.is_none() {
            best_ip = Some(ip_str);
        }
    }
    best_ip
}

/// Render the URL into a grayscale QR image.
fn render_qr(url: &str) -> Option<GrayImage> {
    let code = QrCode::new(url.as_bytes()).ok()?;
    let image = code
        .render::<image::Luma<u8>>()
        .min_dimensions(200, 200)
        .max_dimensions(400, 400)
        .build();
    Some(image)
}
