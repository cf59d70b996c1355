//! Headless HTTP media backends.
//!
//! - [`HlsHttpEngine`] : client HLS qui lit les manifestes servis par le
//!   serveur local et consomme les segments au rythme de leur durée
//! - [`OEmbedProvider`] : fournisseur de clips embarqués résolus par oEmbed
//!
//! Neither backend decodes media: they drive the network side of playback
//! so the kiosk shell can run the attract loop unattended.

pub mod hls;
pub mod oembed;

use std::time::Duration;

use reqwest::Client;

pub use hls::{HlsHttpEngine, HlsSession, Manifest, MediaSegment, VariantStream, parse_manifest};
pub use oembed::{OEmbedInfo, OEmbedPlayer, OEmbedProvider};

/// Default timeout for HTTP requests (10 seconds)
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 10;

/// Default User-Agent
pub const DEFAULT_USER_AGENT: &str = concat!("PMOKiosk/", env!("CARGO_PKG_VERSION"));

/// Shared HTTP client with the kiosk user agent.
pub fn http_client() -> reqwest::Result<Client> {
    Client::builder()
        .user_agent(DEFAULT_USER_AGENT)
        .connect_timeout(Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS))
        .build()
}
