//! Types d'erreurs pour pmoscreensaver

use std::time::Duration;

/// Erreurs de montage et de configuration de l'économiseur
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Idle timeout must be greater than 0")]
    InvalidTimeout,

    #[error("Playlist must contain at least one entry")]
    EmptyPlaylist,

    #[error("Invalid playlist entry #{index}: {reason}")]
    InvalidEntry { index: usize, reason: String },

    #[error("Adapter {adapter} cannot play a {entry} entry")]
    AdapterMismatch {
        adapter: &'static str,
        entry: &'static str,
    },

    #[error("Adapter already started (generation {0})")]
    AlreadyStarted(u64),

    #[error("Screensaver controller is gone")]
    ControllerGone,

    #[error("Configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Type Result spécialisé pour pmoscreensaver
pub type Result<T> = std::result::Result<T, Error>;

/// Erreurs de lecture remontées par les moteurs et les adaptateurs.
///
/// `AutoplayDenied` est la seule variante récupérable localement (repli en
/// lecture muette). Toutes les autres font avancer la playlist.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PlaybackError {
    #[error("Audible autoplay is not allowed")]
    AutoplayDenied,

    #[error("Playback start was aborted")]
    Aborted,

    #[error("Fatal stream error: {0}")]
    Fatal(String),

    #[error("Provider unavailable: {0}")]
    Unavailable(String),

    #[error("Provider error {code}")]
    Provider { code: i32 },

    #[error("Timed out after {0:?}")]
    Timeout(Duration),
}

impl PlaybackError {
    pub fn fatal(message: impl Into<String>) -> Self {
        PlaybackError::Fatal(message.into())
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        PlaybackError::Unavailable(message.into())
    }

    /// True when the platform refused audible autoplay specifically.
    pub fn is_autoplay_denied(&self) -> bool {
        matches!(self, PlaybackError::AutoplayDenied)
    }
}
