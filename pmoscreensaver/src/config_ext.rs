//! Extension de pmoconfig pour l'économiseur d'écran

use std::time::Duration;

use crate::adapter::{AdapterOptions, EmbeddedAutoplay};
use crate::coordinator::ScreensaverConfig;
use crate::error::{Error, Result};
use crate::overlay::OverlayContent;
use crate::playlist::{Playlist, PlaylistEntry};

/// Trait d'extension pour pmoconfig::Config
pub trait ScreensaverConfigExt {
    /// Construit la configuration du contrôleur depuis la section `screensaver`
    fn screensaver_config(&self) -> Result<ScreensaverConfig>;

    /// Lit et valide la playlist `screensaver.playlist`
    fn screensaver_playlist(&self) -> Result<Playlist>;
}

impl ScreensaverConfigExt for pmoconfig::Config {
    fn screensaver_config(&self) -> Result<ScreensaverConfig> {
        let idle_timeout = Duration::from_millis(self.get_idle_timeout_ms()?);
        if idle_timeout.is_zero() {
            return Err(Error::InvalidTimeout);
        }

        let adapter = AdapterOptions {
            start_delay: Duration::from_millis(self.get_start_delay_ms()?),
            unmute_delay: Duration::from_millis(self.get_unmute_delay_ms()?),
            embed_load_timeout: Duration::from_millis(self.get_embed_load_timeout_ms()?),
            embedded_autoplay: self.get_embedded_autoplay()?.parse::<EmbeddedAutoplay>()?,
        };

        // Section facultative, mais une section présente doit être valide
        let overlay = match self.get_value(&["screensaver", "overlay"]) {
            Err(_) => OverlayContent::default(),
            Ok(_) => self
                .get_typed::<OverlayContent>(&["screensaver", "overlay"])
                .map_err(|e| Error::Config(e.to_string()))?,
        };

        Ok(ScreensaverConfig {
            idle_timeout,
            adapter,
            overlay,
        })
    }

    fn screensaver_playlist(&self) -> Result<Playlist> {
        let entries: Vec<PlaylistEntry> = self
            .get_typed(&["screensaver", "playlist"])
            .map_err(|e| Error::Config(e.to_string()))?;
        Playlist::new(entries)
    }
}
