//! # pmoscreensaver - Boucle de présentation déclenchée par l'inactivité
//!
//! Cette crate fournit le contrôleur « économiseur d'écran » d'un kiosque :
//! - Détection d'inactivité sur un bus d'entrées ([`InputBus`])
//! - Boucle de présentation sur une playlist fixe, avec bouclage infini
//! - Adaptateurs de lecture pour les flux HLS locaux et les clips embarqués
//! - Négociation de l'autoplay (repli en lecture muette)
//! - Overlay plein écran qui rend la main au premier contact
//!
//! # Architecture
//!
//! - **Screensaver** : monte un coordinateur (tâche tokio unique) qui possède
//!   l'état `Dormant` / `Presenting`, le minuteur et le curseur de playlist
//! - **PlaybackAdapter** : façade `start` / `stop` par type d'entrée
//! - **StreamEngine / EmbedProvider** : points d'intégration avec les moteurs
//!   de lecture réels (voir le module `backends` avec la feature
//!   `http-backends`)
//! - **OverlaySurface** : rendu de l'overlay, fourni par le shell
//!
//! # Exemple d'utilisation
//!
//! ```no_run
//! use pmoscreensaver::{
//!     Backends, InputBus, InputEvent, OverlayContent, OverlaySurface, Playlist,
//!     PlaylistEntry, Screensaver, ScreensaverConfig,
//! };
//!
//! struct NullSurface;
//!
//! impl OverlaySurface for NullSurface {
//!     fn show(&mut self, _content: &OverlayContent) {}
//!     fn present(&mut self, _entry: &PlaylistEntry, _index: usize) {}
//!     fn hide(&mut self) {}
//! }
//!
//! # async fn run(backends: Backends) -> pmoscreensaver::Result<()> {
//! let playlist = Playlist::new(vec![
//!     PlaylistEntry::local("/Videos/slcr/master.m3u8"),
//!     PlaylistEntry::embedded("vUlae8o14zw"),
//! ])?;
//!
//! let bus = InputBus::default();
//! let handle = Screensaver::mount(
//!     ScreensaverConfig::default(),
//!     playlist,
//!     backends,
//!     Box::new(NullSurface),
//!     &bus,
//! )?;
//!
//! // Le shell publie chaque interaction observée
//! bus.publish(InputEvent::KeyDown);
//!
//! handle.unmount().await?;
//! # Ok(())
//! # }
//! ```

pub mod activity;
pub mod adapter;
mod coordinator;
mod error;
pub mod idle_timer;
pub mod overlay;
pub mod playlist;

#[cfg(feature = "http-backends")]
pub mod backends;

#[cfg(feature = "pmoconfig")]
mod config_ext;

// Réexports publics
pub use activity::{ActivityMonitor, ActivitySignal, InputBus, InputEvent};
pub use adapter::{
    AdapterEvent, AdapterOptions, AdapterReport, AdapterReporter, AudioMode, Backends,
    EmbedOptions, EmbedProvider, EmbeddedAdapter, EmbeddedAutoplay, EmbeddedPlayer, Generation,
    LocalStreamAdapter, Playable, PlaybackAdapter, ProviderEvent, ProviderState, StreamEngine,
    StreamEvent, StreamSession, negotiate_autoplay,
};
pub use coordinator::{
    DEFAULT_IDLE_TIMEOUT, PresentationState, Screensaver, ScreensaverConfig, ScreensaverHandle,
    ScreensaverStatus,
};
pub use error::{Error, PlaybackError, Result};
pub use idle_timer::IdleTimer;
pub use overlay::{DismissRequest, OverlayContent, OverlaySurface, PresentationOverlay};
pub use playlist::{EntryKind, Playlist, PlaylistCursor, PlaylistEntry};

#[cfg(feature = "pmoconfig")]
pub use config_ext::ScreensaverConfigExt;
