//! Adapter for clips hosted by an external embeddable-player provider.
//!
//! The provider player is loaded with its native controls masked: the
//! overlay owns every interaction while presenting. Loading and reaching
//! `Ready` are bounded by `embed_load_timeout`, so an unreachable provider
//! fails the entry instead of stalling the loop.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::time::{Instant, sleep_until, timeout_at};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::adapter::{
    AdapterOptions, AdapterReport, AdapterReporter, AudioMode, EmbeddedAutoplay, Playable,
    PlaybackTask, delay_unless_cancelled, negotiate_autoplay,
};
use crate::error::{Error, PlaybackError, Result};

/// Player parameters passed to the provider at load time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EmbedOptions {
    pub autoplay: bool,
    pub start_muted: bool,
    /// Native playback controls.
    pub controls: bool,
    /// Native keyboard shortcuts.
    pub keyboard: bool,
    /// Whether the player surface receives pointer input at all.
    pub pointer_events: bool,
}

impl EmbedOptions {
    /// Autoplaying player with every native interaction disabled.
    pub fn masked(start_muted: bool) -> Self {
        Self {
            autoplay: true,
            start_muted,
            controls: false,
            keyboard: false,
            pointer_events: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderState {
    Unstarted,
    Playing,
    Paused,
    Buffering,
    Cued,
    Ended,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderEvent {
    Ready,
    StateChanged(ProviderState),
    Error { code: i32 },
}

/// Loader of the third-party player.
#[async_trait]
pub trait EmbedProvider: Send + Sync {
    async fn load(
        &self,
        video_id: &str,
        options: &EmbedOptions,
    ) -> std::result::Result<Box<dyn EmbeddedPlayer>, PlaybackError>;
}

/// A loaded provider player.
#[async_trait]
pub trait EmbeddedPlayer: Playable {
    /// Next provider event. Must be cancel safe.
    async fn next_event(&mut self) -> Option<ProviderEvent>;

    /// Tries to turn sound on; providers may refuse.
    async fn unmute(&mut self) -> std::result::Result<(), PlaybackError>;

    /// Tears the player down and releases its streaming session.
    async fn destroy(&mut self);
}

pub struct EmbeddedAdapter {
    provider: Arc<dyn EmbedProvider>,
    options: AdapterOptions,
    task: Option<PlaybackTask>,
    generation: Option<u64>,
}

impl std::fmt::Debug for EmbeddedAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmbeddedAdapter")
            .field("options", &self.options)
            .field("started", &self.task.is_some())
            .field("generation", &self.generation)
            .finish()
    }
}

impl EmbeddedAdapter {
    pub fn new(provider: Arc<dyn EmbedProvider>, options: AdapterOptions) -> Self {
        Self {
            provider,
            options,
            task: None,
            generation: None,
        }
    }

    pub fn start(&mut self, video_id: &str, reporter: AdapterReporter) -> Result<()> {
        if self.task.is_some() {
            return Err(Error::AlreadyStarted(self.generation.unwrap_or_default()));
        }

        let provider = self.provider.clone();
        let options = self.options.clone();
        let video_id = video_id.to_string();
        self.generation = Some(reporter.generation().value());

        info!(generation = %reporter.generation(), video_id = %video_id, "Starting embedded clip");
        self.task = Some(PlaybackTask::spawn(move |token| {
            run_embedded(provider, video_id, options, reporter, token)
        }));
        Ok(())
    }

    pub async fn stop(&mut self) {
        if let Some(task) = self.task.take() {
            task.shutdown().await;
            debug!(generation = ?self.generation, "Embedded clip stopped");
        }
    }

    pub fn is_started(&self) -> bool {
        self.task.is_some()
    }
}

async fn run_embedded(
    provider: Arc<dyn EmbedProvider>,
    video_id: String,
    options: AdapterOptions,
    reporter: AdapterReporter,
    token: CancellationToken,
) {
    if !delay_unless_cancelled(options.start_delay, &token).await {
        return;
    }

    let embed_options =
        EmbedOptions::masked(options.embedded_autoplay == EmbeddedAutoplay::MutedThenUnmute);
    let deadline = Instant::now() + options.embed_load_timeout;

    let loaded = tokio::select! {
        _ = token.cancelled() => return,
        loaded = timeout_at(deadline, provider.load(&video_id, &embed_options)) => loaded,
    };

    let mut player = match loaded {
        Ok(Ok(player)) => player,
        Ok(Err(err)) => {
            warn!(video_id = %video_id, "Cannot load embedded player, skipping: {err}");
            reporter.failed(err);
            return;
        }
        Err(_) => {
            warn!(video_id = %video_id, "Embedded player load timed out, skipping");
            reporter.failed(PlaybackError::Timeout(options.embed_load_timeout));
            return;
        }
    };

    let outcome = tokio::select! {
        _ = token.cancelled() => None,
        report = drive_player(player.as_mut(), &video_id, &options, deadline) => Some(report),
    };

    player.destroy().await;

    if let Some(report) = outcome {
        reporter.report(report);
    }
}

enum Step {
    Event(Option<ProviderEvent>),
    Unmute,
}

async fn drive_player(
    player: &mut dyn EmbeddedPlayer,
    video_id: &str,
    options: &AdapterOptions,
    deadline: Instant,
) -> AdapterReport {
    match timeout_at(deadline, wait_ready(&mut *player)).await {
        Ok(Ok(Readiness::Ready)) => debug!(video_id = %video_id, "Embedded player ready"),
        Ok(Ok(Readiness::Ended)) => {
            info!(video_id = %video_id, "Embedded clip ended before ready");
            return AdapterReport::Finished;
        }
        Ok(Err(err)) => return AdapterReport::Failed(err),
        Err(_) => return AdapterReport::Failed(PlaybackError::Timeout(options.embed_load_timeout)),
    }

    let started = match options.embedded_autoplay {
        EmbeddedAutoplay::SoundFirst => negotiate_autoplay(&mut *player).await,
        EmbeddedAutoplay::MutedThenUnmute => player.play(true).await.map(|()| AudioMode::Muted),
    };
    let mode = match started {
        Ok(mode) => mode,
        Err(err) => {
            warn!(video_id = %video_id, "Embedded playback could not start: {err}");
            return AdapterReport::Failed(err);
        }
    };

    let wants_unmute =
        options.embedded_autoplay == EmbeddedAutoplay::MutedThenUnmute && mode == AudioMode::Muted;
    let mut confirmed = false;
    let mut unmute_at: Option<Instant> = None;

    loop {
        let step = match unmute_at {
            Some(at) => tokio::select! {
                _ = sleep_until(at) => Step::Unmute,
                event = player.next_event() => Step::Event(event),
            },
            None => Step::Event(player.next_event().await),
        };

        match step {
            Step::Unmute => {
                unmute_at = None;
                match player.unmute().await {
                    Ok(()) => info!(video_id = %video_id, "Embedded clip unmuted"),
                    Err(err) => {
                        warn!(video_id = %video_id, "Unmute rejected, continuing muted: {err}")
                    }
                }
            }
            Step::Event(Some(ProviderEvent::StateChanged(ProviderState::Ended))) => {
                info!(video_id = %video_id, "Embedded clip ended");
                return AdapterReport::Finished;
            }
            Step::Event(Some(ProviderEvent::StateChanged(ProviderState::Playing))) => {
                if !confirmed {
                    confirmed = true;
                    debug!(video_id = %video_id, "Embedded playback confirmed");
                    if wants_unmute {
                        unmute_at = Some(Instant::now() + options.unmute_delay);
                    }
                }
            }
            Step::Event(Some(ProviderEvent::StateChanged(state))) => {
                debug!(video_id = %video_id, ?state, "Embedded player state changed");
            }
            Step::Event(Some(ProviderEvent::Ready)) => {}
            Step::Event(Some(ProviderEvent::Error { code })) => {
                warn!(video_id = %video_id, code, "Embedded provider error, skipping");
                return AdapterReport::Failed(PlaybackError::Provider { code });
            }
            Step::Event(None) => {
                return AdapterReport::Failed(PlaybackError::unavailable("embedded player closed"));
            }
        }
    }
}

enum Readiness {
    Ready,
    Ended,
}

async fn wait_ready(
    player: &mut dyn EmbeddedPlayer,
) -> std::result::Result<Readiness, PlaybackError> {
    loop {
        match player.next_event().await {
            Some(ProviderEvent::Ready) => return Ok(Readiness::Ready),
            Some(ProviderEvent::StateChanged(ProviderState::Ended)) => return Ok(Readiness::Ended),
            Some(ProviderEvent::Error { code }) => return Err(PlaybackError::Provider { code }),
            Some(ProviderEvent::StateChanged(_)) => continue,
            None => {
                return Err(PlaybackError::unavailable(
                    "embedded player closed before ready",
                ));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_masked_options_disable_native_interaction() {
        let options = EmbedOptions::masked(true);
        assert!(options.autoplay);
        assert!(options.start_muted);
        assert!(!options.controls);
        assert!(!options.keyboard);
        assert!(!options.pointer_events);
    }
}
