//! Playback adapters.
//!
//! Every playlist entry kind has one adapter. [`PlaybackAdapter`] is the
//! tagged façade the coordinator talks to: it exposes the same
//! `start` / `stop` contract for each variant and reports back through an
//! [`AdapterReporter`] stamped with the mount [`Generation`].
//!
//! Both adapters negotiate the autoplay-with-sound restriction:
//! 1. try to start audible,
//! 2. on [`PlaybackError::AutoplayDenied`] retry once muted,
//! 3. treat any other startup error as a failure of the entry.

pub mod embedded;
pub mod local;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::{Error, PlaybackError, Result};
use crate::playlist::{EntryKind, PlaylistEntry};

pub use embedded::{
    EmbedOptions, EmbedProvider, EmbeddedAdapter, EmbeddedPlayer, ProviderEvent, ProviderState,
};
pub use local::{LocalStreamAdapter, StreamEngine, StreamEvent, StreamSession};

/// Identifier of one adapter mount. Strictly increasing per controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Generation(u64);

impl Generation {
    pub fn new(value: u64) -> Self {
        Generation(value)
    }

    pub fn value(&self) -> u64 {
        self.0
    }

    pub fn next(&self) -> Generation {
        Generation(self.0 + 1)
    }
}

impl std::fmt::Display for Generation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Outcome an adapter reports to the coordinator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdapterReport {
    Finished,
    Failed(PlaybackError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdapterEvent {
    pub generation: Generation,
    pub report: AdapterReport,
}

/// Callback side of the adapter contract.
///
/// Sending never blocks; reports sent after the coordinator went away are
/// dropped.
#[derive(Debug, Clone)]
pub struct AdapterReporter {
    generation: Generation,
    tx: mpsc::UnboundedSender<AdapterEvent>,
}

impl AdapterReporter {
    pub fn new(generation: Generation, tx: mpsc::UnboundedSender<AdapterEvent>) -> Self {
        Self { generation, tx }
    }

    pub fn generation(&self) -> Generation {
        self.generation
    }

    pub fn finished(&self) {
        self.report(AdapterReport::Finished);
    }

    pub fn failed(&self, reason: PlaybackError) {
        self.report(AdapterReport::Failed(reason));
    }

    pub fn report(&self, report: AdapterReport) {
        let _ = self.tx.send(AdapterEvent {
            generation: self.generation,
            report,
        });
    }
}

/// How the embedded adapter deals with the autoplay restriction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum EmbeddedAutoplay {
    /// Audible attempt first, muted retry on denial.
    SoundFirst,
    /// Start pre-muted, try to unmute once playback is confirmed.
    #[default]
    MutedThenUnmute,
}

impl std::str::FromStr for EmbeddedAutoplay {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "sound_first" => Ok(EmbeddedAutoplay::SoundFirst),
            "muted_then_unmute" => Ok(EmbeddedAutoplay::MutedThenUnmute),
            other => Err(Error::Config(format!(
                "Unknown embedded autoplay strategy '{other}'"
            ))),
        }
    }
}

/// Timing knobs shared by the adapters.
#[derive(Debug, Clone)]
pub struct AdapterOptions {
    /// Delay between mount and the first engine call (overlay fade-in).
    pub start_delay: Duration,
    /// Delay after confirmed playback before the deferred unmute attempt.
    pub unmute_delay: Duration,
    /// Upper bound for loading the provider player and reaching `Ready`.
    pub embed_load_timeout: Duration,
    pub embedded_autoplay: EmbeddedAutoplay,
}

impl Default for AdapterOptions {
    fn default() -> Self {
        Self {
            start_delay: Duration::from_millis(300),
            unmute_delay: Duration::from_millis(1000),
            embed_load_timeout: Duration::from_secs(15),
            embedded_autoplay: EmbeddedAutoplay::default(),
        }
    }
}

/// Media platforms the adapters drive.
#[derive(Clone)]
pub struct Backends {
    pub stream_engine: Arc<dyn StreamEngine>,
    pub embed_provider: Arc<dyn EmbedProvider>,
}

impl Backends {
    pub fn new(stream_engine: Arc<dyn StreamEngine>, embed_provider: Arc<dyn EmbedProvider>) -> Self {
        Self {
            stream_engine,
            embed_provider,
        }
    }
}

impl std::fmt::Debug for Backends {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Backends").finish_non_exhaustive()
    }
}

/// Anything that can be asked to start playing, muted or not.
#[async_trait]
pub trait Playable: Send {
    async fn play(&mut self, muted: bool) -> std::result::Result<(), PlaybackError>;
}

/// Audio state actually obtained at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioMode {
    Audible,
    Muted,
}

/// Audible attempt, then a single muted retry if audible autoplay is denied.
pub async fn negotiate_autoplay<P>(target: &mut P) -> std::result::Result<AudioMode, PlaybackError>
where
    P: Playable + ?Sized,
{
    match target.play(false).await {
        Ok(()) => Ok(AudioMode::Audible),
        Err(PlaybackError::AutoplayDenied) => {
            warn!("Autoplay with sound blocked, falling back to muted playback");
            target.play(true).await.map(|()| AudioMode::Muted)
        }
        Err(err) => Err(err),
    }
}

/// Background playback task of a started adapter.
///
/// `shutdown` cancels the task and awaits it, so every engine resource the
/// task holds has been released when it returns.
#[derive(Debug)]
pub(crate) struct PlaybackTask {
    token: CancellationToken,
    handle: JoinHandle<()>,
}

impl PlaybackTask {
    pub(crate) fn spawn<F, Fut>(body: F) -> Self
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let token = CancellationToken::new();
        let handle = tokio::spawn(body(token.clone()));
        Self { token, handle }
    }

    pub(crate) async fn shutdown(self) {
        self.token.cancel();
        if let Err(err) = self.handle.await {
            if err.is_panic() {
                warn!("Playback task panicked: {err}");
            }
        }
    }
}

/// Sleeps `delay`, returning false if cancelled first.
pub(crate) async fn delay_unless_cancelled(delay: Duration, token: &CancellationToken) -> bool {
    if delay.is_zero() {
        return !token.is_cancelled();
    }
    tokio::select! {
        _ = token.cancelled() => false,
        _ = tokio::time::sleep(delay) => true,
    }
}

/// Tagged adapter façade selected by the entry kind.
#[derive(Debug)]
pub enum PlaybackAdapter {
    Local(LocalStreamAdapter),
    Embedded(EmbeddedAdapter),
}

impl PlaybackAdapter {
    pub fn for_entry(entry: &PlaylistEntry, backends: &Backends, options: &AdapterOptions) -> Self {
        match entry.kind() {
            EntryKind::Local => PlaybackAdapter::Local(LocalStreamAdapter::new(
                backends.stream_engine.clone(),
                options.clone(),
            )),
            EntryKind::Embedded => PlaybackAdapter::Embedded(EmbeddedAdapter::new(
                backends.embed_provider.clone(),
                options.clone(),
            )),
        }
    }

    pub fn kind(&self) -> EntryKind {
        match self {
            PlaybackAdapter::Local(_) => EntryKind::Local,
            PlaybackAdapter::Embedded(_) => EntryKind::Embedded,
        }
    }

    /// Starts playback of `entry`. Outcomes are reported through `reporter`.
    ///
    /// # Errors
    /// - [`Error::AdapterMismatch`] if `entry` is not of this adapter's kind
    /// - [`Error::AlreadyStarted`] if called twice without `stop`
    pub fn start(&mut self, entry: &PlaylistEntry, reporter: AdapterReporter) -> Result<()> {
        match (self, entry) {
            (PlaybackAdapter::Local(adapter), PlaylistEntry::Local { stream_url, .. }) => {
                adapter.start(stream_url, reporter)
            }
            (
                PlaybackAdapter::Embedded(adapter),
                PlaylistEntry::Embedded {
                    provider_video_id, ..
                },
            ) => adapter.start(provider_video_id, reporter),
            (adapter, entry) => Err(Error::AdapterMismatch {
                adapter: adapter.kind().as_str(),
                entry: entry.kind().as_str(),
            }),
        }
    }

    /// Stops playback and awaits full teardown. Idempotent.
    pub async fn stop(&mut self) {
        debug!(kind = self.kind().as_str(), "Stopping playback adapter");
        match self {
            PlaybackAdapter::Local(adapter) => adapter.stop().await,
            PlaybackAdapter::Embedded(adapter) => adapter.stop().await,
        }
    }

    pub fn is_started(&self) -> bool {
        match self {
            PlaybackAdapter::Local(adapter) => adapter.is_started(),
            PlaybackAdapter::Embedded(adapter) => adapter.is_started(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    struct Scripted {
        answers: VecDeque<std::result::Result<(), PlaybackError>>,
        calls: Vec<bool>,
    }

    #[async_trait]
    impl Playable for Scripted {
        async fn play(&mut self, muted: bool) -> std::result::Result<(), PlaybackError> {
            self.calls.push(muted);
            self.answers.pop_front().unwrap_or(Ok(()))
        }
    }

    fn scripted(answers: Vec<std::result::Result<(), PlaybackError>>) -> Scripted {
        Scripted {
            answers: answers.into(),
            calls: Vec::new(),
        }
    }

    #[tokio::test]
    async fn test_audible_start_when_allowed() {
        let mut target = scripted(vec![Ok(())]);
        assert_eq!(negotiate_autoplay(&mut target).await, Ok(AudioMode::Audible));
        assert_eq!(target.calls, vec![false]);
    }

    #[tokio::test]
    async fn test_denial_falls_back_to_muted_once() {
        let mut target = scripted(vec![Err(PlaybackError::AutoplayDenied), Ok(())]);
        assert_eq!(negotiate_autoplay(&mut target).await, Ok(AudioMode::Muted));
        assert_eq!(target.calls, vec![false, true]);
    }

    #[tokio::test]
    async fn test_other_errors_are_not_retried() {
        let mut target = scripted(vec![Err(PlaybackError::fatal("decoder"))]);
        assert_eq!(
            negotiate_autoplay(&mut target).await,
            Err(PlaybackError::fatal("decoder"))
        );
        assert_eq!(target.calls, vec![false]);
    }

    #[tokio::test]
    async fn test_failed_muted_retry_is_reported() {
        let mut target = scripted(vec![
            Err(PlaybackError::AutoplayDenied),
            Err(PlaybackError::AutoplayDenied),
        ]);
        assert_eq!(
            negotiate_autoplay(&mut target).await,
            Err(PlaybackError::AutoplayDenied)
        );
        assert_eq!(target.calls.len(), 2);
    }

    #[test]
    fn test_embedded_autoplay_from_str() {
        assert_eq!(
            "sound_first".parse::<EmbeddedAutoplay>().unwrap(),
            EmbeddedAutoplay::SoundFirst
        );
        assert_eq!(
            " Muted_Then_Unmute ".parse::<EmbeddedAutoplay>().unwrap(),
            EmbeddedAutoplay::MutedThenUnmute
        );
        assert!("loud".parse::<EmbeddedAutoplay>().is_err());
    }

    #[test]
    fn test_reporter_stamps_generation() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let reporter = AdapterReporter::new(Generation::new(7), tx);
        reporter.failed(PlaybackError::Aborted);
        let event = rx.try_recv().unwrap();
        assert_eq!(event.generation, Generation::new(7));
        assert_eq!(event.report, AdapterReport::Failed(PlaybackError::Aborted));
    }
}
