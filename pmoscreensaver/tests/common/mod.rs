//! Scripted media backends and overlay surface shared by the integration
//! tests. Every interaction is appended to a [`Journal`].

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::future::pending;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use pmoscreensaver::{
    AdapterOptions, Backends, EmbedOptions, EmbedProvider, EmbeddedAutoplay, EmbeddedPlayer,
    InputBus, OverlayContent, OverlaySurface, Playable, PlaybackError, Playlist, PlaylistEntry,
    ProviderEvent, ProviderState, Screensaver, ScreensaverConfig, ScreensaverHandle,
    StreamEngine, StreamEvent, StreamSession,
};
use tokio::time::{Instant, sleep, sleep_until};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Open(String),
    Play { source: String, muted: bool },
    Destroy(String),
    Load { video_id: String, options: EmbedOptions },
    Unmute(String),
    Show,
    Present { index: usize, label: String },
    Hide,
}

/// Time-stamped call log plus a live-session gauge.
#[derive(Clone, Default)]
pub struct Journal {
    calls: Arc<Mutex<Vec<(Instant, Call)>>>,
    live: Arc<AtomicUsize>,
    max_live: Arc<AtomicUsize>,
}

impl Journal {
    pub fn push(&self, call: Call) {
        self.calls.lock().unwrap().push((Instant::now(), call));
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().iter().map(|(_, c)| c.clone()).collect()
    }

    pub fn timed(&self) -> Vec<(Instant, Call)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, pred: impl Fn(&Call) -> bool) -> usize {
        self.calls.lock().unwrap().iter().filter(|(_, c)| pred(c)).count()
    }

    pub fn opens(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Open(url) => Some(url),
                Call::Load { video_id, .. } => Some(video_id),
                _ => None,
            })
            .collect()
    }

    pub fn destroys(&self) -> usize {
        self.count(|c| matches!(c, Call::Destroy(_)))
    }

    pub fn live(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }

    pub fn max_live(&self) -> usize {
        self.max_live.load(Ordering::SeqCst)
    }

    fn acquire(&self) {
        let now = self.live.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_live.fetch_max(now, Ordering::SeqCst);
    }

    fn release(&self) {
        self.live.fetch_sub(1, Ordering::SeqCst);
    }
}

/// What a scripted stream or clip does once started.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Ends,
    Fatal,
    ProviderError(i32),
    Never,
}

#[derive(Debug, Clone)]
pub struct Behavior {
    pub open_error: Option<PlaybackError>,
    pub open_delay: Duration,
    pub deny_audible: bool,
    pub deny_unmute: bool,
    pub send_ready: bool,
    /// Outcome is scheduled at load time, before any `play`.
    pub runs_unplayed: bool,
    pub recoverable_error: bool,
    pub outcome: Outcome,
    pub after: Duration,
}

impl Behavior {
    pub fn ends_after(after: Duration) -> Self {
        Self {
            open_error: None,
            open_delay: Duration::ZERO,
            deny_audible: false,
            deny_unmute: false,
            send_ready: true,
            runs_unplayed: false,
            recoverable_error: false,
            outcome: Outcome::Ends,
            after,
        }
    }

    pub fn never_ends() -> Self {
        Self {
            outcome: Outcome::Never,
            ..Self::ends_after(Duration::ZERO)
        }
    }

    pub fn fatal_after(after: Duration) -> Self {
        Self {
            outcome: Outcome::Fatal,
            ..Self::ends_after(after)
        }
    }

    pub fn provider_error_after(after: Duration, code: i32) -> Self {
        Self {
            outcome: Outcome::ProviderError(code),
            ..Self::ends_after(after)
        }
    }

    pub fn fails_to_open(error: PlaybackError) -> Self {
        Self {
            open_error: Some(error),
            ..Self::never_ends()
        }
    }

    pub fn deny_audible(mut self) -> Self {
        self.deny_audible = true;
        self
    }

    pub fn deny_unmute(mut self) -> Self {
        self.deny_unmute = true;
        self
    }

    pub fn without_ready(mut self) -> Self {
        self.send_ready = false;
        self
    }

    /// Reaches its outcome `after` the load without ever reporting ready.
    pub fn ends_before_ready(after: Duration) -> Self {
        Self {
            send_ready: false,
            runs_unplayed: true,
            ..Self::ends_after(after)
        }
    }

    pub fn with_open_delay(mut self, delay: Duration) -> Self {
        self.open_delay = delay;
        self
    }

    pub fn with_recoverable_error(mut self) -> Self {
        self.recoverable_error = true;
        self
    }
}

/// Backend answering by source (URL or video id), falling back to a
/// default behaviour.
#[derive(Clone)]
pub struct Scripted {
    journal: Journal,
    behaviors: Arc<Mutex<HashMap<String, Behavior>>>,
    default: Behavior,
    adaptive: bool,
}

impl Scripted {
    pub fn new(journal: &Journal, default: Behavior) -> Self {
        Self {
            journal: journal.clone(),
            behaviors: Arc::default(),
            default,
            adaptive: true,
        }
    }

    /// Engine without an adaptive pipeline of its own.
    pub fn direct_playback(mut self) -> Self {
        self.adaptive = false;
        self
    }

    pub fn script(self, source: &str, behavior: Behavior) -> Self {
        self.behaviors
            .lock()
            .unwrap()
            .insert(source.to_string(), behavior);
        self
    }

    fn behavior(&self, source: &str) -> Behavior {
        self.behaviors
            .lock()
            .unwrap()
            .get(source)
            .cloned()
            .unwrap_or_else(|| self.default.clone())
    }

    async fn open_session(&self, source: &str) -> Result<ScriptedSession, PlaybackError> {
        let behavior = self.behavior(source);
        if !behavior.open_delay.is_zero() {
            sleep(behavior.open_delay).await;
        }
        if let Some(error) = behavior.open_error.clone() {
            return Err(error);
        }
        self.journal.acquire();

        let mut events = VecDeque::new();
        if behavior.send_ready {
            events.push_back(Event::Ready);
        }
        Ok(ScriptedSession {
            source: source.to_string(),
            journal: self.journal.clone(),
            events,
            deadline: behavior.runs_unplayed.then(|| Instant::now() + behavior.after),
            behavior,
            closed: false,
        })
    }
}

#[async_trait]
impl StreamEngine for Scripted {
    async fn open(&self, manifest_url: &str) -> Result<Box<dyn StreamSession>, PlaybackError> {
        self.journal.push(Call::Open(manifest_url.to_string()));
        let mut session = self.open_session(manifest_url).await?;
        session.events.clear();
        Ok(Box::new(session))
    }

    fn supports_adaptive(&self) -> bool {
        self.adaptive
    }
}

#[async_trait]
impl EmbedProvider for Scripted {
    async fn load(
        &self,
        video_id: &str,
        options: &EmbedOptions,
    ) -> Result<Box<dyn EmbeddedPlayer>, PlaybackError> {
        self.journal.push(Call::Load {
            video_id: video_id.to_string(),
            options: *options,
        });
        Ok(Box::new(self.open_session(video_id).await?))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Event {
    Ready,
    Playing,
    Recoverable,
}

struct ScriptedSession {
    source: String,
    journal: Journal,
    behavior: Behavior,
    events: VecDeque<Event>,
    deadline: Option<Instant>,
    closed: bool,
}

impl ScriptedSession {
    /// Next scripted step; cancel safe since the deadline is stored.
    async fn next(&mut self) -> Option<Result<Event, Outcome>> {
        if self.closed {
            return None;
        }
        if let Some(event) = self.events.pop_front() {
            return Some(Ok(event));
        }
        let Some(deadline) = self.deadline else {
            return pending().await;
        };
        if self.behavior.outcome == Outcome::Never {
            return pending().await;
        }
        sleep_until(deadline).await;
        self.closed = true;
        Some(Err(self.behavior.outcome.clone()))
    }
}

#[async_trait]
impl Playable for ScriptedSession {
    async fn play(&mut self, muted: bool) -> Result<(), PlaybackError> {
        self.journal.push(Call::Play {
            source: self.source.clone(),
            muted,
        });
        if !muted && self.behavior.deny_audible {
            return Err(PlaybackError::AutoplayDenied);
        }
        if self.deadline.is_none() {
            self.deadline = Some(Instant::now() + self.behavior.after);
            self.events.push_back(Event::Playing);
            if self.behavior.recoverable_error {
                self.events.push_back(Event::Recoverable);
            }
        }
        Ok(())
    }
}

#[async_trait]
impl StreamSession for ScriptedSession {
    async fn next_event(&mut self) -> Option<StreamEvent> {
        match self.next().await? {
            Ok(Event::Playing) => Some(StreamEvent::Playing),
            Ok(Event::Recoverable) => Some(StreamEvent::Error {
                fatal: false,
                detail: "segment 3 missing".to_string(),
            }),
            Ok(Event::Ready) => Some(StreamEvent::Playing),
            Err(Outcome::Ends) => Some(StreamEvent::Ended),
            Err(_) => Some(StreamEvent::Error {
                fatal: true,
                detail: "decoder crashed".to_string(),
            }),
        }
    }

    async fn destroy(&mut self) {
        self.teardown();
    }
}

#[async_trait]
impl EmbeddedPlayer for ScriptedSession {
    async fn next_event(&mut self) -> Option<ProviderEvent> {
        match self.next().await? {
            Ok(Event::Ready) => Some(ProviderEvent::Ready),
            Ok(Event::Playing) => Some(ProviderEvent::StateChanged(ProviderState::Playing)),
            Ok(Event::Recoverable) => Some(ProviderEvent::StateChanged(ProviderState::Buffering)),
            Err(Outcome::ProviderError(code)) => Some(ProviderEvent::Error { code }),
            Err(Outcome::Fatal) => Some(ProviderEvent::Error { code: 5 }),
            Err(_) => Some(ProviderEvent::StateChanged(ProviderState::Ended)),
        }
    }

    async fn unmute(&mut self) -> Result<(), PlaybackError> {
        self.journal.push(Call::Unmute(self.source.clone()));
        if self.behavior.deny_unmute {
            Err(PlaybackError::AutoplayDenied)
        } else {
            Ok(())
        }
    }

    async fn destroy(&mut self) {
        self.teardown();
    }
}

impl ScriptedSession {
    fn teardown(&mut self) {
        self.journal.push(Call::Destroy(self.source.clone()));
        self.journal.release();
        self.closed = true;
    }
}

/// Overlay surface appending to the journal.
pub struct RecordingSurface(pub Journal);

impl OverlaySurface for RecordingSurface {
    fn show(&mut self, _content: &OverlayContent) {
        self.0.push(Call::Show);
    }

    fn present(&mut self, entry: &PlaylistEntry, index: usize) {
        self.0.push(Call::Present {
            index,
            label: entry.label().to_string(),
        });
    }

    fn hide(&mut self) {
        self.0.push(Call::Hide);
    }
}

pub const IDLE: Duration = Duration::from_millis(5000);

pub fn ms(millis: u64) -> Duration {
    Duration::from_millis(millis)
}

/// Controller settings without start delay, so timings are exact.
pub fn config() -> ScreensaverConfig {
    ScreensaverConfig {
        idle_timeout: IDLE,
        adapter: AdapterOptions {
            start_delay: Duration::ZERO,
            unmute_delay: ms(1000),
            embed_load_timeout: ms(15_000),
            embedded_autoplay: EmbeddedAutoplay::MutedThenUnmute,
        },
        overlay: OverlayContent::default(),
    }
}

pub struct Harness {
    pub handle: ScreensaverHandle,
    pub bus: InputBus,
    pub journal: Journal,
    pub mounted_at: Instant,
}

pub fn mount(
    config: ScreensaverConfig,
    entries: Vec<PlaylistEntry>,
    engine: Scripted,
    provider: Scripted,
    journal: &Journal,
) -> Harness {
    let bus = InputBus::default();
    let backends = Backends::new(Arc::new(engine), Arc::new(provider));
    let handle = Screensaver::mount(
        config,
        Playlist::new(entries).unwrap(),
        backends,
        Box::new(RecordingSurface(journal.clone())),
        &bus,
    )
    .unwrap();
    Harness {
        handle,
        bus,
        journal: journal.clone(),
        mounted_at: Instant::now(),
    }
}

/// Lets the spawned tasks run without moving the paused clock.
pub async fn settle() {
    for _ in 0..50 {
        tokio::task::yield_now().await;
    }
}

/// Sleeps until `at` after mount, then settles.
pub async fn at(harness: &Harness, millis: u64) {
    sleep_until(harness.mounted_at + ms(millis)).await;
    settle().await;
}
