//! Lifecycle coordinator of the attract loop.
//!
//! ## Architecture
//!
//! [`Screensaver::mount`] spawns one actor task that owns every piece of
//! mutable state: presentation state, idle timer, playlist cursor and the
//! mounted adapter. Everything else talks to it through channels:
//! - the [`ActivityMonitor`] forwards activity signals,
//! - adapters report through their [`AdapterReporter`],
//! - the [`PresentationOverlay`] is polled for dismissal while visible,
//! - the [`ScreensaverHandle`] requests the unmount.
//!
//! State machine:
//! - `Dormant → Presenting` when the idle timer fires,
//! - `Presenting → Presenting` on a current-generation finish or failure,
//! - `Presenting → Dormant` on any activity or overlay dismissal,
//! - `Dormant → Dormant` on activity (the timer is rearmed).
//!
//! The previous adapter's `stop()` is always awaited before the next one is
//! started, and reports carrying another generation than the mounted one
//! are discarded.

use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use crate::activity::{ActivityMonitor, ActivitySignal, InputBus};
use crate::adapter::{
    AdapterEvent, AdapterOptions, AdapterReport, AdapterReporter, Backends, Generation,
    PlaybackAdapter,
};
use crate::error::{Error, PlaybackError, Result};
use crate::idle_timer::IdleTimer;
use crate::overlay::{DismissRequest, OverlayContent, OverlaySurface, PresentationOverlay};
use crate::playlist::{Playlist, PlaylistCursor};

pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PresentationState {
    #[default]
    Dormant,
    Presenting,
}

/// Observable snapshot of the controller.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ScreensaverStatus {
    pub state: PresentationState,
    /// Cursor index of the entry being presented (or last presented).
    pub index: usize,
    /// Generation of the mounted adapter, if any.
    pub generation: Option<Generation>,
}

#[derive(Debug, Clone)]
pub struct ScreensaverConfig {
    pub idle_timeout: Duration,
    pub adapter: AdapterOptions,
    pub overlay: OverlayContent,
}

impl Default for ScreensaverConfig {
    fn default() -> Self {
        Self {
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
            adapter: AdapterOptions::default(),
            overlay: OverlayContent::default(),
        }
    }
}

#[derive(Debug)]
enum Command {
    Activity(ActivitySignal),
    Unmount,
}

#[derive(Debug)]
enum Event {
    Activity(ActivitySignal),
    Dismiss(DismissRequest),
    IdleDeadline,
    Adapter(AdapterEvent),
    Unmount,
}

/// Entry point of the attract-loop controller.
pub struct Screensaver;

impl Screensaver {
    /// Mounts a controller instance: starts the activity monitor and arms
    /// the idle timer. Must be called from within a tokio runtime.
    ///
    /// # Errors
    /// Returns [`Error::InvalidTimeout`] if `config.idle_timeout` is zero.
    pub fn mount(
        config: ScreensaverConfig,
        playlist: Playlist,
        backends: Backends,
        surface: Box<dyn OverlaySurface>,
        input: &InputBus,
    ) -> Result<ScreensaverHandle> {
        let (coordinator, commands, status) =
            Coordinator::new(config, playlist, backends, surface, input)?;
        let task = tokio::spawn(coordinator.run());

        Ok(ScreensaverHandle {
            commands,
            status,
            task: Some(task),
        })
    }
}

/// Handle kept by the shell for the lifetime of the display session.
pub struct ScreensaverHandle {
    commands: mpsc::UnboundedSender<Command>,
    status: watch::Receiver<ScreensaverStatus>,
    task: Option<JoinHandle<()>>,
}

impl std::fmt::Debug for ScreensaverHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScreensaverHandle")
            .field("status", &*self.status.borrow())
            .field("mounted", &self.task.is_some())
            .finish()
    }
}

impl ScreensaverHandle {
    pub fn status(&self) -> watch::Receiver<ScreensaverStatus> {
        self.status.clone()
    }

    pub fn state(&self) -> PresentationState {
        self.status.borrow().state
    }

    /// Injects an activity signal, as if observed on the input bus.
    pub fn notify_activity(&self, signal: ActivitySignal) -> Result<()> {
        self.commands
            .send(Command::Activity(signal))
            .map_err(|_| Error::ControllerGone)
    }

    /// Stops any playing adapter, hides the overlay, releases the listeners
    /// and waits for the controller to exit.
    pub async fn unmount(mut self) -> Result<()> {
        let _ = self.commands.send(Command::Unmount);
        match self.task.take() {
            Some(task) => task.await.map_err(|e| Error::Other(e.into())),
            None => Ok(()),
        }
    }
}

impl Drop for ScreensaverHandle {
    fn drop(&mut self) {
        if self.task.is_some() {
            let _ = self.commands.send(Command::Unmount);
        }
    }
}

struct MountedAdapter {
    generation: Generation,
    adapter: PlaybackAdapter,
}

struct Coordinator {
    config: ScreensaverConfig,
    cursor: PlaylistCursor,
    backends: Backends,
    input: InputBus,
    idle: IdleTimer,
    monitor: ActivityMonitor,
    overlay: PresentationOverlay,
    state: PresentationState,
    active: Option<MountedAdapter>,
    last_generation: Generation,
    commands: mpsc::UnboundedReceiver<Command>,
    adapter_events: mpsc::UnboundedReceiver<AdapterEvent>,
    adapter_tx: mpsc::UnboundedSender<AdapterEvent>,
    status: watch::Sender<ScreensaverStatus>,
}

impl Coordinator {
    fn new(
        config: ScreensaverConfig,
        playlist: Playlist,
        backends: Backends,
        surface: Box<dyn OverlaySurface>,
        input: &InputBus,
    ) -> Result<(
        Self,
        mpsc::UnboundedSender<Command>,
        watch::Receiver<ScreensaverStatus>,
    )> {
        let mut idle = IdleTimer::new();
        idle.arm(config.idle_timeout)?;

        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let (adapter_tx, adapter_rx) = mpsc::unbounded_channel();
        let (status_tx, status_rx) = watch::channel(ScreensaverStatus::default());

        let activity_tx = commands_tx.clone();
        let monitor = ActivityMonitor::spawn(input, move |signal| {
            let _ = activity_tx.send(Command::Activity(signal));
        });

        info!(
            idle_timeout_ms = config.idle_timeout.as_millis() as u64,
            entries = playlist.len(),
            "Screensaver mounted"
        );

        let coordinator = Coordinator {
            overlay: PresentationOverlay::new(surface, config.overlay.clone()),
            config,
            cursor: PlaylistCursor::new(playlist),
            backends,
            input: input.clone(),
            idle,
            monitor,
            state: PresentationState::Dormant,
            active: None,
            last_generation: Generation::default(),
            commands: commands_rx,
            adapter_events: adapter_rx,
            adapter_tx,
            status: status_tx,
        };

        Ok((coordinator, commands_tx, status_rx))
    }

    async fn run(mut self) {
        loop {
            // Une interaction déjà en file passe avant l'échéance d'inactivité
            let event = tokio::select! {
                biased;
                command = self.commands.recv() => match command {
                    Some(Command::Activity(signal)) => Event::Activity(signal),
                    Some(Command::Unmount) | None => Event::Unmount,
                },
                request = self.overlay.dismissal(), if self.overlay.is_visible() => {
                    Event::Dismiss(request)
                }
                Some(report) = self.adapter_events.recv() => Event::Adapter(report),
                () = self.idle.expired(), if self.idle.is_armed() => Event::IdleDeadline,
            };

            match event {
                Event::Activity(signal) => self.on_activity(signal).await,
                Event::Dismiss(request) => {
                    if self.state == PresentationState::Presenting {
                        debug!(trigger = ?request.trigger, "Overlay dismissed");
                        self.dismiss().await;
                    }
                }
                Event::IdleDeadline => self.on_idle_deadline(),
                Event::Adapter(report) => self.on_adapter_event(report).await,
                Event::Unmount => break,
            }
        }

        self.teardown().await;
    }

    async fn on_activity(&mut self, signal: ActivitySignal) {
        match self.state {
            PresentationState::Presenting => {
                debug!(%signal, "Activity while presenting");
                self.dismiss().await;
            }
            PresentationState::Dormant => {
                trace!(%signal, "Activity, rearming idle timer");
                self.rearm();
            }
        }
    }

    fn on_idle_deadline(&mut self) {
        if self.state != PresentationState::Dormant {
            return;
        }
        info!("Idle timeout reached, starting attract loop");
        self.state = PresentationState::Presenting;
        self.cursor.reset();
        self.overlay.show(&self.input);
        self.mount_current();
    }

    async fn on_adapter_event(&mut self, event: AdapterEvent) {
        let current = self.active.as_ref().map(|m| m.generation);
        if self.state != PresentationState::Presenting || current != Some(event.generation) {
            debug!(
                generation = %event.generation,
                current = ?current.map(|g| g.value()),
                "Discarding stale adapter report"
            );
            return;
        }

        match &event.report {
            AdapterReport::Finished => {
                debug!(generation = %event.generation, index = self.cursor.index(), "Entry finished");
            }
            AdapterReport::Failed(reason) => {
                warn!(
                    generation = %event.generation,
                    index = self.cursor.index(),
                    "Entry failed, advancing: {reason}"
                );
            }
        }

        self.stop_active().await;
        self.cursor.advance();
        self.mount_current();
    }

    /// Mounts and starts the adapter for the current cursor entry.
    fn mount_current(&mut self) {
        debug_assert!(self.active.is_none());

        self.last_generation = self.last_generation.next();
        let generation = self.last_generation;
        let index = self.cursor.index();
        let entry = self.cursor.current().clone();

        let mut adapter =
            PlaybackAdapter::for_entry(&entry, &self.backends, &self.config.adapter);
        let reporter = AdapterReporter::new(generation, self.adapter_tx.clone());

        if let Err(err) = adapter.start(&entry, reporter.clone()) {
            // Traité comme un échec de lecture : la boucle continue
            warn!(%generation, index, "Adapter refused to start: {err}");
            reporter.failed(PlaybackError::fatal(err.to_string()));
        }

        info!(%generation, index, entry = entry.label(), kind = entry.kind().as_str(), "Presenting entry");
        self.overlay.present(&entry, index);
        self.active = Some(MountedAdapter {
            generation,
            adapter,
        });
        self.publish();
    }

    async fn stop_active(&mut self) {
        if let Some(mut mounted) = self.active.take() {
            mounted.adapter.stop().await;
            debug!(generation = %mounted.generation, "Adapter torn down");
        }
    }

    async fn dismiss(&mut self) {
        self.stop_active().await;
        self.overlay.hide();
        self.state = PresentationState::Dormant;
        self.rearm();
        info!("Attract loop dismissed");
        self.publish();
    }

    fn rearm(&mut self) {
        if let Err(err) = self.idle.arm(self.config.idle_timeout) {
            warn!("Cannot rearm idle timer: {err}");
        }
    }

    async fn teardown(&mut self) {
        self.stop_active().await;
        self.overlay.hide();
        self.idle.cancel();
        self.monitor.shutdown().await;
        self.state = PresentationState::Dormant;
        self.publish();
        info!("Screensaver unmounted");
    }

    fn publish(&self) {
        let status = ScreensaverStatus {
            state: self.state,
            index: self.cursor.index(),
            generation: self.active.as_ref().map(|m| m.generation),
        };
        self.status.send_replace(status);
    }
}
