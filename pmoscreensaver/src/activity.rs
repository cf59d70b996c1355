//! Activity monitoring.
//!
//! The application shell publishes every raw interaction it sees on an
//! [`InputBus`]. The [`ActivityMonitor`] listens to the bus and reports the
//! qualifying kinds ([`ActivitySignal`]) to a single callback. The
//! presentation overlay subscribes to the same bus while it is visible.

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

const DEFAULT_BUS_CAPACITY: usize = 256;

/// Raw user interaction events as produced by the display shell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputEvent {
    PointerDown,
    PointerUp,
    PointerMove,
    KeyDown,
    KeyUp,
    TouchStart,
    TouchEnd,
    Scroll,
    Click,
    Resize,
    Focus(bool),
}

impl InputEvent {
    /// Maps the event onto the activity kinds that reset the idle countdown.
    pub fn activity(&self) -> Option<ActivitySignal> {
        match self {
            InputEvent::PointerDown => Some(ActivitySignal::PointerDown),
            InputEvent::PointerMove => Some(ActivitySignal::PointerMove),
            InputEvent::KeyDown => Some(ActivitySignal::KeyDown),
            InputEvent::TouchStart => Some(ActivitySignal::TouchStart),
            InputEvent::Scroll => Some(ActivitySignal::Scroll),
            InputEvent::Click => Some(ActivitySignal::Click),
            InputEvent::PointerUp
            | InputEvent::KeyUp
            | InputEvent::TouchEnd
            | InputEvent::Resize
            | InputEvent::Focus(_) => None,
        }
    }
}

/// The fixed set of interaction kinds counted as user activity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActivitySignal {
    PointerDown,
    PointerMove,
    KeyDown,
    TouchStart,
    Scroll,
    Click,
}

impl ActivitySignal {
    pub const ALL: [ActivitySignal; 6] = [
        ActivitySignal::PointerDown,
        ActivitySignal::PointerMove,
        ActivitySignal::KeyDown,
        ActivitySignal::TouchStart,
        ActivitySignal::Scroll,
        ActivitySignal::Click,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ActivitySignal::PointerDown => "pointer-down",
            ActivitySignal::PointerMove => "pointer-move",
            ActivitySignal::KeyDown => "key-down",
            ActivitySignal::TouchStart => "touch-start",
            ActivitySignal::Scroll => "scroll",
            ActivitySignal::Click => "click",
        }
    }
}

impl std::fmt::Display for ActivitySignal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Broadcast bus carrying raw input from the shell to its listeners.
#[derive(Clone, Debug)]
pub struct InputBus {
    sender: broadcast::Sender<InputEvent>,
}

impl Default for InputBus {
    fn default() -> Self {
        Self::new(DEFAULT_BUS_CAPACITY)
    }
}

impl InputBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Publishes an event; returns the number of listeners that received it.
    pub fn publish(&self, event: InputEvent) -> usize {
        self.sender.send(event).unwrap_or(0)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<InputEvent> {
        self.sender.subscribe()
    }

    pub fn listener_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

/// Listener task forwarding qualifying input to the activity callback.
///
/// Dropping the monitor cancels the listener; [`ActivityMonitor::shutdown`]
/// additionally waits for it to exit, so no handler survives a remount.
pub struct ActivityMonitor {
    token: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl ActivityMonitor {
    pub fn spawn<F>(bus: &InputBus, on_activity: F) -> Self
    where
        F: Fn(ActivitySignal) + Send + 'static,
    {
        let token = CancellationToken::new();
        let mut rx = bus.subscribe();
        let child = token.clone();

        let handle = tokio::spawn(async move {
            loop {
                let received = tokio::select! {
                    _ = child.cancelled() => break,
                    received = rx.recv() => received,
                };

                match received {
                    Ok(event) => {
                        if let Some(signal) = event.activity() {
                            trace!(%signal, "Activity observed");
                            on_activity(signal);
                        }
                    }
                    // Les événements les plus récents restent dans le tampon
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        debug!(skipped, "Activity monitor lagged behind input bus");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
            debug!("Activity monitor stopped");
        });

        Self {
            token,
            handle: Some(handle),
        }
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Cancels the listener and waits for it to exit. Idempotent.
    pub async fn shutdown(&mut self) {
        self.token.cancel();
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }
}

impl Drop for ActivityMonitor {
    fn drop(&mut self) {
        self.token.cancel();
    }
}
