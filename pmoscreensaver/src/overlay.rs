//! Full-screen presentation shell.
//!
//! While visible, the overlay listens to the input bus and turns any
//! pointer-down, pointer-move, touch-start or click into a dismissal request.
//! Rendering is delegated to an [`OverlaySurface`] provided by the shell.

use std::future::pending;

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{debug, trace};

use crate::activity::{InputBus, InputEvent};
use crate::playlist::PlaylistEntry;

/// Branding displayed around the media.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OverlayContent {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub subtitle: String,
    #[serde(default)]
    pub partners: Vec<String>,
}

/// Display backend of the overlay.
pub trait OverlaySurface: Send {
    /// Covers the whole display with the overlay shell.
    fn show(&mut self, content: &OverlayContent);

    /// Updates the shell with the entry being presented.
    fn present(&mut self, entry: &PlaylistEntry, index: usize);

    /// Removes the shell from the display.
    fn hide(&mut self);
}

/// Why the overlay asked to be dismissed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DismissRequest {
    pub trigger: InputEvent,
}

pub struct PresentationOverlay {
    surface: Box<dyn OverlaySurface>,
    content: OverlayContent,
    listener: Option<broadcast::Receiver<InputEvent>>,
}

impl std::fmt::Debug for PresentationOverlay {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PresentationOverlay")
            .field("content", &self.content)
            .field("visible", &self.is_visible())
            .finish()
    }
}

impl PresentationOverlay {
    pub fn new(surface: Box<dyn OverlaySurface>, content: OverlayContent) -> Self {
        Self {
            surface,
            content,
            listener: None,
        }
    }

    /// True for the input kinds that dismiss the overlay.
    pub fn dismisses(event: &InputEvent) -> bool {
        matches!(
            event,
            InputEvent::PointerDown
                | InputEvent::PointerMove
                | InputEvent::TouchStart
                | InputEvent::Click
        )
    }

    pub fn is_visible(&self) -> bool {
        self.listener.is_some()
    }

    /// Shows the shell and starts listening. Input published before this
    /// call is never seen by the overlay.
    pub fn show(&mut self, bus: &InputBus) {
        if self.listener.is_none() {
            self.listener = Some(bus.subscribe());
            self.surface.show(&self.content);
            debug!("Presentation overlay shown");
        }
    }

    pub fn present(&mut self, entry: &PlaylistEntry, index: usize) {
        self.surface.present(entry, index);
    }

    /// Hides the shell and stops listening. Idempotent.
    pub fn hide(&mut self) {
        if self.listener.take().is_some() {
            self.surface.hide();
            debug!("Presentation overlay hidden");
        }
    }

    /// Waits for the next dismissing input. Never resolves while hidden.
    /// Cancel safe.
    pub async fn dismissal(&mut self) -> DismissRequest {
        let Some(listener) = self.listener.as_mut() else {
            return pending().await;
        };

        loop {
            match listener.recv().await {
                Ok(event) if Self::dismisses(&event) => {
                    trace!(?event, "Overlay dismissal requested");
                    return DismissRequest { trigger: event };
                }
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => return pending().await,
            }
        }
    }
}
