//! Playlist entries and the wrapping cursor.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Kind tag of a [`PlaylistEntry`], used to select the playback adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntryKind {
    Local,
    Embedded,
}

impl EntryKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryKind::Local => "local",
            EntryKind::Embedded => "embedded",
        }
    }
}

/// One media descriptor of the attract loop.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PlaylistEntry {
    /// Locally hosted adaptive-bitrate stream (HLS master manifest).
    Local {
        stream_url: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        title: Option<String>,
    },
    /// Clip hosted by an external embeddable-player provider.
    Embedded {
        provider_video_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        title: Option<String>,
    },
}

impl PlaylistEntry {
    pub fn local(stream_url: impl Into<String>) -> Self {
        PlaylistEntry::Local {
            stream_url: stream_url.into(),
            title: None,
        }
    }

    pub fn embedded(provider_video_id: impl Into<String>) -> Self {
        PlaylistEntry::Embedded {
            provider_video_id: provider_video_id.into(),
            title: None,
        }
    }

    pub fn with_title(mut self, label: impl Into<String>) -> Self {
        match &mut self {
            PlaylistEntry::Local { title, .. } | PlaylistEntry::Embedded { title, .. } => {
                *title = Some(label.into());
            }
        }
        self
    }

    pub fn kind(&self) -> EntryKind {
        match self {
            PlaylistEntry::Local { .. } => EntryKind::Local,
            PlaylistEntry::Embedded { .. } => EntryKind::Embedded,
        }
    }

    /// Stream URL or provider video id.
    pub fn source(&self) -> &str {
        match self {
            PlaylistEntry::Local { stream_url, .. } => stream_url,
            PlaylistEntry::Embedded {
                provider_video_id, ..
            } => provider_video_id,
        }
    }

    pub fn title(&self) -> Option<&str> {
        match self {
            PlaylistEntry::Local { title, .. } | PlaylistEntry::Embedded { title, .. } => {
                title.as_deref()
            }
        }
    }

    /// Human readable label: the title when set, the source otherwise.
    pub fn label(&self) -> &str {
        self.title().unwrap_or_else(|| self.source())
    }
}

/// Immutable, non-empty, ordered list of entries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Playlist {
    entries: Arc<[PlaylistEntry]>,
}

impl Playlist {
    /// Validates and freezes the entries.
    ///
    /// # Errors
    /// - [`Error::EmptyPlaylist`] if `entries` is empty
    /// - [`Error::InvalidEntry`] if an entry has a blank URL or video id
    pub fn new(entries: Vec<PlaylistEntry>) -> Result<Self> {
        if entries.is_empty() {
            return Err(Error::EmptyPlaylist);
        }
        for (index, entry) in entries.iter().enumerate() {
            if entry.source().trim().is_empty() {
                let reason = match entry.kind() {
                    EntryKind::Local => "stream_url is empty",
                    EntryKind::Embedded => "provider_video_id is empty",
                };
                return Err(Error::InvalidEntry {
                    index,
                    reason: reason.to_string(),
                });
            }
        }
        Ok(Self {
            entries: entries.into(),
        })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Always false: construction rejects empty lists.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&PlaylistEntry> {
        self.entries.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &PlaylistEntry> {
        self.entries.iter()
    }
}

/// Index into a [`Playlist`], always in `[0, len)`.
#[derive(Debug, Clone)]
pub struct PlaylistCursor {
    playlist: Playlist,
    index: usize,
}

impl PlaylistCursor {
    pub fn new(playlist: Playlist) -> Self {
        Self { playlist, index: 0 }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn playlist(&self) -> &Playlist {
        &self.playlist
    }

    pub fn current(&self) -> &PlaylistEntry {
        &self.playlist.entries[self.index]
    }

    /// Moves forward with unconditional wraparound.
    pub fn advance(&mut self) -> &PlaylistEntry {
        self.index = (self.index + 1) % self.playlist.len();
        self.current()
    }

    pub fn reset(&mut self) {
        self.index = 0;
    }
}
