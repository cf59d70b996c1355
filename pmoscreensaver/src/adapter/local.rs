//! Adapter for locally hosted adaptive-bitrate streams.
//!
//! The adapter opens the manifest through a [`StreamEngine`], negotiates
//! autoplay, then follows the session events until the stream ends or a
//! fatal error occurs. Segment level errors are recoverable and ignored.

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::adapter::{
    AdapterOptions, AdapterReport, AdapterReporter, AudioMode, Playable, PlaybackTask,
    delay_unless_cancelled, negotiate_autoplay,
};
use crate::error::{Error, PlaybackError, Result};

/// Events produced by an open stream session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    /// First frames are being presented.
    Playing,
    /// Natural end of the media.
    Ended,
    /// Streaming error; `fatal` errors end the session.
    Error { fatal: bool, detail: String },
}

/// Adaptive-bitrate streaming client.
#[async_trait]
pub trait StreamEngine: Send + Sync {
    /// Loads and parses the manifest. Resolves once the session is ready to
    /// play.
    async fn open(
        &self,
        manifest_url: &str,
    ) -> std::result::Result<Box<dyn StreamSession>, PlaybackError>;

    /// `false` when the engine hands the manifest to a native player instead
    /// of driving the adaptive pipeline itself.
    fn supports_adaptive(&self) -> bool {
        true
    }
}

/// One loaded stream, bound to a decoding pipeline until destroyed.
#[async_trait]
pub trait StreamSession: Playable {
    /// Next session event; `None` once the session has nothing more to say.
    async fn next_event(&mut self) -> Option<StreamEvent>;

    /// Releases the decoding pipeline and streaming resources.
    async fn destroy(&mut self);
}

pub struct LocalStreamAdapter {
    engine: Arc<dyn StreamEngine>,
    options: AdapterOptions,
    task: Option<PlaybackTask>,
    generation: Option<u64>,
}

impl std::fmt::Debug for LocalStreamAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalStreamAdapter")
            .field("options", &self.options)
            .field("started", &self.task.is_some())
            .field("generation", &self.generation)
            .finish()
    }
}

impl LocalStreamAdapter {
    pub fn new(engine: Arc<dyn StreamEngine>, options: AdapterOptions) -> Self {
        Self {
            engine,
            options,
            task: None,
            generation: None,
        }
    }

    pub fn start(&mut self, stream_url: &str, reporter: AdapterReporter) -> Result<()> {
        if self.task.is_some() {
            return Err(Error::AlreadyStarted(self.generation.unwrap_or_default()));
        }

        let engine = self.engine.clone();
        let options = self.options.clone();
        let url = stream_url.to_string();
        self.generation = Some(reporter.generation().value());

        info!(generation = %reporter.generation(), url = %url, "Starting local stream");
        self.task = Some(PlaybackTask::spawn(move |token| {
            run_stream(engine, url, options, reporter, token)
        }));
        Ok(())
    }

    pub async fn stop(&mut self) {
        if let Some(task) = self.task.take() {
            task.shutdown().await;
            debug!(generation = ?self.generation, "Local stream stopped");
        }
    }

    pub fn is_started(&self) -> bool {
        self.task.is_some()
    }
}

async fn run_stream(
    engine: Arc<dyn StreamEngine>,
    url: String,
    options: AdapterOptions,
    reporter: AdapterReporter,
    token: CancellationToken,
) {
    if !delay_unless_cancelled(options.start_delay, &token).await {
        return;
    }

    if !engine.supports_adaptive() {
        debug!(url = %url, "Adaptive streaming unavailable, direct playback");
    }

    let opened = tokio::select! {
        _ = token.cancelled() => return,
        opened = engine.open(&url) => opened,
    };

    let mut session = match opened {
        Ok(session) => session,
        Err(err) => {
            warn!(url = %url, "Cannot open stream, skipping: {err}");
            reporter.failed(err);
            return;
        }
    };

    // Une fois la session ouverte, elle est toujours détruite avant de sortir
    let outcome = tokio::select! {
        _ = token.cancelled() => None,
        report = drive_session(session.as_mut(), &url) => Some(report),
    };

    session.destroy().await;

    if let Some(report) = outcome {
        reporter.report(report);
    }
}

async fn drive_session(session: &mut dyn StreamSession, url: &str) -> AdapterReport {
    match negotiate_autoplay(&mut *session).await {
        Ok(AudioMode::Audible) => debug!(url = %url, "Playing with sound"),
        Ok(AudioMode::Muted) => debug!(url = %url, "Playing muted"),
        Err(err) => {
            warn!(url = %url, "Stream playback could not start: {err}");
            return AdapterReport::Failed(err);
        }
    }

    loop {
        match session.next_event().await {
            Some(StreamEvent::Playing) => debug!(url = %url, "Stream playing"),
            Some(StreamEvent::Ended) => {
                info!(url = %url, "Stream ended");
                return AdapterReport::Finished;
            }
            Some(StreamEvent::Error { fatal: true, detail }) => {
                warn!(url = %url, "Fatal stream error, skipping: {detail}");
                return AdapterReport::Failed(PlaybackError::Fatal(detail));
            }
            Some(StreamEvent::Error { fatal: false, detail }) => {
                debug!(url = %url, "Recoverable stream error: {detail}");
            }
            None => {
                return AdapterReport::Failed(PlaybackError::fatal("stream session closed"));
            }
        }
    }
}
