//! HLS client over HTTP.
//!
//! `open` fetches the master manifest, selects the highest-bandwidth variant
//! and loads its media playlist. The session then downloads each segment and
//! waits for its `#EXTINF` duration, which paces the entry like real
//! playback would. A failed segment is a recoverable error until
//! `max_segment_failures` of them happen in a row.

use std::collections::VecDeque;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tracing::{debug, info};
use url::Url;

use crate::adapter::{Playable, StreamEngine, StreamEvent, StreamSession};
use crate::error::PlaybackError;

use super::DEFAULT_REQUEST_TIMEOUT_SECS;

/// Consecutive segment failures after which the stream is declared dead.
pub const DEFAULT_MAX_SEGMENT_FAILURES: u32 = 3;

const MAX_VARIANT_DEPTH: usize = 2;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariantStream {
    pub bandwidth: u64,
    pub uri: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MediaSegment {
    pub duration: Duration,
    pub uri: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Manifest {
    /// Multivariant playlist (`#EXT-X-STREAM-INF`).
    Master(Vec<VariantStream>),
    /// Media playlist (`#EXTINF` segments).
    Media(Vec<MediaSegment>),
}

impl Manifest {
    /// Variant with the highest advertised bandwidth.
    pub fn best_variant(&self) -> Option<&VariantStream> {
        match self {
            Manifest::Master(variants) => variants.iter().max_by_key(|v| v.bandwidth),
            Manifest::Media(_) => None,
        }
    }
}

/// Parses an HLS playlist.
///
/// # Errors
/// [`PlaybackError::Fatal`] if the `#EXTM3U` header is missing or if the
/// playlist lists neither variants nor segments.
pub fn parse_manifest(text: &str) -> Result<Manifest, PlaybackError> {
    let mut lines = text
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty());

    if lines.next() != Some("#EXTM3U") {
        return Err(PlaybackError::fatal("manifest does not start with #EXTM3U"));
    }

    let mut variants = Vec::new();
    let mut segments = Vec::new();
    let mut pending_bandwidth: Option<u64> = None;
    let mut pending_duration: Option<Duration> = None;

    for line in lines {
        if let Some(attributes) = line.strip_prefix("#EXT-X-STREAM-INF:") {
            pending_bandwidth = Some(
                attribute(attributes, "BANDWIDTH")
                    .and_then(|b| b.parse().ok())
                    .unwrap_or(0),
            );
        } else if let Some(info) = line.strip_prefix("#EXTINF:") {
            let seconds = info.split(',').next().unwrap_or("").trim();
            let duration = seconds
                .parse::<f64>()
                .ok()
                .and_then(|s| Duration::try_from_secs_f64(s).ok())
                .unwrap_or_default();
            pending_duration = Some(duration);
        } else if line.starts_with('#') {
            continue;
        } else if let Some(bandwidth) = pending_bandwidth.take() {
            variants.push(VariantStream {
                bandwidth,
                uri: line.to_string(),
            });
        } else if let Some(duration) = pending_duration.take() {
            segments.push(MediaSegment {
                duration,
                uri: line.to_string(),
            });
        }
    }

    if !variants.is_empty() {
        Ok(Manifest::Master(variants))
    } else if !segments.is_empty() {
        Ok(Manifest::Media(segments))
    } else {
        Err(PlaybackError::fatal("manifest lists no variant and no segment"))
    }
}

/// Value of `name` in an attribute list, quotes stripped.
fn attribute<'a>(list: &'a str, name: &str) -> Option<&'a str> {
    let mut in_quotes = false;
    let mut start = 0;
    let mut fields = Vec::new();
    for (i, c) in list.char_indices() {
        match c {
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => {
                fields.push(&list[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    fields.push(&list[start..]);

    fields.into_iter().find_map(|field| {
        let (key, value) = field.split_once('=')?;
        (key.trim() == name).then(|| value.trim().trim_matches('"'))
    })
}

/// [`StreamEngine`] fetching HLS manifests and segments with reqwest.
#[derive(Debug, Clone)]
pub struct HlsHttpEngine {
    client: Client,
    base_url: Option<Url>,
    allow_audible_autoplay: bool,
    timeout: Duration,
    max_segment_failures: u32,
}

impl HlsHttpEngine {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            base_url: None,
            allow_audible_autoplay: false,
            timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            max_segment_failures: DEFAULT_MAX_SEGMENT_FAILURES,
        }
    }

    /// Base against which relative stream URLs (`/Videos/...`) are resolved.
    pub fn with_base_url(mut self, base_url: Url) -> Self {
        self.base_url = Some(base_url);
        self
    }

    pub fn with_audible_autoplay(mut self, allowed: bool) -> Self {
        self.allow_audible_autoplay = allowed;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_max_segment_failures(mut self, failures: u32) -> Self {
        self.max_segment_failures = failures.max(1);
        self
    }

    fn resolve(&self, stream_url: &str) -> Result<Url, PlaybackError> {
        match Url::parse(stream_url) {
            Ok(url) => Ok(url),
            Err(url::ParseError::RelativeUrlWithoutBase) => match &self.base_url {
                Some(base) => base
                    .join(stream_url)
                    .map_err(|e| PlaybackError::fatal(format!("invalid stream url {stream_url}: {e}"))),
                None => Err(PlaybackError::fatal(format!(
                    "relative stream url {stream_url} without base url"
                ))),
            },
            Err(e) => Err(PlaybackError::fatal(format!(
                "invalid stream url {stream_url}: {e}"
            ))),
        }
    }

    async fn fetch_manifest(&self, url: &Url) -> Result<Manifest, PlaybackError> {
        let response = self
            .client
            .get(url.clone())
            .timeout(self.timeout)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| PlaybackError::fatal(format!("cannot fetch manifest {url}: {e}")))?;
        let text = response
            .text()
            .await
            .map_err(|e| PlaybackError::fatal(format!("cannot read manifest {url}: {e}")))?;
        parse_manifest(&text)
    }
}

#[async_trait]
impl StreamEngine for HlsHttpEngine {
    async fn open(&self, manifest_url: &str) -> Result<Box<dyn StreamSession>, PlaybackError> {
        let mut url = self.resolve(manifest_url)?;
        let mut manifest = self.fetch_manifest(&url).await?;

        for _ in 0..MAX_VARIANT_DEPTH {
            let Some(variant) = manifest.best_variant() else {
                break;
            };
            debug!(bandwidth = variant.bandwidth, uri = %variant.uri, "Selected HLS variant");
            url = url
                .join(&variant.uri)
                .map_err(|e| PlaybackError::fatal(format!("invalid variant uri: {e}")))?;
            manifest = self.fetch_manifest(&url).await?;
        }

        let Manifest::Media(segments) = manifest else {
            return Err(PlaybackError::fatal("variant playlist has no segment"));
        };

        let segments = segments
            .into_iter()
            .map(|segment| {
                url.join(&segment.uri)
                    .map(|uri| (uri, segment.duration))
                    .map_err(|e| PlaybackError::fatal(format!("invalid segment uri: {e}")))
            })
            .collect::<Result<VecDeque<_>, _>>()?;

        info!(url = %url, segments = segments.len(), "HLS stream opened");
        Ok(Box::new(HlsSession {
            client: self.client.clone(),
            segments,
            allow_audible_autoplay: self.allow_audible_autoplay,
            timeout: self.timeout,
            max_segment_failures: self.max_segment_failures,
            consecutive_failures: 0,
            events: VecDeque::new(),
            started: false,
            ended: false,
        }))
    }
}

/// An opened HLS stream.
#[derive(Debug)]
pub struct HlsSession {
    client: Client,
    segments: VecDeque<(Url, Duration)>,
    allow_audible_autoplay: bool,
    timeout: Duration,
    max_segment_failures: u32,
    consecutive_failures: u32,
    events: VecDeque<StreamEvent>,
    started: bool,
    ended: bool,
}

impl HlsSession {
    async fn fetch_segment(&self, url: &Url) -> reqwest::Result<usize> {
        let body = self
            .client
            .get(url.clone())
            .timeout(self.timeout)
            .send()
            .await?
            .error_for_status()?
            .bytes()
            .await?;
        Ok(body.len())
    }
}

#[async_trait]
impl Playable for HlsSession {
    async fn play(&mut self, muted: bool) -> Result<(), PlaybackError> {
        if !muted && !self.allow_audible_autoplay {
            return Err(PlaybackError::AutoplayDenied);
        }
        if !self.started {
            self.started = true;
            self.events.push_back(StreamEvent::Playing);
        }
        Ok(())
    }
}

#[async_trait]
impl StreamSession for HlsSession {
    async fn next_event(&mut self) -> Option<StreamEvent> {
        // La position n'avance qu'après le rythme du segment écoulé
        loop {
            if let Some(event) = self.events.pop_front() {
                return Some(event);
            }
            if self.ended || !self.started {
                return None;
            }

            let Some((url, duration)) = self.segments.front().cloned() else {
                self.ended = true;
                return Some(StreamEvent::Ended);
            };

            match self.fetch_segment(&url).await {
                Ok(bytes) => {
                    self.consecutive_failures = 0;
                    tokio::time::sleep(duration).await;
                    self.segments.pop_front();
                    debug!(url = %url, bytes, "HLS segment played");
                }
                Err(err) => {
                    self.segments.pop_front();
                    self.consecutive_failures += 1;
                    let fatal = self.consecutive_failures >= self.max_segment_failures;
                    if fatal {
                        self.ended = true;
                    }
                    return Some(StreamEvent::Error {
                        fatal,
                        detail: format!("segment {url}: {err}"),
                    });
                }
            }
        }
    }

    async fn destroy(&mut self) {
        self.segments.clear();
        self.events.clear();
        self.ended = true;
        debug!("HLS session destroyed");
    }
}
