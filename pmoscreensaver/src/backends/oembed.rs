//! Embedded clips resolved through an oEmbed endpoint.
//!
//! The provider checks that the video exists and is embeddable with one
//! oEmbed lookup, then hands out a headless player that plays for
//! `clip_duration`.

use std::collections::VecDeque;
use std::future::pending;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use tokio::time::{Instant, sleep_until};
use tracing::{debug, info};
use url::Url;

use crate::adapter::{EmbedOptions, EmbedProvider, EmbeddedPlayer, Playable, ProviderEvent, ProviderState};
use crate::error::PlaybackError;

use super::DEFAULT_REQUEST_TIMEOUT_SECS;

pub const DEFAULT_OEMBED_ENDPOINT: &str = "https://www.youtube.com/oembed";
pub const DEFAULT_WATCH_URL: &str = "https://www.youtube.com/watch";
pub const DEFAULT_CLIP_DURATION_SECS: u64 = 60;

/// Subset of the oEmbed response used by the kiosk.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct OEmbedInfo {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub author_name: Option<String>,
    #[serde(default)]
    pub provider_name: Option<String>,
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
}

#[derive(Debug, Clone)]
pub struct OEmbedProvider {
    client: Client,
    endpoint: Url,
    watch_url: String,
    clip_duration: Duration,
    allow_audible_autoplay: bool,
    timeout: Duration,
}

impl OEmbedProvider {
    pub fn new(client: Client, endpoint: Url) -> Self {
        Self {
            client,
            endpoint,
            watch_url: DEFAULT_WATCH_URL.to_string(),
            clip_duration: Duration::from_secs(DEFAULT_CLIP_DURATION_SECS),
            allow_audible_autoplay: false,
            timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
        }
    }

    /// Page URL pattern the endpoint is queried with (`?v=<id>` is appended).
    pub fn with_watch_url(mut self, watch_url: impl Into<String>) -> Self {
        self.watch_url = watch_url.into();
        self
    }

    pub fn with_clip_duration(mut self, clip_duration: Duration) -> Self {
        self.clip_duration = clip_duration;
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

    /// Looks the video up on the oEmbed endpoint.
    ///
    /// # Errors
    /// [`PlaybackError::Unavailable`] on network errors, on unknown or
    /// non-embeddable videos, and on unparsable responses.
    pub async fn lookup(&self, video_id: &str) -> Result<OEmbedInfo, PlaybackError> {
        let watch = Url::parse_with_params(&self.watch_url, &[("v", video_id)])
            .map_err(|e| PlaybackError::unavailable(format!("invalid watch url: {e}")))?;

        let response = self
            .client
            .get(self.endpoint.clone())
            .query(&[("url", watch.as_str()), ("format", "json")])
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| PlaybackError::unavailable(format!("oEmbed request failed: {e}")))?;

        match response.status() {
            status if status.is_success() => {}
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                return Err(PlaybackError::unavailable(format!(
                    "video {video_id} cannot be embedded"
                )));
            }
            StatusCode::NOT_FOUND => {
                return Err(PlaybackError::unavailable(format!(
                    "video {video_id} not found"
                )));
            }
            status => {
                return Err(PlaybackError::unavailable(format!(
                    "oEmbed endpoint answered {status}"
                )));
            }
        }

        let body = response
            .text()
            .await
            .map_err(|e| PlaybackError::unavailable(format!("oEmbed body: {e}")))?;
        serde_json::from_str(&body)
            .map_err(|e| PlaybackError::unavailable(format!("invalid oEmbed response: {e}")))
    }
}

#[async_trait]
impl EmbedProvider for OEmbedProvider {
    async fn load(
        &self,
        video_id: &str,
        options: &EmbedOptions,
    ) -> Result<Box<dyn EmbeddedPlayer>, PlaybackError> {
        let info = self.lookup(video_id).await?;
        info!(
            video_id,
            title = info.title.as_deref().unwrap_or(""),
            provider = info.provider_name.as_deref().unwrap_or(""),
            "Embedded clip resolved"
        );

        Ok(Box::new(OEmbedPlayer {
            info,
            options: *options,
            clip_duration: self.clip_duration,
            allow_audible_autoplay: self.allow_audible_autoplay,
            muted: options.start_muted,
            ends_at: None,
            events: VecDeque::from([ProviderEvent::Ready]),
            closed: false,
        }))
    }
}

/// Headless player: `Ready` once loaded, `Playing` after `play`, `Ended`
/// when the clip duration has elapsed.
#[derive(Debug)]
pub struct OEmbedPlayer {
    info: OEmbedInfo,
    options: EmbedOptions,
    clip_duration: Duration,
    allow_audible_autoplay: bool,
    muted: bool,
    ends_at: Option<Instant>,
    events: VecDeque<ProviderEvent>,
    closed: bool,
}

impl OEmbedPlayer {
    pub fn info(&self) -> &OEmbedInfo {
        &self.info
    }

    pub fn options(&self) -> &EmbedOptions {
        &self.options
    }

    pub fn is_muted(&self) -> bool {
        self.muted
    }
}

#[async_trait]
impl Playable for OEmbedPlayer {
    async fn play(&mut self, muted: bool) -> Result<(), PlaybackError> {
        if !muted && !self.allow_audible_autoplay {
            return Err(PlaybackError::AutoplayDenied);
        }
        self.muted = muted;
        if self.ends_at.is_none() {
            self.ends_at = Some(Instant::now() + self.clip_duration);
            self.events
                .push_back(ProviderEvent::StateChanged(ProviderState::Playing));
        }
        Ok(())
    }
}

#[async_trait]
impl EmbeddedPlayer for OEmbedPlayer {
    async fn next_event(&mut self) -> Option<ProviderEvent> {
        if self.closed {
            return None;
        }
        if let Some(event) = self.events.pop_front() {
            return Some(event);
        }
        match self.ends_at {
            Some(at) => {
                sleep_until(at).await;
                self.closed = true;
                Some(ProviderEvent::StateChanged(ProviderState::Ended))
            }
            // Ni lu ni détruit : rien à signaler
            None => pending().await,
        }
    }

    async fn unmute(&mut self) -> Result<(), PlaybackError> {
        if !self.allow_audible_autoplay {
            return Err(PlaybackError::AutoplayDenied);
        }
        self.muted = false;
        Ok(())
    }

    async fn destroy(&mut self) {
        self.closed = true;
        self.events.clear();
        debug!(title = self.info.title.as_deref().unwrap_or(""), "Embedded player closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::{
        Mock, MockServer, ResponseTemplate,
        matchers::{method, path, query_param},
    };

    fn provider(server: &MockServer) -> OEmbedProvider {
        let endpoint = Url::parse(&format!("{}/oembed", server.uri())).unwrap();
        OEmbedProvider::new(Client::new(), endpoint)
            .with_clip_duration(Duration::from_millis(20))
    }

    async fn mount_found(server: &MockServer) {
        Mock::given(method("GET"))
            .and(path("/oembed"))
            .and(query_param("url", "https://www.youtube.com/watch?v=vUlae8o14zw"))
            .and(query_param("format", "json"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"{"title":"Ganga rejuvenation","author_name":"SLCR","provider_name":"YouTube","type":"video","html":"<iframe></iframe>"}"#,
            ))
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn test_lookup_parses_response() {
        let server = MockServer::start().await;
        mount_found(&server).await;

        let info = provider(&server).lookup("vUlae8o14zw").await.unwrap();
        assert_eq!(info.title.as_deref(), Some("Ganga rejuvenation"));
        assert_eq!(info.kind.as_deref(), Some("video"));
    }

    #[tokio::test]
    async fn test_unknown_and_private_videos_are_unavailable() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/oembed"))
            .and(query_param("url", "https://www.youtube.com/watch?v=private"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let provider = provider(&server);
        let options = EmbedOptions::masked(true);
        assert!(matches!(
            provider.load("private", &options).await,
            Err(PlaybackError::Unavailable(_))
        ));
        // Aucun mock : 404
        assert!(matches!(
            provider.load("missing", &options).await,
            Err(PlaybackError::Unavailable(_))
        ));
    }

    #[tokio::test]
    async fn test_invalid_json_is_unavailable() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/oembed"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html></html>"))
            .mount(&server)
            .await;

        assert!(matches!(
            provider(&server).lookup("abc").await,
            Err(PlaybackError::Unavailable(_))
        ));
    }

    #[tokio::test]
    async fn test_player_lifecycle_without_sound() {
        let server = MockServer::start().await;
        mount_found(&server).await;

        let mut player = provider(&server)
            .load("vUlae8o14zw", &EmbedOptions::masked(true))
            .await
            .unwrap();

        assert_eq!(player.next_event().await, Some(ProviderEvent::Ready));
        assert_eq!(player.play(false).await, Err(PlaybackError::AutoplayDenied));
        player.play(true).await.unwrap();
        assert_eq!(
            player.next_event().await,
            Some(ProviderEvent::StateChanged(ProviderState::Playing))
        );
        assert_eq!(player.unmute().await, Err(PlaybackError::AutoplayDenied));
        assert_eq!(
            player.next_event().await,
            Some(ProviderEvent::StateChanged(ProviderState::Ended))
        );
        player.destroy().await;
        assert_eq!(player.next_event().await, None);
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_unavailable() {
        // Port fermé
        let endpoint = Url::parse("http://127.0.0.1:9/oembed").unwrap();
        let provider = OEmbedProvider::new(Client::new(), endpoint)
            .with_timeout(Duration::from_millis(500));
        assert!(matches!(
            provider.lookup("abc").await,
            Err(PlaybackError::Unavailable(_))
        ));
    }
}
