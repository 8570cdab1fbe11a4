//! External platform API clients
//!
//! One client per platform, each exposing the same seam: publish an asset
//! with metadata and get back a public URL, plus a best-effort analytics
//! read. Authentication is a per-user bearer token obtained by the separate
//! OAuth flow; the token arrives with the release metadata.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use thiserror::Error;
use trackwire_common::Platform;

use super::{PlatformAnalytics, ReleaseMetadata};

const YOUTUBE_BASE_URL: &str = "https://www.googleapis.com/youtube/v3";
const SPOTIFY_BASE_URL: &str = "https://api.spotify.com/v1";
const SOUNDCLOUD_BASE_URL: &str = "https://api.soundcloud.com";
const USER_AGENT: &str = "trackwire/0.1.0";
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Platform client errors
#[derive(Debug, Error)]
pub enum PlatformError {
    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("API error {0}: {1}")]
    ApiError(u16, String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("No auth token for {0}")]
    MissingToken(Platform),
}

/// Publish/analytics seam to one external platform
///
/// Implementations must be independent of each other: a failure in one
/// client never affects another platform's attempt.
#[async_trait]
pub trait PlatformClient: Send + Sync {
    fn platform(&self) -> Platform;

    /// Publish the asset; returns the public URL on success
    async fn publish(
        &self,
        file_url: &str,
        metadata: &ReleaseMetadata,
    ) -> Result<String, PlatformError>;

    /// Fetch platform metrics for a published release
    async fn analytics(&self, published_url: &str) -> Result<PlatformAnalytics, PlatformError>;
}

fn build_http_client() -> Result<reqwest::Client, PlatformError> {
    reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
        .build()
        .map_err(|e| PlatformError::NetworkError(e.to_string()))
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, PlatformError> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(PlatformError::ApiError(status.as_u16(), body));
    }
    Ok(response)
}

// ---------------------------------------------------------------------------
// YouTube
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct YoutubeVideoResponse {
    id: String,
}

#[derive(Debug, Deserialize)]
struct YoutubeStatsResponse {
    #[serde(default)]
    view_count: u64,
    #[serde(default)]
    like_count: u64,
    #[serde(default)]
    comment_count: u64,
}

/// Video platform client
pub struct YoutubeClient {
    http_client: reqwest::Client,
}

impl YoutubeClient {
    pub fn new() -> Result<Self, PlatformError> {
        Ok(Self {
            http_client: build_http_client()?,
        })
    }
}

#[async_trait]
impl PlatformClient for YoutubeClient {
    fn platform(&self) -> Platform {
        Platform::Youtube
    }

    async fn publish(
        &self,
        _file_url: &str,
        metadata: &ReleaseMetadata,
    ) -> Result<String, PlatformError> {
        let token = metadata
            .token(Platform::Youtube)
            .ok_or(PlatformError::MissingToken(Platform::Youtube))?;

        let response = self
            .http_client
            .post(format!("{}/videos", YOUTUBE_BASE_URL))
            .bearer_auth(token)
            .json(&json!({
                "snippet": {
                    "title": metadata.title,
                    "description": metadata.description,
                    "tags": metadata.tags,
                },
                "status": { "privacyStatus": "public" },
            }))
            .send()
            .await
            .map_err(|e| PlatformError::NetworkError(e.to_string()))?;

        let video: YoutubeVideoResponse = check_status(response)
            .await?
            .json()
            .await
            .map_err(|e| PlatformError::ParseError(e.to_string()))?;

        Ok(format!("https://youtube.com/watch?v={}", video.id))
    }

    async fn analytics(&self, published_url: &str) -> Result<PlatformAnalytics, PlatformError> {
        let video_id = published_url
            .split_once("v=")
            .map(|(_, id)| id)
            .ok_or_else(|| PlatformError::ParseError(format!("No video id in {}", published_url)))?;

        let response = self
            .http_client
            .get(format!("{}/videos/{}/stats", YOUTUBE_BASE_URL, video_id))
            .send()
            .await
            .map_err(|e| PlatformError::NetworkError(e.to_string()))?;

        let stats: YoutubeStatsResponse = check_status(response)
            .await?
            .json()
            .await
            .map_err(|e| PlatformError::ParseError(e.to_string()))?;

        Ok(PlatformAnalytics {
            platform: Platform::Youtube,
            plays: stats.view_count,
            likes: stats.like_count,
            comments: stats.comment_count,
        })
    }
}

// ---------------------------------------------------------------------------
// Spotify
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct SpotifyExternalUrls {
    spotify: String,
}

#[derive(Debug, Deserialize)]
struct SpotifyTrackResponse {
    external_urls: SpotifyExternalUrls,
}

#[derive(Debug, Deserialize)]
struct SpotifyStatsResponse {
    #[serde(default)]
    streams: u64,
    #[serde(default)]
    saves: u64,
}

/// Audio-streaming platform client
pub struct SpotifyClient {
    http_client: reqwest::Client,
}

impl SpotifyClient {
    pub fn new() -> Result<Self, PlatformError> {
        Ok(Self {
            http_client: build_http_client()?,
        })
    }
}

#[async_trait]
impl PlatformClient for SpotifyClient {
    fn platform(&self) -> Platform {
        Platform::Spotify
    }

    async fn publish(
        &self,
        file_url: &str,
        metadata: &ReleaseMetadata,
    ) -> Result<String, PlatformError> {
        let token = metadata
            .token(Platform::Spotify)
            .ok_or(PlatformError::MissingToken(Platform::Spotify))?;

        let response = self
            .http_client
            .post(format!("{}/users/me/tracks", SPOTIFY_BASE_URL))
            .bearer_auth(token)
            .json(&json!({
                "name": metadata.title,
                "description": metadata.description,
                "audio_url": file_url,
            }))
            .send()
            .await
            .map_err(|e| PlatformError::NetworkError(e.to_string()))?;

        let track: SpotifyTrackResponse = check_status(response)
            .await?
            .json()
            .await
            .map_err(|e| PlatformError::ParseError(e.to_string()))?;

        Ok(track.external_urls.spotify)
    }

    async fn analytics(&self, published_url: &str) -> Result<PlatformAnalytics, PlatformError> {
        let response = self
            .http_client
            .get(format!("{}/tracks/stats", SPOTIFY_BASE_URL))
            .query(&[("url", published_url)])
            .send()
            .await
            .map_err(|e| PlatformError::NetworkError(e.to_string()))?;

        let stats: SpotifyStatsResponse = check_status(response)
            .await?
            .json()
            .await
            .map_err(|e| PlatformError::ParseError(e.to_string()))?;

        Ok(PlatformAnalytics {
            platform: Platform::Spotify,
            plays: stats.streams,
            likes: stats.saves,
            comments: 0,
        })
    }
}

// ---------------------------------------------------------------------------
// SoundCloud
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct SoundcloudTrackResponse {
    permalink_url: String,
}

#[derive(Debug, Deserialize)]
struct SoundcloudStatsResponse {
    #[serde(default)]
    playback_count: u64,
    #[serde(default)]
    favoritings_count: u64,
    #[serde(default)]
    comment_count: u64,
}

/// Audio-social platform client
pub struct SoundcloudClient {
    http_client: reqwest::Client,
}

impl SoundcloudClient {
    pub fn new() -> Result<Self, PlatformError> {
        Ok(Self {
            http_client: build_http_client()?,
        })
    }
}

#[async_trait]
impl PlatformClient for SoundcloudClient {
    fn platform(&self) -> Platform {
        Platform::Soundcloud
    }

    async fn publish(
        &self,
        file_url: &str,
        metadata: &ReleaseMetadata,
    ) -> Result<String, PlatformError> {
        let token = metadata
            .token(Platform::Soundcloud)
            .ok_or(PlatformError::MissingToken(Platform::Soundcloud))?;

        let response = self
            .http_client
            .post(format!("{}/tracks", SOUNDCLOUD_BASE_URL))
            // SoundCloud uses the OAuth scheme name rather than Bearer
            .header("Authorization", format!("OAuth {}", token))
            .json(&json!({
                "title": metadata.title,
                "description": metadata.description,
                "asset_data": file_url,
            }))
            .send()
            .await
            .map_err(|e| PlatformError::NetworkError(e.to_string()))?;

        let track: SoundcloudTrackResponse = check_status(response)
            .await?
            .json()
            .await
            .map_err(|e| PlatformError::ParseError(e.to_string()))?;

        Ok(track.permalink_url)
    }

    async fn analytics(&self, published_url: &str) -> Result<PlatformAnalytics, PlatformError> {
        let response = self
            .http_client
            .get(format!("{}/tracks/stats", SOUNDCLOUD_BASE_URL))
            .query(&[("url", published_url)])
            .send()
            .await
            .map_err(|e| PlatformError::NetworkError(e.to_string()))?;

        let stats: SoundcloudStatsResponse = check_status(response)
            .await?
            .json()
            .await
            .map_err(|e| PlatformError::ParseError(e.to_string()))?;

        Ok(PlatformAnalytics {
            platform: Platform::Soundcloud,
            plays: stats.playback_count,
            likes: stats.favoritings_count,
            comments: stats.comment_count,
        })
    }
}
