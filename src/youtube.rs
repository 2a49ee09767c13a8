#![forbid(unsafe_code)]

//! Blocking client for the two YouTube Data API v3 reads the dashboard needs:
//! the regional "most popular" chart and channel statistics.
//!
//! Every call is a single request without retries. Callers running inside the
//! async server hand the client to `spawn_blocking`.

use std::time::Duration;

use serde::{Deserialize, Deserializer, Serialize, de::DeserializeOwned};
use thiserror::Error;
use tracing::debug;

pub const API_BASE_URL: &str = "https://www.googleapis.com/youtube/v3";

/// `channels.list` rejects requests carrying more ids than this.
pub const CHANNEL_BATCH_SIZE: usize = 50;

#[derive(Debug, Error)]
pub enum PlatformError {
    #[error("request to YouTube {endpoint} endpoint failed: {message}")]
    Transport {
        endpoint: &'static str,
        message: String,
    },
    /// Non-2xx answer; `message` is the platform's own explanation when the
    /// body carried one.
    #[error("{message}")]
    Api { status: u16, message: String },
    #[error("decoding YouTube {endpoint} response: {source}")]
    Decode {
        endpoint: &'static str,
        #[source]
        source: std::io::Error,
    },
}

/// A video currently on the trending chart.
#[derive(Debug, Clone, PartialEq)]
pub struct TrendingItem {
    pub id: String,
    pub title: String,
    pub channel_id: String,
    pub channel_title: String,
    pub category_id: Option<String>,
    pub published_at: String,
    pub view_count: i64,
    pub like_count: i64,
}

/// Live statistics for one channel.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChannelStats {
    pub channel_id: String,
    pub title: String,
    pub subscriber_count: i64,
    pub view_count: i64,
    pub video_count: i64,
}

/// The reads ingestion and analytics depend on. Implemented by
/// [`YouTubeClient`] and by in-process fakes in tests.
pub trait VideoPlatform: Send + Sync {
    fn list_trending(
        &self,
        region_code: &str,
        max_results: u32,
    ) -> Result<Vec<TrendingItem>, PlatformError>;

    /// One `channels.list` round trip. `ids` never holds more than
    /// [`CHANNEL_BATCH_SIZE`] entries.
    fn fetch_channel_batch(&self, ids: &[String]) -> Result<Vec<ChannelStats>, PlatformError>;

    /// Looks up every id, [`CHANNEL_BATCH_SIZE`] at a time, concatenating the
    /// batches in request order. The first failing batch aborts the lookup.
    fn list_channel_stats(&self, ids: &[String]) -> Result<Vec<ChannelStats>, PlatformError> {
        let mut stats = Vec::with_capacity(ids.len());
        for batch in ids.chunks(CHANNEL_BATCH_SIZE) {
            stats.extend(self.fetch_channel_batch(batch)?);
        }
        Ok(stats)
    }
}

pub struct YouTubeClient {
    agent: ureq::Agent,
    api_key: String,
    base_url: String,
}

impl YouTubeClient {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self::with_base_url(api_key, API_BASE_URL)
    }

    pub fn with_base_url(api_key: impl Into<String>, base_url: impl Into<String>) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout_connect(Duration::from_secs(10))
            .timeout_read(Duration::from_secs(30))
            .user_agent(concat!("trendboard/", env!("CARGO_PKG_VERSION")))
            .build();
        Self {
            agent,
            api_key: api_key.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn get_json<T: DeserializeOwned>(
        &self,
        endpoint: &'static str,
        query: &[(&str, &str)],
    ) -> Result<T, PlatformError> {
        let url = format!("{}/{endpoint}", self.base_url);
        debug!(endpoint, ?query, "YouTube API request");

        let mut request = self.agent.get(&url);
        for (key, value) in query {
            request = request.query(key, value);
        }
        // The key stays out of the logged query above.
        request = request.query("key", &self.api_key);

        match request.call() {
            Ok(response) => response
                .into_json::<T>()
                .map_err(|source| PlatformError::Decode { endpoint, source }),
            Err(ureq::Error::Status(status, response)) => {
                let body = response.into_string().unwrap_or_default();
                Err(PlatformError::Api {
                    status,
                    message: api_error_message(status, &body),
                })
            }
            // Transport errors render the full URL, key included, so only the
            // kind and message are kept.
            Err(ureq::Error::Transport(err)) => {
                let message = match err.message() {
                    Some(detail) => format!("{}: {detail}", err.kind()),
                    None => err.kind().to_string(),
                };
                Err(PlatformError::Transport { endpoint, message })
            }
        }
    }
}

impl VideoPlatform for YouTubeClient {
    fn list_trending(
        &self,
        region_code: &str,
        max_results: u32,
    ) -> Result<Vec<TrendingItem>, PlatformError> {
        let max_results = max_results.to_string();
        let response: ListResponse<VideoResource> = self.get_json(
            "videos",
            &[
                ("part", "snippet,statistics"),
                ("chart", "mostPopular"),
                ("regionCode", region_code),
                ("maxResults", &max_results),
            ],
        )?;
        Ok(response.items.into_iter().map(TrendingItem::from).collect())
    }

    fn fetch_channel_batch(&self, ids: &[String]) -> Result<Vec<ChannelStats>, PlatformError> {
        let joined = ids.join(",");
        let response: ListResponse<ChannelResource> = self.get_json(
            "channels",
            &[("part", "snippet,statistics"), ("id", &joined)],
        )?;
        Ok(response.items.into_iter().map(ChannelStats::from).collect())
    }
}

/// Pulls `error.message` out of a Google API error body.
fn api_error_message(status: u16, body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|value| {
            value
                .pointer("/error/message")
                .and_then(|message| message.as_str())
                .map(str::to_owned)
        })
        .filter(|message| !message.trim().is_empty())
        .unwrap_or_else(|| format!("YouTube API returned HTTP {status}"))
}

#[derive(Debug, Deserialize)]
struct ListResponse<T> {
    #[serde(default = "Vec::new")]
    items: Vec<T>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VideoResource {
    id: String,
    snippet: VideoSnippet,
    #[serde(default)]
    statistics: VideoStatistics,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VideoSnippet {
    title: String,
    channel_id: String,
    channel_title: String,
    #[serde(default)]
    category_id: Option<String>,
    published_at: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VideoStatistics {
    #[serde(default, deserialize_with = "deserialize_count")]
    view_count: i64,
    #[serde(default, deserialize_with = "deserialize_count")]
    like_count: i64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChannelResource {
    id: String,
    snippet: ChannelSnippet,
    #[serde(default)]
    statistics: ChannelStatistics,
}

#[derive(Debug, Deserialize)]
struct ChannelSnippet {
    title: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChannelStatistics {
    #[serde(default, deserialize_with = "deserialize_count")]
    subscriber_count: i64,
    #[serde(default, deserialize_with = "deserialize_count")]
    view_count: i64,
    #[serde(default, deserialize_with = "deserialize_count")]
    video_count: i64,
}

impl From<VideoResource> for TrendingItem {
    fn from(resource: VideoResource) -> Self {
        Self {
            id: resource.id,
            title: resource.snippet.title,
            channel_id: resource.snippet.channel_id,
            channel_title: resource.snippet.channel_title,
            category_id: resource.snippet.category_id,
            published_at: resource.snippet.published_at,
            view_count: resource.statistics.view_count,
            like_count: resource.statistics.like_count,
        }
    }
}

impl From<ChannelResource> for ChannelStats {
    fn from(resource: ChannelResource) -> Self {
        Self {
            channel_id: resource.id,
            title: resource.snippet.title,
            subscriber_count: resource.statistics.subscriber_count,
            view_count: resource.statistics.view_count,
            video_count: resource.statistics.video_count,
        }
    }
}

/// The API encodes 64-bit counters as decimal strings. Absent or null
/// counters (hidden likes, hidden subscriber counts) become 0.
fn deserialize_count<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawCount {
        Number(i64),
        Text(String),
    }

    match Option::<RawCount>::deserialize(deserializer)? {
        None => Ok(0),
        Some(RawCount::Number(value)) => Ok(value.max(0)),
        Some(RawCount::Text(text)) => {
            let trimmed = text.trim();
            if trimmed.is_empty() {
                return Ok(0);
            }
            trimmed
                .parse::<i64>()
                .map(|value| value.max(0))
                .map_err(|err| serde::de::Error::custom(format!("invalid count {text:?}: {err}")))
        }
    }
}
