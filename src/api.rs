//! Client for the profile directory API.
//!
//! Two endpoints are consumed: profile lookup by handle and keyword search.
//! A call succeeds only when the HTTP status is 200 and the body carries
//! `msg: "success"`; anything else is an [`ApiError`]. Response payloads are
//! parsed into optional-field records and converted into [`Profile`]s here,
//! so missing fields become empty strings or zero at this boundary only.

use crate::config::{ApiConfig, HttpConfig};
use crate::profile::Profile;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, warn};

pub type Result<T> = std::result::Result<T, ApiError>;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("API error (status {status})")]
    Status { status: u16 },

    #[error("API reported failure: {msg}")]
    Unsuccessful { msg: String },

    #[error("Malformed response: {0}")]
    Malformed(String),
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ApiError::Timeout(err.to_string())
        } else {
            ApiError::Network(err.to_string())
        }
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        ApiError::Malformed(err.to_string())
    }
}

/// Common response wrapper: `{"msg": "success", "data": {...}}`
#[derive(Debug, Deserialize)]
struct Envelope<T> {
    #[serde(default)]
    msg: Option<String>,
    data: Option<T>,
}

/// User object as returned by both endpoints. Every field may be absent or null.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawUser {
    #[serde(rename = "uniqueId", default)]
    pub unique_id: Option<String>,
    #[serde(default)]
    pub nickname: Option<String>,
    #[serde(default)]
    pub signature: Option<String>,
    #[serde(rename = "avatarMedium", default)]
    pub avatar_medium: Option<String>,
    #[serde(rename = "avatarThumb", default)]
    pub avatar_thumb: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawStats {
    #[serde(rename = "followerCount", default)]
    pub follower_count: Option<u64>,
}

/// Payload of the profile lookup endpoint
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UserInfo {
    #[serde(default)]
    pub user: Option<RawUser>,
    #[serde(default)]
    pub stats: Option<RawStats>,
}

#[derive(Debug, Deserialize)]
struct SearchData {
    #[serde(default)]
    user_list: Option<Vec<serde_json::Value>>,
}

#[derive(Debug, Deserialize)]
struct SearchEntry {
    #[serde(default)]
    user: Option<RawUser>,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|s| !s.is_empty())
}

impl RawUser {
    pub fn handle(&self) -> Option<&str> {
        self.unique_id.as_deref().filter(|s| !s.is_empty())
    }

    /// Convert into a profile, applying empty-string defaults.
    /// `fallback_handle` is used when the payload has no `uniqueId`.
    pub fn into_profile(self, fallback_handle: &str, stats: Option<&RawStats>) -> Profile {
        let handle = non_empty(self.unique_id).unwrap_or_else(|| fallback_handle.to_string());
        let avatar_url = non_empty(self.avatar_medium)
            .or_else(|| non_empty(self.avatar_thumb))
            .unwrap_or_default();
        let follower_count = stats.and_then(|s| s.follower_count).unwrap_or(0);

        Profile::new(
            handle,
            self.nickname.unwrap_or_default(),
            self.signature.unwrap_or_default(),
            avatar_url,
        )
        .with_follower_count(follower_count)
    }
}

pub struct DirectoryClient {
    client: reqwest::Client,
    config: ApiConfig,
}

impl DirectoryClient {
    pub fn new(api: &ApiConfig, http: &HttpConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(http.user_agent.clone())
            .timeout(http.request_timeout())
            .build()?;
        Ok(Self {
            client,
            config: api.clone(),
        })
    }

    pub fn page_size(&self) -> u32 {
        self.config.search_page_size
    }

    /// Look up a profile by handle. Returns the raw payload so the caller can
    /// decide what counts as "not found".
    pub async fn lookup_profile(&self, handle: &str) -> Result<UserInfo> {
        debug!(handle, "Looking up profile");
        let unique_id = format!("@{}", handle);
        self.get_data(&self.config.user_info_url, &[("unique_id", unique_id.as_str())])
            .await
    }

    /// Search profiles by keyword. Entries without a usable user object are dropped.
    pub async fn search_profiles(&self, keyword: &str, count: u32, cursor: u32) -> Result<Vec<Profile>> {
        debug!(keyword, count, cursor, "Searching profiles");
        let count = count.to_string();
        let cursor = cursor.to_string();
        let data: SearchData = self
            .get_data(
                &self.config.search_profiles_url,
                &[("keywords", keyword), ("count", count.as_str()), ("cursor", cursor.as_str())],
            )
            .await?;

        let entries = data
            .user_list
            .ok_or_else(|| ApiError::Malformed(format!("search for '{}' has no data.user_list", keyword)))?;

        let mut profiles = Vec::with_capacity(entries.len());
        for entry in entries {
            match serde_json::from_value::<SearchEntry>(entry) {
                Ok(SearchEntry { user: Some(user) }) if user.handle().is_some() => {
                    profiles.push(user.into_profile("", None));
                }
                Ok(_) => debug!(keyword, "Skipping search entry without a user handle"),
                Err(e) => warn!(keyword, error = %e, "Skipping malformed search entry"),
            }
        }
        Ok(profiles)
    }

    async fn get_data<T: DeserializeOwned>(&self, url: &str, query: &[(&str, &str)]) -> Result<T> {
        let resp = self
            .client
            .get(url)
            .header("X-RapidAPI-Key", &self.config.key)
            .header("X-RapidAPI-Host", &self.config.host)
            .query(query)
            .send()
            .await?;

        let status = resp.status();
        if status != reqwest::StatusCode::OK {
            return Err(ApiError::Status {
                status: status.as_u16(),
            });
        }

        let body = resp.text().await?;
        let envelope: Envelope<T> = serde_json::from_str(&body)?;

        match envelope.msg.as_deref() {
            Some(msg) if msg.eq_ignore_ascii_case("success") => {}
            other => {
                return Err(ApiError::Unsuccessful {
                    msg: other.unwrap_or("<missing>").to_string(),
                })
            }
        }

        envelope
            .data
            .ok_or_else(|| ApiError::Malformed("response has no data field".to_string()))
    }
}
