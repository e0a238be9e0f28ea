//! Thin typed surface over the Slack Web API.
//!
//! Plugins talk to [`SlackApi`] so tests can substitute a mock; the real
//! implementation is [`WebApiClient`] in [`web`].

pub mod web;

pub use web::{AuthInfo, WebApiClient};

use core::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Opaque conversation identifier, e.g. `C0123ABCDE`.
///
/// Distinguished from a human-readable channel name by its fixed format:
/// a leading `C` followed by nine uppercase alphanumerics.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChannelId(String);

impl ChannelId {
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether `s` is already in channel-ID format (no directory lookup
    /// needed to use it).
    #[must_use]
    pub fn is_id_format(s: &str) -> bool {
        let mut chars = s.chars();
        if chars.next() != Some('C') {
            return false;
        }
        let rest: Vec<char> = chars.collect();
        rest.len() == 9
            && rest
                .iter()
                .all(|c| c.is_ascii_digit() || c.is_ascii_uppercase())
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ChannelId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

/// One entry from the conversation directory listing.
#[derive(Debug, Clone, Deserialize)]
pub struct ChannelSummary {
    pub id: ChannelId,
    pub name: String,
    #[serde(default)]
    pub is_archived: bool,
}

/// Metadata for a single conversation.
#[derive(Debug, Clone, Deserialize)]
pub struct ChannelInfo {
    pub id: ChannelId,
    #[serde(default)]
    pub is_private: bool,
}

/// Resolved user profile fields we care about.
#[derive(Debug, Clone, Deserialize)]
pub struct UserInfo {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
}

/// Failure of a single Web API call. The `method` names the stage that
/// failed so orchestration errors stay diagnosable.
#[derive(Debug, Error)]
pub enum ApiError {
    /// The call completed but the envelope reported `ok: false`.
    #[error("slack `{method}` returned error: {code}")]
    NotOk { method: &'static str, code: String },
    /// Transport-level failure (connect, TLS, body decode).
    #[error("slack `{method}` transport failure")]
    Transport {
        method: &'static str,
        #[source]
        source: reqwest::Error,
    },
}

pub type ApiResult<T> = Result<T, ApiError>;

/// The subset of the Slack Web API the plugins use. All calls are fallible
/// and asynchronous; none retry.
#[async_trait]
pub trait SlackApi: Send + Sync {
    /// List all conversations visible to the bot, archived ones included.
    async fn list_channels(&self) -> ApiResult<Vec<ChannelSummary>>;

    /// Fetch metadata (notably the privacy classification) for a channel.
    async fn channel_info(&self, channel: &ChannelId) -> ApiResult<ChannelInfo>;

    /// Fetch the durable shareable link for a specific message.
    async fn permalink(&self, channel: &ChannelId, ts: &str) -> ApiResult<String>;

    /// Resolve a user ID to profile information.
    async fn user_info(&self, user: &str) -> ApiResult<UserInfo>;

    /// Post a plain-text message to a channel.
    async fn post_message(&self, channel: &ChannelId, text: &str) -> ApiResult<()>;

    /// Add an emoji reaction to a message.
    async fn add_reaction(&self, channel: &ChannelId, ts: &str, name: &str) -> ApiResult<()>;
}
