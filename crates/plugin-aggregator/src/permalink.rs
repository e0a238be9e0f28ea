//! Permalink retrieval for a (channel, ts) pair.

use anyhow::{Context as _, Result};

use slack_api::{ChannelId, SlackApi};

/// A durable link for one message plus the privacy classification of the
/// conversation it lives in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PermalinkRecord {
    pub url: String,
    pub is_private: bool,
}

/// Two sequential remote calls; both must succeed. The error context names
/// the stage that failed.
pub async fn fetch_permalink(
    api: &dyn SlackApi,
    channel: &ChannelId,
    ts: &str,
) -> Result<PermalinkRecord> {
    let info = api
        .channel_info(channel)
        .await
        .context("fetching conversation information")?;
    let url = api
        .permalink(channel, ts)
        .await
        .context("fetching message permalink")?;
    Ok(PermalinkRecord {
        url,
        is_private: info.is_private,
    })
}
