//! Channel name to ID resolution.

use tracing::error;

use slack_api::{ChannelId, SlackApi};

/// Resolve a configured target to a channel ID.
///
/// Inputs already in ID format are returned unchanged with no network
/// call. Otherwise the directory is queried and the first non-archived
/// channel whose name matches exactly (case-sensitive) wins. Remote
/// failure is logged and reported as `None`, never as an error.
pub async fn resolve_channel(api: &dyn SlackApi, name_or_id: &str) -> Option<ChannelId> {
    if ChannelId::is_id_format(name_or_id) {
        return Some(ChannelId::from(name_or_id));
    }
    match api.list_channels().await {
        Ok(channels) => channels
            .into_iter()
            .find(|c| !c.is_archived && c.name == name_or_id)
            .map(|c| c.id),
        Err(e) => {
            error!(error = %e, channel = %name_or_id, "Error fetching channel ID by name");
            None
        }
    }
}
