//! Reaction aggregator: watches for matching reactions (default "thank")
//! and posts the reacted-to message's permalink into a configured
//! aggregation channel, suppressing repeats within a 24h window.

mod dedup;
mod permalink;
mod resolve;

pub use dedup::{DEDUP_PREFIX, DEDUP_WINDOW_MS, DedupStore, SweeperHandle, start_sweeper};
pub use permalink::{PermalinkRecord, fetch_permalink};
pub use resolve::resolve_channel;

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use regex::RegexBuilder;
use serde::Deserialize;
use tracing::{error, info};

use plugin_core::{
    Clock, Plugin, PluginContext, PluginSpec, Polarity, ReactionEvent, send_reply,
};
use slack_api::ChannelId;

#[derive(Debug, Clone, Deserialize)]
pub struct AggregatorConfig {
    /// Aggregation target, either a channel name or a raw channel ID.
    #[serde(default)]
    pub channel: Option<String>,
    /// Pattern the reaction name must match, case-insensitively.
    #[serde(default = "default_pattern")]
    pub pattern: String,
    /// Whether permalinks from private conversations get published.
    #[serde(default)]
    pub from_private: bool,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            channel: None,
            pattern: default_pattern(),
            from_private: false,
        }
    }
}

fn default_pattern() -> String {
    "thank".to_owned()
}

pub struct Aggregator {
    clock: Arc<dyn Clock>,
}

impl Aggregator {
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self { clock }
    }
}

impl core::fmt::Debug for Aggregator {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Aggregator").finish_non_exhaustive()
    }
}

#[async_trait]
impl Plugin for Aggregator {
    fn id(&self) -> &'static str {
        "aggregator"
    }

    fn help(&self) -> &'static str {
        "Posts permalinks of messages with matching reactions to an aggregation channel"
    }

    fn handles_reactions(&self) -> bool {
        true
    }

    async fn run(&self, _ctx: &PluginContext, _args: &str, _spec: &PluginSpec) -> Result<()> {
        Ok(())
    }

    async fn on_reaction(
        &self,
        ctx: &PluginContext,
        event: &ReactionEvent,
        polarity: Polarity,
        spec: &PluginSpec,
    ) -> Result<()> {
        if polarity != Polarity::Added {
            return Ok(());
        }

        let cfg: AggregatorConfig =
            serde_yaml::from_value(spec.config.clone()).unwrap_or_default();
        let Some(target_setting) = cfg.channel.as_deref() else {
            error!("Aggregation channel is not configured");
            return Ok(());
        };

        let matcher = match RegexBuilder::new(&cfg.pattern).case_insensitive(true).build() {
            Ok(re) => re,
            Err(e) => {
                error!(error = %e, pattern = %cfg.pattern, "Invalid aggregation pattern");
                return Ok(());
            }
        };
        if !matcher.is_match(&event.reaction) {
            return Ok(());
        }

        let Some(target) = resolve_channel(ctx.api.as_ref(), target_setting).await else {
            error!(channel = %target_setting, "Cannot find aggregation channel");
            return Ok(());
        };

        // Aggregating the aggregation channel would recurse.
        if event.item_channel == target {
            info!("Skipping permalink for message already in the aggregation channel");
            return Ok(());
        }

        let record = match fetch_permalink(ctx.api.as_ref(), &event.item_channel, &event.item_ts)
            .await
        {
            Ok(record) => record,
            Err(e) => {
                error!(error = %e, "Error fetching the permalink");
                let _ = send_reply(ctx, "I encountered an error while fetching the permalink.")
                    .await;
                return Ok(());
            }
        };

        let store = DedupStore::new(ctx.brain.clone());
        let now = self.clock.now_millis();
        if let Some(last) = store.last_posted(&record.url).await
            && now - last < DEDUP_WINDOW_MS
        {
            info!(permalink = %record.url, "Permalink already posted within the last 24 hours");
            return Ok(());
        }

        // Recorded before the privacy filter: a suppressed message still
        // consumes its dedup slot for the full window.
        store.record(&record.url, now).await;

        if record.is_private && !cfg.from_private {
            info!("Skipping permalink from private conversation");
            return Ok(());
        }

        publish(ctx, &target, &record.url).await
    }
}

async fn publish(ctx: &PluginContext, target: &ChannelId, url: &str) -> Result<()> {
    ctx.api.post_message(target, url).await?;
    info!(channel = %target, permalink = %url, "Aggregated permalink");
    Ok(())
}
