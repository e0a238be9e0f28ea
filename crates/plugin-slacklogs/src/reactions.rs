use std::path::Path;

use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;
use time::{OffsetDateTime, format_description::well_known::Rfc3339};
use tracing::warn;

use plugin_core::{Plugin, PluginContext, PluginSpec, Polarity, ReactionEvent};

use crate::sink::LineSink;

#[derive(Debug, Serialize)]
struct ReactionRecord<'a> {
    user: Option<&'a str>,
    user_id: &'a str,
    emoji: &'a str,
    polarity: &'a str,
    item_channel: &'a str,
    item_timestamp: &'a str,
    timestamp: String,
}

/// Logs every reaction (added and removed) as one NDJSON record.
#[derive(Debug)]
pub struct ReactionLog {
    sink: LineSink,
}

impl ReactionLog {
    #[must_use]
    pub fn new(path: Option<&Path>) -> Self {
        Self {
            sink: LineSink::open(path),
        }
    }
}

#[async_trait]
impl Plugin for ReactionLog {
    fn id(&self) -> &'static str {
        "reactionlog"
    }

    fn help(&self) -> &'static str {
        "Logs emoji reactions as newline-delimited JSON"
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
        _spec: &PluginSpec,
    ) -> Result<()> {
        let user_name = match ctx.api.user_info(&event.user).await {
            Ok(info) => info.name,
            Err(e) => {
                warn!(error = %e, user = %event.user, "Failed to fetch user info");
                None
            }
        };

        let record = ReactionRecord {
            user: user_name.as_deref(),
            user_id: &event.user,
            emoji: &event.reaction,
            polarity: polarity.as_str(),
            item_channel: event.item_channel.as_str(),
            item_timestamp: &event.item_ts,
            timestamp: OffsetDateTime::now_utc()
                .format(&Rfc3339)
                .unwrap_or_default(),
        };
        let line = serde_json::to_string(&record)?;
        self.sink.write_line(&line).await;
        Ok(())
    }
}
