use std::path::Path;

use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;
use time::{OffsetDateTime, format_description::well_known::Rfc3339};
use tracing::warn;

use plugin_core::{MessageEvent, Plugin, PluginContext, PluginSpec};

use crate::sink::LineSink;

#[derive(Debug, Serialize)]
struct MessageRecord<'a> {
    user: Option<&'a str>,
    user_id: &'a str,
    text: &'a str,
    room: &'a str,
    timestamp: String,
    slack_timestamp: &'a str,
    thread_timestamp: Option<&'a str>,
    is_thread_root: bool,
}

/// Logs every message as one NDJSON record.
#[derive(Debug)]
pub struct ChatLog {
    sink: LineSink,
}

impl ChatLog {
    #[must_use]
    pub fn new(path: Option<&Path>) -> Self {
        Self {
            sink: LineSink::open(path),
        }
    }
}

#[async_trait]
impl Plugin for ChatLog {
    fn id(&self) -> &'static str {
        "chatlog"
    }

    fn help(&self) -> &'static str {
        "Logs every message as newline-delimited JSON"
    }

    fn handles_messages(&self) -> bool {
        true
    }

    // The log should contain the bot's side of conversations too.
    fn wants_own_messages(&self) -> bool {
        true
    }

    async fn run(&self, _ctx: &PluginContext, _args: &str, _spec: &PluginSpec) -> Result<()> {
        Ok(())
    }

    async fn on_message(
        &self,
        ctx: &PluginContext,
        event: &MessageEvent,
        _spec: &PluginSpec,
    ) -> Result<()> {
        // Name lookup is best-effort; the record keeps the ID either way.
        let user_name = match ctx.api.user_info(&event.user).await {
            Ok(info) => info.name,
            Err(e) => {
                warn!(error = %e, user = %event.user, "Failed to fetch user info");
                None
            }
        };

        let record = MessageRecord {
            user: user_name.as_deref(),
            user_id: &event.user,
            text: &event.text,
            room: event.channel.as_str(),
            timestamp: OffsetDateTime::now_utc()
                .format(&Rfc3339)
                .unwrap_or_default(),
            slack_timestamp: &event.ts,
            thread_timestamp: event.thread_ts.as_deref(),
            is_thread_root: event.is_thread_root(),
        };
        let line = serde_json::to_string(&record)?;
        self.sink.write_line(&line).await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{ctx, spec};

    use std::fs;

    use slack_api::ChannelId;

    #[tokio::test]
    async fn appends_one_json_line_per_message() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logs/messages.ndjson");
        let plugin = ChatLog::new(Some(&path));

        let event = MessageEvent {
            user: "U0000001".to_owned(),
            text: "hello there".to_owned(),
            channel: ChannelId::from("C000000ABC"),
            ts: "1.000".to_owned(),
            thread_ts: Some("1.000".to_owned()),
        };
        plugin
            .on_message(&ctx(), &event, &spec("chatlog"))
            .await
            .unwrap();
        plugin
            .on_message(&ctx(), &event, &spec("chatlog"))
            .await
            .unwrap();

        let contents = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 2);

        let parsed: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(parsed["user"], "alice");
        assert_eq!(parsed["user_id"], "U0000001");
        assert_eq!(parsed["text"], "hello there");
        assert_eq!(parsed["room"], "C000000ABC");
        assert_eq!(parsed["slack_timestamp"], "1.000");
        assert_eq!(parsed["is_thread_root"], true);
    }

    #[tokio::test]
    async fn reply_in_thread_is_not_a_thread_root() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("messages.ndjson");
        let plugin = ChatLog::new(Some(&path));

        let event = MessageEvent {
            user: "U0000001".to_owned(),
            text: "reply".to_owned(),
            channel: ChannelId::from("C000000ABC"),
            ts: "2.000".to_owned(),
            thread_ts: Some("1.000".to_owned()),
        };
        plugin
            .on_message(&ctx(), &event, &spec("chatlog"))
            .await
            .unwrap();

        let contents = fs::read_to_string(&path).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(contents.lines().next().unwrap()).unwrap();
        assert_eq!(parsed["is_thread_root"], false);
        assert_eq!(parsed["thread_timestamp"], "1.000");
    }

    #[tokio::test]
    async fn missing_file_configuration_still_succeeds() {
        let plugin = ChatLog::new(None);
        let event = MessageEvent {
            user: "U0000001".to_owned(),
            text: "hello".to_owned(),
            channel: ChannelId::from("C000000ABC"),
            ts: "1.000".to_owned(),
            thread_ts: None,
        };
        plugin
            .on_message(&ctx(), &event, &spec("chatlog"))
            .await
            .unwrap();
    }
}
