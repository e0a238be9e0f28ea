//! Quote collection: hears `"<quote>" -- <author>` in any channel, stores
//! it in the brain, and serves a random one back on `!wisdom`.

use anyhow::Result;
use async_trait::async_trait;
use rand::seq::SliceRandom as _;
use rand::thread_rng;
use regex::Regex;
use serde_json::{Value, json};
use time::{OffsetDateTime, macros::format_description};
use tracing::{info, warn};

use plugin_core::{MessageEvent, Plugin, PluginContext, PluginSpec, send_reply};

const QUOTES_KEY: &str = "quotes";

/// Straight or curly quotes around the quote body, double or em dash
/// before the author.
const QUOTE_PATTERN: &str = r#"^\s*("|“)(.+?)("|”)\s+(--|—)\s*(.+?)$"#;

#[derive(Debug)]
pub struct Wisdom {
    matcher: Regex,
}

impl Wisdom {
    /// # Panics
    /// Never; the pattern is a compile-time constant.
    #[must_use]
    pub fn new() -> Self {
        Self {
            matcher: Regex::new(QUOTE_PATTERN).unwrap(),
        }
    }
}

impl Default for Wisdom {
    fn default() -> Self {
        Self::new()
    }
}

fn now_stamp() -> String {
    let format = format_description!("[year]-[month]-[day] [hour]:[minute]:[second]");
    OffsetDateTime::now_utc().format(&format).unwrap_or_default()
}

#[async_trait]
impl Plugin for Wisdom {
    fn id(&self) -> &'static str {
        "wisdom"
    }

    fn help(&self) -> &'static str {
        "Store quotes (\"<quote>\" -- <author>) and recall one with !wisdom"
    }

    fn handles_messages(&self) -> bool {
        true
    }

    /// `!wisdom` — reply with a random stored quote.
    async fn run(&self, ctx: &PluginContext, _args: &str, _spec: &PluginSpec) -> Result<()> {
        let quotes = ctx.brain.get(QUOTES_KEY).await;
        let reply = quotes
            .as_ref()
            .and_then(Value::as_array)
            .filter(|list| !list.is_empty())
            .and_then(|list| {
                let picked = {
                    let mut rng = thread_rng();
                    list.choose(&mut rng).cloned()
                };
                picked.map(|entry| {
                    format!(
                        "{} -- {}",
                        entry["quote"].as_str().unwrap_or_default(),
                        entry["author"].as_str().unwrap_or_default()
                    )
                })
            });
        match reply {
            Some(text) => send_reply(ctx, text).await,
            None => send_reply(ctx, "I have no wisdom to share yet. Please teach me.").await,
        }
    }

    async fn on_message(
        &self,
        ctx: &PluginContext,
        event: &MessageEvent,
        _spec: &PluginSpec,
    ) -> Result<()> {
        let Some(caps) = self.matcher.captures(&event.text) else {
            return Ok(());
        };
        let quote = caps.get(2).map_or("", |m| m.as_str());
        let author = caps.get(5).map_or("", |m| m.as_str());

        // Submitter recorded by display name where available.
        let submitter = match ctx.api.user_info(&event.user).await {
            Ok(user_info) => user_info.name.unwrap_or_else(|| event.user.clone()),
            Err(_) => event.user.clone(),
        };

        let mut quotes = ctx
            .brain
            .get(QUOTES_KEY)
            .await
            .and_then(|v| v.as_array().cloned())
            .unwrap_or_default();
        quotes.push(json!({
            "quote": format!("\"{quote}\""),
            "author": author,
            "user": submitter,
            "timestamp": now_stamp(),
        }));
        ctx.brain.set(QUOTES_KEY, Value::Array(quotes)).await;
        info!(author = %author, "Stored quote");

        // Acknowledge on the message itself; fall back to a reply when the
        // reaction cannot be added.
        if let Err(e) = ctx
            .api
            .add_reaction(&event.channel, &event.ts, "quote")
            .await
        {
            warn!(error = %e, "Failed to add reaction");
            send_reply(ctx, "Quote added.").await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::{Arc, Mutex};

    use plugin_core::{Brain, PluginRegistry, PluginTriggers};
    use slack_api::{
        ApiError, ApiResult, ChannelId, ChannelInfo, ChannelSummary, SlackApi, UserInfo,
    };

    #[derive(Default)]
    struct RecordingApi {
        reactions_fail: bool,
        posted: Mutex<Vec<(String, String)>>,
        reactions: Mutex<Vec<(String, String, String)>>,
    }

    #[async_trait]
    impl SlackApi for RecordingApi {
        async fn list_channels(&self) -> ApiResult<Vec<ChannelSummary>> {
            Ok(Vec::new())
        }
        async fn channel_info(&self, channel: &ChannelId) -> ApiResult<ChannelInfo> {
            Ok(ChannelInfo {
                id: channel.clone(),
                is_private: false,
            })
        }
        async fn permalink(&self, _channel: &ChannelId, _ts: &str) -> ApiResult<String> {
            Ok(String::new())
        }
        async fn user_info(&self, user: &str) -> ApiResult<UserInfo> {
            Ok(UserInfo {
                id: user.to_owned(),
                name: Some("stahnma".to_owned()),
            })
        }
        async fn post_message(&self, channel: &ChannelId, text: &str) -> ApiResult<()> {
            self.posted
                .lock()
                .unwrap()
                .push((channel.to_string(), text.to_owned()));
            Ok(())
        }
        async fn add_reaction(&self, channel: &ChannelId, ts: &str, name: &str) -> ApiResult<()> {
            if self.reactions_fail {
                return Err(ApiError::NotOk {
                    method: "reactions.add",
                    code: "already_reacted".to_owned(),
                });
            }
            self.reactions
                .lock()
                .unwrap()
                .push((channel.to_string(), ts.to_owned(), name.to_owned()));
            Ok(())
        }
    }

    fn ctx(api: Arc<RecordingApi>, brain: Brain) -> PluginContext {
        PluginContext {
            api,
            brain,
            registry: Arc::new(PluginRegistry::new()),
            channel: ChannelId::from("C000000ABC"),
            user: "U0000001".to_owned(),
        }
    }

    fn spec() -> PluginSpec {
        PluginSpec {
            id: "wisdom".to_owned(),
            enabled: true,
            triggers: PluginTriggers {
                commands: vec!["!wisdom".to_owned()],
            },
            config: serde_yaml::Value::default(),
        }
    }

    fn message(text: &str) -> MessageEvent {
        MessageEvent {
            user: "U0000001".to_owned(),
            text: text.to_owned(),
            channel: ChannelId::from("C000000ABC"),
            ts: "7.000".to_owned(),
            thread_ts: None,
        }
    }

    #[tokio::test]
    async fn stores_quote_and_acknowledges_with_reaction() {
        let api = Arc::new(RecordingApi::default());
        let brain = Brain::in_memory();
        let plugin = Wisdom::new();

        plugin
            .on_message(
                &ctx(Arc::clone(&api), brain.clone()),
                &message(r#""Simplicity is the soul of efficiency" -- Austin"#),
                &spec(),
            )
            .await
            .unwrap();

        let stored = brain.get(QUOTES_KEY).await.unwrap();
        let list = stored.as_array().unwrap();
        assert_eq!(list.len(), 1);
        assert_eq!(list[0]["quote"], "\"Simplicity is the soul of efficiency\"");
        assert_eq!(list[0]["author"], "Austin");
        assert_eq!(list[0]["user"], "stahnma");

        let reactions = api.reactions.lock().unwrap().clone();
        assert_eq!(
            reactions,
            vec![("C000000ABC".to_owned(), "7.000".to_owned(), "quote".to_owned())]
        );
        assert!(api.posted.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn curly_quotes_and_em_dash_parse_too() {
        let api = Arc::new(RecordingApi::default());
        let brain = Brain::in_memory();
        let plugin = Wisdom::new();

        plugin
            .on_message(
                &ctx(Arc::clone(&api), brain.clone()),
                &message("“Talk is cheap” — Linus"),
                &spec(),
            )
            .await
            .unwrap();

        let stored = brain.get(QUOTES_KEY).await.unwrap();
        assert_eq!(stored[0]["author"], "Linus");
    }

    #[tokio::test]
    async fn non_quote_chatter_is_ignored() {
        let api = Arc::new(RecordingApi::default());
        let brain = Brain::in_memory();
        let plugin = Wisdom::new();

        plugin
            .on_message(
                &ctx(Arc::clone(&api), brain.clone()),
                &message("just talking, no quote here"),
                &spec(),
            )
            .await
            .unwrap();

        assert!(brain.get(QUOTES_KEY).await.is_none());
        assert!(api.reactions.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn reaction_failure_falls_back_to_text_reply() {
        let api = Arc::new(RecordingApi {
            reactions_fail: true,
            ..RecordingApi::default()
        });
        let brain = Brain::in_memory();
        let plugin = Wisdom::new();

        plugin
            .on_message(
                &ctx(Arc::clone(&api), brain.clone()),
                &message(r#""quoted" -- someone"#),
                &spec(),
            )
            .await
            .unwrap();

        let posted = api.posted.lock().unwrap().clone();
        assert_eq!(posted, vec![("C000000ABC".to_owned(), "Quote added.".to_owned())]);
        // Still stored despite the failed acknowledgement.
        assert!(brain.get(QUOTES_KEY).await.is_some());
    }

    #[tokio::test]
    async fn wisdom_command_replies_with_stored_quote() {
        let api = Arc::new(RecordingApi::default());
        let brain = Brain::in_memory();
        brain
            .set(
                QUOTES_KEY,
                json!([{ "quote": "\"stay curious\"", "author": "anon" }]),
            )
            .await;
        let plugin = Wisdom::new();

        plugin
            .run(&ctx(Arc::clone(&api), brain), "", &spec())
            .await
            .unwrap();

        let posted = api.posted.lock().unwrap().clone();
        assert_eq!(
            posted,
            vec![("C000000ABC".to_owned(), "\"stay curious\" -- anon".to_owned())]
        );
    }

    #[tokio::test]
    async fn wisdom_command_with_empty_bank_asks_to_be_taught() {
        let api = Arc::new(RecordingApi::default());
        let plugin = Wisdom::new();

        plugin
            .run(&ctx(Arc::clone(&api), Brain::in_memory()), "", &spec())
            .await
            .unwrap();

        let posted = api.posted.lock().unwrap().clone();
        assert_eq!(posted[0].1, "I have no wisdom to share yet. Please teach me.");
    }
}
