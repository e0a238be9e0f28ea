pub mod brain;
pub mod clock;

pub use brain::Brain;
pub use clock::{Clock, ManualClock, SystemClock};

use std::{collections::HashMap, sync::Arc};

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use slack_api::{ChannelId, SlackApi};

/// A chat event as delivered by the host, validated at the boundary before
/// any plugin sees it.
#[derive(Debug, Clone)]
pub enum ChatEvent {
    Message(MessageEvent),
    ReactionAdded(ReactionEvent),
    ReactionRemoved(ReactionEvent),
}

#[derive(Debug, Clone)]
pub struct MessageEvent {
    pub user: String,
    pub text: String,
    pub channel: ChannelId,
    pub ts: String,
    pub thread_ts: Option<String>,
}

impl MessageEvent {
    /// A message starts a thread when its own ts doubles as the thread ts.
    #[must_use]
    pub fn is_thread_root(&self) -> bool {
        self.thread_ts.as_deref() == Some(self.ts.as_str())
    }
}

/// A reaction placed on (or removed from) a message.
#[derive(Debug, Clone)]
pub struct ReactionEvent {
    pub user: String,
    pub reaction: String,
    pub item_channel: ChannelId,
    pub item_ts: String,
}

/// Polarity of a reaction event, passed alongside the event so passive
/// plugins can observe removals without a second handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Polarity {
    Added,
    Removed,
}

impl Polarity {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Added => "added",
            Self::Removed => "removed",
        }
    }
}

/// Everything a plugin invocation may need: the shared API client, the
/// brain handle, the registry, and the channel/user the event came from.
#[derive(Clone)]
pub struct PluginContext {
    pub api: Arc<dyn SlackApi>,
    pub brain: Brain,
    pub registry: Arc<PluginRegistry>,
    /// Channel the triggering event originated in; replies go here.
    pub channel: ChannelId,
    /// User that triggered the event.
    pub user: String,
}

#[async_trait]
pub trait Plugin: Send + Sync {
    fn id(&self) -> &'static str;
    fn help(&self) -> &'static str;
    fn handles_messages(&self) -> bool {
        false
    }
    fn handles_reactions(&self) -> bool {
        false
    }
    /// Whether `on_message` should also see the bot's own messages.
    fn wants_own_messages(&self) -> bool {
        false
    }

    /// Invoked when one of the plugin's registered `!commands` fires.
    async fn run(&self, ctx: &PluginContext, args: &str, spec: &PluginSpec) -> Result<()>;

    /// Invoked for every message when `handles_messages` is true.
    async fn on_message(
        &self,
        _ctx: &PluginContext,
        _event: &MessageEvent,
        _spec: &PluginSpec,
    ) -> Result<()> {
        Ok(())
    }

    /// Invoked for every reaction when `handles_reactions` is true.
    async fn on_reaction(
        &self,
        _ctx: &PluginContext,
        _event: &ReactionEvent,
        _polarity: Polarity,
        _spec: &PluginSpec,
    ) -> Result<()> {
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct PluginTriggers {
    #[serde(default)]
    pub commands: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PluginSpec {
    pub id: String,
    #[serde(default = "enabled_true")]
    pub enabled: bool,
    #[serde(default)]
    pub triggers: PluginTriggers,
    #[serde(default)]
    pub config: serde_yaml::Value,
}

const fn enabled_true() -> bool {
    true
}

#[derive(Clone)]
pub struct PluginEntry {
    pub spec: PluginSpec,
    pub plugin: Arc<dyn Plugin>,
}

#[derive(Default)]
struct RegistryInner {
    by_id: HashMap<String, PluginEntry>,
    by_command: HashMap<String, String>,
}

#[derive(Clone, Default)]
pub struct PluginRegistry {
    inner: Arc<RwLock<RegistryInner>>,
}

impl PluginRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn register(&self, spec: PluginSpec, plugin: Arc<dyn Plugin>) -> Option<PluginEntry> {
        let mut inner = self.inner.write().await;
        let id = spec.id.clone();
        let previous = inner.by_id.insert(
            id.clone(),
            PluginEntry {
                spec: spec.clone(),
                plugin,
            },
        );
        inner.by_command.retain(|_, existing| existing != &id);
        for cmd in &spec.triggers.commands {
            inner.by_command.insert(normalize_cmd(cmd), id.clone());
        }
        previous
    }

    pub async fn entry(&self, id: &str) -> Option<PluginEntry> {
        let inner = self.inner.read().await;
        inner.by_id.get(id).cloned()
    }

    pub async fn entry_by_command(&self, token: &str) -> Option<PluginEntry> {
        let inner = self.inner.read().await;
        inner
            .by_command
            .get(token)
            .and_then(|id| inner.by_id.get(id))
            .cloned()
    }

    pub async fn entries(&self) -> Vec<(String, PluginEntry)> {
        let inner = self.inner.read().await;
        inner
            .by_id
            .iter()
            .map(|(id, entry)| (id.clone(), entry.clone()))
            .collect()
    }

    #[must_use]
    pub async fn is_enabled(&self, id: &str) -> bool {
        let inner = self.inner.read().await;
        inner
            .by_id
            .get(id)
            .is_some_and(|entry| entry.spec.enabled)
    }
}

fn normalize_cmd(s: &str) -> String {
    if s.starts_with('!') {
        s.to_owned()
    } else {
        format!("!{s}")
    }
}

/// Reply in the channel the triggering event came from.
pub async fn send_reply(ctx: &PluginContext, text: impl Into<String>) -> Result<()> {
    ctx.api.post_message(&ctx.channel, &text.into()).await?;
    Ok(())
}

#[must_use]
pub fn truncate(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}
