//! Fan-out of validated chat events to registered plugins. Each event is
//! handled on its own task; plugin failures are logged and contained.

use std::sync::Arc;

use tracing::{info, warn};

use plugin_core::{
    ChatEvent, MessageEvent, PluginContext, PluginRegistry, Polarity, ReactionEvent,
};
use slack_api::{ChannelId, SlackApi};

#[derive(Clone)]
pub struct Dispatcher {
    api: Arc<dyn SlackApi>,
    brain: plugin_core::Brain,
    registry: Arc<PluginRegistry>,
    bot_user: Option<String>,
}

impl Dispatcher {
    pub fn new(
        api: Arc<dyn SlackApi>,
        brain: plugin_core::Brain,
        registry: Arc<PluginRegistry>,
        bot_user: Option<String>,
    ) -> Self {
        Self {
            api,
            brain,
            registry,
            bot_user,
        }
    }

    /// Hand one event off to a fresh task. Events do not wait on each
    /// other; there is no ordering between concurrent handlers.
    pub fn dispatch(&self, event: ChatEvent) {
        let this = self.clone();
        tokio::spawn(async move {
            match event {
                ChatEvent::Message(ev) => this.handle_message(ev).await,
                ChatEvent::ReactionAdded(ev) => this.handle_reaction(ev, Polarity::Added).await,
                ChatEvent::ReactionRemoved(ev) => this.handle_reaction(ev, Polarity::Removed).await,
            }
        });
    }

    fn context(&self, channel: &ChannelId, user: &str) -> PluginContext {
        PluginContext {
            api: Arc::clone(&self.api),
            brain: self.brain.clone(),
            registry: Arc::clone(&self.registry),
            channel: channel.clone(),
            user: user.to_owned(),
        }
    }

    async fn handle_message(&self, event: MessageEvent) {
        let is_self = self.bot_user.as_deref() == Some(event.user.as_str());
        let ctx = self.context(&event.channel, &event.user);

        // !command dispatch, never for our own messages
        let body = event.text.trim();
        if !is_self && body.starts_with('!') {
            let mut parts = body.splitn(2, ' ');
            let cmd = parts.next().unwrap_or("");
            let args = parts.next().unwrap_or("").trim();
            if let Some(entry) = self.registry.entry_by_command(cmd).await {
                let plugin_id = entry.spec.id.clone();
                if self.registry.is_enabled(&plugin_id).await {
                    info!(cmd = %cmd, plugin = %plugin_id, "Dispatching command");
                    if let Err(e) = entry.plugin.run(&ctx, args, &entry.spec).await {
                        warn!(error = %e, plugin = %plugin_id, "Plugin failed");
                    }
                } else {
                    info!(plugin = %plugin_id, "Plugin disabled");
                }
            }
        }

        // Passive listeners
        for (plugin_id, entry) in self.registry.entries().await {
            if !entry.plugin.handles_messages() {
                continue;
            }
            if is_self && !entry.plugin.wants_own_messages() {
                continue;
            }
            if !self.registry.is_enabled(&plugin_id).await {
                continue;
            }
            if let Err(e) = entry.plugin.on_message(&ctx, &event, &entry.spec).await {
                warn!(error = %e, plugin = %plugin_id, "Plugin on_message failed");
            }
        }
    }

    async fn handle_reaction(&self, event: ReactionEvent, polarity: Polarity) {
        let ctx = self.context(&event.item_channel, &event.user);
        for (plugin_id, entry) in self.registry.entries().await {
            if !entry.plugin.handles_reactions() {
                continue;
            }
            if !self.registry.is_enabled(&plugin_id).await {
                continue;
            }
            if let Err(e) = entry
                .plugin
                .on_reaction(&ctx, &event, polarity, &entry.spec)
                .await
            {
                warn!(error = %e, plugin = %plugin_id, "Plugin on_reaction failed");
            }
        }
    }
}
