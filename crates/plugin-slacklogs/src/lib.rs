//! Append-only NDJSON logging of chat traffic: one plugin for messages,
//! one for reactions, sharing the same sink machinery.

mod messages;
mod reactions;
mod sink;

pub use messages::ChatLog;
pub use reactions::ReactionLog;

#[cfg(test)]
mod testutil {
    use std::sync::Arc;

    use async_trait::async_trait;

    use plugin_core::{Brain, PluginContext, PluginRegistry, PluginSpec, PluginTriggers};
    use slack_api::{ApiError, ApiResult, ChannelId, ChannelInfo, ChannelSummary, SlackApi, UserInfo};

    struct StubApi {
        user_lookup_fails: bool,
    }

    #[async_trait]
    impl SlackApi for StubApi {
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
            if self.user_lookup_fails {
                return Err(ApiError::NotOk {
                    method: "users.info",
                    code: "user_not_found".to_owned(),
                });
            }
            Ok(UserInfo {
                id: user.to_owned(),
                name: Some("alice".to_owned()),
            })
        }
        async fn post_message(&self, _channel: &ChannelId, _text: &str) -> ApiResult<()> {
            Ok(())
        }
        async fn add_reaction(&self, _channel: &ChannelId, _ts: &str, _name: &str) -> ApiResult<()> {
            Ok(())
        }
    }

    fn ctx_with(api: StubApi) -> PluginContext {
        PluginContext {
            api: Arc::new(api),
            brain: Brain::in_memory(),
            registry: Arc::new(PluginRegistry::new()),
            channel: ChannelId::from("C000000ABC"),
            user: "U0000001".to_owned(),
        }
    }

    pub(crate) fn ctx() -> PluginContext {
        ctx_with(StubApi {
            user_lookup_fails: false,
        })
    }

    pub(crate) fn failing_user_ctx() -> PluginContext {
        ctx_with(StubApi {
            user_lookup_fails: true,
        })
    }

    pub(crate) fn spec(id: &str) -> PluginSpec {
        PluginSpec {
            id: id.to_owned(),
            enabled: true,
            triggers: PluginTriggers::default(),
            config: serde_yaml::Value::default(),
        }
    }
}
