//! `!apikey` — request an API key from the key-provisioning service on
//! behalf of the invoking user. The service DMs the key itself; the bot
//! only reports whether the request was accepted.

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use plugin_core::{Plugin, PluginContext, PluginSpec, send_reply};

const DEFAULT_SERVICE_URI: &str = "http://localhost:7177/api";

#[derive(Debug, Clone, Deserialize, Default)]
struct ApiKeyConfig {
    #[serde(default)]
    uri: Option<String>,
}

#[derive(Serialize)]
struct KeyRequest<'a> {
    slack_id: &'a str,
}

/// Holds its own HTTP client; constructed once at startup.
#[derive(Debug)]
pub struct ApiKeyPlugin {
    http: reqwest::Client,
}

impl ApiKeyPlugin {
    #[must_use]
    pub fn new() -> Self {
        Self {
            http: reqwest::Client::new(),
        }
    }
}

impl Default for ApiKeyPlugin {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Plugin for ApiKeyPlugin {
    fn id(&self) -> &'static str {
        "apikey"
    }

    fn help(&self) -> &'static str {
        "Request an API key; the key service delivers it by DM"
    }

    async fn run(&self, ctx: &PluginContext, _args: &str, spec: &PluginSpec) -> Result<()> {
        let cfg: ApiKeyConfig = serde_yaml::from_value(spec.config.clone()).unwrap_or_default();
        let uri = cfg
            .uri
            .as_deref()
            .filter(|u| !u.is_empty())
            .unwrap_or(DEFAULT_SERVICE_URI);

        let request = KeyRequest {
            slack_id: &ctx.user,
        };
        match self.http.post(uri).json(&request).send().await {
            Ok(response) if response.status().as_u16() == 200 => {
                send_reply(ctx, "Request successful! Check your DMs.").await
            }
            Ok(response) => {
                send_reply(
                    ctx,
                    format!(
                        "Request failed with status code: {}",
                        response.status().as_u16()
                    ),
                )
                .await
            }
            Err(e) => {
                debug!(error = %e, uri, "API key request failed");
                send_reply(ctx, format!("{e}")).await
            }
        }
    }
}
