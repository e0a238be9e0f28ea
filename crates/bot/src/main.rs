mod dispatch;
mod logging;
mod plugins;
mod socket;

use core::time::Duration;
use std::{fs, path::PathBuf, sync::Arc};

use anyhow::{Context as _, Result};
use clap::Parser;
use serde::Deserialize;
use tracing::info;

use plugin_aggregator::{DEDUP_WINDOW_MS, DedupStore, start_sweeper};
use plugin_core::{Brain, PluginSpec, SystemClock};
use slack_api::{SlackApi, WebApiClient};

use crate::dispatch::Dispatcher;
use crate::logging::init_tracing;

#[derive(Parser, Debug)]
#[command(
    name = "slack-plugin-bot",
    version,
    about = "Slack bot hosting the permalink aggregator, chat loggers, quote store and API-key plugins"
)]
pub(crate) struct Args {
    /// Bot token (xoxb-…) for Web API calls
    #[arg(long, env = "SLACK_BOT_TOKEN")]
    bot_token: String,

    /// App-level token (xapp-…) for Socket Mode
    #[arg(long, env = "SLACK_APP_TOKEN")]
    app_token: String,

    /// Optional YAML file with per-plugin specs
    #[arg(long, env = "BOT_CONFIG", default_value = "./config.yaml")]
    config: PathBuf,

    /// JSON file backing the persistent brain
    #[arg(long, env = "BOT_BRAIN_FILE", default_value = "./brain.json")]
    brain_file: PathBuf,

    /// Channel (name or raw ID) that receives aggregated permalinks
    #[arg(long, env = "AGGREGATION_CHANNEL")]
    pub(crate) aggregation_channel: Option<String>,

    /// Reaction pattern that triggers aggregation
    #[arg(long, env = "AGGREGATION_PATTERN", default_value = "thank")]
    pub(crate) aggregation_pattern: String,

    /// Also aggregate permalinks from private conversations
    #[arg(long, env = "AGGREGATION_FROM_PRIVATE", default_value_t = false)]
    pub(crate) aggregation_from_private: bool,

    /// NDJSON message log file
    #[arg(long, env = "SLACK_LOGS_FILE")]
    pub(crate) logs_file: Option<PathBuf>,

    /// NDJSON reactions log file (falls back to the message log file)
    #[arg(long, env = "SLACK_REACTIONS_LOGS_FILE")]
    pub(crate) reactions_logs_file: Option<PathBuf>,

    /// API-key provisioning service URI
    #[arg(long, env = "APIKEY_SERVICE_URI")]
    pub(crate) apikey_uri: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
pub(crate) struct BotConfig {
    #[serde(default)]
    pub(crate) plugins: Option<Vec<PluginSpec>>,
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    // Load .env if present so clap can pick up env vars.
    let _ = dotenvy::dotenv();
    let args = Args::parse();

    let config = load_config(&args.config)?;
    let brain = Brain::load(args.brain_file.clone())
        .with_context(|| format!("loading brain from {}", args.brain_file.display()))?;

    let client = Arc::new(WebApiClient::new(&args.bot_token));
    let auth = client
        .auth_test()
        .await
        .context("authenticating with slack")?;
    info!(user_id = ?auth.user_id, "Authenticated");

    let registry = plugins::build_registry(&args, &config).await;
    let mut command_keys: Vec<String> = Vec::new();
    for (_, entry) in registry.entries().await {
        command_keys.extend(entry.spec.triggers.commands.iter().cloned());
    }
    command_keys.sort();
    info!(commands = ?command_keys, "Registered plugin commands");

    // Periodic dedup garbage collection, cancelled at shutdown.
    let sweeper = start_sweeper(
        DedupStore::new(brain.clone()),
        Arc::new(SystemClock),
        Duration::from_millis(u64::try_from(DEDUP_WINDOW_MS).unwrap_or(u64::MAX)),
    );

    let api: Arc<dyn SlackApi> = Arc::clone(&client) as Arc<dyn SlackApi>;
    let dispatcher = Dispatcher::new(api, brain, registry, auth.user_id);

    let outcome = tokio::select! {
        () = shutdown_signal() => {
            info!("Shutdown signal received");
            Ok(())
        }
        res = socket::run(&client, &args.app_token, dispatcher) => res,
    };

    sweeper.shutdown();
    outcome
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}

/// A missing config file is fine (everything can come from env vars); a
/// present but malformed one is a startup error.
fn load_config(path: &PathBuf) -> Result<BotConfig> {
    if !path.exists() {
        return Ok(BotConfig::default());
    }
    let yaml = fs::read_to_string(path)
        .with_context(|| format!("reading config file at {}", path.display()))?;
    let cfg: BotConfig = serde_yaml::from_str(&yaml).context("parsing YAML config")?;
    Ok(cfg)
}
