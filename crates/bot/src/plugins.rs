use std::{collections::HashMap, sync::Arc};

use serde_yaml::Value;
use tracing::warn;

use plugin_core::{Plugin, PluginRegistry, PluginSpec, PluginTriggers, SystemClock};

use crate::{Args, BotConfig};

/// Build the plugin registry: one instance per plugin, specs taken from
/// the YAML config where present and seeded from the environment
/// otherwise.
pub async fn build_registry(args: &Args, config: &BotConfig) -> Arc<PluginRegistry> {
    let reactions_log = args
        .reactions_logs_file
        .clone()
        .or_else(|| args.logs_file.clone());

    #[rustfmt::skip]
    let plugins: HashMap<&'static str, Arc<dyn Plugin>> = HashMap::from([
        ("aggregator", Arc::new(plugin_aggregator::Aggregator::new(Arc::new(SystemClock))) as Arc<dyn Plugin>),
        ("apikey", Arc::new(plugin_apikey::ApiKeyPlugin::new()) as Arc<dyn Plugin>),
        ("chatlog", Arc::new(plugin_slacklogs::ChatLog::new(args.logs_file.as_deref())) as Arc<dyn Plugin>),
        ("reactionlog", Arc::new(plugin_slacklogs::ReactionLog::new(reactions_log.as_deref())) as Arc<dyn Plugin>),
        ("wisdom", Arc::new(plugin_wisdom::Wisdom::new()) as Arc<dyn Plugin>),
    ]);

    let mut specs = config.plugins.clone().unwrap_or_default();

    // Environment-seeded specs for plugins the config file does not
    // mention explicitly.
    if !specs.iter().any(|s| s.id == "aggregator") {
        specs.push(aggregator_spec(args));
    }
    if !specs.iter().any(|s| s.id == "apikey") {
        specs.push(apikey_spec(args));
    }
    merge_default_spec(&mut specs, simple_spec("chatlog", &[]));
    merge_default_spec(&mut specs, simple_spec("reactionlog", &[]));
    merge_default_spec(&mut specs, simple_spec("wisdom", &["!wisdom"]));

    let registry = Arc::new(PluginRegistry::new());
    for spec in specs {
        let Some(plugin) = plugins.get(spec.id.as_str()) else {
            warn!("Unknown plugin ID: {}", spec.id);
            continue;
        };
        registry.register(spec, Arc::clone(plugin)).await;
    }
    registry
}

fn aggregator_spec(args: &Args) -> PluginSpec {
    let mut mapping = serde_yaml::Mapping::new();
    if let Some(channel) = &args.aggregation_channel {
        mapping.insert("channel".into(), channel.clone().into());
    }
    mapping.insert("pattern".into(), args.aggregation_pattern.clone().into());
    mapping.insert("from_private".into(), args.aggregation_from_private.into());

    let enabled = args.aggregation_channel.is_some();
    if !enabled {
        warn!("AGGREGATION_CHANNEL is not set; aggregator disabled");
    }
    PluginSpec {
        id: "aggregator".to_owned(),
        enabled,
        triggers: PluginTriggers::default(),
        config: Value::Mapping(mapping),
    }
}

fn apikey_spec(args: &Args) -> PluginSpec {
    let mut mapping = serde_yaml::Mapping::new();
    if let Some(uri) = &args.apikey_uri {
        mapping.insert("uri".into(), uri.clone().into());
    }
    PluginSpec {
        id: "apikey".to_owned(),
        enabled: true,
        triggers: PluginTriggers {
            commands: vec!["!apikey".to_owned()],
        },
        config: Value::Mapping(mapping),
    }
}

fn simple_spec(id: &str, commands: &[&str]) -> PluginSpec {
    PluginSpec {
        id: id.to_owned(),
        enabled: true,
        triggers: PluginTriggers {
            commands: commands.iter().map(|c| (*c).to_owned()).collect(),
        },
        config: Value::default(),
    }
}

fn merge_default_spec(specs: &mut Vec<PluginSpec>, default: PluginSpec) {
    if let Some(existing) = specs.iter_mut().find(|s| s.id == default.id) {
        for cmd in default.triggers.commands {
            if !existing
                .triggers
                .commands
                .iter()
                .any(|c| c.eq_ignore_ascii_case(&cmd))
            {
                existing.triggers.commands.push(cmd);
            }
        }
    } else {
        specs.push(default);
    }
}
