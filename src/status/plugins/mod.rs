//! Built-in status plugins.

mod command;
mod context;

pub use command::CommandPlugin;
pub use context::ContextUsagePlugin;

use super::StatusPlugin;
use crate::config::schema::PluginsConfig;
use std::sync::Arc;

/// Builds every plugin enabled in `config`.
pub fn from_config(config: &PluginsConfig) -> Vec<Arc<dyn StatusPlugin>> {
    let mut plugins: Vec<Arc<dyn StatusPlugin>> = Vec::new();
    if config.context.enabled {
        plugins.push(Arc::new(ContextUsagePlugin::from_config(&config.context)));
    }
    for cmd in &config.command {
        plugins.push(Arc::new(CommandPlugin::from_config(cmd)));
    }
    plugins
}
