use anyhow::{anyhow, Context, Result};
use std::sync::OnceLock;
use tokio::fs;
use tokio::net::TcpListener;
use tracing::info;

use crate::models::extension_model::ExtensionConfig;

static CONFIG_CACHE: OnceLock<ExtensionConfig> = OnceLock::new();

const CONFIG_ENV: &str = "PLOTUNE_PLUGIN_CONFIG";
const DEFAULT_CONFIG_PATH: &str = "plugin.json";

fn config_path() -> String {
    std::env::var(CONFIG_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string())
}

/// Loads the plugin config, binds the listener and caches the config with
/// the port actually bound.
pub async fn init_config_and_bind() -> Result<TcpListener> {
    let file_path = config_path();

    let data = fs::read_to_string(&file_path)
        .await
        .with_context(|| format!("reading {}", file_path))?;

    let mut config: ExtensionConfig =
        serde_json::from_str(&data).with_context(|| format!("parsing {}", file_path))?;

    let bind_addr = format!("{}:{}", config.connection.ip, config.connection.port);

    let listener = TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("binding {}", bind_addr))?;

    // Port 0 asks the OS for a free port
    let actual_port = listener.local_addr()?.port();
    config.connection.port = actual_port;

    CONFIG_CACHE
        .set(config)
        .map_err(|_| anyhow!("config already initialized"))?;

    info!("Config {} loaded, listening on port {}", file_path, actual_port);

    Ok(listener)
}

pub fn get_cached_config() -> Option<&'static ExtensionConfig> {
    CONFIG_CACHE.get()
}
