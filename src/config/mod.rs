use anyhow::{Context, Result};
use serde::Deserialize;
use std::time::Duration;

/// Complete hub configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SyncConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub hub: HubSettings,
    #[serde(default)]
    pub cors: CorsConfig,
}

/// Listener and route configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
    /// Path the state-sync WebSocket is served on
    #[serde(default = "default_route")]
    pub route: String,
}

fn default_bind_addr() -> String {
    "0.0.0.0:4222".to_string()
}

fn default_route() -> String {
    "/state-sync".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            route: default_route(),
        }
    }
}

/// Hub tuning
#[derive(Debug, Clone, Deserialize)]
pub struct HubSettings {
    /// Per-connection outbound queue length; frames beyond it are dropped for that peer
    #[serde(default = "default_outbox_capacity")]
    pub outbox_capacity: usize,
    /// How long shutdown waits for open sessions to finish (milliseconds)
    #[serde(default = "default_drain_timeout_ms")]
    pub drain_timeout_ms: u64,
}

fn default_outbox_capacity() -> usize {
    256
}

fn default_drain_timeout_ms() -> u64 {
    5000
}

impl HubSettings {
    pub fn drain_timeout(&self) -> Duration {
        Duration::from_millis(self.drain_timeout_ms)
    }
}

impl Default for HubSettings {
    fn default() -> Self {
        Self {
            outbox_capacity: default_outbox_capacity(),
            drain_timeout_ms: default_drain_timeout_ms(),
        }
    }
}

/// Cross-origin policy for browser clients
#[derive(Debug, Clone, Deserialize)]
pub struct CorsConfig {
    #[serde(default = "default_allow_any_origin")]
    pub allow_any_origin: bool,
    /// Host names (with optional port); each is allowed over http and https
    #[serde(default)]
    pub origins: Vec<String>,
}

fn default_allow_any_origin() -> bool {
    true
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allow_any_origin: default_allow_any_origin(),
            origins: Vec::new(),
        }
    }
}

impl CorsConfig {
    /// `http://` and `https://` variants of every configured origin
    pub fn expanded_origins(&self) -> Vec<String> {
        self.origins
            .iter()
            .flat_map(|origin| [format!("http://{}", origin), format!("https://{}", origin)])
            .collect()
    }
}

impl SyncConfig {
    /// Build from env vars: `STATESYNC_CONFIG` (TOML path) then `STATESYNC_BIND_ADDR`
    pub fn from_env() -> Result<Self> {
        let mut cfg = match std::env::var("STATESYNC_CONFIG") {
            Ok(path) => load_config(&path)?,
            Err(_) => Self::default(),
        };

        if let Ok(addr) = std::env::var("STATESYNC_BIND_ADDR") {
            cfg.server.bind_addr = addr;
        }

        Ok(cfg)
    }
}

/// Load configuration from TOML file
pub fn load_config(path: &str) -> Result<SyncConfig> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file {}", path))?;
    let config: SyncConfig =
        toml::from_str(&contents).with_context(|| format!("Failed to parse config file {}", path))?;
    Ok(config)
}
