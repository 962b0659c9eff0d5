use std::path::{Path, PathBuf};
use std::time::Duration;

use reconciler::services::{HttpSettings, MeiliSettings};
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NetSection {
    pub addr: String,
    pub web_static_dir: String,
}

impl Default for NetSection {
    fn default() -> Self {
        Self {
            addr: "0.0.0.0:8080".to_string(),
            web_static_dir: "web/dist".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RelaySection {
    /// Shared secret identifying game servers. Empty disables producers.
    pub producer_token: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseSection {
    pub path: String,
}

impl Default for DatabaseSection {
    fn default() -> Self {
        Self {
            path: "data/map.db".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServicesSection {
    pub overpass_url: String,
    pub nominatim_url: String,
    pub user_agent: String,
    pub request_timeout_secs: u64,
}

impl Default for ServicesSection {
    fn default() -> Self {
        Self {
            overpass_url: "https://overpass-api.de/api/interpreter".to_string(),
            nominatim_url: "https://nominatim.openstreetmap.org".to_string(),
            user_agent: concat!("map_server/", env!("CARGO_PKG_VERSION")).to_string(),
            request_timeout_secs: 60,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SearchSection {
    pub host: String,
    pub api_key: String,
    pub index: String,
    pub task_poll_ms: u64,
    pub task_timeout_secs: u64,
}

impl Default for SearchSection {
    fn default() -> Self {
        Self {
            host: "http://127.0.0.1:7700".to_string(),
            api_key: String::new(),
            index: "regions".to_string(),
            task_poll_ms: 250,
            task_timeout_secs: 120,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ReconcileSection {
    pub page_size: usize,
}

impl Default for ReconcileSection {
    fn default() -> Self {
        Self { page_size: 100 }
    }
}

/// A bearer token accepted by the static verifier.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenEntry {
    pub token: String,
    pub subject: String,
    #[serde(default)]
    pub roles: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AuthSection {
    pub admin_role: String,
    pub tokens: Vec<TokenEntry>,
}

impl Default for AuthSection {
    fn default() -> Self {
        Self {
            admin_role: "mapadmin".to_string(),
            tokens: Vec::new(),
        }
    }
}

/// Top-level map server configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub net: NetSection,
    pub relay: RelaySection,
    pub database: DatabaseSection,
    pub services: ServicesSection,
    pub search: SearchSection,
    pub reconcile: ReconcileSection,
    pub auth: AuthSection,
}

impl ServerConfig {
    /// Load configuration from an optional TOML file path.
    pub fn load(config_path: Option<&str>) -> Result<Self, Box<dyn std::error::Error>> {
        let config = match config_path {
            Some(path) if Path::new(path).exists() => {
                let content = std::fs::read_to_string(path)?;
                toml::from_str(&content)?
            }
            _ => Self::default(),
        };
        Ok(config)
    }

    /// Secrets from the environment win over the file.
    pub fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(token) = lookup("PRODUCER_TOKEN").filter(|t| !t.is_empty()) {
            self.relay.producer_token = token;
        }
        if let Some(key) = lookup("MEILISEARCH_KEY").filter(|k| !k.is_empty()) {
            self.search.api_key = key;
        }
    }

    pub fn to_http_settings(&self) -> HttpSettings {
        HttpSettings {
            timeout: Duration::from_secs(self.services.request_timeout_secs.max(1)),
            user_agent: self.services.user_agent.clone(),
        }
    }

    pub fn to_meili_settings(&self) -> MeiliSettings {
        MeiliSettings {
            host: self.search.host.clone(),
            api_key: Some(self.search.api_key.clone()).filter(|k| !k.is_empty()),
            index: self.search.index.clone(),
            task_poll: Duration::from_millis(self.search.task_poll_ms.max(1)),
            task_timeout: Duration::from_secs(self.search.task_timeout_secs),
        }
    }

    /// Static directory, if it exists on disk.
    pub fn static_dir(&self) -> Option<PathBuf> {
        let p = PathBuf::from(&self.net.web_static_dir);
        p.is_dir().then_some(p)
    }
}

/// Parse CLI arguments and load config.
/// Supports: --config <path>
pub fn parse_cli_args() -> ServerConfig {
    let args: Vec<String> = std::env::args().collect();
    let mut config_path: Option<&str> = None;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--config" => {
                if let Some(val) = args.get(i + 1) {
                    config_path = Some(val.as_str());
                    i += 2;
                } else {
                    eprintln!("--config requires a path argument");
                    std::process::exit(1);
                }
            }
            other => {
                eprintln!("Unknown argument: {}", other);
                std::process::exit(1);
            }
        }
    }

    let mut config = match ServerConfig::load(config_path) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load config: {}", e);
            std::process::exit(1);
        }
    };
    config.apply_env_overrides(|key| std::env::var(key).ok());
    config
}
