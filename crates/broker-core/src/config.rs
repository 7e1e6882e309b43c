//! brokerd.toml configuration parser.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::document::DocumentSource;

pub const DEFAULT_BIND: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 4567;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BrokerdConfig {
    pub server: Option<ServerConfig>,
    pub broker: Option<BrokerConfig>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServerConfig {
    pub bind: Option<String>,
    pub port: Option<u16>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BrokerConfig {
    /// Path to the bootstrap behavior document.
    pub data: Option<String>,
    pub environment: Option<Environment>,
    /// Explicit tracing filter; overrides the environment's default level.
    pub log_filter: Option<String>,
}

/// Deployment flavor. Only affects the default log level.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Development,
    Test,
    Production,
}

impl Environment {
    pub fn default_log_filter(&self) -> &'static str {
        match self {
            Environment::Development => "debug",
            Environment::Test => "info",
            Environment::Production => "warn",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Development => "development",
            Environment::Test => "test",
            Environment::Production => "production",
        }
    }
}

impl std::str::FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "development" | "dev" => Ok(Environment::Development),
            "test" => Ok(Environment::Test),
            "production" | "prod" => Ok(Environment::Production),
            other => Err(format!("unknown environment: {other}")),
        }
    }
}

impl BrokerdConfig {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: BrokerdConfig = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> anyhow::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn bind(&self) -> &str {
        self.server
            .as_ref()
            .and_then(|s| s.bind.as_deref())
            .unwrap_or(DEFAULT_BIND)
    }

    pub fn port(&self) -> u16 {
        self.server
            .as_ref()
            .and_then(|s| s.port)
            .unwrap_or(DEFAULT_PORT)
    }

    pub fn environment(&self) -> Environment {
        self.broker
            .as_ref()
            .and_then(|b| b.environment)
            .unwrap_or_default()
    }

    pub fn document_source(&self) -> DocumentSource {
        self.broker
            .as_ref()
            .and_then(|b| b.data.as_deref())
            .map(DocumentSource::parse)
            .unwrap_or_default()
    }

    /// The tracing filter to use when `RUST_LOG` is not set.
    pub fn log_filter(&self) -> String {
        self.broker
            .as_ref()
            .and_then(|b| b.log_filter.clone())
            .unwrap_or_else(|| self.environment().default_log_filter().to_string())
    }

    /// Apply command-line overrides on top of the file values.
    pub fn with_overrides(
        mut self,
        bind: Option<String>,
        port: Option<u16>,
        data: Option<String>,
        environment: Option<Environment>,
    ) -> Self {
        let server = self.server.get_or_insert_with(ServerConfig::default);
        if bind.is_some() {
            server.bind = bind;
        }
        if port.is_some() {
            server.port = port;
        }
        let broker = self.broker.get_or_insert_with(BrokerConfig::default);
        if data.is_some() {
            broker.data = data;
        }
        if environment.is_some() {
            broker.environment = environment;
        }
        self
    }

    /// Scaffold a brokerd.toml with every default spelled out.
    pub fn scaffold() -> Self {
        BrokerdConfig {
            server: Some(ServerConfig {
                bind: Some(DEFAULT_BIND.to_string()),
                port: Some(DEFAULT_PORT),
            }),
            broker: Some(BrokerConfig {
                data: Some("data.json".to_string()),
                environment: Some(Environment::Development),
                log_filter: None,
            }),
        }
    }
}
