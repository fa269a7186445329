// Server configuration - defaults, optional file, then MODELLER_* environment

//! # Configuration
//!
//! Configuration is layered, later sources overriding earlier ones:
//!
//! 1. Built-in defaults ([`ServerConfig::default`])
//! 2. An optional TOML/JSON/YAML file
//! 3. Environment variables prefixed with `MODELLER_`, e.g. `MODELLER_PORT=8080`
//!
//! A `.env` file in the working directory is loaded into the environment
//! first when present.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::engine::DEFAULT_COMMITTED_UID_BASE;
use crate::models::Uid;
use crate::Result;

/// Settings of the HTTP server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Allow cross-origin requests from browser clients
    #[serde(default = "default_true")]
    pub cors_enabled: bool,

    /// Extra `*.json` workflow definitions loaded on top of the built-ins
    #[serde(default)]
    pub definitions_dir: Option<PathBuf>,

    /// First real uid minted for entities committed by the in-memory fact store
    #[serde(default = "default_uid_base")]
    pub committed_uid_base: Uid,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    4000
}

fn default_true() -> bool {
    true
}

fn default_uid_base() -> Uid {
    DEFAULT_COMMITTED_UID_BASE
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            host: default_host(),
            port: default_port(),
            cors_enabled: true,
            definitions_dir: None,
            committed_uid_base: DEFAULT_COMMITTED_UID_BASE,
        }
    }
}

impl ServerConfig {
    /// Load configuration from defaults, `path` (if given) and the environment
    pub fn load(path: Option<&str>) -> Result<Self> {
        dotenv::dotenv().ok();

        let mut builder = config::Config::builder()
            .add_source(config::Config::try_from(&ServerConfig::default())?);

        if let Some(path) = path {
            builder = builder.add_source(config::File::with_name(path).required(false));
        }

        builder = builder.add_source(config::Environment::with_prefix("MODELLER").try_parsing(true));

        Ok(builder.build()?.try_deserialize()?)
    }

    /// `host:port`, ready for `SocketAddr` parsing
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
