//! Service configuration: an optional TOML file, then command-line overrides.
//!
//! ```toml
//! [server]
//! host = "0.0.0.0"
//! port = 4000
//!
//! [database]
//! backend = "sqlite"
//! connection_string = "tax_app.db"
//!
//! [assessment.tax_policy]
//! kind = "flat"
//! rate = 0.23
//!
//! [logging]
//! level = "debug"
//! file = "tax-api.log"
//! ```
//!
//! Every section and key is optional.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use serde::{Deserialize, Serialize};
use tax_core::calculations::AssessmentConfig;
use tax_core::db::DbConfig;

/// HTTP service for the taxpayer registry and tax assessments.
#[derive(Debug, Default, Parser)]
#[command(version)]
pub struct Cli {
    /// TOML configuration file.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Address to bind.
    #[arg(long)]
    pub host: Option<String>,

    /// Port to listen on.
    #[arg(long)]
    pub port: Option<u16>,

    /// Database backend to use (`sqlite` or `memory`).
    #[arg(long)]
    pub backend: Option<String>,

    /// Database connection string.
    /// For SQLite this is a file path (e.g. `tax_app.db`) or `:memory:`.
    #[arg(long)]
    pub db: Option<String>,

    /// Log filter, e.g. `debug` or `info,tax_core=trace`.
    #[arg(long)]
    pub log_level: Option<String>,

    /// Also append log output to this file.
    #[arg(long)]
    pub log_file: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 4000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DbConfig,
    pub assessment: AssessmentConfig,
    pub logging: LoggingConfig,
}

impl AppConfig {
    pub fn from_toml_str(text: &str) -> Result<Self> {
        toml::from_str(text).context("Invalid configuration")
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file '{}'", path.display()))?;
        Self::from_toml_str(&text)
            .with_context(|| format!("Failed to parse config file '{}'", path.display()))
    }

    /// Loads `--config` if given, applies the remaining flags on top and
    /// validates the assessment settings.
    pub fn from_cli(cli: &Cli) -> Result<Self> {
        let mut config = match &cli.config {
            Some(path) => Self::load(path)?,
            None => Self::default(),
        };
        config.apply_overrides(cli);
        config
            .assessment
            .validate()
            .context("Invalid [assessment] configuration")?;
        Ok(config)
    }

    pub fn apply_overrides(
        &mut self,
        cli: &Cli,
    ) {
        if let Some(host) = &cli.host {
            self.server.host = host.clone();
        }
        if let Some(port) = cli.port {
            self.server.port = port;
        }
        if let Some(backend) = &cli.backend {
            self.database.backend = backend.clone();
        }
        if let Some(db) = &cli.db {
            self.database.connection_string = db.clone();
        }
        if let Some(level) = &cli.log_level {
            self.logging.level = level.clone();
        }
        if let Some(file) = &cli.log_file {
            self.logging.file = Some(file.clone());
        }
    }

    pub fn socket_addr(&self) -> Result<SocketAddr> {
        let addr = format!("{}:{}", self.server.host, self.server.port);
        addr.parse()
            .with_context(|| format!("Invalid listen address '{addr}'"))
    }
}
