//! Configuration Loader
//!
//! Source precedence, lowest first:
//!
//! 1. Built-in defaults
//! 2. Optional TOML file (`--config <path>` or `INGEST_CONFIG_PATH`)
//! 3. `INGEST__<SECTION>__<KEY>` environment variables
//! 4. Deployment variables `AMQP_URL`, `AMQP_EXCHANGE`, `AMQP_TRANSFER_TOPIC`,
//!    `S3_ENDPOINT`, `S3_ACCESS_KEY`, `S3_SECRET_KEY`
//!
//! The environment is read once into a snapshot so tests can load against an
//! explicit map instead of the process environment.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use config::{Config, Environment, File, FileFormat};
use tracing::{debug, info};

use super::error::{ConfigResult, ConfigurationError};
use super::IngestConfig;

/// Environment variable naming the configuration file
pub const CONFIG_PATH_ENV: &str = "INGEST_CONFIG_PATH";

/// Prefix of structured environment overrides
pub const ENV_PREFIX: &str = "INGEST";

/// Deployment variables and the configuration keys they override
const DEPLOYMENT_OVERRIDES: &[(&str, &[&str])] = &[
    ("AMQP_URL", &["broker.url"]),
    ("AMQP_EXCHANGE", &["broker.exchange"]),
    ("AMQP_TRANSFER_TOPIC", &["broker.queue", "broker.routing_key"]),
    ("S3_ENDPOINT", &["blob_store.endpoint"]),
    ("S3_ACCESS_KEY", &["blob_store.access_key"]),
    ("S3_SECRET_KEY", &["blob_store.secret_key"]),
];

#[derive(Debug, Clone, Default)]
pub struct ConfigLoader {
    file: Option<PathBuf>,
    env: HashMap<String, String>,
}

impl ConfigLoader {
    /// Loader over the current process environment
    pub fn from_process_env() -> Self {
        Self {
            file: None,
            env: std::env::vars().collect(),
        }
    }

    /// Loader over an explicit environment snapshot
    pub fn with_env(env: HashMap<String, String>) -> Self {
        Self { file: None, env }
    }

    /// Read this file; it must exist
    pub fn with_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.file = Some(path.into());
        self
    }

    /// File to read: the explicit one, else `INGEST_CONFIG_PATH` from the snapshot
    pub fn config_file(&self) -> Option<PathBuf> {
        self.file.clone().or_else(|| {
            self.env
                .get(CONFIG_PATH_ENV)
                .filter(|path| !path.trim().is_empty())
                .map(PathBuf::from)
        })
    }

    /// Build, deserialize and validate the configuration
    pub fn load(&self) -> ConfigResult<IngestConfig> {
        let mut builder = Config::builder();

        if let Some(path) = self.config_file() {
            builder = builder.add_source(Self::file_source(&path)?);
        }

        let structured: HashMap<String, String> = self
            .env
            .iter()
            .filter(|(key, _)| key.starts_with(&format!("{ENV_PREFIX}__")))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();

        builder = builder.add_source(
            Environment::with_prefix(ENV_PREFIX)
                .separator("__")
                .try_parsing(true)
                .list_separator(" ")
                .with_list_parse_key("converter.args")
                .source(Some(structured)),
        );

        for (variable, keys) in DEPLOYMENT_OVERRIDES {
            if let Some(value) = self.env.get(*variable).filter(|v| !v.is_empty()) {
                debug!(variable = %variable, "Applying deployment environment override");
                for key in *keys {
                    builder = builder.set_override(*key, value.clone())?;
                }
            }
        }

        let config: IngestConfig = builder
            .build()?
            .try_deserialize()
            .map_err(|e| ConfigurationError::load_error("merged configuration", e))?;

        config.validate()?;

        info!(
            config_file = ?self.config_file(),
            queue = %config.broker.queue,
            prefetch_count = config.broker.prefetch_count,
            "✅ Configuration loaded"
        );
        debug!(config = %config.sanitized(), "Effective configuration");

        Ok(config)
    }

    fn file_source(path: &Path) -> ConfigResult<File<config::FileSourceFile, FileFormat>> {
        if !path.is_file() {
            return Err(ConfigurationError::config_file_not_found(path));
        }
        Ok(File::from(path).format(FileFormat::Toml).required(true))
    }
}
