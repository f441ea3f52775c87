use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    pub catalog: CatalogConfig,
    pub datastore: DatastoreConfig,
    #[serde(default)]
    pub ingest: IngestConfig,
    #[serde(default)]
    pub style: StyleConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    3000
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CatalogConfig {
    #[serde(rename = "type")]
    pub catalog_type: String,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub database: Option<String>,
    pub user: Option<String>,
    pub password: Option<String>,
    /// SQLite database file. Defaults to `mapstudio.db` in the working directory.
    pub path: Option<String>,
}

impl CatalogConfig {
    /// Connection URL for a postgres catalog. Only meaningful after `validate`.
    pub fn postgres_url(&self) -> String {
        format!(
            "postgresql://{}:{}@{}:{}/{}",
            self.user.as_deref().unwrap_or_default(),
            self.password.as_deref().unwrap_or_default(),
            self.host.as_deref().unwrap_or("localhost"),
            self.port.unwrap_or(5432),
            self.database.as_deref().unwrap_or_default()
        )
    }

    pub fn sqlite_path(&self) -> &str {
        self.path.as_deref().unwrap_or("mapstudio.db")
    }
}

/// The PostGIS database that ingested tables are written to.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatastoreConfig {
    pub url: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct IngestConfig {
    /// Uploaded files are kept under `<upload_dir>/<upload id>/`.
    #[serde(default = "default_upload_dir")]
    pub upload_dir: String,
    #[serde(default = "default_info_tool")]
    pub info_tool: String,
    #[serde(default = "default_convert_tool")]
    pub convert_tool: String,
    /// Upper bound on a single tool invocation.
    #[serde(default = "default_tool_timeout_secs")]
    pub tool_timeout_secs: u64,
    #[serde(default = "default_target_srs")]
    pub target_srs: String,
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            upload_dir: default_upload_dir(),
            info_tool: default_info_tool(),
            convert_tool: default_convert_tool(),
            tool_timeout_secs: default_tool_timeout_secs(),
            target_srs: default_target_srs(),
            queue_capacity: default_queue_capacity(),
        }
    }
}

impl IngestConfig {
    pub fn tool_timeout(&self) -> Duration {
        Duration::from_secs(self.tool_timeout_secs)
    }
}

fn default_upload_dir() -> String {
    "uploads".to_string()
}

fn default_info_tool() -> String {
    "ogrinfo".to_string()
}

fn default_convert_tool() -> String {
    "ogr2ogr".to_string()
}

fn default_tool_timeout_secs() -> u64 {
    600
}

fn default_target_srs() -> String {
    crate::ingest::DEFAULT_TARGET_SRS.to_string()
}

fn default_queue_capacity() -> usize {
    crate::ingest::INGEST_CHANNEL_CAPACITY
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StyleConfig {
    /// Public root that relative tile and data URLs in styles are resolved against.
    #[serde(default = "default_base_url")]
    pub base_url: String,
}

impl Default for StyleConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
        }
    }
}

fn default_base_url() -> String {
    "http://127.0.0.1:3000".to_string()
}

impl AppConfig {
    /// Load configuration from file and environment variables
    pub fn load(config_path: &str) -> Result<Self> {
        let config = config::Config::builder()
            .add_source(config::File::with_name(config_path))
            // Example: MAPSTUDIO_INGEST__TOOL_TIMEOUT_SECS=120
            .add_source(
                config::Environment::with_prefix("MAPSTUDIO")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .context("Failed to build configuration")?;

        config
            .try_deserialize()
            .context("Failed to deserialize configuration")
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        match self.catalog.catalog_type.as_str() {
            "postgres" => {
                if self.catalog.host.is_none() {
                    anyhow::bail!("Postgres catalog requires 'host'");
                }
                if self.catalog.database.is_none() {
                    anyhow::bail!("Postgres catalog requires 'database'");
                }
                if self.catalog.user.is_none() {
                    anyhow::bail!("Postgres catalog requires 'user'");
                }
                if self.catalog.password.is_none() {
                    anyhow::bail!("Postgres catalog requires 'password'");
                }
            }
            "sqlite" => {}
            _ => anyhow::bail!("Invalid catalog type: {}", self.catalog.catalog_type),
        }

        if self.datastore.url.trim().is_empty() {
            anyhow::bail!("Datastore requires 'url'");
        }
        if self.ingest.tool_timeout_secs == 0 {
            anyhow::bail!("Ingest 'tool_timeout_secs' must be greater than zero");
        }
        if self.ingest.queue_capacity == 0 {
            anyhow::bail!("Ingest 'queue_capacity' must be greater than zero");
        }

        Ok(())
    }
}
