//! Service configuration: optional file, `PHONE_*` environment variables,
//! then built-in defaults.

use std::fmt;
use std::net::SocketAddr;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::schema::Tables;

const ENV_PREFIX: &str = "PHONE";

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default = "default_listen_addr")]
    pub listen_addr: SocketAddr,

    /// Deadline applied to every HTTP request.
    #[serde(default = "default_request_timeout", with = "humantime_serde")]
    pub request_timeout: Duration,

    #[serde(default)]
    pub database: DatabaseConfig,

    #[serde(default)]
    pub log: LogConfig,
}

#[derive(Clone, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_host")]
    pub host: String,
    #[serde(default = "default_db_port")]
    pub port: u16,
    #[serde(default = "default_db_user")]
    pub user: String,
    #[serde(default = "default_db_password")]
    pub password: String,
    #[serde(default = "default_db_name")]
    pub name: String,
    /// Empty means `public`.
    #[serde(default)]
    pub schema: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    #[serde(default = "default_acquire_timeout", with = "humantime_serde")]
    pub acquire_timeout: Duration,
    #[serde(default)]
    pub tables: Tables,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LogConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub format: LogFormat,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            host: default_db_host(),
            port: default_db_port(),
            user: default_db_user(),
            password: default_db_password(),
            name: default_db_name(),
            schema: String::new(),
            max_connections: default_max_connections(),
            acquire_timeout: default_acquire_timeout(),
            tables: Tables::default(),
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

impl DatabaseConfig {
    pub fn search_path(&self) -> String {
        if self.schema.is_empty() {
            "public".to_owned()
        } else {
            self.schema.clone()
        }
    }

    /// Connection URL with the password masked, for logs.
    pub fn redacted_url(&self) -> String {
        format!(
            "postgres://{}:***@{}:{}/{}?search_path={}",
            self.user,
            self.host,
            self.port,
            self.name,
            self.search_path()
        )
    }
}

impl fmt::Debug for DatabaseConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatabaseConfig")
            .field("url", &self.redacted_url())
            .field("max_connections", &self.max_connections)
            .field("acquire_timeout", &self.acquire_timeout)
            .field("tables", &self.tables)
            .finish()
    }
}

fn default_listen_addr() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 9090))
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_db_host() -> String {
    "127.0.0.1".into()
}

fn default_db_port() -> u16 {
    54322
}

fn default_db_user() -> String {
    "phone".into()
}

fn default_db_password() -> String {
    "phone".into()
}

fn default_db_name() -> String {
    "phonedb".into()
}

fn default_max_connections() -> u32 {
    u32::try_from(num_cpus::get() * 2).unwrap_or(u32::MAX)
}

fn default_acquire_timeout() -> Duration {
    Duration::from_secs(5)
}

fn default_log_level() -> String {
    "info".into()
}

impl Config {
    /// Load configuration. `file` names an optional config file (extension
    /// may be omitted); environment variables override it.
    pub fn load(file: Option<&str>) -> Result<Self> {
        dotenvy::dotenv().ok();

        let mut builder = config::Config::builder();
        if let Some(name) = file {
            builder = builder.add_source(config::File::with_name(name).required(true));
        }

        let config = builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    // Numeric-looking passwords and schema names stay strings.
                    .try_parsing(false),
            )
            .build()
            .context("Failed to build configuration")?;

        config
            .try_deserialize()
            .context("Failed to deserialize configuration")
    }
}
