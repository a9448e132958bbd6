//! Gateway configuration.
//!
//! Configuration is read once from the process environment (optionally seeded
//! from a `.env` file) and validated before the service starts. Adapters
//! receive the values they need through their constructors.

use std::collections::HashSet;
use std::path::Path;

use serde::Deserialize;
use validator::Validate;

use crate::errors::{AppError, AppResult};
use crate::models::resource::{Resource, ResourceCapabilities};

const DEFAULT_HOST: &str = "0.0.0.0";
const DEFAULT_PORT: u16 = 8080;
const DEFAULT_DATABASE_URL: &str = "sqlite://gateway.db?mode=rwc";
const DEFAULT_RESOURCE_TIMEOUT_SECS: u64 = 30;
const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;
const DEFAULT_ORIGINAL_QUERY_MAX_LEN: usize = 8192;

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable lines.
    Pretty,
    /// One JSON object per line.
    Json,
}

/// A resource declared by the administrator.
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ResourceConfig {
    /// Administrator-assigned identifier.
    #[validate(length(min = 1, message = "resource id is required"))]
    pub id: String,

    /// Display name.
    #[validate(length(min = 1, message = "resource name is required"))]
    pub name: String,

    /// Free-form description.
    #[serde(default)]
    pub description: Option<String>,

    /// Base URL of the resource's query interface.
    #[validate(url(message = "base URL must be a valid URL"))]
    #[serde(default, alias = "baseURL")]
    pub base_url: Option<String>,

    /// Operations the resource implements.
    #[serde(default)]
    pub capabilities: ResourceCapabilities,
}

impl From<ResourceConfig> for Resource {
    fn from(cfg: ResourceConfig) -> Self {
        Resource {
            id: cfg.id,
            name: cfg.name,
            description: cfg.description,
            base_url: cfg.base_url.map(|u| u.trim_end_matches('/').to_string()),
            capabilities: cfg.capabilities,
        }
    }
}

/// Application configuration shared by the gateway components.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Service name used in logs and responses.
    pub service_name: String,
    /// Bind host.
    pub host: String,
    /// Bind port.
    pub port: u16,
    /// Query store connection string.
    pub database_url: String,
    /// Timeout applied to every outbound resource call.
    pub resource_timeout_secs: u64,
    /// Connect timeout for outbound resource calls.
    pub connect_timeout_secs: u64,
    /// Upper bound for the stored original query text.
    pub original_query_max_len: usize,
    /// Resources to register at startup.
    pub resources: Vec<ResourceConfig>,
    /// Log output format.
    pub log_format: LogFormat,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            service_name: "gateway".to_string(),
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            database_url: DEFAULT_DATABASE_URL.to_string(),
            resource_timeout_secs: DEFAULT_RESOURCE_TIMEOUT_SECS,
            connect_timeout_secs: DEFAULT_CONNECT_TIMEOUT_SECS,
            original_query_max_len: DEFAULT_ORIGINAL_QUERY_MAX_LEN,
            resources: Vec::new(),
            log_format: LogFormat::Pretty,
        }
    }
}

impl AppConfig {
    /// Loads the configuration for a service from the environment.
    ///
    /// # Errors
    /// Returns `AppError::Application` if the resources file cannot be read
    /// or parsed, or if a numeric variable is set to something unparsable.
    pub fn from_env(service_name: &str) -> AppResult<Self> {
        let defaults = Self::default();

        let resources = match std::env::var("RESOURCES_FILE") {
            Ok(path) => load_resources_file(Path::new(&path))?,
            Err(_) => Vec::new(),
        };

        let log_format = match std::env::var("LOG_FORMAT").as_deref() {
            Ok("json") => LogFormat::Json,
            _ => LogFormat::Pretty,
        };

        Ok(Self {
            service_name: service_name.to_string(),
            host: std::env::var("SERVER_HOST").unwrap_or(defaults.host),
            port: env_parse("SERVER_PORT")?.unwrap_or(defaults.port),
            database_url: std::env::var("DATABASE_URL").unwrap_or(defaults.database_url),
            resource_timeout_secs: env_parse("RESOURCE_TIMEOUT_SECS")?
                .unwrap_or(defaults.resource_timeout_secs),
            connect_timeout_secs: env_parse("RESOURCE_CONNECT_TIMEOUT_SECS")?
                .unwrap_or(defaults.connect_timeout_secs),
            original_query_max_len: env_parse("ORIGINAL_QUERY_MAX_LEN")?
                .unwrap_or(defaults.original_query_max_len),
            resources,
            log_format,
        })
    }

    /// Validates the configuration once, before any adapter is built.
    ///
    /// # Errors
    /// Returns `AppError::Application` describing the first problem found.
    pub fn validate(&self) -> AppResult<()> {
        if self.resource_timeout_secs == 0 {
            return Err(AppError::Application(
                "RESOURCE_TIMEOUT_SECS must be greater than zero".into(),
            ));
        }
        if self.database_url.trim().is_empty() {
            return Err(AppError::Application("DATABASE_URL must not be empty".into()));
        }

        let mut seen = HashSet::new();
        for resource in &self.resources {
            resource.validate().map_err(|e| {
                AppError::Application(format!("invalid resource '{}': {}", resource.id, e))
            })?;
            if !seen.insert(resource.id.as_str()) {
                return Err(AppError::Application(format!(
                    "duplicate resource id '{}'",
                    resource.id
                )));
            }
        }
        Ok(())
    }

    /// Address the HTTP listener binds to.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Unset variables yield `None`; a set value that does not parse is an error.
fn env_parse<T: std::str::FromStr>(key: &str) -> AppResult<Option<T>> {
    parse_var(key, std::env::var(key).ok())
}

fn parse_var<T: std::str::FromStr>(key: &str, value: Option<String>) -> AppResult<Option<T>> {
    match value {
        None => Ok(None),
        Some(raw) => raw.trim().parse().map(Some).map_err(|_| {
            AppError::Application(format!("invalid value for {}: '{}'", key, raw))
        }),
    }
}

/// Reads a JSON array of resource declarations.
pub fn load_resources_file(path: &Path) -> AppResult<Vec<ResourceConfig>> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        AppError::Application(format!("cannot read resources file {}: {}", path.display(), e))
    })?;
    serde_json::from_str(&content).map_err(|e| {
        AppError::Application(format!("cannot parse resources file {}: {}", path.display(), e))
    })
}

/// Load .env file from the working directory (best-effort, no error if missing).
pub fn load_dotenv() {
    let env_path = Path::new(".env");
    if let Ok(content) = std::fs::read_to_string(env_path) {
        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            if let Some((key, value)) = line.split_once('=') {
                let key = key.trim();
                // Only set if not already set by the environment
                if std::env::var(key).is_err() {
                    std::env::set_var(key, value.trim());
                }
            }
        }
    }
}
