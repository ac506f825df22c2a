//! Application Configuration
//!
//! This module provides configuration management for the application,
//! supporting YAML configuration files with sensible defaults and a small
//! set of environment overrides for container deployments.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::fs;
use std::env;
use log::{info, warn};

/// Mount point used by the container image for persistent data
pub const CONTAINER_DATA_DIR: &str = "/app/data";

/// Deployment environment
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Development,
    Staging,
    Production,
}

impl std::str::FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "development" | "dev" => Ok(Environment::Development),
            "staging" => Ok(Environment::Staging),
            "production" | "prod" => Ok(Environment::Production),
            _ => Err(format!("Unknown environment: {}", s)),
        }
    }
}

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Deployment environment, drives the default log level
    pub env: Environment,
    /// Server configuration
    pub server: ServerConfig,
    /// Database configuration
    pub database: DatabaseConfig,
    /// Logging configuration
    pub logging: LoggingConfig,
    /// Token signing configuration
    pub auth: AuthConfig,
    /// Background scraping configuration
    pub scraper: ScraperConfig,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Server host
    pub host: String,
    /// Server port
    pub port: u16,
    /// Number of worker threads
    pub workers: usize,
}

/// SQLite configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Database file path
    pub path: PathBuf,
    /// Busy timeout in milliseconds
    pub busy_timeout_ms: u64,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Optional log4rs YAML file; used instead of the built-in layout when it exists
    pub config_file: PathBuf,
    /// Directory holding the application and error logs
    pub dir: PathBuf,
    /// Overrides the environment-derived level
    pub level: Option<String>,
}

/// Token signing configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// HS256 secret; generated at startup when empty
    pub secret_key: Option<String>,
    /// Token lifetime in minutes
    pub token_expire_minutes: i64,
}

/// Background scraping configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScraperConfig {
    /// Run the periodic scraping loops
    pub enabled: bool,
    /// Per-request timeout in seconds
    pub request_timeout_secs: u64,
    /// User agent sent with every request
    pub user_agent: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            env: Environment::default(),
            server: ServerConfig::default(),
            database: DatabaseConfig::default(),
            logging: LoggingConfig::default(),
            auth: AuthConfig::default(),
            scraper: ScraperConfig::default(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            workers: 4,
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(Path::new(CONTAINER_DATA_DIR)),
            busy_timeout_ms: 30_000,
        }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            secret_key: None,
            token_expire_minutes: 60 * 24 * 7,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            config_file: PathBuf::from("server_log.yaml"),
            dir: PathBuf::from("logs"),
            level: None,
        }
    }
}

impl Default for ScraperConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            request_timeout_secs: 15,
            user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36".to_string(),
        }
    }
}

/// Database location: inside the container data mount when it exists,
/// otherwise next to the working directory.
pub fn default_db_path(container_dir: &Path) -> PathBuf {
    if container_dir.is_dir() {
        container_dir.join("gold_prices.db")
    } else {
        PathBuf::from("gold_prices.db")
    }
}

impl AppConfig {
    /// Load configuration from file, use defaults if not found, then apply
    /// environment overrides
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let mut config = if path.exists() {
            let content = fs::read_to_string(path)?;
            let config: AppConfig = serde_yaml::from_str(&content)?;
            info!("Loaded configuration from {}", path.display());
            config
        } else {
            warn!("Config file {} not found, using defaults", path.display());
            Self::default()
        };
        config.apply_env_overrides(|key| env::var(key).ok());
        Ok(config)
    }

    /// Apply `GOLD_ENV`, `GOLD_HOST`, `GOLD_PORT`, `DATABASE_PATH` and
    /// `SECRET_KEY`. Invalid values are ignored with a warning.
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup("GOLD_ENV") {
            match value.parse::<Environment>() {
                Ok(env) => self.env = env,
                Err(e) => warn!("Ignoring GOLD_ENV: {}", e),
            }
        }
        if let Some(host) = lookup("GOLD_HOST").filter(|h| !h.trim().is_empty()) {
            self.server.host = host;
        }
        if let Some(value) = lookup("GOLD_PORT") {
            match value.parse::<u16>() {
                Ok(port) => self.server.port = port,
                Err(_) => warn!("Ignoring invalid GOLD_PORT: {}", value),
            }
        }
        if let Some(path) = lookup("DATABASE_PATH").filter(|p| !p.trim().is_empty()) {
            self.database.path = PathBuf::from(path);
        }
        if let Some(secret) = lookup("SECRET_KEY").filter(|s| !s.trim().is_empty()) {
            self.auth.secret_key = Some(secret);
        }
    }

    /// Effective log level name
    pub fn log_level(&self) -> String {
        match &self.logging.level {
            Some(level) => level.clone(),
            None if self.env == Environment::Production => "info".to_string(),
            None => "debug".to_string(),
        }
    }

    /// Address the HTTP server binds to
    pub fn bind_address(&self) -> (String, u16) {
        (self.server.host.clone(), self.server.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::collections::HashMap;

    #[test]
    fn test_default_binds_all_interfaces_on_8000() {
        let config = AppConfig::default();
        assert_eq!(config.bind_address(), ("0.0.0.0".to_string(), 8000));
        assert_eq!(config.auth.token_expire_minutes, 10080);
        assert_eq!(config.logging.dir, PathBuf::from("logs"));
    }

    #[test]
    fn test_default_db_path_prefers_container_mount() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(default_db_path(dir.path()), dir.path().join("gold_prices.db"));
        assert_eq!(
            default_db_path(&dir.path().join("missing")),
            PathBuf::from("gold_prices.db")
        );
    }

    #[test]
    fn test_env_overrides() {
        let vars: HashMap<&str, &str> = [
            ("GOLD_ENV", "production"),
            ("GOLD_PORT", "9000"),
            ("DATABASE_PATH", "/tmp/prices.db"),
            ("SECRET_KEY", "s3cret"),
        ]
        .into_iter()
        .collect();

        let mut config = AppConfig::default();
        config.apply_env_overrides(|k| vars.get(k).map(|v| v.to_string()));

        assert_eq!(config.env, Environment::Production);
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.database.path, PathBuf::from("/tmp/prices.db"));
        assert_eq!(config.auth.secret_key.as_deref(), Some("s3cret"));
        assert_eq!(config.log_level(), "info");
    }

    #[test]
    fn test_invalid_env_values_are_ignored() {
        let mut config = AppConfig::default();
        config.apply_env_overrides(|k| match k {
            "GOLD_PORT" => Some("not-a-port".to_string()),
            "GOLD_ENV" => Some("moon".to_string()),
            _ => None,
        });
        assert_eq!(config.server.port, 8000);
        assert_eq!(config.env, Environment::Development);
        assert_eq!(config.log_level(), "debug");
    }

    #[test]
    #[serial]
    fn test_load_partial_yaml_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        fs::write(&path, "server:\n  port: 8100\nscraper:\n  enabled: false\n").unwrap();

        let config = AppConfig::load(&path).unwrap();
        assert_eq!(config.server.port, 8100);
        assert_eq!(config.server.host, "0.0.0.0");
        assert!(!config.scraper.enabled);
        assert_eq!(config.scraper.request_timeout_secs, 15);
    }

    #[test]
    #[serial]
    fn test_load_reads_process_environment() {
        let dir = tempfile::tempdir().unwrap();
        env::set_var("GOLD_PORT", "8200");
        let config = AppConfig::load(&dir.path().join("absent.yaml"));
        env::remove_var("GOLD_PORT");

        let config = config.unwrap();
        assert_eq!(config.server.port, 8200);
        assert_eq!(config.server.host, "0.0.0.0");
    }
}
