//! Configuration management
//!
//! Configuration is loaded from config.yml with environment variable
//! overrides (DUMPHUB_* for tunables). Missing optional values fall back to
//! defaults. The session signing secret is deliberately NOT part of the
//! config file: it comes only from the SESSION_SECRET environment variable
//! and its absence is a startup error.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::auth::MacBackendKind;

/// Environment variable holding the session signing secret.
pub const SESSION_SECRET_ENV: &str = "SESSION_SECRET";

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,
    /// Database configuration
    #[serde(default)]
    pub database: DatabaseConfig,
    /// Session token configuration
    #[serde(default)]
    pub session: SessionConfig,
    /// Dump file storage configuration
    #[serde(default)]
    pub storage: StorageConfig,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host address to bind to
    #[serde(default = "default_host")]
    pub host: String,
    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,
    /// CORS allowed origin (for cookie-based auth)
    #[serde(default = "default_cors_origin")]
    pub cors_origin: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            cors_origin: default_cors_origin(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_cors_origin() -> String {
    "http://localhost:3000".to_string()
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// SQLite database path or connection URL
    #[serde(default = "default_database_url")]
    pub url: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: default_database_url(),
        }
    }
}

fn default_database_url() -> String {
    "data/dumphub.db".to_string()
}

/// Session token configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Token lifetime in seconds for a normal login (2 hours)
    #[serde(default = "default_session_ttl")]
    pub ttl_seconds: i64,
    /// Token lifetime in seconds when "remember me" is checked (30 days)
    #[serde(default = "default_remember_ttl")]
    pub remember_ttl_seconds: i64,
    /// Which HMAC implementation signs tokens
    #[serde(default)]
    pub mac_backend: MacBackendKind,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            ttl_seconds: default_session_ttl(),
            remember_ttl_seconds: default_remember_ttl(),
            mac_backend: MacBackendKind::default(),
        }
    }
}

fn default_session_ttl() -> i64 {
    7200
}

fn default_remember_ttl() -> i64 {
    2_592_000
}

/// Dump file storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Root directory for stored dump files
    #[serde(default = "default_storage_path")]
    pub path: PathBuf,
    /// Maximum upload size in bytes (default: 100MB)
    #[serde(default = "default_max_file_size")]
    pub max_file_size: u64,
    /// Lifetime of signed download links in seconds
    #[serde(default = "default_link_ttl")]
    pub link_ttl_seconds: i64,
    /// Upload extensions to accept, lowercase without the dot. Empty means
    /// any extension is accepted.
    #[serde(default)]
    pub allowed_extensions: Vec<String>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: default_storage_path(),
            max_file_size: default_max_file_size(),
            link_ttl_seconds: default_link_ttl(),
            allowed_extensions: Vec::new(),
        }
    }
}

fn default_storage_path() -> PathBuf {
    PathBuf::from("data/files")
}

fn default_max_file_size() -> u64 {
    100 * 1024 * 1024 // 100MB
}

fn default_link_ttl() -> i64 {
    600
}

/// Error type for configuration parsing
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    FileRead {
        path: String,
        source: std::io::Error,
    },
    #[error("Failed to parse config file '{path}': {message}")]
    ParseError { path: String, message: String },
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

impl Config {
    /// Load configuration from file
    ///
    /// If the file doesn't exist, returns default configuration.
    /// If the file exists but is invalid YAML, returns an error with details.
    pub fn load(path: &std::path::Path) -> anyhow::Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::FileRead {
            path: path.display().to_string(),
            source: e,
        })?;

        if content.trim().is_empty() {
            return Ok(Self::default());
        }

        let config: Config =
            serde_yaml::from_str(&content).map_err(|e| ConfigError::ParseError {
                path: path.display().to_string(),
                message: format_yaml_error(&e),
            })?;

        Ok(config)
    }

    /// Load configuration from file with environment variable overrides
    ///
    /// Environment variables follow the pattern:
    /// - DUMPHUB_SERVER_HOST
    /// - DUMPHUB_SERVER_PORT
    /// - DUMPHUB_SERVER_CORS_ORIGIN
    /// - DUMPHUB_DATABASE_URL
    /// - DUMPHUB_SESSION_TTL_SECONDS
    /// - DUMPHUB_SESSION_MAC_BACKEND
    /// - DUMPHUB_STORAGE_PATH
    /// - DUMPHUB_STORAGE_MAX_FILE_SIZE
    /// - DUMPHUB_STORAGE_ALLOWED_EXTENSIONS (comma-separated)
    pub fn load_with_env(path: &std::path::Path) -> anyhow::Result<Self> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(host) = std::env::var("DUMPHUB_SERVER_HOST") {
            self.server.host = host;
        }
        if let Ok(port) = std::env::var("DUMPHUB_SERVER_PORT") {
            if let Ok(port) = port.parse::<u16>() {
                self.server.port = port;
            }
        }
        if let Ok(cors_origin) = std::env::var("DUMPHUB_SERVER_CORS_ORIGIN") {
            self.server.cors_origin = cors_origin;
        }

        if let Ok(url) = std::env::var("DUMPHUB_DATABASE_URL") {
            self.database.url = url;
        }

        if let Ok(ttl) = std::env::var("DUMPHUB_SESSION_TTL_SECONDS") {
            if let Ok(ttl) = ttl.parse::<i64>() {
                self.session.ttl_seconds = ttl;
            }
        }
        if let Ok(backend) = std::env::var("DUMPHUB_SESSION_MAC_BACKEND") {
            // Unknown backend names are ignored
            if let Ok(kind) = backend.parse::<MacBackendKind>() {
                self.session.mac_backend = kind;
            }
        }

        if let Ok(path) = std::env::var("DUMPHUB_STORAGE_PATH") {
            self.storage.path = PathBuf::from(path);
        }
        if let Ok(size) = std::env::var("DUMPHUB_STORAGE_MAX_FILE_SIZE") {
            if let Ok(size) = size.parse::<u64>() {
                self.storage.max_file_size = size;
            }
        }
        if let Ok(extensions) = std::env::var("DUMPHUB_STORAGE_ALLOWED_EXTENSIONS") {
            self.storage.allowed_extensions = extensions
                .split(',')
                .map(|ext| ext.trim().to_lowercase())
                .filter(|ext| !ext.is_empty())
                .collect();
        }
    }
}

/// Read the session signing secret from the environment.
///
/// The secret never lives in config.yml. A missing or empty value aborts
/// startup rather than letting the server issue forgeable tokens.
pub fn require_session_secret() -> anyhow::Result<Vec<u8>> {
    match std::env::var(SESSION_SECRET_ENV) {
        Ok(secret) if !secret.trim().is_empty() => Ok(secret.into_bytes()),
        _ => Err(ConfigError::ValidationError(format!(
            "{SESSION_SECRET_ENV} must be set to a non-empty value"
        ))
        .into()),
    }
}

/// Format YAML parsing error with location and context
fn format_yaml_error(e: &serde_yaml::Error) -> String {
    if let Some(location) = e.location() {
        format!(
            "at line {}, column {}: {}",
            location.line(),
            location.column(),
            e
        )
    } else {
        e.to_string()
    }
}

// Shared mutex for all config tests that modify environment variables.
#[cfg(test)]
static CONFIG_ENV_MUTEX: std::sync::Mutex<()> = std::sync::Mutex::new(());


#[cfg(test)]
mod property_tests {
    use super::*;
    use proptest::prelude::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn valid_config_strategy() -> impl Strategy<Value = Config> {
        (
            "[a-z][a-z0-9]{0,10}",
            1u16..=65535,
            60i64..=86400,
            prop_oneof![Just(MacBackendKind::HmacSha2), Just(MacBackendKind::Ring)],
            1024u64..=1_000_000_000,
        )
            .prop_map(|(host, port, ttl, mac_backend, max_file_size)| Config {
                server: ServerConfig {
                    host,
                    port,
                    cors_origin: default_cors_origin(),
                },
                database: DatabaseConfig::default(),
                session: SessionConfig {
                    ttl_seconds: ttl,
                    remember_ttl_seconds: ttl * 2,
                    mac_backend,
                },
                storage: StorageConfig {
                    path: PathBuf::from("data/files"),
                    max_file_size,
                    link_ttl_seconds: 600,
                    allowed_extensions: Vec::new(),
                },
            })
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(20))]

        /// Any valid config survives a YAML write/read cycle unchanged.
        #[test]
        fn property_config_roundtrip(config in valid_config_strategy()) {
            let yaml = serde_yaml::to_string(&config).expect("Failed to serialize config");

            let mut file = NamedTempFile::new().expect("Failed to create temp file");
            write!(file, "{}", yaml).expect("Failed to write config");

            let parsed = Config::load(file.path()).expect("Failed to parse config");

            prop_assert_eq!(config.server.host, parsed.server.host);
            prop_assert_eq!(config.server.port, parsed.server.port);
            prop_assert_eq!(config.session.ttl_seconds, parsed.session.ttl_seconds);
            prop_assert_eq!(config.session.remember_ttl_seconds, parsed.session.remember_ttl_seconds);
            prop_assert_eq!(config.session.mac_backend, parsed.session.mac_backend);
            prop_assert_eq!(config.storage.max_file_size, parsed.storage.max_file_size);
        }

        /// Malformed YAML always surfaces as an error, never defaults.
        #[test]
        fn property_invalid_config_is_an_error(yaml in prop_oneof![
            Just("server:\n  port: not_a_number".to_string()),
            Just("server:\n  port: [1, 2, 3]".to_string()),
            Just("session:\n  mac_backend: 123".to_string()),
            Just("server: [invalid, list]".to_string()),
            Just("storage:\n  max_file_size: -5".to_string()),
        ]) {
            let mut file = NamedTempFile::new().expect("Failed to create temp file");
            write!(file, "{}", yaml).expect("Failed to write config");

            prop_assert!(Config::load(file.path()).is_err());
        }
    }
}
