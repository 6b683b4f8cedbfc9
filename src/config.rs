//! Configuration System
//!
//! Handles loading configuration from files and environment variables.
//! Supports TOML config files and environment variable overrides.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::backend::{ChangeFilter, RealtimeConfig as ChannelConfig, SupabaseConfig};
use crate::view::ViewOptions;

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub backend: BackendConfig,

    #[serde(default)]
    pub auth: AuthConfig,

    #[serde(default)]
    pub realtime: RealtimeConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Managed backend connection
#[derive(Debug, Clone, Deserialize)]
pub struct BackendConfig {
    #[serde(default = "default_backend_url")]
    pub url: String,

    /// Public anon key; row-level security does the real gatekeeping
    #[serde(default)]
    pub anon_key: String,

    #[serde(default = "default_table")]
    pub table: String,

    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

fn default_backend_url() -> String {
    "http://localhost:54321".to_string()
}

fn default_table() -> String {
    "bookmarks".to_string()
}

fn default_request_timeout() -> u64 {
    10
}

fn default_max_retries() -> u32 {
    3
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            url: default_backend_url(),
            anon_key: String::new(),
            table: default_table(),
            request_timeout_secs: default_request_timeout(),
            max_retries: default_max_retries(),
        }
    }
}

/// Sign-in settings
#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    #[serde(default = "default_provider")]
    pub provider: String,

    /// Where the provider sends the browser after sign-in
    pub redirect_to: Option<String>,

    #[serde(default = "default_session_file")]
    pub session_file: String,
}

fn default_provider() -> String {
    "google".to_string()
}

fn default_session_file() -> String {
    dirs::data_local_dir()
        .map(|p| {
            p.join("smartmarks")
                .join("session.json")
                .to_string_lossy()
                .to_string()
        })
        .unwrap_or_else(|| "./smartmarks_session.json".to_string())
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            redirect_to: None,
            session_file: default_session_file(),
        }
    }
}

/// Live update channel settings
#[derive(Debug, Clone, Deserialize)]
pub struct RealtimeConfig {
    #[serde(default = "default_channel")]
    pub channel: String,

    #[serde(default = "default_schema")]
    pub schema: String,

    #[serde(default = "default_heartbeat_interval")]
    pub heartbeat_interval_secs: u64,

    #[serde(default = "default_join_timeout")]
    pub join_timeout_secs: u64,
}

fn default_channel() -> String {
    "bookmarks-channel".to_string()
}

fn default_schema() -> String {
    "public".to_string()
}

fn default_heartbeat_interval() -> u64 {
    30
}

fn default_join_timeout() -> u64 {
    10
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            channel: default_channel(),
            schema: default_schema(),
            heartbeat_interval_secs: default_heartbeat_interval(),
            join_timeout_secs: default_join_timeout(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl Config {
    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        let config: Config = toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        Ok(config)
    }

    /// Load configuration from environment variables only
    pub fn from_env() -> Self {
        let mut config = Config::default();
        config.apply_env_overrides();
        config
    }

    /// Load configuration with environment variable overrides
    pub fn load_with_env(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Load from default locations or environment
    pub fn load_default() -> Self {
        let config_paths = [
            dirs::config_dir().map(|p| p.join("smartmarks").join("config.toml")),
            Some(PathBuf::from("/etc/smartmarks/config.toml")),
            Some(PathBuf::from("./smartmarks.toml")),
        ];

        for path_opt in config_paths.iter().flatten() {
            if path_opt.exists() {
                match Self::load_with_env(path_opt) {
                    Ok(config) => {
                        tracing::info!("Loaded config from {:?}", path_opt);
                        return config;
                    }
                    Err(e) => {
                        tracing::warn!("Failed to load config from {:?}: {}", path_opt, e);
                    }
                }
            }
        }

        tracing::info!("Using default config with environment overrides");
        Self::from_env()
    }

    /// Apply environment variable overrides to an existing config
    fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        // Backend overrides
        if let Some(url) = lookup("SMARTMARKS_URL") {
            self.backend.url = url;
        }
        if let Some(key) = lookup("SMARTMARKS_ANON_KEY") {
            self.backend.anon_key = key;
        }

        // Auth overrides
        if let Some(provider) = lookup("SMARTMARKS_PROVIDER") {
            self.auth.provider = provider;
        }
        if let Some(redirect) = lookup("SMARTMARKS_REDIRECT_TO") {
            self.auth.redirect_to = Some(redirect);
        }
        if let Some(path) = lookup("SMARTMARKS_SESSION_FILE") {
            self.auth.session_file = path;
        }

        // Logging overrides
        if let Some(level) = lookup("SMARTMARKS_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Some(format) = lookup("SMARTMARKS_LOG_FORMAT") {
            self.logging.format = format;
        }
    }

    /// REST and auth client settings
    pub fn supabase_config(&self) -> SupabaseConfig {
        SupabaseConfig {
            base_url: self.backend.url.clone(),
            anon_key: self.backend.anon_key.clone(),
            table: self.backend.table.clone(),
            redirect_to: self.auth.redirect_to.clone(),
            request_timeout_ms: self.backend.request_timeout_secs * 1000,
            max_retries: self.backend.max_retries,
            ..SupabaseConfig::default()
        }
    }

    /// Realtime channel settings
    pub fn channel_config(&self) -> ChannelConfig {
        ChannelConfig {
            base_url: self.backend.url.clone(),
            anon_key: self.backend.anon_key.clone(),
            channel: self.realtime.channel.clone(),
            heartbeat_interval: Duration::from_secs(self.realtime.heartbeat_interval_secs),
            join_timeout: Duration::from_secs(self.realtime.join_timeout_secs),
        }
    }

    pub fn view_options(&self) -> ViewOptions {
        ViewOptions {
            provider: self.auth.provider.clone(),
            filter: ChangeFilter::all_rows(self.realtime.schema.clone(), self.backend.table.clone()),
        }
    }

    pub fn session_path(&self) -> PathBuf {
        PathBuf::from(&self.auth.session_file)
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path:?}: {error}")]
    Io { path: PathBuf, error: String },

    #[error("Failed to parse config file {path:?}: {error}")]
    Parse { path: PathBuf, error: String },
}

/// Generate a default config file content
pub fn generate_default_config() -> String {
    r#"# Smart Bookmark Manager Configuration
#
# Environment variables override these settings:
# - SMARTMARKS_URL
# - SMARTMARKS_ANON_KEY
# - SMARTMARKS_PROVIDER
# - SMARTMARKS_REDIRECT_TO
# - SMARTMARKS_SESSION_FILE
# - SMARTMARKS_LOG_LEVEL
# - SMARTMARKS_LOG_FORMAT

[backend]
# Project URL of the managed backend
url = "http://localhost:54321"

# Public anon key of the project
anon_key = ""

# Table holding the bookmarks
table = "bookmarks"

# Request timeout in seconds
request_timeout_secs = 10

# Retries for transient failures (timeouts, 429, 5xx)
max_retries = 3

[auth]
# OAuth provider used by `smartmarks login`
provider = "google"

# Where the provider redirects after sign-in
# redirect_to = "http://localhost:3000/"

# Where the access token is kept between runs
# session_file = "~/.local/share/smartmarks/session.json"

[realtime]
# Channel name joined on the realtime socket
channel = "bookmarks-channel"

# Schema of the bookmarks table
schema = "public"

# Heartbeat interval in seconds
heartbeat_interval_secs = 30

# How long to wait for the channel join reply (seconds)
join_timeout_secs = 10

[logging]
# Log level: trace, debug, info, warn, error
level = "info"

# Log format: pretty (for development) or json (for production)
format = "pretty"
"#
    .to_string()
}
