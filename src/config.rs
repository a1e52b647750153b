//! Configuration loading and validation.
//!
//! Every field is defaulted so the binary runs with no config file and no
//! flags. A `config.toml` may override any of them.

use serde::Deserialize;
use std::net::SocketAddr;
use std::path::Path;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub security: SecurityConfig,
}

/// Listener and transport tuning.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address the WebSocket listener binds to.
    pub listen: SocketAddr,
    /// Maximum inbound frame size in bytes.
    pub max_frame_bytes: usize,
    /// Transport keepalive: server-to-peer ping period in seconds.
    pub ping_interval_secs: u64,
    /// Transport keepalive: how long to wait for a pong.
    pub pong_timeout_secs: u64,
    /// Period of the supervisor liveness sweep.
    pub sweep_interval_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: "0.0.0.0:3333".parse().expect("static listen address"),
            max_frame_bytes: 1024 * 1024,
            ping_interval_secs: 20,
            pong_timeout_secs: 10,
            sweep_interval_secs: 30,
        }
    }
}

/// Room catalog storage.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: "chat_rooms.db".to_string(),
        }
    }
}

/// Admin credential, ban persistence, and flood suppression tuning.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// File the rotating admin secret is written to.
    pub admin_secret_file: String,
    /// File the banned address set is persisted in.
    pub ban_file: String,
    /// Admin secret rotation period in seconds.
    pub rotation_secs: u64,
    /// Width of the flood suppression window in seconds.
    pub flood_window_secs: u64,
    /// Messages admitted per window for non-admins.
    pub flood_max_messages: usize,
    /// Prefix for auto-allocated usernames.
    pub auto_name_prefix: String,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            admin_secret_file: "admin.txt".to_string(),
            ban_file: "banned.txt".to_string(),
            rotation_secs: 3600,
            flood_window_secs: 60,
            flood_max_messages: 30,
            auto_name_prefix: "xsukax".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file. A missing file yields the
    /// defaults; a malformed file is an error.
    pub fn load(path: &str) -> anyhow::Result<Self> {
        if !Path::new(path).exists() {
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(path)?;
        let config = toml::from_str(&raw)?;
        Ok(config)
    }
}

/// Validate a loaded configuration, collecting every problem.
pub fn validate(config: &Config) -> Result<(), Vec<String>> {
    let mut errors = Vec::new();

    if config.security.flood_max_messages == 0 {
        errors.push("security.flood_max_messages must be at least 1".to_string());
    }
    if config.security.flood_window_secs == 0 {
        errors.push("security.flood_window_secs must be at least 1".to_string());
    }
    if config.security.rotation_secs == 0 {
        errors.push("security.rotation_secs must be at least 1".to_string());
    }
    if config.server.max_frame_bytes == 0 {
        errors.push("server.max_frame_bytes must be at least 1".to_string());
    }
    let prefix = &config.security.auto_name_prefix;
    if prefix.is_empty()
        || prefix.len() + 4 > 20
        || !prefix
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    {
        errors.push(
            "security.auto_name_prefix must be 1-16 chars of [A-Za-z0-9_-]".to_string(),
        );
    }

    if errors.is_empty() { Ok(()) } else { Err(errors) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = Config::default();
        assert!(validate(&config).is_ok());
        assert_eq!(config.server.listen.port(), 3333);
        assert_eq!(config.security.flood_max_messages, 30);
    }

    #[test]
    fn missing_file_yields_defaults() {
        let config = Config::load("/nonexistent/config.toml").unwrap();
        assert_eq!(config.database.path, "chat_rooms.db");
    }

    #[test]
    fn partial_toml_overrides() {
        let config: Config = toml::from_str(
            r#"
            [server]
            listen = "127.0.0.1:4444"

            [security]
            flood_max_messages = 5
            "#,
        )
        .unwrap();
        assert_eq!(config.server.listen.port(), 4444);
        assert_eq!(config.security.flood_max_messages, 5);
        // Untouched sections keep their defaults.
        assert_eq!(config.security.rotation_secs, 3600);
    }

    #[test]
    fn bad_values_are_collected() {
        let mut config = Config::default();
        config.security.flood_max_messages = 0;
        config.security.auto_name_prefix = "way-too-long-prefix-here".to_string();
        let errors = validate(&config).unwrap_err();
        assert_eq!(errors.len(), 2);
    }
}
