// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Configuration file support for dab-server.
//!
//! Config is loaded from the `[dab-server]` section of `dab-rs.toml`.
//! Default search order:
//! 1. Path specified via `--config` CLI argument
//! 2. `$DAB_RS_CONFIG`
//! 3. `./dab-rs.toml`
//! 4. `~/.config/dab-rs/dab-rs.toml`
//! 5. `/etc/dab-rs/dab-rs.toml`

use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use dab_app::{ConfigError, ConfigFile};
use dab_core::AnnouncementConfig;

/// Top-level server configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// General settings
    pub general: GeneralConfig,
    /// Control listener
    pub listen: ListenConfig,
    /// Switching policy
    pub announcements: AnnouncementConfig,
    /// History persistence
    pub history: HistoryConfig,
    /// Simulated receiver front end
    pub tuner: TunerConfig,
}

/// General application settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log level (trace, debug, info, warn, error)
    pub log_level: Option<String>,
}

/// TCP listener configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ListenConfig {
    /// Whether the listener is enabled
    pub enabled: bool,
    /// IP address to listen on
    pub listen: IpAddr,
    /// TCP port to listen on
    pub port: u16,
    /// Authentication configuration
    pub auth: AuthConfig,
}

impl Default for ListenConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            listen: IpAddr::V4(std::net::Ipv4Addr::LOCALHOST),
            port: 4540,
            auth: AuthConfig::default(),
        }
    }
}

/// Authentication configuration for the TCP listener.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Valid authentication tokens (empty = no auth required)
    pub tokens: Vec<String>,
}

/// History ledger persistence.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    /// Keep history across restarts in a JSON-lines file
    pub persist: bool,
    /// History file; empty selects the platform data directory
    pub path: Option<PathBuf>,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            persist: true,
            path: None,
        }
    }
}

impl HistoryConfig {
    pub fn resolved_path(&self) -> PathBuf {
        self.path
            .clone()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(dab_history::default_history_path)
    }
}

/// Simulated front end: which sub-channels the current ensemble carries.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TunerConfig {
    /// Service selected at startup
    pub initial_service: Option<String>,
    /// Sub-channels present in the ensemble; empty accepts any
    pub subchannels: Vec<String>,
    /// Services the receiver cannot decode
    pub unsupported_services: Vec<String>,
    /// Upper bound for one retune
    pub retune_timeout_ms: u64,
    /// Simulated retune latency
    pub latency_ms: u64,
}

impl Default for TunerConfig {
    fn default() -> Self {
        Self {
            initial_service: None,
            subchannels: Vec::new(),
            unsupported_services: Vec::new(),
            retune_timeout_ms: 5_000,
            latency_ms: 50,
        }
    }
}

impl TunerConfig {
    pub fn retune_timeout(&self) -> Duration {
        Duration::from_millis(self.retune_timeout_ms)
    }

    pub fn latency(&self) -> Duration {
        Duration::from_millis(self.latency_ms)
    }
}

impl ServerConfig {
    /// Load configuration from a specific file path.
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        <Self as ConfigFile>::load_from_file(path)
    }

    /// Load configuration from the default search paths.
    pub fn load_from_default_paths() -> Result<(Self, Option<PathBuf>), ConfigError> {
        <Self as ConfigFile>::load_from_default_paths()
    }

    /// Validate configuration values, naming the offending section and key.
    pub fn validate(&self) -> Result<(), String> {
        validate_log_level(self.general.log_level.as_deref())?;

        validate_tokens("[listen.auth].tokens", &self.listen.auth.tokens)?;
        if self.listen.enabled && self.listen.port == 0 {
            return Err("[listen].port must be > 0 when listener is enabled".to_string());
        }

        self.announcements
            .validate()
            .map_err(|e| format!("[announcements] {}", e.0))?;

        if self.tuner.retune_timeout_ms == 0 {
            return Err("[tuner].retune_timeout_ms must be > 0".to_string());
        }
        if let Some(service) = &self.tuner.initial_service {
            if service.trim().is_empty() {
                return Err("[tuner].initial_service must not be empty".to_string());
            }
        }
        if self.tuner.subchannels.iter().any(|s| s.trim().is_empty()) {
            return Err("[tuner].subchannels must not contain empty ids".to_string());
        }

        Ok(())
    }

    /// Generate an example configuration wrapped under the `[dab-server]`
    /// section header, suitable for use in a combined `dab-rs.toml` file.
    pub fn example_combined_toml() -> String {
        #[derive(serde::Serialize)]
        struct Wrapper {
            #[serde(rename = "dab-server")]
            inner: ServerConfig,
        }
        toml::to_string_pretty(&Wrapper {
            inner: Self::example(),
        })
        .unwrap_or_default()
    }

    fn example() -> Self {
        Self {
            general: GeneralConfig {
                log_level: Some("info".to_string()),
            },
            listen: ListenConfig::default(),
            announcements: AnnouncementConfig::default(),
            history: HistoryConfig::default(),
            tuner: TunerConfig {
                initial_service: Some("0xC221".to_string()),
                subchannels: vec!["0xC221".to_string(), "T1".to_string()],
                ..TunerConfig::default()
            },
        }
    }
}

fn validate_log_level(level: Option<&str>) -> Result<(), String> {
    if let Some(level) = level {
        match level {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => {
                return Err(format!(
                    "[general].log_level '{}' is invalid (expected one of: trace, debug, info, warn, error)",
                    level
                ))
            }
        }
    }
    Ok(())
}

fn validate_tokens(path: &str, tokens: &[String]) -> Result<(), String> {
    if tokens.iter().any(|t| t.trim().is_empty()) {
        return Err(format!("{path} must not contain empty tokens"));
    }
    Ok(())
}

impl ConfigFile for ServerConfig {
    fn section_key() -> &'static str {
        "dab-server"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dab_core::AnnouncementType;

    #[test]
    fn test_default_config() {
        let config = ServerConfig::default();
        assert!(config.listen.enabled);
        assert_eq!(config.listen.port, 4540);
        assert!(config.history.persist);
        assert_eq!(config.tuner.retune_timeout(), Duration::from_secs(5));
        assert!(config.announcements.enabled);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_minimal_toml() {
        let config = ServerConfig::load_from_str(
            r#"
[dab-server.general]
log_level = "debug"
"#,
        )
        .unwrap();
        assert_eq!(config.general.log_level.as_deref(), Some("debug"));
        assert_eq!(config.announcements.max_duration_secs, 300);
    }

    #[test]
    fn test_parse_full_toml() {
        let config = ServerConfig::load_from_str(
            r#"
[dab-server.listen]
port = 5000

[dab-server.listen.auth]
tokens = ["secret"]

[dab-server.announcements]
enabled_types = ["alarm", "traffic"]
priority_threshold = 3
max_duration_secs = 60
allow_manual_return = false

[dab-server.history]
persist = false
path = "/tmp/history.jsonl"

[dab-server.tuner]
initial_service = "0xC221"
subchannels = ["0xC221", "T1"]
unsupported_services = ["0xC999"]
latency_ms = 0
"#,
        )
        .unwrap();
        assert_eq!(config.listen.port, 5000);
        assert_eq!(config.listen.auth.tokens, vec!["secret".to_string()]);
        assert!(config.announcements.is_type_enabled(AnnouncementType::Traffic));
        assert!(!config.announcements.is_type_enabled(AnnouncementType::Weather));
        assert_eq!(config.announcements.priority_threshold, 3);
        assert!(!config.announcements.allow_manual_return);
        assert!(!config.history.persist);
        assert_eq!(
            config.history.resolved_path(),
            PathBuf::from("/tmp/history.jsonl")
        );
        assert_eq!(config.tuner.subchannels.len(), 2);
        assert_eq!(config.tuner.latency(), Duration::ZERO);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_names_section_and_key() {
        let mut config = ServerConfig::default();
        config.general.log_level = Some("loud".to_string());
        assert!(config.validate().unwrap_err().contains("[general].log_level"));

        let mut config = ServerConfig::default();
        config.announcements.max_duration_secs = 0;
        let err = config.validate().unwrap_err();
        assert!(err.starts_with("[announcements]"));
        assert!(err.contains("max_duration_secs"));

        let mut config = ServerConfig::default();
        config.listen.auth.tokens = vec![" ".to_string()];
        assert!(config
            .validate()
            .unwrap_err()
            .contains("[listen.auth].tokens"));

        let mut config = ServerConfig::default();
        config.tuner.retune_timeout_ms = 0;
        assert!(config
            .validate()
            .unwrap_err()
            .contains("[tuner].retune_timeout_ms"));
    }

    #[test]
    fn test_example_combined_toml_parses() {
        let example = ServerConfig::example_combined_toml();
        assert!(example.contains("[dab-server"));
        let config = ServerConfig::load_from_str(&example).unwrap();
        assert_eq!(config.tuner.initial_service.as_deref(), Some("0xC221"));
        assert!(config.validate().is_ok());
    }
}
