//! Configuration loading.
//!
//! Settings live in `~/.pyramid/config.toml`; every field has a default
//! so a missing file means a fully working local setup. CLI flags
//! override the file.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub gateway: GatewayConfig,
    pub auth: AuthConfig,
    pub limits: LimitsConfig,
    /// Where the credential database and client logs live. Not read
    /// from the file; always derived from the home directory.
    #[serde(skip)]
    pub data_dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Session token lifetime in seconds.
    pub session_lifetime_secs: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Largest array any identity may store.
    pub max_array_len: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            gateway: GatewayConfig::default(),
            auth: AuthConfig::default(),
            limits: LimitsConfig::default(),
            data_dir: PathBuf::new(),
        }
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 8080,
        }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            session_lifetime_secs: 2 * 60 * 60,
        }
    }
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_array_len: 100_000,
        }
    }
}

impl Config {
    /// Load `~/.pyramid/config.toml`, falling back to defaults when the
    /// file does not exist.
    pub fn load() -> Result<Self> {
        let data_dir = default_data_dir()?;
        let config_path = data_dir.join("config.toml");

        let mut config = if config_path.exists() {
            let contents = std::fs::read_to_string(&config_path)
                .with_context(|| format!("Failed to read {}", config_path.display()))?;
            toml::from_str(&contents)
                .with_context(|| format!("Failed to parse {}", config_path.display()))?
        } else {
            Self::default()
        };

        config.data_dir = data_dir;
        Ok(config)
    }
}

fn default_data_dir() -> Result<PathBuf> {
    let user_dirs =
        directories::UserDirs::new().context("Could not determine the home directory")?;
    Ok(user_dirs.home_dir().join(".pyramid"))
}

// ── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let config = Config::default();
        assert_eq!(config.gateway.host, "127.0.0.1");
        assert_eq!(config.gateway.port, 8080);
        assert_eq!(config.auth.session_lifetime_secs, 7200);
        assert_eq!(config.limits.max_array_len, 100_000);
    }

    #[test]
    fn partial_file_fills_in_defaults() {
        let config: Config = toml::from_str("[gateway]\nport = 9000\n").unwrap();
        assert_eq!(config.gateway.port, 9000);
        assert_eq!(config.gateway.host, "127.0.0.1");
        assert_eq!(config.limits.max_array_len, 100_000);
    }

    #[test]
    fn empty_file_is_all_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.auth.session_lifetime_secs, 7200);
    }
}
