//! Gatekeeper configuration.
//!
//! TOML-backed configuration shared by the daemon and the client agent.
//! Every field has a serde default so a partial (or absent) file yields a
//! working configuration; validation is fail-closed and rejects values that
//! would disable a check instead of silently accepting them.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Top-level gatekeeper configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatekeeperConfig {
    /// Address the eligibility gate HTTP service binds to.
    #[serde(default = "default_listen_addr")]
    pub listen_addr: SocketAddr,

    /// Path to the SQLite history database.
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    /// Registration reuse thresholds.
    #[serde(default)]
    pub reuse: ReuseThresholds,

    /// Withdrawal gating policy.
    #[serde(default)]
    pub withdrawal: WithdrawalPolicy,
}

/// How many prior registrations may share an identity signal before a new
/// attempt is denied.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReuseThresholds {
    /// Maximum registrations per device fingerprint.
    #[serde(default = "default_max_per_device")]
    pub max_per_device: u32,

    /// Maximum registrations per network address.
    #[serde(default = "default_max_per_ip")]
    pub max_per_ip: u32,

    /// Maximum registrations per phone number.
    #[serde(default = "default_max_per_phone")]
    pub max_per_phone: u32,
}

/// Per-profile withdrawal velocity limits and the structural minimum amount.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WithdrawalPolicy {
    /// Length of the velocity window, in hours.
    #[serde(default = "default_velocity_window_hours")]
    pub velocity_window_hours: u32,

    /// Maximum withdrawal requests per profile inside the window.
    #[serde(default = "default_max_per_window")]
    pub max_per_window: u32,

    /// Minimum withdrawal amount, enforced client-side before the gate.
    #[serde(default = "default_min_amount")]
    pub min_amount: f64,
}

fn default_listen_addr() -> SocketAddr {
    "127.0.0.1:8787".parse().expect("static default address")
}

fn default_db_path() -> PathBuf {
    PathBuf::from("fraudgate.db")
}

fn default_max_per_device() -> u32 {
    1
}

fn default_max_per_ip() -> u32 {
    3
}

fn default_max_per_phone() -> u32 {
    1
}

fn default_velocity_window_hours() -> u32 {
    24
}

fn default_max_per_window() -> u32 {
    3
}

fn default_min_amount() -> f64 {
    10.0
}

impl Default for GatekeeperConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            db_path: default_db_path(),
            reuse: ReuseThresholds::default(),
            withdrawal: WithdrawalPolicy::default(),
        }
    }
}

impl Default for ReuseThresholds {
    fn default() -> Self {
        Self {
            max_per_device: default_max_per_device(),
            max_per_ip: default_max_per_ip(),
            max_per_phone: default_max_per_phone(),
        }
    }
}

impl Default for WithdrawalPolicy {
    fn default() -> Self {
        Self {
            velocity_window_hours: default_velocity_window_hours(),
            max_per_window: default_max_per_window(),
            min_amount: default_min_amount(),
        }
    }
}

/// Configuration loading and validation failures.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Validation(String),
}

impl GatekeeperConfig {
    /// Load and validate configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed, or validated.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parse and validate configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML is invalid or any threshold would
    /// disable a check (zero reuse limits, zero velocity window, or a
    /// non-positive minimum amount).
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Fail-closed sanity checks on threshold values.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Validation` naming the offending field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.reuse.max_per_device == 0 {
            return Err(ConfigError::Validation("reuse.max_per_device must be at least 1".into()));
        }
        if self.reuse.max_per_ip == 0 {
            return Err(ConfigError::Validation("reuse.max_per_ip must be at least 1".into()));
        }
        if self.reuse.max_per_phone == 0 {
            return Err(ConfigError::Validation("reuse.max_per_phone must be at least 1".into()));
        }
        if self.withdrawal.velocity_window_hours == 0 {
            return Err(ConfigError::Validation(
                "withdrawal.velocity_window_hours must be at least 1".into(),
            ));
        }
        if self.withdrawal.max_per_window == 0 {
            return Err(ConfigError::Validation(
                "withdrawal.max_per_window must be at least 1".into(),
            ));
        }
        if self.withdrawal.min_amount <= 0.0 {
            return Err(ConfigError::Validation("withdrawal.min_amount must be positive".into()));
        }
        Ok(())
    }
}
