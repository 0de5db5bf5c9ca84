//! Wallet configuration.
//!
//! Values are layered: built-in defaults, then an optional TOML file, then
//! `ANCHOR_*` environment variables (e.g. `ANCHOR_FEE_RATE=12`,
//! `ANCHOR_NETWORK=signet`).

use std::path::{Path, PathBuf};
use std::time::Duration;

use anchor_core::Network;
use anchor_core::constants::{
    ADDRESS_SCAN_WINDOW, BALANCE_WINDOW, DEFAULT_FEE_RATE, DUST_THRESHOLD, IDLE_TIMEOUT_SECS,
    KEY_MATCH_WINDOW, MIN_FEE,
};
use config::{Config, ConfigError, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};

use crate::builder::TxBuilder;
use crate::fee::FeePolicy;

/// Environment variable prefix.
pub const ENV_PREFIX: &str = "ANCHOR";

fn default_fee_rate() -> u64 {
    DEFAULT_FEE_RATE
}

fn default_min_fee() -> u64 {
    MIN_FEE
}

fn default_dust_threshold() -> u64 {
    DUST_THRESHOLD
}

fn default_key_match_window() -> u32 {
    KEY_MATCH_WINDOW
}

fn default_true() -> bool {
    true
}

fn default_address_scan_window() -> u32 {
    ADDRESS_SCAN_WINDOW
}

fn default_balance_window() -> u32 {
    BALANCE_WINDOW
}

fn default_idle_timeout_secs() -> u64 {
    IDLE_TIMEOUT_SECS
}

/// Tunables for a wallet session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalletConfig {
    #[serde(default)]
    pub network: Network,
    /// Sats per vbyte when the caller does not pick a rate.
    #[serde(default = "default_fee_rate")]
    pub fee_rate: u64,
    #[serde(default = "default_min_fee")]
    pub min_fee: u64,
    #[serde(default = "default_dust_threshold")]
    pub dust_threshold: u64,
    /// Indices per chain searched for a signing key.
    #[serde(default = "default_key_match_window")]
    pub key_match_window: u32,
    #[serde(default = "default_true")]
    pub scan_change_chain: bool,
    /// Indices probed when looking for the first unused receive address.
    #[serde(default = "default_address_scan_window")]
    pub address_scan_window: u32,
    /// Receive addresses summed into the displayed balance.
    #[serde(default = "default_balance_window")]
    pub balance_window: u32,
    /// Seconds without activity before the session locks; 0 disables.
    #[serde(default = "default_idle_timeout_secs")]
    pub idle_timeout_secs: u64,
    /// Gateway base URL overriding the per-network default.
    #[serde(default)]
    pub gateway_url: Option<String>,
}

impl Default for WalletConfig {
    fn default() -> Self {
        Self {
            network: Network::default(),
            fee_rate: DEFAULT_FEE_RATE,
            min_fee: MIN_FEE,
            dust_threshold: DUST_THRESHOLD,
            key_match_window: KEY_MATCH_WINDOW,
            scan_change_chain: true,
            address_scan_window: ADDRESS_SCAN_WINDOW,
            balance_window: BALANCE_WINDOW,
            idle_timeout_secs: IDLE_TIMEOUT_SECS,
            gateway_url: None,
        }
    }
}

impl WalletConfig {
    /// `<config dir>/anchor/config.toml`, if the platform has a config dir.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("anchor").join("config.toml"))
    }

    /// Load from `path` (or the default path) and the process environment.
    /// A missing file is not an error.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        Self::load_with_env(path, Environment::with_prefix(ENV_PREFIX).try_parsing(true))
    }

    /// Load with an explicit environment source.
    pub fn load_with_env(path: Option<&Path>, env: Environment) -> Result<Self, ConfigError> {
        let mut builder = Config::builder();
        if let Some(file) = path.map(Path::to_path_buf).or_else(Self::default_path) {
            // An explicitly named file must exist.
            let required = path.is_some();
            builder = builder.add_source(File::from(file).format(FileFormat::Toml).required(required));
        }
        let config: Self = builder.add_source(env).build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values that would make the wallet unusable.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.key_match_window == 0 {
            return Err(ConfigError::Message("key_match_window must be at least 1".into()));
        }
        if self.address_scan_window == 0 {
            return Err(ConfigError::Message("address_scan_window must be at least 1".into()));
        }
        if self.fee_rate == 0 {
            return Err(ConfigError::Message("fee_rate must be at least 1 sat/vB".into()));
        }
        Ok(())
    }

    /// Fee policy at the configured rate.
    pub fn fee_policy(&self) -> FeePolicy {
        self.fee_policy_at(self.fee_rate)
    }

    /// Fee policy at an explicit rate, keeping the configured floor and
    /// dust threshold.
    pub fn fee_policy_at(&self, fee_rate: u64) -> FeePolicy {
        FeePolicy {
            fee_rate,
            min_fee: self.min_fee,
            dust_threshold: self.dust_threshold,
        }
    }

    /// Transaction builder honoring the key-matching settings.
    pub fn tx_builder(&self, fee_rate: u64) -> TxBuilder {
        TxBuilder::new(self.fee_policy_at(fee_rate))
            .key_match_window(self.key_match_window)
            .scan_change_chain(self.scan_change_chain)
    }

    /// Idle timeout, or `None` when disabled.
    pub fn idle_timeout(&self) -> Option<Duration> {
        (self.idle_timeout_secs > 0).then(|| Duration::from_secs(self.idle_timeout_secs))
    }
}
