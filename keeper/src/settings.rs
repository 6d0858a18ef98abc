//! Settings of the keeper service.
//!
//! Values are merged from, in increasing precedence:
//! - defaults of every field
//! - `./config/*.json`
//! - the json files listed in `CONFIG_FILES`, comma separated
//! - `KEEPER_` prefixed environment variables, `__` separating nested keys,
//!   e.g. `KEEPER_SCHEDULER__RETRY_DELAY_SECS=30`

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use config::{Config, Environment, File};
use ethers::types::{Address, U256};
use eyre::{eyre, Context, Result};
use serde::Deserialize;

pub use signing_keys::SigningKeys;
pub use trace::{Level, Style, TracingConfig};

use crate::keeper::KeeperConfig;
use crate::scheduler::SchedulerConfig;

mod signing_keys;
mod trace;


const ENV_PREFIX: &str = "KEEPER";

/// Private key of the keeper account, kept out of debug output.
#[derive(Clone, Deserialize)]
#[serde(transparent)]
pub struct KeeperKey(String);

impl KeeperKey {
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for KeeperKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("KeeperKey(..)")
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct KeeperSettings {
    pub rpc_url: String,
    pub chain_id: u64,
    pub keeper_key: KeeperKey,
    /// In-memory scheduling when absent; nothing survives a restart.
    #[serde(default)]
    pub redis_url: Option<String>,
    /// Previewer contract exposing the pending proposals of accounts.
    pub previewer: Address,
    #[serde(default)]
    pub transaction: TransactionSettings,
    #[serde(default)]
    pub scheduler: SchedulerSettings,
    #[serde(default)]
    pub tracing: TracingConfig,
    /// Key the block webhook signs its deliveries with.
    #[serde(default)]
    pub webhook_signing_key: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct TransactionSettings {
    pub max_fee_per_gas: u64,
    pub max_priority_fee_per_gas: u64,
    pub gas_limit: u64,
    pub rebroadcast_interval_secs: u64,
    pub receipt_timeout_secs: u64,
    pub receipt_poll_interval_secs: u64,
    pub trace_retry_count: usize,
    pub trace_retry_delay_ms: u64,
}

impl Default for TransactionSettings {
    fn default() -> Self {
        Self {
            max_fee_per_gas: 1_000_000_000,
            max_priority_fee_per_gas: 1_000_000,
            gas_limit: 5_000_000,
            rebroadcast_interval_secs: 10,
            receipt_timeout_secs: 180,
            receipt_poll_interval_secs: 4,
            trace_retry_count: 10,
            trace_retry_delay_ms: 1_000,
        }
    }
}

impl From<&TransactionSettings> for KeeperConfig {
    fn from(settings: &TransactionSettings) -> Self {
        Self {
            max_fee_per_gas: U256::from(settings.max_fee_per_gas),
            max_priority_fee_per_gas: U256::from(settings.max_priority_fee_per_gas),
            gas_limit: U256::from(settings.gas_limit),
            rebroadcast_interval: Duration::from_secs(settings.rebroadcast_interval_secs),
            receipt_timeout: Duration::from_secs(settings.receipt_timeout_secs),
            receipt_poll_interval: Duration::from_secs(settings.receipt_poll_interval_secs),
            trace_retry_count: settings.trace_retry_count,
            trace_retry_delay: Duration::from_millis(settings.trace_retry_delay_ms),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SchedulerSettings {
    pub unlock_grace_secs: u64,
    pub retry_delay_secs: u64,
    pub weth_market: Option<Address>,
    /// Testnets drop legacy withdraws the account reverts.
    pub drop_reverted_withdraws: bool,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            unlock_grace_secs: 10,
            retry_delay_secs: 60,
            weth_market: None,
            drop_reverted_withdraws: false,
        }
    }
}

impl From<&SchedulerSettings> for SchedulerConfig {
    fn from(settings: &SchedulerSettings) -> Self {
        Self {
            unlock_grace: Duration::from_secs(settings.unlock_grace_secs),
            retry_delay: Duration::from_secs(settings.retry_delay_secs),
            weth_market: settings.weth_market,
            drop_reverted_withdraws: settings.drop_reverted_withdraws,
        }
    }
}

impl KeeperSettings {
    /// Loads the settings from `./config`, `CONFIG_FILES` and the environment.
    pub fn new() -> Result<Self> {
        let config_files = std::env::var("CONFIG_FILES")
            .map(|files| files.split(',').map(PathBuf::from).collect::<Vec<_>>())
            .unwrap_or_default();
        Self::load(Path::new("./config"), &config_files, Self::environment())
    }

    fn environment() -> Environment {
        Environment::with_prefix(ENV_PREFIX)
            .prefix_separator("_")
            .separator("__")
            .try_parsing(true)
    }

    pub(crate) fn load(
        config_dir: &Path,
        config_files: &[PathBuf],
        environment: Environment,
    ) -> Result<Self> {
        let mut builder = Config::builder();

        if config_dir.is_dir() {
            let mut entries = config_dir
                .read_dir()
                .context("Failed to open config directory")?
                .map(|entry| entry.map(|entry| entry.path()))
                .collect::<Result<Vec<_>, _>>()
                .context("Failed to list config directory")?;
            entries.sort();
            for path in entries {
                if path.is_file() && path.extension() == Some("json".as_ref()) {
                    builder = builder.add_source(File::from(path));
                }
            }
        }

        for path in config_files {
            if !path.exists() {
                return Err(eyre!(
                    "Provided config path via CONFIG_FILES does not exist ({path:?})"
                ));
            }
            if !path.is_file() || path.extension() != Some("json".as_ref()) {
                return Err(eyre!(
                    "Provided config path via CONFIG_FILES is not a json file ({path:?})"
                ));
            }
            builder = builder.add_source(File::from(path.clone()));
        }

        builder
            .add_source(environment)
            .build()
            .context("Failed to load config sources")?
            .try_deserialize::<Self>()
            .context("Config deserialization error")
    }

    pub fn keeper_config(&self) -> KeeperConfig {
        (&self.transaction).into()
    }

    pub fn scheduler_config(&self) -> SchedulerConfig {
        (&self.scheduler).into()
    }

    pub fn signing_keys(&self) -> SigningKeys {
        SigningKeys::new(self.webhook_signing_key.iter().cloned())
    }
}
