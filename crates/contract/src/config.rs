//! Contract suite configuration.

use std::env;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::ContractError;

pub const CONSUMER_ENV: &str = "PACT_CONSUMER";
pub const PROVIDER_ENV: &str = "PACT_PROVIDER";
pub const PACT_DIR_ENV: &str = "PACT_DIR";
pub const BIND_ADDRESS_ENV: &str = "PACT_BIND_ADDRESS";
pub const WRITE_MODE_ENV: &str = "PACT_FILE_WRITE_MODE";

pub const DEFAULT_CONSUMER: &str = "pactflow-example-consumer";
pub const DEFAULT_PROVIDER: &str = "pactflow-example-provider";
pub const DEFAULT_PACT_DIR: &str = "pacts";
const DEFAULT_BIND_ADDRESS: &str = "127.0.0.1:0";

/// How the pact file is written when one already exists.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PactWriteMode {
    /// Replace the existing file.
    #[default]
    Overwrite,
    /// Add this run's interactions to the existing file.
    Merge,
}

impl FromStr for PactWriteMode {
    type Err = ContractError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "overwrite" => Ok(Self::Overwrite),
            "merge" => Ok(Self::Merge),
            other => Err(ContractError::config(format!(
                "unknown pact write mode '{other}'; expected 'overwrite' or 'merge'"
            ))),
        }
    }
}

/// Settings for one [`crate::ContractSuite`] run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContractConfig {
    pub consumer: String,
    pub provider: String,
    /// Directory the pact file is written to.
    pub pact_dir: PathBuf,
    /// Loopback address for the mock provider; port `0` picks a free one.
    pub bind_address: SocketAddr,
    pub write_mode: PactWriteMode,
    /// When false, finalize verifies and shuts down without writing a file.
    pub write_pact: bool,
}

impl Default for ContractConfig {
    fn default() -> Self {
        Self {
            consumer: DEFAULT_CONSUMER.to_string(),
            provider: DEFAULT_PROVIDER.to_string(),
            pact_dir: PathBuf::from(DEFAULT_PACT_DIR),
            bind_address: SocketAddr::from(([127, 0, 0, 1], 0)),
            write_mode: PactWriteMode::Overwrite,
            write_pact: true,
        }
    }
}

impl ContractConfig {
    /// Build configuration from `PACT_*` environment variables over the defaults.
    pub fn from_env() -> Result<Self, ContractError> {
        let mut config = Self::default();
        if let Some(consumer) = non_empty_var(CONSUMER_ENV) {
            config.consumer = consumer;
        }
        if let Some(provider) = non_empty_var(PROVIDER_ENV) {
            config.provider = provider;
        }
        if let Some(pact_dir) = non_empty_var(PACT_DIR_ENV) {
            config.pact_dir = PathBuf::from(pact_dir);
        }
        config.bind_address = resolve_bind_address(non_empty_var(BIND_ADDRESS_ENV).as_deref())?;
        if let Some(mode) = non_empty_var(WRITE_MODE_ENV) {
            config.write_mode = mode.parse()?;
        }
        Ok(config)
    }

    pub fn with_pact_dir(mut self, pact_dir: impl Into<PathBuf>) -> Self {
        self.pact_dir = pact_dir.into();
        self
    }

    pub fn with_write_mode(mut self, write_mode: PactWriteMode) -> Self {
        self.write_mode = write_mode;
        self
    }

    pub fn without_pact_file(mut self) -> Self {
        self.write_pact = false;
        self
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|value| !value.trim().is_empty())
}

/// Resolve a safe local bind address for the mock provider.
pub fn resolve_bind_address(bind_address: Option<&str>) -> Result<SocketAddr, ContractError> {
    let address = bind_address.unwrap_or(DEFAULT_BIND_ADDRESS);
    let parsed: SocketAddr = address
        .parse()
        .map_err(|error| ContractError::config(format!("invalid mock provider bind address '{address}': {error}")))?;
    if !is_loopback(parsed.ip()) {
        return Err(ContractError::config("mock provider must bind to a loopback address"));
    }
    Ok(parsed)
}

fn is_loopback(address: IpAddr) -> bool {
    match address {
        IpAddr::V4(ip) => ip.is_loopback(),
        IpAddr::V6(ip) => ip.is_loopback(),
    }
}
