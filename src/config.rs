//! Service configuration from the environment.
//!
//! Binaries call `dotenvy::dotenv()` at startup and then
//! [`ServiceConfig::from_env`]. Every value has a default, so an empty
//! environment yields a working dev configuration.
//!
//! Environment variables used:
//! - `NUWA_NETWORK` — `dev`, `test`, or `main` (default `dev`)
//! - `NUWA_RPC_URL` — overrides the network's default node endpoint
//! - `NUWA_DEFAULT_ASSET_ID` — default `0x3::gas_coin::RGas`
//! - `NUWA_DEFAULT_UNIT_PRICE` — pico-USD per usage unit (default `1000000`)
//! - `NUWA_ADMIN_DIDS` — comma-separated admin DIDs
//! - `NUWA_DEBUG` — `1`/`true` enables debug behavior

use std::str::FromStr;
use url::Url;

use nuwa_payment::processor::ProcessorConfig;
use nuwa_types::amount::PicoUsd;
use nuwa_types::chain::NetworkTag;
use nuwa_types::did::Did;

/// Loads `.env` values into the process environment. Binaries call this
/// once before [`ServiceConfig::from_env`]; a missing file is fine.
pub fn load_dotenv() {
    dotenvy::dotenv().ok();
}

const ENV_NETWORK: &str = "NUWA_NETWORK";
const ENV_RPC_URL: &str = "NUWA_RPC_URL";
const ENV_DEFAULT_ASSET_ID: &str = "NUWA_DEFAULT_ASSET_ID";
const ENV_DEFAULT_UNIT_PRICE: &str = "NUWA_DEFAULT_UNIT_PRICE";
const ENV_ADMIN_DIDS: &str = "NUWA_ADMIN_DIDS";
const ENV_DEBUG: &str = "NUWA_DEBUG";

pub const DEFAULT_ASSET_ID: &str = "0x3::gas_coin::RGas";
const DEFAULT_UNIT_PRICE: PicoUsd = PicoUsd(1_000_000);

/// A malformed environment value.
#[derive(Debug, thiserror::Error)]
#[error("invalid value for {variable}: {value} ({reason})")]
pub struct ConfigError {
    pub variable: &'static str,
    pub value: String,
    pub reason: String,
}

/// Service-level configuration.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub network: NetworkTag,
    /// Explicit RPC endpoint; when unset the network default applies.
    pub rpc_url: Option<Url>,
    pub default_asset_id: String,
    /// Default pico-USD price per usage unit for per-unit rules.
    pub default_unit_price: PicoUsd,
    pub admin_dids: Vec<Did>,
    pub debug: bool,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        ServiceConfig {
            network: NetworkTag::Dev,
            rpc_url: None,
            default_asset_id: DEFAULT_ASSET_ID.into(),
            default_unit_price: DEFAULT_UNIT_PRICE,
            admin_dids: Vec::new(),
            debug: false,
        }
    }
}

impl ServiceConfig {
    /// Loads configuration from process environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|variable| std::env::var(variable).ok())
    }

    /// Loads configuration through an arbitrary lookup, which keeps parsing
    /// testable without mutating the process environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&'static str) -> Option<String>,
    {
        let mut config = ServiceConfig::default();

        if let Some(value) = lookup(ENV_NETWORK) {
            config.network = NetworkTag::from_str(&value).map_err(|e| ConfigError {
                variable: ENV_NETWORK,
                value,
                reason: e.to_string(),
            })?;
        }
        if let Some(value) = lookup(ENV_RPC_URL) {
            let url = Url::parse(&value).map_err(|e| ConfigError {
                variable: ENV_RPC_URL,
                value,
                reason: e.to_string(),
            })?;
            config.rpc_url = Some(url);
        }
        if let Some(value) = lookup(ENV_DEFAULT_ASSET_ID) {
            config.default_asset_id = value;
        }
        if let Some(value) = lookup(ENV_DEFAULT_UNIT_PRICE) {
            let price = value.parse::<u128>().map_err(|e| ConfigError {
                variable: ENV_DEFAULT_UNIT_PRICE,
                value,
                reason: e.to_string(),
            })?;
            config.default_unit_price = PicoUsd(price);
        }
        if let Some(value) = lookup(ENV_ADMIN_DIDS) {
            let mut admin_dids = Vec::new();
            for entry in value.split(',').map(str::trim).filter(|s| !s.is_empty()) {
                let did = Did::from_str(entry).map_err(|e| ConfigError {
                    variable: ENV_ADMIN_DIDS,
                    value: value.clone(),
                    reason: e.to_string(),
                })?;
                admin_dids.push(did);
            }
            config.admin_dids = admin_dids;
        }
        if let Some(value) = lookup(ENV_DEBUG) {
            config.debug = matches!(value.as_str(), "1" | "true" | "TRUE" | "True");
        }
        Ok(config)
    }

    /// The RPC endpoint to use: the explicit override, or the network
    /// default.
    pub fn rpc_url(&self) -> Url {
        self.rpc_url.clone().unwrap_or_else(|| self.network.node_url())
    }

    /// The processor configuration implied by this service configuration.
    pub fn processor_config(&self) -> ProcessorConfig {
        ProcessorConfig::new(self.network.chain_id(), self.default_asset_id.clone())
    }
}
