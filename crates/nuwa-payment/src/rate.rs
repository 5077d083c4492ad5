//! The asset/USD rate-provider port.
//!
//! Rates are expressed in pico-USD per asset base unit. The processor
//! prefetches the rate during `pre_process` so that settlement stays
//! synchronous. Providers are shared and must be safe for concurrent calls.

use async_trait::async_trait;
use std::collections::HashMap;

use nuwa_types::amount::PicoUsd;

/// No rate could be produced for the asset.
#[derive(Debug, thiserror::Error)]
#[error("no rate available for asset {asset_id}: {reason}")]
pub struct RateError {
    pub asset_id: String,
    pub reason: String,
}

/// Supplies pico-USD-per-base-unit rates by asset id.
#[async_trait]
pub trait RateProvider: Send + Sync {
    async fn rate(&self, asset_id: &str) -> Result<PicoUsd, RateError>;
}

/// A static rate table, used in tests and fixed-price deployments.
#[derive(Debug, Clone, Default)]
pub struct FixedRateProvider {
    rates: HashMap<String, PicoUsd>,
}

impl FixedRateProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rate(mut self, asset_id: impl Into<String>, rate: PicoUsd) -> Self {
        self.rates.insert(asset_id.into(), rate);
        self
    }
}

#[async_trait]
impl RateProvider for FixedRateProvider {
    async fn rate(&self, asset_id: &str) -> Result<PicoUsd, RateError> {
        self.rates
            .get(asset_id)
            .copied()
            .ok_or_else(|| RateError {
                asset_id: asset_id.into(),
                reason: "asset not in rate table".into(),
            })
    }
}
