pub mod block_history;
pub mod compute_budget;
pub mod fixed;

use std::sync::Arc;

use async_trait::async_trait;
use tracing::warn;

use crate::config::TxmConfig;
use crate::error::Error;
use crate::rpc::TxmClient;

/// Provider of the base compute unit price used when building transactions.
#[async_trait]
pub trait Estimator: Send + Sync {
    async fn start(&self) -> Result<(), Error>;
    async fn close(&self) -> Result<(), Error>;
    fn base_compute_unit_price(&self) -> u64;
}

/// Select an estimator from the configured mode (case-insensitive).
pub fn create_estimator(
    client: Arc<dyn TxmClient>,
    cfg: &TxmConfig,
) -> Result<Arc<dyn Estimator>, Error> {
    match cfg.fee_estimator_mode.to_lowercase().as_str() {
        "fixed" => Ok(Arc::new(fixed::FixedPriceEstimator::new(cfg.clone())?)),
        "blockhistory" => Ok(Arc::new(block_history::BlockHistoryEstimator::new(
            client,
            cfg.clone(),
        )?)),
        mode => Err(Error::Config(format!(
            "unknown solana fee estimator type: {}",
            mode
        ))),
    }
}

/// Compute unit price for retry attempt `count`. The schedule doubles the
/// base price per bump, saturating at `max`; the result is always within
/// `[min, max]`. `count = 0` is the initial attempt and returns the base.
pub fn calculate_fee(base: u64, max: u64, min: u64, count: u32) -> u64 {
    let fee = if count >= 64 {
        max
    } else {
        base.checked_mul(1u64 << count).unwrap_or(max)
    };
    fee.max(min).min(max)
}

/// Median of the sample set, breaking even-length ties toward the lower half.
pub fn median(samples: &mut [u64]) -> Result<u64, Error> {
    if samples.is_empty() {
        return Err(Error::EmptyFeeSamples);
    }
    samples.sort_unstable();
    Ok(samples[(samples.len() - 1) / 2])
}

/// Clamp a raw cached price to the configured bounds, warning when the
/// estimate falls outside them.
pub(crate) fn clamp_base_price(raw: u64, cfg: &TxmConfig) -> u64 {
    let min = cfg.compute_unit_price_min;
    let max = cfg.compute_unit_price_max;
    if raw >= min && raw <= max {
        return raw;
    }

    if raw < min {
        warn!(
            min,
            calculated = raw,
            "estimation below minimum, consider lowering compute_unit_price_min"
        );
        return min;
    }

    warn!(
        max,
        calculated = raw,
        "estimation above maximum, consider increasing compute_unit_price_max"
    );
    max
}
