use async_trait::async_trait;

use super::{clamp_base_price, Estimator};
use crate::config::TxmConfig;
use crate::error::Error;

/// Estimator that always returns the configured default price.
pub struct FixedPriceEstimator {
    cfg: TxmConfig,
}

impl FixedPriceEstimator {
    pub fn new(cfg: TxmConfig) -> Result<Self, Error> {
        cfg.validate()?;
        Ok(Self { cfg })
    }
}

#[async_trait]
impl Estimator for FixedPriceEstimator {
    async fn start(&self) -> Result<(), Error> {
        Ok(())
    }

    async fn close(&self) -> Result<(), Error> {
        Ok(())
    }

    fn base_compute_unit_price(&self) -> u64 {
        clamp_base_price(self.cfg.compute_unit_price_default, &self.cfg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_price_is_clamped() {
        let cfg = TxmConfig {
            compute_unit_price_default: 100,
            compute_unit_price_min: 0,
            compute_unit_price_max: 1_000,
            ..TxmConfig::default()
        };
        let estimator = FixedPriceEstimator::new(cfg).unwrap();
        assert_eq!(estimator.base_compute_unit_price(), 100);

        let cfg = TxmConfig {
            compute_unit_price_default: 100,
            compute_unit_price_min: 200,
            compute_unit_price_max: 1_000,
            ..TxmConfig::default()
        };
        let estimator = FixedPriceEstimator::new(cfg).unwrap();
        assert_eq!(estimator.base_compute_unit_price(), 200);
    }
}
