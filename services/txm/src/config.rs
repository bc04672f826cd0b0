use std::time::Duration;

use serde::Deserialize;

use crate::error::Error;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub txm: TxmConfig,
}

/// Chain-level transaction manager settings. A snapshot of the relevant
/// fields is taken per submission at enqueue time (see `TxConfig`).
#[derive(Debug, Deserialize, Clone)]
pub struct TxmConfig {
    pub chain_id: String,
    pub rpc_url: String,
    pub commitment: String,

    // fee estimation
    pub fee_estimator_mode: String,
    pub compute_unit_price_default: u64,
    pub compute_unit_price_min: u64,
    pub compute_unit_price_max: u64,
    pub compute_unit_limit_default: u32,
    pub estimate_compute_unit_limit: bool,

    // poll periods and timeouts
    pub block_history_poll_period_secs: u64,
    pub confirm_poll_period_ms: u64,
    pub tx_retry_timeout_secs: u64,
    pub tx_confirm_timeout_secs: u64,
    pub fee_bump_period_secs: u64,
}

impl TxmConfig {
    pub fn block_history_poll_period(&self) -> Duration {
        Duration::from_secs(self.block_history_poll_period_secs)
    }

    pub fn confirm_poll_period(&self) -> Duration {
        Duration::from_millis(self.confirm_poll_period_ms)
    }

    pub fn tx_retry_timeout(&self) -> Duration {
        Duration::from_secs(self.tx_retry_timeout_secs)
    }

    pub fn tx_confirm_timeout(&self) -> Duration {
        Duration::from_secs(self.tx_confirm_timeout_secs)
    }

    pub fn fee_bump_period(&self) -> Duration {
        Duration::from_secs(self.fee_bump_period_secs)
    }

    pub fn validate(&self) -> Result<(), Error> {
        if self.compute_unit_price_min > self.compute_unit_price_max {
            return Err(Error::Config(format!(
                "compute_unit_price_min ({}) greater than compute_unit_price_max ({})",
                self.compute_unit_price_min, self.compute_unit_price_max
            )));
        }
        Ok(())
    }
}

impl Default for TxmConfig {
    fn default() -> Self {
        Self {
            chain_id: "localnet".to_string(),
            rpc_url: "http://localhost:8899".to_string(),
            commitment: "confirmed".to_string(),
            fee_estimator_mode: "fixed".to_string(),
            compute_unit_price_default: 0,
            compute_unit_price_min: 0,
            compute_unit_price_max: 1_000,
            compute_unit_limit_default: 200_000,
            estimate_compute_unit_limit: false,
            block_history_poll_period_secs: 5,
            confirm_poll_period_ms: 500,
            tx_retry_timeout_secs: 10,
            tx_confirm_timeout_secs: 30,
            fee_bump_period_secs: 3,
        }
    }
}

impl Config {
    /// Load configuration from `TXM__`-prefixed environment variables over
    /// built-in defaults. A `.env` file is honored if present.
    pub fn load() -> anyhow::Result<Self> {
        let _ = dotenvy::dotenv();

        let settings = config::Config::builder()
            .set_default("txm.chain_id", "localnet")?
            .set_default("txm.rpc_url", "http://localhost:8899")?
            .set_default("txm.commitment", "confirmed")?
            .set_default("txm.fee_estimator_mode", "fixed")?
            .set_default("txm.compute_unit_price_default", 0u64)?
            .set_default("txm.compute_unit_price_min", 0u64)?
            .set_default("txm.compute_unit_price_max", 1_000u64)?
            .set_default("txm.compute_unit_limit_default", 200_000u32)?
            .set_default("txm.estimate_compute_unit_limit", false)?
            .set_default("txm.block_history_poll_period_secs", 5u64)?
            .set_default("txm.confirm_poll_period_ms", 500u64)?
            .set_default("txm.tx_retry_timeout_secs", 10u64)?
            .set_default("txm.tx_confirm_timeout_secs", 30u64)?
            .set_default("txm.fee_bump_period_secs", 3u64)?
            .add_source(
                config::Environment::with_prefix("TXM")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config = settings.try_deserialize::<Self>()?;
        config.txm.validate()?;

        Ok(config)
    }
}
