use std::sync::{Arc, Mutex, RwLock};

use async_trait::async_trait;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use super::{clamp_base_price, compute_budget, median, Estimator};
use crate::config::TxmConfig;
use crate::error::Error;
use crate::rpc::TxmClient;

/// Estimator that follows the market by polling recent blocks and taking the
/// median of the compute unit prices paid by their transactions.
///
/// `getRecentPrioritizationFees` is deliberately not used: it reports the
/// lowest prioritization fee of an included transaction, which is not
/// effective enough for increasing the chances of block inclusion.
pub struct BlockHistoryEstimator {
    client: Arc<dyn TxmClient>,
    cfg: TxmConfig,
    price: Arc<RwLock<u64>>,
    stop: CancellationToken,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl BlockHistoryEstimator {
    pub fn new(client: Arc<dyn TxmClient>, cfg: TxmConfig) -> Result<Self, Error> {
        cfg.validate()?;
        let price = Arc::new(RwLock::new(cfg.compute_unit_price_default));
        Ok(Self {
            client,
            cfg,
            price,
            stop: CancellationToken::new(),
            handle: Mutex::new(None),
        })
    }

    fn read_raw_price(&self) -> u64 {
        *self.price.read().expect("price lock poisoned")
    }
}

#[async_trait]
impl Estimator for BlockHistoryEstimator {
    async fn start(&self) -> Result<(), Error> {
        let mut handle = self.handle.lock().expect("handle lock poisoned");
        if handle.is_some() {
            return Ok(());
        }

        let client = Arc::clone(&self.client);
        let price = Arc::clone(&self.price);
        let stop = self.stop.clone();
        let period = self.cfg.block_history_poll_period();
        *handle = Some(tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = stop.cancelled() => return,
                    _ = tokio::time::sleep(period) => {
                        if let Err(e) = calculate_price(&client, &price).await {
                            error!("BlockHistoryEstimator failed to fetch price: {}", e);
                        }
                    }
                }
            }
        }));
        debug!("BlockHistoryEstimator: started");
        Ok(())
    }

    async fn close(&self) -> Result<(), Error> {
        self.stop.cancel();
        let handle = self.handle.lock().expect("handle lock poisoned").take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
        debug!("BlockHistoryEstimator: stopped");
        Ok(())
    }

    fn base_compute_unit_price(&self) -> u64 {
        clamp_base_price(self.read_raw_price(), &self.cfg)
    }
}

async fn calculate_price(
    client: &Arc<dyn TxmClient>,
    price: &Arc<RwLock<u64>>,
) -> Result<(), Error> {
    // latest block at the configured commitment
    let block = client.get_latest_block().await?;

    let mut fee_data = compute_budget::parse_block(&block);
    let value = median(&mut fee_data.prices)?;

    *price.write().expect("price lock poisoned") = value;
    debug!(
        compute_unit_price = value,
        blockhash = %block.blockhash,
        slot = block.parent_slot + 1,
        count = fee_data.prices.len(),
        "BlockHistoryEstimator: updated"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use solana_sdk::{
        hash::Hash,
        message::Message,
        pubkey::Pubkey,
        signature::Signature,
        system_instruction,
        transaction::{Transaction, VersionedTransaction},
    };

    use super::*;
    use crate::rpc::{Block, SimulationResult, TxStatus};

    struct BlockClient {
        prices: Vec<u64>,
    }

    #[async_trait]
    impl TxmClient for BlockClient {
        async fn send_tx(&self, _tx: &Transaction) -> Result<Signature, Error> {
            unimplemented!("not used in test")
        }

        async fn signature_statuses(
            &self,
            _sigs: &[Signature],
        ) -> Result<Vec<Option<TxStatus>>, Error> {
            unimplemented!("not used in test")
        }

        async fn simulate_tx(&self, _tx: &Transaction) -> Result<SimulationResult, Error> {
            unimplemented!("not used in test")
        }

        async fn get_latest_block(&self) -> Result<Block, Error> {
            let transactions = self
                .prices
                .iter()
                .map(|price| {
                    let payer = Pubkey::new_unique();
                    let to = Pubkey::new_unique();
                    let ix = system_instruction::transfer(&payer, &to, 1);
                    let mut message = Message::new(&[ix], Some(&payer));
                    compute_budget::set_compute_unit_price(&mut message, *price).unwrap();
                    VersionedTransaction::from(Transaction::new_unsigned(message))
                })
                .collect();
            Ok(Block {
                blockhash: Hash::new_unique(),
                parent_slot: 7,
                transactions,
            })
        }
    }

    fn estimator_with(prices: Vec<u64>, min: u64, max: u64) -> BlockHistoryEstimator {
        let cfg = TxmConfig {
            fee_estimator_mode: "blockhistory".to_string(),
            compute_unit_price_default: 1,
            compute_unit_price_min: min,
            compute_unit_price_max: max,
            ..TxmConfig::default()
        };
        BlockHistoryEstimator::new(Arc::new(BlockClient { prices }), cfg).unwrap()
    }

    #[tokio::test]
    async fn test_median_of_block_prices() {
        let estimator = estimator_with(vec![10, 20, 30, 40, 50], 0, 1_000);
        calculate_price(&estimator.client, &estimator.price)
            .await
            .unwrap();
        assert_eq!(estimator.base_compute_unit_price(), 30);
    }

    #[tokio::test]
    async fn test_price_clamped_on_read() {
        // raw median 30, floor 35
        let estimator = estimator_with(vec![10, 20, 30, 40, 50], 35, 1_000);
        calculate_price(&estimator.client, &estimator.price)
            .await
            .unwrap();
        assert_eq!(estimator.base_compute_unit_price(), 35);

        // raw median 30, ceiling 25
        let estimator = estimator_with(vec![10, 20, 30, 40, 50], 20, 25);
        calculate_price(&estimator.client, &estimator.price)
            .await
            .unwrap();
        assert_eq!(estimator.base_compute_unit_price(), 25);
    }

    #[tokio::test]
    async fn test_failed_tick_keeps_cached_price() {
        let estimator = estimator_with(vec![], 0, 1_000);
        // empty block -> median fails -> cached default untouched
        assert!(calculate_price(&estimator.client, &estimator.price)
            .await
            .is_err());
        assert_eq!(estimator.read_raw_price(), 1);
    }

    #[tokio::test]
    async fn test_start_is_idempotent_and_close_stops() {
        let estimator = estimator_with(vec![10, 20, 30], 0, 1_000);
        estimator.start().await.unwrap();
        estimator.start().await.unwrap();
        estimator.close().await.unwrap();
        // close after close is a no-op
        estimator.close().await.unwrap();
    }
}
