pub mod client;

use async_trait::async_trait;
use solana_sdk::{
    hash::Hash,
    signature::Signature,
    transaction::{Transaction, TransactionError, VersionedTransaction},
};

use crate::error::Error;

/// Chain-reported stage for a signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfirmationStatus {
    Processed,
    Confirmed,
    Finalized,
}

/// One entry of a `signature_statuses` response. `None` in the response
/// vector means the chain has not seen the signature at all.
#[derive(Debug, Clone)]
pub struct TxStatus {
    pub slot: u64,
    pub err: Option<TransactionError>,
    pub confirmation_status: Option<ConfirmationStatus>,
}

/// Result of a preflight simulation.
#[derive(Debug, Clone, Default)]
pub struct SimulationResult {
    pub err: Option<TransactionError>,
    pub units_consumed: Option<u64>,
}

/// Latest block as fetched at the configured commitment, with its
/// transactions decoded for fee parsing.
#[derive(Debug, Clone)]
pub struct Block {
    pub blockhash: Hash,
    pub parent_slot: u64,
    pub transactions: Vec<VersionedTransaction>,
}

/// The injected RPC capability the transaction manager runs against.
#[async_trait]
pub trait TxmClient: Send + Sync {
    /// Submit an encoded transaction and return its chain signature.
    async fn send_tx(&self, tx: &Transaction) -> Result<Signature, Error>;

    /// Batch signature status lookup. The result vector is parallel to the
    /// input; entries are `None` for signatures the chain does not know.
    async fn signature_statuses(
        &self,
        sigs: &[Signature],
    ) -> Result<Vec<Option<TxStatus>>, Error>;

    /// Simulate a transaction without signature verification.
    async fn simulate_tx(&self, tx: &Transaction) -> Result<SimulationResult, Error>;

    /// Fetch the latest block at the configured commitment.
    async fn get_latest_block(&self) -> Result<Block, Error>;
}
