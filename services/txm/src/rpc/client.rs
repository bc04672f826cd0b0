use std::str::FromStr;

use async_trait::async_trait;
use solana_client::nonblocking::rpc_client::RpcClient;
use solana_client::rpc_config::{
    RpcBlockConfig, RpcSendTransactionConfig, RpcSimulateTransactionConfig,
};
use solana_sdk::{
    commitment_config::{CommitmentConfig, CommitmentLevel},
    hash::Hash,
    signature::Signature,
    transaction::Transaction,
};
use solana_transaction_status::{
    TransactionConfirmationStatus, TransactionDetails, UiTransactionEncoding,
};
use tracing::info;

use super::{Block, ConfirmationStatus, SimulationResult, TxStatus, TxmClient};
use crate::config::TxmConfig;
use crate::error::Error;

pub struct RpcTxmClient {
    client: RpcClient,
    commitment: CommitmentConfig,
}

impl RpcTxmClient {
    pub async fn new(config: &TxmConfig) -> Result<Self, Error> {
        info!("Connecting to Solana RPC: {}", config.rpc_url);

        let commitment = match config.commitment.as_str() {
            "processed" => CommitmentConfig::processed(),
            "confirmed" => CommitmentConfig::confirmed(),
            "finalized" => CommitmentConfig::finalized(),
            _ => CommitmentConfig::confirmed(),
        };

        let client = RpcClient::new_with_commitment(config.rpc_url.clone(), commitment);

        // Test connection
        match client.get_version().await {
            Ok(version) => {
                info!("Connected to Solana RPC, version: {}", version.solana_core);
            }
            Err(e) => {
                return Err(Error::Rpc(format!(
                    "Failed to connect to Solana RPC: {}",
                    e
                )));
            }
        }

        Ok(Self { client, commitment })
    }
}

#[async_trait]
impl TxmClient for RpcTxmClient {
    async fn send_tx(&self, tx: &Transaction) -> Result<Signature, Error> {
        let cfg = RpcSendTransactionConfig {
            skip_preflight: true,
            preflight_commitment: Some(CommitmentLevel::Processed),
            ..Default::default()
        };
        self.client
            .send_transaction_with_config(tx, cfg)
            .await
            .map_err(|e| Error::Rpc(e.to_string()))
    }

    async fn signature_statuses(
        &self,
        sigs: &[Signature],
    ) -> Result<Vec<Option<TxStatus>>, Error> {
        let response = self
            .client
            .get_signature_statuses(sigs)
            .await
            .map_err(|e| Error::Rpc(e.to_string()))?;

        Ok(response
            .value
            .into_iter()
            .map(|status| {
                status.map(|s| TxStatus {
                    slot: s.slot,
                    err: s.err,
                    confirmation_status: s.confirmation_status.map(|c| match c {
                        TransactionConfirmationStatus::Processed => ConfirmationStatus::Processed,
                        TransactionConfirmationStatus::Confirmed => ConfirmationStatus::Confirmed,
                        TransactionConfirmationStatus::Finalized => ConfirmationStatus::Finalized,
                    }),
                })
            })
            .collect())
    }

    async fn simulate_tx(&self, tx: &Transaction) -> Result<SimulationResult, Error> {
        let cfg = RpcSimulateTransactionConfig {
            sig_verify: false,
            ..Default::default()
        };
        let response = self
            .client
            .simulate_transaction_with_config(tx, cfg)
            .await
            .map_err(|e| Error::Rpc(e.to_string()))?;

        Ok(SimulationResult {
            err: response.value.err,
            units_consumed: response.value.units_consumed,
        })
    }

    async fn get_latest_block(&self) -> Result<Block, Error> {
        let slot = self
            .client
            .get_slot_with_commitment(self.commitment)
            .await
            .map_err(|e| Error::Rpc(e.to_string()))?;

        let cfg = RpcBlockConfig {
            encoding: Some(UiTransactionEncoding::Base64),
            transaction_details: Some(TransactionDetails::Full),
            rewards: Some(false),
            commitment: Some(self.commitment),
            max_supported_transaction_version: Some(0),
        };
        let block = self
            .client
            .get_block_with_config(slot, cfg)
            .await
            .map_err(|e| Error::Rpc(e.to_string()))?;

        let blockhash = Hash::from_str(&block.blockhash)
            .map_err(|e| Error::Rpc(format!("invalid blockhash in block response: {}", e)))?;

        let transactions = block
            .transactions
            .unwrap_or_default()
            .into_iter()
            .filter_map(|tx| tx.transaction.decode())
            .collect();

        Ok(Block {
            blockhash,
            parent_slot: block.parent_slot,
            transactions,
        })
    }
}
