use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use solana_sdk::signature::Signature;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::error::Error;
use crate::metrics;

/// Terminal failure taxonomy, observable through metrics and logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxFailKind {
    /// Initial RPC submit refused the transaction; never inflight.
    Reject,
    /// Signature status reported a chain-level execution error.
    Revert,
    /// Confirmation timeout exceeded without reaching confirmed/finalized.
    Drop,
    /// Simulation returned an instruction error.
    SimRevert,
    /// Simulation returned an unrecognized error class.
    SimOther,
}

impl TxFailKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TxFailKind::Reject => "reject",
            TxFailKind::Revert => "revert",
            TxFailKind::Drop => "drop",
            TxFailKind::SimRevert => "sim_revert",
            TxFailKind::SimOther => "sim_other",
        }
    }
}

struct InflightEntry {
    signatures: Vec<Signature>,
    cancel: CancellationToken,
    broadcast_at: Instant,
}

#[derive(Default)]
struct State {
    txs: HashMap<Uuid, InflightEntry>,
    sig_to_id: HashMap<Signature, Uuid>,
}

/// Set of inflight submissions, keyed by id and by every signature ever
/// attached to them. Mutations are serialized behind the write lock; reads
/// may run concurrently. Terminal resolution cancels the stored token before
/// the entry is removed, so no retry task outlives its entry.
#[derive(Clone)]
pub(crate) struct InflightTxs {
    chain_id: Arc<str>,
    state: Arc<RwLock<State>>,
}

impl InflightTxs {
    pub fn new(chain_id: Arc<str>) -> Self {
        Self {
            chain_id,
            state: Arc::new(RwLock::new(State::default())),
        }
    }

    /// Register a new inflight submission under its first signature and
    /// cancellation handle, minting the submission id.
    pub fn register(&self, sig: Signature, cancel: CancellationToken) -> Result<Uuid, Error> {
        let mut state = self.state.write().expect("inflight lock poisoned");
        if state.sig_to_id.contains_key(&sig) {
            return Err(Error::SignatureExists(sig));
        }
        let id = Uuid::new_v4();
        state.sig_to_id.insert(sig, id);
        state.txs.insert(
            id,
            InflightEntry {
                signatures: vec![sig],
                cancel,
                broadcast_at: Instant::now(),
            },
        );
        metrics::record_tx_pending(&self.chain_id, state.txs.len());
        Ok(id)
    }

    /// Attach another signature (produced by a fee bump) to a submission.
    pub fn add(&self, id: Uuid, sig: Signature) -> Result<(), Error> {
        let mut state = self.state.write().expect("inflight lock poisoned");
        if state.sig_to_id.contains_key(&sig) {
            return Err(Error::SignatureExists(sig));
        }
        let entry = state.txs.get_mut(&id).ok_or(Error::UnknownId(id))?;
        entry.signatures.push(sig);
        state.sig_to_id.insert(sig, id);
        metrics::record_tx_pending(&self.chain_id, state.txs.len());
        Ok(())
    }

    /// Terminal success: cancel the retry task and drop the submission.
    /// Returns `None` if the signature is no longer (or was never) inflight.
    pub fn on_success(&self, sig: &Signature) -> Option<Uuid> {
        metrics::record_tx_success(&self.chain_id);
        self.resolve(sig)
    }

    /// Terminal failure with a taxonomy tag. Same removal semantics as
    /// [`on_success`]; the metric is recorded even for unknown signatures so
    /// rejected initial broadcasts are counted.
    pub fn on_error(&self, sig: &Signature, kind: TxFailKind) -> Option<Uuid> {
        metrics::record_tx_error(&self.chain_id, kind.as_str());
        self.resolve(sig)
    }

    fn resolve(&self, sig: &Signature) -> Option<Uuid> {
        let mut state = self.state.write().expect("inflight lock poisoned");
        let id = state.sig_to_id.get(sig).copied()?;

        // cancel before removal so a concurrent snapshot may still observe
        // the signatures but never a live retry task past removal
        if let Some(entry) = state.txs.get(&id) {
            entry.cancel.cancel();
        }
        if let Some(entry) = state.txs.remove(&id) {
            for sig in &entry.signatures {
                state.sig_to_id.remove(sig);
            }
        }
        metrics::record_tx_pending(&self.chain_id, state.txs.len());
        Some(id)
    }

    /// Whether wall-clock time since the submission's first broadcast
    /// exceeds `timeout`. Unknown signatures are never expired.
    pub fn expired(&self, sig: &Signature, timeout: Duration) -> bool {
        let state = self.state.read().expect("inflight lock poisoned");
        let Some(id) = state.sig_to_id.get(sig) else {
            return false;
        };
        let Some(entry) = state.txs.get(id) else {
            return false;
        };
        entry.broadcast_at.elapsed() > timeout
    }

    /// Snapshot of every signature of every inflight submission.
    pub fn list_all(&self) -> Vec<Signature> {
        let state = self.state.read().expect("inflight lock poisoned");
        state.sig_to_id.keys().copied().collect()
    }

    pub fn count(&self) -> usize {
        let state = self.state.read().expect("inflight lock poisoned");
        state.txs.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sig(byte: u8) -> Signature {
        Signature::from([byte; 64])
    }

    fn inflight() -> InflightTxs {
        InflightTxs::new(Arc::from("testnet"))
    }

    #[tokio::test]
    async fn test_register_and_resolve_success() {
        let txs = inflight();
        let cancel = CancellationToken::new();
        let id = txs.register(sig(1), cancel.clone()).unwrap();

        txs.add(id, sig(2)).unwrap();
        assert_eq!(txs.count(), 1);
        let mut all = txs.list_all();
        all.sort();
        assert_eq!(all.len(), 2);

        // success via any attached signature resolves the submission
        assert_eq!(txs.on_success(&sig(2)), Some(id));
        assert!(cancel.is_cancelled());
        assert_eq!(txs.count(), 0);
        assert!(txs.list_all().is_empty());

        // second resolution is a no-op
        assert_eq!(txs.on_success(&sig(2)), None);
        assert_eq!(txs.on_error(&sig(1), TxFailKind::Revert), None);
    }

    #[tokio::test]
    async fn test_duplicate_signature_rejected() {
        let txs = inflight();
        let id = txs.register(sig(1), CancellationToken::new()).unwrap();
        assert!(matches!(
            txs.register(sig(1), CancellationToken::new()),
            Err(Error::SignatureExists(_))
        ));
        assert!(matches!(
            txs.add(id, sig(1)),
            Err(Error::SignatureExists(_))
        ));
        assert!(matches!(
            txs.add(Uuid::new_v4(), sig(2)),
            Err(Error::UnknownId(_))
        ));
    }

    #[tokio::test]
    async fn test_on_error_cancels_and_removes() {
        let txs = inflight();
        let cancel = CancellationToken::new();
        let id = txs.register(sig(1), cancel.clone()).unwrap();

        assert_eq!(txs.on_error(&sig(1), TxFailKind::SimRevert), Some(id));
        assert!(cancel.is_cancelled());
        assert_eq!(txs.count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired() {
        let txs = inflight();
        txs.register(sig(1), CancellationToken::new()).unwrap();

        let timeout = Duration::from_secs(30);
        assert!(!txs.expired(&sig(1), timeout));

        tokio::time::advance(Duration::from_secs(31)).await;
        assert!(txs.expired(&sig(1), timeout));

        // unknown signatures never expire
        assert!(!txs.expired(&sig(9), timeout));
    }
}
