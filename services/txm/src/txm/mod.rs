pub mod inflight;
mod sig_list;

use std::sync::{Arc, Mutex, OnceLock};
use std::time::Duration;

use solana_sdk::{
    pubkey::Pubkey,
    signature::Signature,
    transaction::{Transaction, TransactionError},
};
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::TxmConfig;
use crate::error::Error;
use crate::fees::{self, compute_budget, Estimator};
use crate::keystore::SimpleKeystore;
use crate::rpc::{ConfirmationStatus, SimulationResult, TxStatus, TxmClient};
use inflight::{InflightTxs, TxFailKind};
use sig_list::SignatureList;

/// Queue capacity for the send and simulate channels.
pub const MAX_QUEUE_LEN: usize = 1000;
/// Max number of signatures per `signature_statuses` call (chain-side limit).
pub const MAX_SIGS_TO_CONFIRM: usize = 256;
/// Exponential retry tapers to one rebroadcast every 250ms.
const MAX_RETRY_DELAY: Duration = Duration::from_millis(250);
/// Percent buffer added on top of estimated compute unit limits to account
/// for variance between simulation and execution.
const COMPUTE_UNIT_LIMIT_BUFFER_PCT: u64 = 10;

/// Per-submission configuration, snapshotted from chain defaults at enqueue
/// and immutable for the life of the submission.
#[derive(Debug, Clone)]
pub struct TxConfig {
    /// Upper bound on the whole rebroadcast lifetime.
    pub timeout: Duration,
    /// How often to bump the compute unit price; zero disables bumping.
    pub fee_bump_period: Duration,
    pub base_compute_unit_price: u64,
    pub compute_unit_price_min: u64,
    pub compute_unit_price_max: u64,
    /// Size the compute unit limit from a preflight simulation.
    pub estimate_compute_unit_limit: bool,
    /// Zero omits the set-limit instruction entirely.
    pub compute_unit_limit: u32,
}

/// Caller overrides applied on top of the snapshotted defaults.
#[derive(Debug, Clone, Default)]
pub struct TxOpts {
    pub timeout: Option<Duration>,
    pub fee_bump_period: Option<Duration>,
    pub base_compute_unit_price: Option<u64>,
    pub compute_unit_price_min: Option<u64>,
    pub compute_unit_price_max: Option<u64>,
    pub estimate_compute_unit_limit: Option<bool>,
    pub compute_unit_limit: Option<u32>,
}

impl TxOpts {
    fn apply(self, cfg: &mut TxConfig) {
        if let Some(v) = self.timeout {
            cfg.timeout = v;
        }
        if let Some(v) = self.fee_bump_period {
            cfg.fee_bump_period = v;
        }
        if let Some(v) = self.base_compute_unit_price {
            cfg.base_compute_unit_price = v;
        }
        if let Some(v) = self.compute_unit_price_min {
            cfg.compute_unit_price_min = v;
        }
        if let Some(v) = self.compute_unit_price_max {
            cfg.compute_unit_price_max = v;
        }
        if let Some(v) = self.estimate_compute_unit_limit {
            cfg.estimate_compute_unit_limit = v;
        }
        if let Some(v) = self.compute_unit_limit {
            cfg.compute_unit_limit = v;
        }
    }
}

#[derive(Debug, Clone)]
struct PendingTx {
    tx: Transaction,
    cfg: TxConfig,
    signature: Signature,
    id: Uuid,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ServiceState {
    Unstarted,
    Started,
    Stopped,
}

/// Transaction manager for the Solana chain: accepts signed-but-unfinalized
/// payloads, drives them to confirmation with rebroadcasts and fee bumps,
/// and resolves each submission to success, revert or drop.
///
/// State is process-local; nothing survives a restart. Uses simulation, so
/// it should only send transactions to trusted programs.
#[derive(Clone)]
pub struct Txm {
    chain_id: Arc<str>,
    cfg: TxmConfig,
    client: Arc<dyn TxmClient>,
    ks: Arc<dyn SimpleKeystore>,
    txs: InflightTxs,
    fee: Arc<OnceLock<Arc<dyn Estimator>>>,
    state: Arc<Mutex<ServiceState>>,
    ch_send: mpsc::Sender<PendingTx>,
    ch_send_rx: Arc<Mutex<Option<mpsc::Receiver<PendingTx>>>>,
    ch_sim: mpsc::Sender<PendingTx>,
    ch_sim_rx: Arc<Mutex<Option<mpsc::Receiver<PendingTx>>>>,
    stop: CancellationToken,
    tasks: TaskTracker,
}

impl Txm {
    pub fn new(
        cfg: TxmConfig,
        client: Arc<dyn TxmClient>,
        ks: Arc<dyn SimpleKeystore>,
    ) -> Self {
        let (ch_send, ch_send_rx) = mpsc::channel(MAX_QUEUE_LEN);
        let (ch_sim, ch_sim_rx) = mpsc::channel(MAX_QUEUE_LEN);
        let chain_id: Arc<str> = cfg.chain_id.clone().into();
        Self {
            txs: InflightTxs::new(Arc::clone(&chain_id)),
            chain_id,
            cfg,
            client,
            ks,
            fee: Arc::new(OnceLock::new()),
            state: Arc::new(Mutex::new(ServiceState::Unstarted)),
            ch_send,
            ch_send_rx: Arc::new(Mutex::new(Some(ch_send_rx))),
            ch_sim,
            ch_sim_rx: Arc::new(Mutex::new(Some(ch_sim_rx))),
            stop: CancellationToken::new(),
            tasks: TaskTracker::new(),
        }
    }

    /// Select and start the fee estimator, then spawn the dispatcher,
    /// confirmer and simulator tasks.
    pub async fn start(&self) -> Result<(), Error> {
        {
            let mut state = self.state.lock().expect("state lock poisoned");
            if *state != ServiceState::Unstarted {
                return Err(Error::AlreadyStarted);
            }
            *state = ServiceState::Started;
        }

        let estimator = match fees::create_estimator(Arc::clone(&self.client), &self.cfg) {
            Ok(estimator) => estimator,
            Err(e) => {
                *self.state.lock().expect("state lock poisoned") = ServiceState::Unstarted;
                return Err(e);
            }
        };
        if let Err(e) = estimator.start().await {
            *self.state.lock().expect("state lock poisoned") = ServiceState::Unstarted;
            return Err(e);
        }
        let _ = self.fee.set(estimator);

        let send_rx = self
            .ch_send_rx
            .lock()
            .expect("send receiver lock poisoned")
            .take()
            .ok_or(Error::AlreadyStarted)?;
        let sim_rx = self
            .ch_sim_rx
            .lock()
            .expect("sim receiver lock poisoned")
            .take()
            .ok_or(Error::AlreadyStarted)?;

        self.tasks.spawn(self.clone().run_dispatcher(send_rx));
        self.tasks.spawn(self.clone().run_confirmer());
        self.tasks.spawn(self.clone().run_simulator(sim_rx));

        info!(chain_id = %self.chain_id, "Txm started");
        Ok(())
    }

    /// Stop all long-lived tasks and any per-submission rebroadcast tasks,
    /// wait for them, then close the estimator. Calling `close` again after
    /// it returned is a no-op.
    pub async fn close(&self) -> Result<(), Error> {
        {
            let mut state = self.state.lock().expect("state lock poisoned");
            if *state != ServiceState::Started {
                return Ok(());
            }
            *state = ServiceState::Stopped;
        }

        self.stop.cancel();
        self.tasks.close();
        self.tasks.wait().await;

        if let Some(fee) = self.fee.get() {
            fee.close().await?;
        }
        info!(chain_id = %self.chain_id, "Txm stopped");
        Ok(())
    }

    fn ready(&self) -> Result<(), Error> {
        let state = self.state.lock().expect("state lock poisoned");
        if *state != ServiceState::Started {
            return Err(Error::NotStarted);
        }
        Ok(())
    }

    /// Number of submissions currently awaiting terminal resolution.
    pub fn inflight_txs(&self) -> usize {
        self.txs.count()
    }

    /// Queue a transaction destined for the chain. Validation, default
    /// config snapshotting and optional compute-unit-limit estimation run
    /// synchronously; everything after the queue handoff is observable only
    /// through metrics and logs.
    pub async fn enqueue(
        &self,
        account_id: &str,
        tx: Transaction,
        opts: Option<TxOpts>,
    ) -> Result<(), Error> {
        self.ready()?;

        if tx.message.account_keys.is_empty() {
            return Err(Error::InvalidTransaction(
                "not enough account keys in tx".to_string(),
            ));
        }

        // fee payer is the account at index 0
        let key = tx.message.account_keys[0];
        if !self.ks.has_account(&key).await? {
            return Err(Error::Keystore(format!(
                "keystore has no key for fee payer {}",
                key
            )));
        }

        let mut cfg = self.default_tx_config();
        if let Some(opts) = opts {
            opts.apply(&mut cfg);
        }

        if cfg.estimate_compute_unit_limit {
            let limit = self.estimate_compute_unit_limit(&tx).await?;
            // zero means estimation had nothing usable; keep the configured limit
            if limit != 0 {
                cfg.compute_unit_limit = limit;
            }
        }

        let msg = PendingTx {
            tx,
            cfg,
            signature: Signature::default(),
            id: Uuid::nil(),
        };
        self.ch_send.try_send(msg).map_err(|e| {
            error!(
                queue_full = matches!(e, mpsc::error::TrySendError::Full(_)),
                "failed to enqueue tx"
            );
            Error::QueueFull(account_id.to_string())
        })
    }

    fn default_tx_config(&self) -> TxConfig {
        let base = self
            .fee
            .get()
            .map(|fee| fee.base_compute_unit_price())
            .unwrap_or(self.cfg.compute_unit_price_default);
        TxConfig {
            timeout: self.cfg.tx_retry_timeout(),
            fee_bump_period: self.cfg.fee_bump_period(),
            base_compute_unit_price: base,
            compute_unit_price_min: self.cfg.compute_unit_price_min,
            compute_unit_price_max: self.cfg.compute_unit_price_max,
            estimate_compute_unit_limit: self.cfg.estimate_compute_unit_limit,
            compute_unit_limit: self.cfg.compute_unit_limit_default,
        }
    }

    /// Simulate the transaction to size its compute unit limit, with a
    /// percentage buffer on top. Returns zero (caller falls back to the
    /// configured limit) when simulation yields no usable consumption value.
    pub async fn estimate_compute_unit_limit(&self, tx: &Transaction) -> Result<u32, Error> {
        let res = self.simulate_tx(tx).await?;

        // bail out instead of broadcasting a tx destined to fail
        if res.err.is_some() {
            let sig = tx.signatures.first().copied().unwrap_or_default();
            self.process_simulation_error(None, sig, &res);
            return Err(Error::Simulation(format!(
                "simulated tx returned error: {:?}",
                res.err
            )));
        }

        let units = match res.units_consumed {
            Some(units) if units > 0 => units,
            _ => {
                debug!("failed to get units consumed for tx");
                return Ok(0);
            }
        };

        let buffered = add_percentage(units, COMPUTE_UNIT_LIMIT_BUFFER_PCT);
        if buffered > u32::MAX as u128 {
            debug!(
                units_consumed = units,
                "compute units used with buffer greater than u32 max"
            );
            return Ok(0);
        }
        Ok(buffered as u32)
    }

    async fn run_dispatcher(self, mut rx: mpsc::Receiver<PendingTx>) {
        loop {
            tokio::select! {
                _ = self.stop.cancelled() => return,
                msg = rx.recv() => {
                    let Some(msg) = msg else { return };
                    let msg = match self.send_with_retry(msg).await {
                        Ok(msg) => msg,
                        Err(e) => {
                            error!("failed to send transaction: {}", e);
                            continue;
                        }
                    };

                    let signature = msg.signature;
                    let id = msg.id;

                    // hand the sent tx to the simulation queue
                    if let Err(e) = self.ch_sim.try_send(msg) {
                        warn!(
                            queue_full = matches!(e, mpsc::error::TrySendError::Full(_)),
                            "failed to enqueue tx for simulation"
                        );
                    }

                    debug!(signature = %signature, id = %id, "transaction sent");
                }
            }
        }
    }

    /// Build and broadcast the initial transaction synchronously, then hand
    /// rebroadcasting off to a per-submission task bounded by the timeout.
    async fn send_with_retry(&self, msg: PendingTx) -> Result<PendingTx, Error> {
        let txcfg = msg.cfg;
        let mut base_tx = msg.tx;

        let key = *base_tx.message.account_keys.first().ok_or_else(|| {
            Error::InvalidTransaction("not enough account keys in tx".to_string())
        })?;

        // the compute unit limit is static for the life of the submission,
        // so it is set once on the base message every attempt inherits
        if txcfg.compute_unit_limit != 0 {
            compute_budget::set_compute_unit_limit(&mut base_tx.message, txcfg.compute_unit_limit)?;
        }

        let init_tx = self.build_tx(&base_tx, &key, &txcfg, 0).await?;

        let cancel = self.stop.child_token();
        let deadline = Instant::now() + txcfg.timeout;

        // initial broadcast: no retry, exit early if it fails
        let sig = match tokio::time::timeout_at(deadline, self.client.send_tx(&init_tx)).await {
            Ok(Ok(sig)) => sig,
            Ok(Err(e)) => {
                cancel.cancel();
                self.txs.on_error(&Signature::default(), TxFailKind::Reject);
                return Err(Error::Rpc(format!("tx failed initial transmit: {}", e)));
            }
            Err(_) => {
                cancel.cancel();
                self.txs.on_error(&Signature::default(), TxFailKind::Reject);
                return Err(Error::Rpc(
                    "tx failed initial transmit: timed out".to_string(),
                ));
            }
        };

        let id = match self.txs.register(sig, cancel.clone()) {
            Ok(id) => id,
            Err(e) => {
                cancel.cancel();
                return Err(e);
            }
        };

        let sigs = SignatureList::new();
        sigs.allocate();
        sigs.set(0, sig)?;

        debug!(id = %id, signature = %sig, "tx initial broadcast");

        self.tasks.spawn(self.clone().run_rebroadcast(
            base_tx,
            init_tx.clone(),
            txcfg.clone(),
            id,
            key,
            sigs,
            cancel,
            deadline,
        ));

        Ok(PendingTx {
            tx: init_tx,
            cfg: txcfg,
            signature: sig,
            id,
        })
    }

    /// Copy the base message, set the (possibly bumped) compute unit price,
    /// and sign. Deterministic in the base message and retry count.
    async fn build_tx(
        &self,
        base: &Transaction,
        key: &Pubkey,
        txcfg: &TxConfig,
        retry_count: u32,
    ) -> Result<Transaction, Error> {
        let mut new_tx = base.clone();

        // the base price was snapshotted at enqueue, so bumps never chase a
        // moving base from the estimator
        let fee = fees::calculate_fee(
            txcfg.base_compute_unit_price,
            txcfg.compute_unit_price_max,
            txcfg.compute_unit_price_min,
            retry_count,
        );
        compute_budget::set_compute_unit_price(&mut new_tx.message, fee)?;

        let msg_bytes = new_tx.message.serialize();
        let sig_bytes = self.ks.sign(key, &msg_bytes).await?;
        new_tx.signatures.push(Signature::from(sig_bytes));

        Ok(new_tx)
    }

    /// Rebroadcast with exponential backoff until the submission context is
    /// cancelled by terminal resolution or by the retry timeout. Ending the
    /// retry window does not stop confirmation polling for the submission.
    #[allow(clippy::too_many_arguments)]
    async fn run_rebroadcast(
        self,
        base_tx: Transaction,
        mut current_tx: Transaction,
        txcfg: TxConfig,
        id: Uuid,
        key: Pubkey,
        sigs: SignatureList,
        cancel: CancellationToken,
        deadline: Instant,
    ) {
        let mut delta_t = Duration::from_millis(1);
        let mut next_tick = Instant::now();
        let mut bump_count: usize = 0;
        let mut bump_time = Instant::now();
        let subtasks = TaskTracker::new();

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep_until(deadline) => {
                    cancel.cancel();
                    break;
                }
                _ = tokio::time::sleep_until(next_tick) => {
                    let should_bump = !txcfg.fee_bump_period.is_zero()
                        && bump_time.elapsed() > txcfg.fee_bump_period;

                    if should_bump {
                        bump_count += 1;
                        bump_time = Instant::now();
                        current_tx = match self.build_tx(&base_tx, &key, &txcfg, bump_count as u32).await {
                            Ok(tx) => tx,
                            Err(e) => {
                                error!(id = %id, "failed to build bumped retry tx: {}", e);
                                break;
                            }
                        };
                        let index = sigs.allocate();
                        if index != bump_count {
                            error!(
                                index,
                                bump_count,
                                "signature slot index does not match bump count"
                            );
                            break;
                        }
                    }

                    let fee = fees::calculate_fee(
                        txcfg.base_compute_unit_price,
                        txcfg.compute_unit_price_max,
                        txcfg.compute_unit_price_min,
                        bump_count as u32,
                    );
                    subtasks.spawn(send_retry(
                        Arc::clone(&self.client),
                        self.txs.clone(),
                        sigs.clone(),
                        cancel.clone(),
                        id,
                        current_tx.clone(),
                        should_bump,
                        bump_count,
                        fee,
                    ));

                    // exponential increase in wait time, capped at 250ms
                    delta_t = (delta_t * 2).min(MAX_RETRY_DELAY);
                    next_tick = Instant::now() + delta_t;
                }
            }
        }

        subtasks.close();
        subtasks.wait().await;
        debug!(id = %id, signatures = ?sigs.list(), "stopped tx retry");
    }

    /// Long-running poller that batches signature status lookups and drives
    /// inflight submissions to their terminal state.
    async fn run_confirmer(self) {
        let mut wait = Duration::ZERO;
        loop {
            tokio::select! {
                _ = self.stop.cancelled() => return,
                _ = tokio::time::sleep(wait) => {}
            }
            wait = with_jitter(self.cfg.confirm_poll_period());

            let sigs = self.txs.list_all();
            if sigs.is_empty() {
                continue;
            }

            let mut handles = Vec::new();
            for batch in sigs.chunks(MAX_SIGS_TO_CONFIRM) {
                let statuses = match self.client.signature_statuses(batch).await {
                    Ok(statuses) => statuses,
                    Err(e) => {
                        error!("failed to get signature statuses: {}", e);
                        break;
                    }
                };

                // process batches as soon as they come in
                let txm = self.clone();
                let batch = batch.to_vec();
                handles.push(tokio::spawn(async move {
                    txm.process_sigs(batch, statuses);
                }));
            }
            for handle in handles {
                let _ = handle.await;
            }
        }
    }

    fn process_sigs(&self, sigs: Vec<Signature>, statuses: Vec<Option<TxStatus>>) {
        // process successful results first: if any attempt of a submission
        // landed in this batch, resolving it as a success must win over a
        // stale revert from an earlier signature
        let pairs = match sort_signatures_and_results(sigs, statuses) {
            Ok(pairs) => pairs,
            Err(e) => {
                error!("sorting error: {}", e);
                return;
            }
        };

        let confirm_timeout = self.cfg.tx_confirm_timeout();
        for (sig, status) in pairs {
            match status {
                // sig not found could mean an invalid tx or one not picked
                // up yet; keep polling until the confirm timeout
                None => {
                    debug!(signature = %sig, "tx state: not found");
                    if self.txs.expired(&sig, confirm_timeout) {
                        let id = self.txs.on_error(&sig, TxFailKind::Drop);
                        info!(
                            id = ?id,
                            signature = %sig,
                            timeout = ?confirm_timeout,
                            "failed to find transaction within confirm timeout"
                        );
                    }
                }
                Some(status) if status.err.is_some() => {
                    let id = self.txs.on_error(&sig, TxFailKind::Revert);
                    debug!(
                        id = ?id,
                        signature = %sig,
                        error = ?status.err,
                        "tx state: failed"
                    );
                }
                Some(TxStatus {
                    confirmation_status: Some(ConfirmationStatus::Processed),
                    ..
                }) => {
                    debug!(signature = %sig, "tx state: processed");
                    if self.txs.expired(&sig, confirm_timeout) {
                        let id = self.txs.on_error(&sig, TxFailKind::Drop);
                        debug!(
                            id = ?id,
                            signature = %sig,
                            timeout = ?confirm_timeout,
                            "tx failed to move beyond 'processed' within confirm timeout"
                        );
                    }
                }
                Some(TxStatus {
                    confirmation_status:
                        Some(ConfirmationStatus::Confirmed | ConfirmationStatus::Finalized),
                    ..
                }) => {
                    let id = self.txs.on_success(&sig);
                    debug!(id = ?id, signature = %sig, "tx state: confirmed");
                }
                // status with no confirmation level yet; keep polling
                Some(_) => {}
            }
        }
    }

    /// Consumes the post-send queue. Simulation can cancel the retry loop
    /// early and gives failure reasons in the logs that confirmation polling
    /// alone cannot.
    async fn run_simulator(self, mut rx: mpsc::Receiver<PendingTx>) {
        loop {
            tokio::select! {
                _ = self.stop.cancelled() => return,
                msg = rx.recv() => {
                    let Some(msg) = msg else { return };
                    let res = match self.simulate_tx(&msg.tx).await {
                        Ok(res) => res,
                        Err(_) => continue,
                    };
                    if res.err.is_none() {
                        continue;
                    }
                    self.process_simulation_error(Some(msg.id), msg.signature, &res);
                }
            }
        }
    }

    async fn simulate_tx(&self, tx: &Transaction) -> Result<SimulationResult, Error> {
        self.client.simulate_tx(tx).await.map_err(|e| {
            // can occur if the endpoint goes down or on an invalid signature
            error!("failed to simulate tx: {}", e);
            e
        })
    }

    fn process_simulation_error(&self, id: Option<Uuid>, sig: Signature, res: &SimulationResult) {
        let Some(err) = &res.err else { return };
        match err {
            // the network bank has not seen the blockhash or the tx is too
            // old; let confirmation polling clean up
            TransactionError::BlockhashNotFound => {
                debug!(id = ?id, signature = %sig, result = ?res, "simulate: BlockhashNotFound");
            }
            // the tx will revert on execution; cancel retry
            TransactionError::InstructionError(..) => {
                self.txs.on_error(&sig, TxFailKind::SimRevert);
                debug!(id = ?id, signature = %sig, result = ?res, "simulate: InstructionError");
            }
            // already on chain, confirmation polling will resolve it
            TransactionError::AlreadyProcessed => {
                debug!(id = ?id, signature = %sig, result = ?res, "simulate: AlreadyProcessed");
            }
            // unrecognized errors indicate more concerning failures
            _ => {
                self.txs.on_error(&sig, TxFailKind::SimOther);
                error!(id = ?id, signature = %sig, result = ?res, "simulate: unrecognized error");
            }
        }
    }
}

/// Fire one rebroadcast of the current transaction. Bumped sends record the
/// new signature against the submission before releasing waiters on its slot.
#[allow(clippy::too_many_arguments)]
async fn send_retry(
    client: Arc<dyn TxmClient>,
    txs: InflightTxs,
    sigs: SignatureList,
    cancel: CancellationToken,
    id: Uuid,
    retry_tx: Transaction,
    bump: bool,
    count: usize,
    fee: u64,
) {
    let retry_sig = tokio::select! {
        _ = cancel.cancelled() => {
            debug!(id = %id, signatures = ?sigs.list(), "tx retry cancelled during send");
            return;
        }
        result = client.send_tx(&retry_tx) => match result {
            Ok(sig) => sig,
            Err(e) => {
                // could occur if the endpoint goes down mid-flight
                warn!(id = %id, signatures = ?sigs.list(), "failed to send retry transaction: {}", e);
                return;
            }
        }
    };

    // save the new signature if the fee was bumped; signatures of sends that
    // failed are never attached to the inflight context
    if bump {
        if let Err(e) = txs.add(id, retry_sig) {
            warn!(id = %id, "error adding retry transaction signature: {}", e);
            return;
        }
        if let Err(e) = sigs.set(count, retry_sig) {
            error!(id = %id, "failed to set bumped signature: {}", e);
        }
        debug!(id = %id, fee, signatures = ?sigs.list(), "tx rebroadcast with bumped fee");
    }

    // wait for the slot of this attempt and cross-check the rebroadcast
    // signature against it
    let stored = tokio::select! {
        _ = cancel.cancelled() => return,
        stored = sigs.wait(count) => stored,
    };
    match stored {
        Ok(stored) if stored == retry_sig => {}
        Ok(stored) => {
            error!(
                id = %id,
                expected = %stored,
                received = %retry_sig,
                "retry signature does not match stored signature"
            );
        }
        Err(e) => {
            error!(id = %id, "failed to read stored signature: {}", e);
        }
    }
}

fn sort_signatures_and_results(
    sigs: Vec<Signature>,
    statuses: Vec<Option<TxStatus>>,
) -> Result<Vec<(Signature, Option<TxStatus>)>, Error> {
    if sigs.len() != statuses.len() {
        return Err(Error::BatchLengthMismatch {
            sigs: sigs.len(),
            statuses: statuses.len(),
        });
    }
    let mut pairs: Vec<_> = sigs.into_iter().zip(statuses).collect();
    pairs.sort_by_key(|(_, status)| status_rank(status));
    Ok(pairs)
}

/// Ordering key: successful results before failed ones, and within each
/// group confirmed/finalized before processed before not-found.
fn status_rank(status: &Option<TxStatus>) -> (u8, u8) {
    match status {
        None => (0, 2),
        Some(status) => {
            let err_rank = u8::from(status.err.is_some());
            let conf_rank = match status.confirmation_status {
                Some(ConfirmationStatus::Confirmed | ConfirmationStatus::Finalized) => 0,
                Some(ConfirmationStatus::Processed) => 1,
                None => 2,
            };
            (err_rank, conf_rank)
        }
    }
}

fn add_percentage(value: u64, pct: u64) -> u128 {
    value as u128 * (100 + pct) as u128 / 100
}

/// `period` plus or minus up to ten percent, to avoid thundering-herd polls.
fn with_jitter(period: Duration) -> Duration {
    let delta = period.as_millis() as u64 / 10;
    if delta == 0 {
        return period;
    }
    let jitter = fastrand::u64(0..=2 * delta);
    period - Duration::from_millis(delta) + Duration::from_millis(jitter)
}

#[cfg(test)]
mod tests {
    use solana_sdk::transaction::TransactionError;

    use super::*;

    fn sig(byte: u8) -> Signature {
        Signature::from([byte; 64])
    }

    fn status(
        err: Option<TransactionError>,
        confirmation: Option<ConfirmationStatus>,
    ) -> Option<TxStatus> {
        Some(TxStatus {
            slot: 1,
            err,
            confirmation_status: confirmation,
        })
    }

    #[test]
    fn test_add_percentage() {
        assert_eq!(add_percentage(100, 10), 110);
        assert_eq!(add_percentage(105, 10), 115); // truncating division
        assert_eq!(add_percentage(0, 10), 0);
        // no overflow near u64::MAX
        assert_eq!(
            add_percentage(u64::MAX, 10),
            u64::MAX as u128 * 110 / 100
        );
    }

    #[test]
    fn test_sort_signatures_and_results() {
        let sigs = vec![sig(1), sig(2), sig(3), sig(4), sig(5)];
        let statuses = vec![
            None,
            status(Some(TransactionError::AccountNotFound), None),
            status(None, Some(ConfirmationStatus::Processed)),
            status(None, Some(ConfirmationStatus::Finalized)),
            status(None, Some(ConfirmationStatus::Confirmed)),
        ];

        let pairs = sort_signatures_and_results(sigs, statuses).unwrap();
        let order: Vec<Signature> = pairs.iter().map(|(s, _)| *s).collect();
        // confirmed/finalized first (stable within the tie), then processed,
        // then not-found, then failed
        assert_eq!(order, vec![sig(4), sig(5), sig(3), sig(1), sig(2)]);
    }

    #[test]
    fn test_sort_rejects_length_mismatch() {
        let result = sort_signatures_and_results(vec![sig(1)], vec![]);
        assert!(matches!(result, Err(Error::BatchLengthMismatch { .. })));
    }

    #[test]
    fn test_tx_opts_apply() {
        let mut cfg = TxConfig {
            timeout: Duration::from_secs(10),
            fee_bump_period: Duration::from_secs(3),
            base_compute_unit_price: 0,
            compute_unit_price_min: 0,
            compute_unit_price_max: 1_000,
            estimate_compute_unit_limit: false,
            compute_unit_limit: 200_000,
        };
        TxOpts {
            fee_bump_period: Some(Duration::ZERO),
            compute_unit_limit: Some(150_000),
            ..TxOpts::default()
        }
        .apply(&mut cfg);

        assert_eq!(cfg.fee_bump_period, Duration::ZERO);
        assert_eq!(cfg.compute_unit_limit, 150_000);
        // untouched fields keep their defaults
        assert_eq!(cfg.timeout, Duration::from_secs(10));
        assert_eq!(cfg.compute_unit_price_max, 1_000);
    }

    #[test]
    fn test_with_jitter_bounds() {
        let period = Duration::from_millis(500);
        for _ in 0..100 {
            let jittered = with_jitter(period);
            assert!(jittered >= Duration::from_millis(450));
            assert!(jittered <= Duration::from_millis(550));
        }
        // sub-10ms periods are left alone
        assert_eq!(with_jitter(Duration::from_millis(5)), Duration::from_millis(5));
    }
}
