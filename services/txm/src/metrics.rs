//! Metric registration and helpers. The host application is expected to
//! install a recorder (e.g. a Prometheus exporter); without one these calls
//! are no-ops.

pub fn register_metrics() {
    metrics::describe_counter!(
        "solana_txm_tx_success",
        "Total number of transactions confirmed or finalized on chain."
    );

    metrics::describe_counter!(
        "solana_txm_tx_error",
        "Total number of transactions that resolved to a failure, by kind."
    );

    metrics::describe_gauge!(
        "solana_txm_tx_pending",
        "Current number of inflight transactions."
    );
}

pub(crate) fn record_tx_success(chain_id: &str) {
    metrics::increment_counter!("solana_txm_tx_success", "chain_id" => chain_id.to_string());
}

pub(crate) fn record_tx_error(chain_id: &str, kind: &'static str) {
    metrics::increment_counter!(
        "solana_txm_tx_error",
        "chain_id" => chain_id.to_string(),
        "kind" => kind
    );
}

pub(crate) fn record_tx_pending(chain_id: &str, count: usize) {
    metrics::gauge!("solana_txm_tx_pending", count as f64, "chain_id" => chain_id.to_string());
}
