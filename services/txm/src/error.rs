use solana_sdk::signature::Signature;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("txm is not started")]
    NotStarted,

    #[error("txm is already started")]
    AlreadyStarted,

    #[error("invalid transaction: {0}")]
    InvalidTransaction(String),

    #[error("keystore error: {0}")]
    Keystore(String),

    #[error("rpc error: {0}")]
    Rpc(String),

    #[error("transaction failed simulation: {0}")]
    Simulation(String),

    #[error("failed to enqueue transaction for {0}: queue full")]
    QueueFull(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("signature {0} already registered to an inflight transaction")]
    SignatureExists(Signature),

    #[error("no inflight transaction for id {0}")]
    UnknownId(uuid::Uuid),

    #[error("signature list slot {0} already set")]
    SlotAlreadySet(usize),

    #[error("signature list slot {0} is not set")]
    SlotUnset(usize),

    #[error("signature list has no slot {0}")]
    SlotOutOfRange(usize),

    #[error("signature count ({sigs}) does not match status count ({statuses})")]
    BatchLengthMismatch { sigs: usize, statuses: usize },

    #[error("no fee samples in block")]
    EmptyFeeSamples,
}
