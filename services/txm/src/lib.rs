//! Solana Transaction Manager
//!
//! In-memory transaction broadcaster: takes signed-but-unfinalized payloads,
//! drives them to confirmation through rebroadcasts and fee bumping, and
//! resolves each submission to success, revert or drop.

pub mod config;
pub mod error;
pub mod fees;
pub mod keystore;
pub mod metrics;
pub mod rpc;
pub mod txm;

pub use config::{Config, TxmConfig};
pub use error::Error;
pub use txm::{TxConfig, TxOpts, Txm};
