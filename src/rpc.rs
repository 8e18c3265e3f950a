//! JSON-RPC plumbing: the abstract capability set the pipeline consumes,
//! the HTTP client implementation, wire types, and hex helpers.

pub mod client;
pub mod helpers;
pub mod options;
pub mod types;

use anyhow::{bail, Result};
use async_trait::async_trait;
use types::{BlockHeader, Log, LogFilter, TxReceipt};

pub use client::{HttpRpc, RpcError};
pub use helpers::{hex_qty_to_u64, normalize_hex_filter, u64_to_hex_qty};
pub use options::RpcClientOptions;

/// The three operations (plus the optional receipts path) the processor
/// needs from a chain endpoint.
///
/// Methods carry no cancellation parameter: every call site races the
/// returned future against its cancellation scope with `tokio::select!`,
/// so cancellation is distinguishable from RPC failure by construction.
#[async_trait]
pub trait EthRpc: Send + Sync + 'static {
    /// Current best block height (`eth_blockNumber`).
    async fn head(&self) -> Result<u64>;

    /// Header of the block at `number` (`eth_getBlockByNumber` without
    /// transaction bodies).
    async fn get_block(&self, number: u64) -> Result<BlockHeader>;

    /// Logs matching `filter`, in ascending `(block, tx index, log index)`
    /// order (`eth_getLogs`).
    async fn get_logs(&self, filter: &LogFilter) -> Result<Vec<Log>>;

    /// Receipts of every transaction in the block at `number`
    /// (`eth_getBlockReceipts`). Only required for the receipts fetch mode.
    async fn get_block_receipts(&self, _number: u64) -> Result<Vec<TxReceipt>> {
        bail!("block receipts are not supported by this RPC client");
    }
}
