//! Wire types for the Ethereum JSON-RPC surface the pipeline consumes.
//!
//! Quantities and hashes stay in their hex-string wire form; the pipeline
//! only ever compares hashes and converts the few quantities it needs via
//! [`crate::rpc::helpers`].

use serde::{Deserialize, Serialize};

/// Block header as returned by `eth_getBlockByNumber` with transaction
/// bodies omitted. The pipeline uses only `hash` and `parent_hash`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockHeader {
    #[serde(default)]
    pub number: String,
    pub hash: String,
    pub parent_hash: String,
    #[serde(default)]
    pub timestamp: String,
}

/// A single event log as returned by `eth_getLogs`, carried downstream
/// without inspection.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Log {
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub topics: Vec<String>,
    #[serde(default)]
    pub data: String,
    #[serde(default)]
    pub block_number: String,
    #[serde(default)]
    pub transaction_hash: String,
    #[serde(default)]
    pub transaction_index: String,
    #[serde(default)]
    pub block_hash: String,
    #[serde(default)]
    pub log_index: String,
    #[serde(default)]
    pub removed: bool,
}

impl Log {
    /// Block height of the log, parsed from the wire hex form.
    /// Returns 0 when the field is absent or malformed (pending logs).
    pub fn block_number_u64(&self) -> u64 {
        crate::rpc::helpers::hex_qty_to_u64(&self.block_number).unwrap_or(0)
    }
}

/// Filter object for `eth_getLogs`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LogFilter {
    pub from_block: String,
    pub to_block: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub address: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub topics: Vec<String>,
}

/// Transaction receipt as returned by `eth_getBlockReceipts`; only the
/// nested logs matter to the pipeline.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TxReceipt {
    #[serde(default)]
    pub transaction_hash: String,
    #[serde(default)]
    pub transaction_index: String,
    #[serde(default)]
    pub block_number: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub logs: Vec<Log>,
}
