//! Fetcher pool: N workers pull block ranges from the planner and retrieve
//! the logs for each range over the configured RPC path.
//!
//! Workers never touch the cursor or any ordering state; results are handed
//! to the arbiter tagged with the originating range. The first RPC failure
//! is deposited into a single-slot error channel and the worker exits.

use crate::processor::planner::BlockRange;
use crate::rpc::types::{Log, LogFilter};
use crate::rpc::{u64_to_hex_qty, EthRpc};
use crate::runtime::config::{FetchMode, ProcessorConfig};
use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Logs fetched for one block range, tagged with its origin.
#[derive(Debug)]
pub(crate) struct RangeLogs {
    pub from: u64,
    pub to: u64,
    pub logs: Vec<Log>,
}

/// Spawns one fetch worker. Workers share the job receiver, so a range is
/// consumed by exactly one of them.
pub(crate) fn spawn_fetcher<R: EthRpc>(
    id: usize,
    rpc: Arc<R>,
    config: Arc<ProcessorConfig>,
    jobs: Arc<Mutex<mpsc::Receiver<BlockRange>>>,
    results: mpsc::Sender<RangeLogs>,
    errors: mpsc::Sender<anyhow::Error>,
    batch: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        tracing::debug!(worker = id, "fetcher started");

        loop {
            let job = {
                let mut rx = jobs.lock().await;
                tokio::select! {
                    _ = batch.cancelled() => None,
                    job = rx.recv() => job,
                }
            };
            // None covers both a cancelled batch and an exhausted plan.
            let Some(range) = job else { break };

            let fetched = tokio::select! {
                _ = batch.cancelled() => break,
                result = fetch_range(rpc.as_ref(), &config, range) => result,
            };

            match fetched {
                Ok(logs) => {
                    tracing::trace!(
                        worker = id,
                        from = range.from,
                        to = range.to,
                        logs = logs.len(),
                        "range fetched"
                    );
                    let delivered = tokio::select! {
                        _ = batch.cancelled() => false,
                        result = results.send(RangeLogs {
                            from: range.from,
                            to: range.to,
                            logs,
                        }) => result.is_ok(),
                    };
                    if !delivered {
                        break;
                    }
                }
                Err(err) => {
                    tracing::warn!(
                        worker = id,
                        from = range.from,
                        to = range.to,
                        error = %err,
                        "range fetch failed"
                    );
                    // Single-slot deposit: first error wins, later ones are
                    // shutdown noise.
                    let _ = errors.try_send(err);
                    break;
                }
            }
        }

        tracing::debug!(worker = id, "fetcher exited");
    })
}

async fn fetch_range<R: EthRpc>(
    rpc: &R,
    config: &ProcessorConfig,
    range: BlockRange,
) -> Result<Vec<Log>> {
    match config.fetch_mode() {
        FetchMode::Logs => {
            let filter = LogFilter {
                from_block: u64_to_hex_qty(range.from),
                to_block: u64_to_hex_qty(range.to),
                address: config.addresses().to_vec(),
                topics: config.topics().to_vec(),
            };
            rpc.get_logs(&filter).await
        }
        FetchMode::Receipts => fetch_range_from_receipts(rpc, config, range).await,
    }
}

/// Receipts path: one `eth_getBlockReceipts` per block, flattening nested
/// logs and applying the topic filter that `eth_getLogs` would have applied
/// server-side.
async fn fetch_range_from_receipts<R: EthRpc>(
    rpc: &R,
    config: &ProcessorConfig,
    range: BlockRange,
) -> Result<Vec<Log>> {
    let mut all_logs = Vec::new();
    for number in range.from..=range.to {
        let receipts = rpc
            .get_block_receipts(number)
            .await
            .with_context(|| format!("failed to get receipts for block {number}"))?;

        for receipt in receipts {
            all_logs.extend(
                receipt
                    .logs
                    .into_iter()
                    .filter(|log| matches_topic_filter(config.topics(), log)),
            );
        }
    }
    Ok(all_logs)
}

/// Matches on the first topic (the event signature). An empty filter
/// accepts every log; a log with no topics matches nothing.
pub(crate) fn matches_topic_filter(topics: &[String], log: &Log) -> bool {
    if topics.is_empty() {
        return true;
    }

    let Some(first) = log.topics.first() else {
        return false;
    };

    topics.iter().any(|topic| topic.eq_ignore_ascii_case(first))
}
