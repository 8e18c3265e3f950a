//! The arbiter: the single sequencer of one batch.
//!
//! Exactly one arbiter future runs per batch and it is the sole writer to
//! the cursor, the stored window hashes, and the downstream log channel.
//! Fetched ranges arrive in arbitrary order; the arbiter stages them by
//! their `from` height and commits strictly in ascending order, validating
//! chain continuity at every window boundary.

use crate::processor::fetcher::RangeLogs;
use crate::processor::reorg::{resolve_ancestor, WindowHashes};
use crate::rpc::types::{BlockHeader, Log};
use crate::rpc::EthRpc;
use crate::runtime::config::ProcessorConfig;
use crate::runtime::progress::ProgressTracker;
use crate::runtime::telemetry::Telemetry;
use std::collections::HashMap;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// How the arbiter left the batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ArbiterExit {
    /// The fetcher channel closed: every planned range was accounted for.
    Drained,
    /// A parent-hash mismatch was confirmed; the batch token is cancelled
    /// and the cursor has been rewound to the resolved ancestor.
    Reorged,
    /// The batch ended early: cancellation was observed or a block-header
    /// fetch failed (the error sits in the single-slot channel).
    Halted,
    /// The downstream log receiver was dropped; there is no consumer left.
    Detached,
}

/// Borrowed view over the processor state the sequencer mutates. Holding
/// the mutable pieces here keeps the single-writer rule structural: the
/// compiler rejects a second concurrent mutator.
pub(crate) struct Arbiter<'a, R> {
    pub rpc: &'a R,
    pub config: &'a ProcessorConfig,
    pub window: &'a mut WindowHashes,
    pub cursor: &'a mut u64,
    pub logs: &'a mpsc::Sender<Log>,
    pub progress: &'a ProgressTracker,
    pub telemetry: &'a Telemetry,
}

impl<R: EthRpc> Arbiter<'_, R> {
    pub(crate) async fn sequence(
        self,
        mut results: mpsc::Receiver<RangeLogs>,
        batch: &CancellationToken,
        shutdown: &CancellationToken,
        errors: &mpsc::Sender<anyhow::Error>,
    ) -> ArbiterExit {
        let mut pending_range: HashMap<u64, u64> = HashMap::new();
        let mut pending_logs: HashMap<u64, Vec<Log>> = HashMap::new();
        let mut next = self.cursor.saturating_add(1);

        loop {
            let message = tokio::select! {
                _ = batch.cancelled() => return ArbiterExit::Halted,
                message = results.recv() => message,
            };
            let Some(RangeLogs { from, to, logs }) = message else {
                // Channel closed. A leftover `next` key would mean the
                // planner skipped a range, which it cannot; drain silently.
                return ArbiterExit::Drained;
            };

            pending_range.insert(from, to);
            pending_logs.insert(from, logs);

            while let Some(&end) = pending_range.get(&next) {
                // First header fetch: confirm continuity with the window
                // committed before this one.
                let header = match self.get_block(next, batch, errors).await {
                    Ok(header) => header,
                    Err(exit) => return exit,
                };

                // Genesis has no parent to validate against.
                if next > 0 && self.detect_mismatch(next, &header) {
                    batch.cancel();
                    self.telemetry.record_reorg();
                    let ancestor = resolve_ancestor(
                        self.rpc,
                        &mut *self.window,
                        *self.cursor,
                        self.config.range_size(),
                        self.config.hard_fallback_blocks(),
                        shutdown,
                    )
                    .await;
                    *self.cursor = ancestor;
                    self.progress.mark_committed(ancestor);
                    return ArbiterExit::Reorged;
                }

                tracing::debug!(from = next, to = end, "committing window");
                if let Some(logs) = pending_logs.remove(&next) {
                    let count = logs.len() as u64;
                    for log in logs {
                        let sent = tokio::select! {
                            _ = batch.cancelled() => return ArbiterExit::Halted,
                            result = self.logs.send(log) => result,
                        };
                        if sent.is_err() {
                            tracing::debug!("downstream log receiver dropped; stopping");
                            return ArbiterExit::Detached;
                        }
                    }
                    self.telemetry.record_emitted_logs(count);
                }

                pending_range.remove(&next);
                *self.cursor = end;
                self.progress.mark_committed(end);
                self.telemetry.record_committed_range();
                next = end.saturating_add(1);

                // Second header fetch: record the hash this window ends on,
                // so the next window's start can be validated. If it fails
                // the window stays committed with no stored hash and the
                // next batch simply skips that continuity check.
                let header = match self.get_block(end, batch, errors).await {
                    Ok(header) => header,
                    Err(exit) => return exit,
                };
                self.window.store(end, header.hash);
            }
        }
    }

    fn detect_mismatch(&self, next: u64, header: &BlockHeader) -> bool {
        match self.window.get(next - 1) {
            Some(parent) if parent != header.parent_hash => {
                tracing::warn!(
                    height = next,
                    stored_parent = parent,
                    observed_parent = %header.parent_hash,
                    "parent hash mismatch; chain reorganization detected"
                );
                true
            }
            _ => false,
        }
    }

    /// Header fetch racing the batch scope. A failure is deposited into the
    /// error slot unless the batch is already unwinding.
    async fn get_block(
        &self,
        number: u64,
        batch: &CancellationToken,
        errors: &mpsc::Sender<anyhow::Error>,
    ) -> Result<BlockHeader, ArbiterExit> {
        tokio::select! {
            _ = batch.cancelled() => Err(ArbiterExit::Halted),
            result = self.rpc.get_block(number) => match result {
                Ok(header) => Ok(header),
                Err(err) => {
                    if !batch.is_cancelled() {
                        tracing::error!(
                            height = number,
                            error = %err,
                            "failed to fetch block header"
                        );
                        let _ = errors.try_send(err);
                    }
                    Err(ArbiterExit::Halted)
                }
            },
        }
    }
}
