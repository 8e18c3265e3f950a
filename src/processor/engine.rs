//! The processor engine: the outer batch loop.
//!
//! Each iteration queries the confirmed target, launches one planner, N
//! fetch workers, and one arbiter under a batch-scoped cancellation token,
//! then supervises them until the batch drains, a reorg rewinds the cursor,
//! an error surfaces, or the outer context is cancelled. Every exit path
//! joins all batch tasks before the next batch may start, so batches never
//! interleave and no worker leaks.

use crate::processor::arbiter::{Arbiter, ArbiterExit};
use crate::processor::fetcher::spawn_fetcher;
use crate::processor::planner::spawn_planner;
use crate::processor::reorg::WindowHashes;
use crate::rpc::types::Log;
use crate::rpc::EthRpc;
use crate::runtime::config::ProcessorConfig;
use crate::runtime::progress::ProgressTracker;
use crate::runtime::telemetry::Telemetry;
use anyhow::{Context, Result};
use futures::future::join_all;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;

/// The log indexer core: walks the chain from the configured start block
/// toward the confirmed head, streaming logs downstream in strict block
/// order and recovering from reorganizations.
pub struct Processor<R: EthRpc> {
    rpc: Arc<R>,
    config: Arc<ProcessorConfig>,
    cursor: u64,
    window: WindowHashes,
    logs_tx: mpsc::Sender<Log>,
    progress: Arc<ProgressTracker>,
    telemetry: Arc<Telemetry>,
}

/// What the supervisor decided after one batch.
enum BatchControl {
    /// Work was done (or a reorg rewound the cursor); plan the next batch
    /// immediately.
    Advanced,
    /// Nothing confirmed to process; pace the next head poll.
    Idle,
    /// The configured end block has been reached.
    Finished,
    /// The outer context was cancelled or the consumer went away.
    Shutdown,
}

impl<R: EthRpc> Processor<R> {
    /// Creates the processor and the downstream log channel.
    ///
    /// The returned receiver is the only consumer surface; it is closed
    /// when [`Processor::run`] returns.
    pub fn new(rpc: R, config: ProcessorConfig) -> (Self, mpsc::Receiver<Log>) {
        let capacity = config.logs_buffer_size().max(1);
        let (logs_tx, logs_rx) = mpsc::channel(capacity);

        let processor = Self {
            rpc: Arc::new(rpc),
            cursor: config.start_block(),
            window: WindowHashes::new(config.window_hash_cap()),
            logs_tx,
            progress: Arc::new(ProgressTracker::new(config.start_block())),
            telemetry: Arc::new(Telemetry::default()),
            config: Arc::new(config),
        };

        (processor, logs_rx)
    }

    /// Observable copy of the cursor, updated on every commit and rewind.
    pub fn progress(&self) -> Arc<ProgressTracker> {
        self.progress.clone()
    }

    /// Rolling counters for observability.
    pub fn telemetry(&self) -> Arc<Telemetry> {
        self.telemetry.clone()
    }

    /// Highest block height whose logs have been committed downstream.
    pub fn cursor(&self) -> u64 {
        self.cursor
    }

    /// Runs the pipeline until `shutdown` is cancelled, the configured end
    /// block is reached, or a non-recoverable error occurs.
    ///
    /// Returns `Ok(())` on cancellation and bounded-backfill completion;
    /// the first offending error otherwise. Consumes the processor so the
    /// downstream channel closes exactly when this future resolves.
    pub async fn run(mut self, shutdown: CancellationToken) -> Result<()> {
        tracing::info!(
            start_block = self.config.start_block(),
            range_size = self.config.range_size(),
            fetchers = self.config.fetcher_concurrency(),
            confirmation = self.config.confirmation(),
            mode = ?self.config.fetch_mode(),
            "starting log processor"
        );

        loop {
            if shutdown.is_cancelled() {
                tracing::info!(cursor = self.cursor, "shutdown requested; log processor stopping");
                return Ok(());
            }

            match self.run_batch(&shutdown).await? {
                BatchControl::Advanced => {}
                BatchControl::Idle => {
                    self.telemetry.record_empty_batch();
                    tokio::select! {
                        _ = shutdown.cancelled() => return Ok(()),
                        _ = tokio::time::sleep(self.config.head_poll_interval()) => {}
                    }
                }
                BatchControl::Finished => {
                    tracing::info!(cursor = self.cursor, "reached configured end block");
                    return Ok(());
                }
                BatchControl::Shutdown => {
                    tracing::info!(cursor = self.cursor, "log processor stopping");
                    return Ok(());
                }
            }
        }
    }

    async fn run_batch(&mut self, shutdown: &CancellationToken) -> Result<BatchControl> {
        if let Some(end_block) = self.config.end_block() {
            if self.cursor >= end_block {
                return Ok(BatchControl::Finished);
            }
        }

        let head = tokio::select! {
            _ = shutdown.cancelled() => return Ok(BatchControl::Shutdown),
            result = self.rpc.head() => result.context("failed to query chain head")?,
        };

        let mut target = head.saturating_sub(self.config.confirmation());
        if let Some(end_block) = self.config.end_block() {
            target = target.min(end_block);
        }

        if target <= self.cursor {
            tracing::debug!(
                head,
                target,
                cursor = self.cursor,
                "no confirmed work; batch is empty"
            );
            return Ok(BatchControl::Idle);
        }

        tracing::debug!(head, target, cursor = self.cursor, "starting batch");
        let concurrency = self.config.fetcher_concurrency();
        let batch = shutdown.child_token();

        let (job_tx, job_rx) = mpsc::channel(concurrency);
        let planner = spawn_planner(
            self.cursor,
            target,
            self.config.range_size(),
            job_tx,
            batch.clone(),
        );

        let jobs = Arc::new(Mutex::new(job_rx));
        let (result_tx, result_rx) = mpsc::channel(concurrency);
        let (error_tx, mut error_rx) = mpsc::channel(1);
        let mut fetchers = Vec::with_capacity(concurrency);
        for id in 0..concurrency {
            fetchers.push(spawn_fetcher(
                id,
                self.rpc.clone(),
                self.config.clone(),
                jobs.clone(),
                result_tx.clone(),
                error_tx.clone(),
                batch.clone(),
            ));
        }
        // The arbiter observes channel closure once every worker is done.
        drop(result_tx);

        enum Exit {
            Sequencer(ArbiterExit),
            Failed(anyhow::Error),
            Shutdown,
        }

        let exit = {
            let arbiter = Arbiter {
                rpc: self.rpc.as_ref(),
                config: self.config.as_ref(),
                window: &mut self.window,
                cursor: &mut self.cursor,
                logs: &self.logs_tx,
                progress: self.progress.as_ref(),
                telemetry: self.telemetry.as_ref(),
            };
            let sequence = arbiter.sequence(result_rx, &batch, shutdown, &error_tx);
            tokio::pin!(sequence);

            tokio::select! {
                outcome = &mut sequence => Exit::Sequencer(outcome),
                Some(err) = error_rx.recv() => Exit::Failed(err),
                _ = shutdown.cancelled() => Exit::Shutdown,
            }
        };

        // Drain discipline: every task attached to this batch must observe
        // the cancellation and be joined before the batch is considered
        // over.
        batch.cancel();
        if let Err(err) = planner.await {
            tracing::warn!(error = %err, "planner task terminated unexpectedly");
        }
        let results = join_all(fetchers).await;
        for (id, result) in results.into_iter().enumerate() {
            if let Err(err) = result {
                tracing::warn!(worker = id, error = %err, "fetcher task terminated unexpectedly");
            }
        }

        match exit {
            Exit::Failed(err) => Err(err),
            Exit::Shutdown => Ok(BatchControl::Shutdown),
            Exit::Sequencer(ArbiterExit::Reorged) => {
                tracing::warn!(
                    cursor = self.cursor,
                    "cursor rewound after reorg; replanning from common ancestor"
                );
                Ok(BatchControl::Advanced)
            }
            Exit::Sequencer(ArbiterExit::Detached) => Ok(BatchControl::Shutdown),
            Exit::Sequencer(ArbiterExit::Drained | ArbiterExit::Halted) => {
                // An error deposited in the same instant the fetchers
                // finished must still win over starting the next batch.
                if let Ok(err) = error_rx.try_recv() {
                    return Err(err);
                }
                Ok(BatchControl::Advanced)
            }
        }
    }
}
