use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Result};
use logsync::{init_tracing as lib_init_tracing, Log, ProgressTracker};
use tokio::sync::mpsc;
use tokio::time::{sleep, timeout, Instant};

pub fn init_tracing() {
    lib_init_tracing();
}

/// Receives exactly `count` logs or fails with a description of how far it
/// got.
pub async fn collect_logs(
    rx: &mut mpsc::Receiver<Log>,
    count: usize,
    limit: Duration,
) -> Result<Vec<Log>> {
    let deadline = Instant::now() + limit;
    let mut logs = Vec::with_capacity(count);

    while logs.len() < count {
        let remaining = deadline.saturating_duration_since(Instant::now());
        match timeout(remaining, rx.recv()).await {
            Ok(Some(log)) => logs.push(log),
            Ok(None) => bail!("log channel closed after {} of {count} logs", logs.len()),
            Err(_) => bail!("timed out after collecting {} of {count} logs", logs.len()),
        }
    }

    Ok(logs)
}

/// Drains the channel until it closes; intended for runs that terminate on
/// their own (bounded backfill).
pub async fn drain_logs(mut rx: mpsc::Receiver<Log>) -> Vec<Log> {
    let mut logs = Vec::new();
    while let Some(log) = rx.recv().await {
        logs.push(log);
    }
    logs
}

pub async fn wait_for_committed(
    progress: &Arc<ProgressTracker>,
    target: u64,
    limit: Duration,
) -> Result<()> {
    let start = Instant::now();
    loop {
        let current = progress.last_committed();
        if current.is_some_and(|height| height >= target) {
            return Ok(());
        }
        if start.elapsed() > limit {
            let reported = current
                .map(|height| height.to_string())
                .unwrap_or_else(|| "<none>".to_owned());
            bail!(
                "processor did not commit height {target} within {limit:?} (last committed: {reported})"
            );
        }
        sleep(Duration::from_millis(20)).await;
    }
}

/// Downstream delivery must never go backwards in block height.
pub fn assert_block_order(logs: &[Log]) {
    for pair in logs.windows(2) {
        if let [lhs, rhs] = pair {
            assert!(
                lhs.block_number_u64() <= rhs.block_number_u64(),
                "log at block {} delivered after block {}",
                rhs.block_number_u64(),
                lhs.block_number_u64()
            );
        }
    }
}
