//! Range planning for one batch: a single task that walks the span between
//! the cursor and the confirmed target, handing disjoint block windows to
//! the fetcher pool through a bounded channel.

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Closed block-height interval processed as a unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockRange {
    pub from: u64,
    pub to: u64,
}

/// Spawns the planner task for one batch.
///
/// Emits `(from, min(from + range_size - 1, target))` for
/// `from = cursor + 1, cursor + 1 + range_size, ...` while `from <= target`,
/// in ascending order. The job channel closes when the plan is exhausted,
/// the batch is cancelled, or every fetcher has exited.
pub(crate) fn spawn_planner(
    cursor: u64,
    target: u64,
    range_size: u64,
    jobs: mpsc::Sender<BlockRange>,
    batch: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut from = cursor.saturating_add(1);
        while from <= target {
            let to = from.saturating_add(range_size - 1).min(target);
            let delivered = tokio::select! {
                _ = batch.cancelled() => false,
                result = jobs.send(BlockRange { from, to }) => result.is_ok(),
            };
            if !delivered {
                return;
            }
            tracing::trace!(from, to, "planned block range");
            from = from.saturating_add(range_size);
        }
    })
}
