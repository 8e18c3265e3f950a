//! Reorg detection state and recovery for the log processor.
//!
//! `WindowHashes` retains the canonical hash of the last block of each
//! committed window so the arbiter can validate the parent hash at the next
//! window boundary. `resolve_ancestor` walks those stored boundaries
//! backward when a mismatch is observed.

use crate::rpc::EthRpc;
use std::collections::VecDeque;
use tokio_util::sync::CancellationToken;

/// Bounded FIFO of `(end_height, block_hash)` pairs in commit order.
///
/// Insertion order always equals ascending height order because windows are
/// committed strictly in height order.
#[derive(Debug, Clone)]
pub struct WindowHashes {
    cap: usize,
    items: VecDeque<(u64, String)>,
}

impl WindowHashes {
    pub fn new(cap: usize) -> Self {
        Self {
            cap: cap.max(1),
            items: VecDeque::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn cap(&self) -> usize {
        self.cap
    }

    /// Hash stored for the window ending at `height`, if still retained.
    pub fn get(&self, height: u64) -> Option<&str> {
        self.items
            .iter()
            .rev()
            .find(|(existing, _)| *existing == height)
            .map(|(_, hash)| hash.as_str())
    }

    /// Records the hash of the block ending a committed window. An existing
    /// entry for `height` is overwritten in place; otherwise the oldest
    /// entry is evicted once the FIFO is at capacity.
    pub fn store(&mut self, height: u64, hash: impl Into<String>) {
        let hash = hash.into();
        if let Some(entry) = self.items.iter_mut().find(|(existing, _)| *existing == height) {
            entry.1 = hash;
            return;
        }

        if self.items.len() >= self.cap {
            self.items.pop_front();
        }
        self.items.push_back((height, hash));
    }

    /// Removes entries whose height is greater than the provided value while
    /// keeping the older portion of the window intact.
    pub fn drop_above(&mut self, height: u64) {
        while matches!(self.items.back(), Some((existing, _)) if *existing > height) {
            self.items.pop_back();
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &(u64, String)> {
        self.items.iter()
    }
}

/// Walks stored window boundaries backward from the cursor looking for the
/// deepest one whose successor block still points to it.
///
/// Probes at most `window.cap()` boundaries, stepping by `range_size`
/// because hashes exist only at window-end heights. Any RPC failure, outer
/// cancellation, or exhaustion of the retained history degrades to the hard
/// fallback depth; the resolver never propagates an error.
pub(crate) async fn resolve_ancestor<R: EthRpc>(
    rpc: &R,
    window: &mut WindowHashes,
    cursor: u64,
    range_size: u64,
    hard_fallback_blocks: u64,
    shutdown: &CancellationToken,
) -> u64 {
    let fallback = cursor.saturating_sub(hard_fallback_blocks);
    let mut ancestor = cursor;

    for _ in 0..window.cap() {
        let header = tokio::select! {
            _ = shutdown.cancelled() => return fallback,
            result = rpc.get_block(ancestor + 1) => match result {
                Ok(header) => header,
                Err(err) => {
                    tracing::warn!(
                        probe = ancestor + 1,
                        fallback,
                        error = %err,
                        "ancestor probe failed; applying hard fallback"
                    );
                    return fallback;
                }
            },
        };

        if window
            .get(ancestor)
            .is_some_and(|stored| stored == header.parent_hash)
        {
            window.drop_above(ancestor);
            tracing::info!(ancestor, "reorg ancestor located");
            return ancestor;
        }

        if ancestor < range_size {
            break;
        }
        ancestor -= range_size;

        if shutdown.is_cancelled() {
            return fallback;
        }
    }

    tracing::warn!(fallback, "no stored boundary matched; applying hard fallback");
    window.drop_above(fallback);
    fallback
}
