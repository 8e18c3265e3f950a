use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::OnceLock;
use tracing_subscriber::EnvFilter;

static TRACING_INIT: OnceLock<()> = OnceLock::new();

/// Installs a basic tracing subscriber (if one is not already active).
///
/// The subscriber honours `RUST_LOG` if it is present, otherwise it falls back to `info`.
/// Calling this function multiple times is harmless.
pub fn init_tracing() {
    if TRACING_INIT.get().is_some() {
        return;
    }

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init();

    let _ = TRACING_INIT.set(());
}

/// Lightweight rolling counters used to derive runtime metrics.
#[derive(Default, Debug)]
pub struct Telemetry {
    committed_ranges: AtomicU64,
    emitted_logs: AtomicU64,
    reorgs_detected: AtomicU64,
    empty_batches: AtomicU64,
}

impl Telemetry {
    pub fn record_committed_range(&self) {
        self.committed_ranges.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_emitted_logs(&self, count: u64) {
        if count == 0 {
            return;
        }
        self.emitted_logs.fetch_add(count, Ordering::Relaxed);
    }

    pub fn record_reorg(&self) {
        self.reorgs_detected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_empty_batch(&self) {
        self.empty_batches.fetch_add(1, Ordering::Relaxed);
    }

    pub fn committed_ranges(&self) -> u64 {
        self.committed_ranges.load(Ordering::Relaxed)
    }

    pub fn emitted_logs(&self) -> u64 {
        self.emitted_logs.load(Ordering::Relaxed)
    }

    pub fn reorgs_detected(&self) -> u64 {
        self.reorgs_detected.load(Ordering::Relaxed)
    }

    pub fn empty_batches(&self) -> u64 {
        self.empty_batches.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> TelemetrySnapshot {
        TelemetrySnapshot {
            committed_ranges: self.committed_ranges(),
            emitted_logs: self.emitted_logs(),
            reorgs_detected: self.reorgs_detected(),
            empty_batches: self.empty_batches(),
        }
    }
}

#[derive(Debug, Copy, Clone)]
pub struct TelemetrySnapshot {
    pub committed_ranges: u64,
    pub emitted_logs: u64,
    pub reorgs_detected: u64,
    pub empty_batches: u64,
}
