use crate::rpc::helpers::normalize_hex_filter;
use anyhow::{bail, Context, Result};
use std::time::Duration;

const DEFAULT_LOGS_BUFFER_SIZE: usize = 1_024;
const DEFAULT_REORG_LOOKBACK_BLOCKS: u64 = 1_024;
const DEFAULT_HARD_FALLBACK_BLOCKS: u64 = 1_000;
const DEFAULT_HEAD_POLL_INTERVAL_SECS: u64 = 2;

const WINDOW_HASH_CAP_MIN: u64 = 8;
const WINDOW_HASH_CAP_MAX: u64 = 256;

/// Which RPC path the fetcher pool uses to obtain logs for a range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FetchMode {
    /// One `eth_getLogs` call per range.
    #[default]
    Logs,
    /// `eth_getBlockReceipts` per block, flattening the nested logs and
    /// applying the topic filter post-fetch.
    Receipts,
}

/// Runtime configuration for the log processor pipeline.
///
/// All instances must be constructed via [`ProcessorConfig::builder`] so
/// invariants are validated before any consumer observes the values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessorConfig {
    range_size: u64,
    fetcher_concurrency: usize,
    start_block: u64,
    end_block: Option<u64>,
    confirmation: u64,
    logs_buffer_size: usize,
    reorg_lookback_blocks: u64,
    hard_fallback_blocks: u64,
    fetch_mode: FetchMode,
    topics: Vec<String>,
    addresses: Vec<String>,
    head_poll_interval: Duration,
}

impl ProcessorConfig {
    /// Returns a builder to incrementally construct and validate a configuration.
    pub fn builder() -> ProcessorConfigBuilder {
        ProcessorConfigBuilder::default()
    }

    /// Width of each fetched block window; also the reorg-walk step.
    pub fn range_size(&self) -> u64 {
        self.range_size
    }

    /// Number of parallel fetcher workers (always at least 1).
    pub fn fetcher_concurrency(&self) -> usize {
        self.fetcher_concurrency
    }

    /// Initial cursor position; 0 starts from genesis.
    pub fn start_block(&self) -> u64 {
        self.start_block
    }

    /// Optional inclusive upper bound for bounded backfill.
    pub fn end_block(&self) -> Option<u64> {
        self.end_block
    }

    /// Depth below the head considered safe; the batch target is
    /// `head - confirmation`.
    pub fn confirmation(&self) -> u64 {
        self.confirmation
    }

    /// Capacity of the downstream log channel. A configured value of 0
    /// (an unbuffered channel) maps to capacity 1, the closest bounded
    /// analogue tokio offers.
    pub fn logs_buffer_size(&self) -> usize {
        self.logs_buffer_size
    }

    /// Depth, in blocks, of retained window-end hashes for reorg detection.
    pub fn reorg_lookback_blocks(&self) -> u64 {
        self.reorg_lookback_blocks
    }

    /// Rewind depth applied when the reorg resolver cannot locate a common
    /// ancestor within the retained history.
    pub fn hard_fallback_blocks(&self) -> u64 {
        self.hard_fallback_blocks
    }

    /// RPC path used by fetchers.
    pub fn fetch_mode(&self) -> FetchMode {
        self.fetch_mode
    }

    /// Normalized topic filter (lowercased hex strings).
    pub fn topics(&self) -> &[String] {
        &self.topics
    }

    /// Normalized contract address filter (lowercased hex strings).
    pub fn addresses(&self) -> &[String] {
        &self.addresses
    }

    /// Pacing delay applied between head polls when a batch is empty.
    pub fn head_poll_interval(&self) -> Duration {
        self.head_poll_interval
    }

    /// Capacity of the stored window-hash FIFO:
    /// `clamp(ceil(reorg_lookback_blocks / range_size) + 1, 8, 256)`.
    pub fn window_hash_cap(&self) -> usize {
        let base = self
            .reorg_lookback_blocks
            .div_ceil(self.range_size)
            .saturating_add(1);
        base.clamp(WINDOW_HASH_CAP_MIN, WINDOW_HASH_CAP_MAX) as usize
    }

    /// Performs validation on an existing configuration instance.
    pub fn validate(&self) -> Result<()> {
        if self.range_size == 0 {
            bail!("range_size must be greater than 0");
        }

        if self.fetcher_concurrency == 0 {
            bail!("fetcher_concurrency must be greater than 0");
        }

        if let Some(end_block) = self.end_block {
            if end_block < self.start_block {
                bail!(
                    "end_block ({end_block}) must not be below start_block ({})",
                    self.start_block
                );
            }
        }

        if self.head_poll_interval.is_zero() {
            bail!("head_poll_interval must be greater than 0");
        }

        Ok(())
    }
}

#[derive(Debug, Default, Clone)]
pub struct ProcessorConfigBuilder {
    range_size: Option<u64>,
    fetcher_concurrency: Option<usize>,
    start_block: Option<u64>,
    end_block: Option<u64>,
    confirmation: Option<u64>,
    logs_buffer_size: Option<usize>,
    reorg_lookback_blocks: Option<u64>,
    hard_fallback_blocks: Option<u64>,
    fetch_mode: Option<FetchMode>,
    topics: Vec<String>,
    addresses: Vec<String>,
    head_poll_interval: Option<Duration>,
}

impl ProcessorConfigBuilder {
    pub fn range_size(mut self, blocks: u64) -> Self {
        self.range_size = Some(blocks);
        self
    }

    /// Values below 1 are clamped to 1 (strictly serial fetching).
    pub fn fetcher_concurrency(mut self, workers: usize) -> Self {
        self.fetcher_concurrency = Some(workers);
        self
    }

    pub fn start_block(mut self, height: u64) -> Self {
        self.start_block = Some(height);
        self
    }

    /// A height of 0 disables the bound (run continuously toward the head).
    pub fn end_block(mut self, height: u64) -> Self {
        self.end_block = Some(height);
        self
    }

    pub fn confirmation(mut self, depth: u64) -> Self {
        self.confirmation = Some(depth);
        self
    }

    pub fn logs_buffer_size(mut self, capacity: usize) -> Self {
        self.logs_buffer_size = Some(capacity);
        self
    }

    pub fn reorg_lookback_blocks(mut self, blocks: u64) -> Self {
        self.reorg_lookback_blocks = Some(blocks);
        self
    }

    pub fn hard_fallback_blocks(mut self, blocks: u64) -> Self {
        self.hard_fallback_blocks = Some(blocks);
        self
    }

    pub fn fetch_mode(mut self, mode: FetchMode) -> Self {
        self.fetch_mode = Some(mode);
        self
    }

    pub fn topics(mut self, topics: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.topics = topics.into_iter().map(Into::into).collect();
        self
    }

    pub fn addresses(mut self, addresses: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.addresses = addresses.into_iter().map(Into::into).collect();
        self
    }

    pub fn head_poll_interval(mut self, interval: Duration) -> Self {
        self.head_poll_interval = Some(interval);
        self
    }

    pub fn build(self) -> Result<ProcessorConfig> {
        let config = ProcessorConfig {
            range_size: self.range_size.context("range_size is required")?,
            fetcher_concurrency: self.fetcher_concurrency.unwrap_or(1).max(1),
            start_block: self.start_block.unwrap_or(0),
            end_block: self.end_block.filter(|&end| end != 0),
            confirmation: self.confirmation.unwrap_or(0),
            logs_buffer_size: self.logs_buffer_size.unwrap_or(DEFAULT_LOGS_BUFFER_SIZE),
            reorg_lookback_blocks: self
                .reorg_lookback_blocks
                .unwrap_or(DEFAULT_REORG_LOOKBACK_BLOCKS),
            hard_fallback_blocks: self
                .hard_fallback_blocks
                .unwrap_or(DEFAULT_HARD_FALLBACK_BLOCKS),
            fetch_mode: self.fetch_mode.unwrap_or_default(),
            topics: normalize_hex_filter(&self.topics),
            addresses: normalize_hex_filter(&self.addresses),
            head_poll_interval: self
                .head_poll_interval
                .unwrap_or_else(|| Duration::from_secs(DEFAULT_HEAD_POLL_INTERVAL_SECS)),
        };

        config.validate()?;
        Ok(config)
    }
}
