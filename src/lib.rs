pub mod processor;
pub mod rpc;
pub mod runtime;

pub use processor::engine::Processor;
pub use processor::planner::BlockRange;
pub use processor::reorg::WindowHashes;
pub use rpc::types::{BlockHeader, Log, LogFilter, TxReceipt};
pub use rpc::{EthRpc, HttpRpc, RpcClientOptions, RpcError};
pub use runtime::config::{FetchMode, ProcessorConfig, ProcessorConfigBuilder};
pub use runtime::progress::ProgressTracker;
pub use runtime::telemetry::{init_tracing, Telemetry, TelemetrySnapshot};
