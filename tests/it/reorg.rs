use crate::support::{
    helpers::{assert_block_order, drain_logs, init_tracing},
    mock_rpc::{MockChain, MockRpcServer},
};
use anyhow::Result;
use logsync::{HttpRpc, Processor, ProcessorConfig};
use tokio_util::sync::CancellationToken;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn reorg_rewinds_to_common_ancestor() -> Result<()> {
    init_tracing();
    let chain = MockChain::new(100);
    // Block 41 reports a bogus parent on first observation, so the batch
    // that committed windows up to 40 detects a fork at the 41 boundary.
    chain.serve_bogus_parent_once(41);
    let server = MockRpcServer::start(chain.clone()).await?;

    let config = ProcessorConfig::builder()
        .range_size(10)
        .fetcher_concurrency(4)
        .end_block(100)
        .build()?;
    let (processor, logs_rx) = Processor::new(HttpRpc::new(server.url())?, config);
    let telemetry = processor.telemetry();
    let progress = processor.progress();

    processor.run(CancellationToken::new()).await?;
    let logs = drain_logs(logs_rx).await;

    // Four windows commit before the fork, six after the rewind to 40:
    // one log per window with the single-log mock.
    assert_eq!(logs.len(), 10);
    assert_block_order(&logs);
    assert_eq!(telemetry.reorgs_detected(), 1);
    assert_eq!(progress.last_committed(), Some(100));

    server.shutdown().await;
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn pipeline_replays_ranges_after_the_rewind() -> Result<()> {
    init_tracing();
    let chain = MockChain::new(60);
    chain.serve_bogus_parent_once(21);
    let server = MockRpcServer::start(chain.clone()).await?;

    let config = ProcessorConfig::builder()
        .range_size(10)
        .fetcher_concurrency(2)
        .end_block(60)
        .build()?;
    let (processor, logs_rx) = Processor::new(HttpRpc::new(server.url())?, config);
    let telemetry = processor.telemetry();

    processor.run(CancellationToken::new()).await?;
    let logs = drain_logs(logs_rx).await;

    // Two windows before the fork at 21, four replayed after it.
    assert_eq!(logs.len(), 6);
    assert_eq!(telemetry.reorgs_detected(), 1);
    assert_eq!(telemetry.committed_ranges(), 6);

    server.shutdown().await;
    Ok(())
}
