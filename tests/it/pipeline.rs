use std::time::Duration;

use crate::support::{
    helpers::{assert_block_order, collect_logs, drain_logs, init_tracing, wait_for_committed},
    mock_rpc::{MockChain, MockRpcServer, TRANSFER_TOPIC},
};
use anyhow::Result;
use logsync::{FetchMode, HttpRpc, Processor, ProcessorConfig};
use tokio_util::sync::CancellationToken;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn single_log_single_range() -> Result<()> {
    init_tracing();
    let chain = MockChain::new(0x10d4f);
    let server = MockRpcServer::start(chain.clone()).await?;

    let config = ProcessorConfig::builder()
        .range_size(100)
        .fetcher_concurrency(4)
        .build()?;
    let (processor, mut logs_rx) = Processor::new(HttpRpc::new(server.url())?, config);
    let progress = processor.progress();

    let shutdown = CancellationToken::new();
    let handle = tokio::spawn(processor.run(shutdown.clone()));

    let logs = collect_logs(&mut logs_rx, 1, Duration::from_secs(5)).await?;
    assert_eq!(logs[0].address, "0xabc");
    assert_eq!(logs[0].topics, vec![TRANSFER_TOPIC.to_owned()]);
    wait_for_committed(&progress, 100, Duration::from_secs(5)).await?;

    shutdown.cancel();
    handle.await??;
    server.shutdown().await;
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn multiple_ranges_aggregate_in_order() -> Result<()> {
    init_tracing();
    let chain = MockChain::new(1_000);
    chain.set_logs_per_range(5);
    let addresses = ["0xabc", "0xabcd", "0xabcde", "0xabcdef", "0xabcdefg"];
    chain.set_addresses(addresses.iter().map(|address| (*address).to_owned()).collect());
    let server = MockRpcServer::start(chain.clone()).await?;

    let config = ProcessorConfig::builder()
        .range_size(50)
        .fetcher_concurrency(4)
        .end_block(1_000)
        .build()?;
    let (processor, logs_rx) = Processor::new(HttpRpc::new(server.url())?, config);
    let telemetry = processor.telemetry();

    processor.run(CancellationToken::new()).await?;
    let logs = drain_logs(logs_rx).await;

    // 20 ranges of 5 logs each, committed strictly in range order.
    assert_eq!(logs.len(), 100);
    for (index, log) in logs.iter().enumerate() {
        assert_eq!(
            log.address,
            addresses[index % addresses.len()],
            "unexpected address at index {index}"
        );
    }
    assert_eq!(logs[5].address, "0xabc", "index 5 cycles back to the first address");
    assert_block_order(&logs);
    assert_eq!(telemetry.committed_ranges(), 20);

    server.shutdown().await;
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn head_below_confirmation_yields_empty_batches() -> Result<()> {
    init_tracing();
    let chain = MockChain::new(5);
    let server = MockRpcServer::start(chain.clone()).await?;

    let config = ProcessorConfig::builder()
        .range_size(10)
        .confirmation(10)
        .head_poll_interval(Duration::from_millis(20))
        .build()?;
    let (processor, _logs_rx) = Processor::new(HttpRpc::new(server.url())?, config);
    let telemetry = processor.telemetry();

    let shutdown = CancellationToken::new();
    let handle = tokio::spawn(processor.run(shutdown.clone()));

    tokio::time::sleep(Duration::from_millis(300)).await;
    shutdown.cancel();
    handle.await??;

    assert_eq!(chain.get_logs_calls(), 0, "no ranges should have been fetched");
    assert!(telemetry.empty_batches() >= 1);
    server.shutdown().await;
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn bounded_backfill_stops_at_end_block() -> Result<()> {
    init_tracing();
    let chain = MockChain::new(1_000);
    let server = MockRpcServer::start(chain.clone()).await?;

    let config = ProcessorConfig::builder()
        .range_size(10)
        .fetcher_concurrency(2)
        .end_block(100)
        .build()?;
    let (processor, logs_rx) = Processor::new(HttpRpc::new(server.url())?, config);
    let progress = processor.progress();

    processor.run(CancellationToken::new()).await?;
    let logs = drain_logs(logs_rx).await;

    assert_eq!(logs.len(), 10, "one log per range up to the end block");
    assert_eq!(progress.last_committed(), Some(100));
    server.shutdown().await;
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn receipts_mode_filters_by_topic() -> Result<()> {
    init_tracing();
    let chain = MockChain::new(5);
    let server = MockRpcServer::start(chain.clone()).await?;

    let config = ProcessorConfig::builder()
        .range_size(5)
        .fetcher_concurrency(2)
        .fetch_mode(FetchMode::Receipts)
        .topics([TRANSFER_TOPIC])
        .end_block(5)
        .build()?;
    let (processor, logs_rx) = Processor::new(HttpRpc::new(server.url())?, config);

    processor.run(CancellationToken::new()).await?;
    let logs = drain_logs(logs_rx).await;

    // The mock serves one matching and one non-matching log per block.
    assert_eq!(logs.len(), 5);
    for log in &logs {
        assert_eq!(log.address, "0xabc");
        assert_eq!(log.topics.first().map(String::as_str), Some(TRANSFER_TOPIC));
    }
    assert_block_order(&logs);

    server.shutdown().await;
    Ok(())
}
