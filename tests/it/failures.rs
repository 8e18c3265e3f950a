use std::time::Duration;

use crate::support::{
    helpers::{drain_logs, init_tracing},
    mock_rpc::{MockChain, MockRpcServer},
};
use anyhow::Result;
use logsync::{HttpRpc, Processor, ProcessorConfig, RpcClientOptions};
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn fetcher_error_aborts_the_run() -> Result<()> {
    init_tracing();
    let chain = MockChain::new(1_000);
    chain.fail_get_logs_from(2);
    let server = MockRpcServer::start(chain.clone()).await?;

    let config = ProcessorConfig::builder()
        .range_size(50)
        .fetcher_concurrency(4)
        .build()?;
    let options = RpcClientOptions {
        max_attempts: 1,
        ..RpcClientOptions::default()
    };
    let (processor, mut logs_rx) = Processor::new(HttpRpc::with_options(server.url(), options)?, config);

    // Keep the downstream drained so the arbiter never blocks on delivery.
    let drainer = tokio::spawn(async move { while logs_rx.recv().await.is_some() {} });

    let err = processor
        .run(CancellationToken::new())
        .await
        .expect_err("fetcher error should abort the run");
    assert!(
        format!("{err:#}").contains("oops"),
        "unexpected error chain: {err:#}"
    );

    // `run` only returns after the batch drained, so the channel closes.
    drainer.await?;
    server.shutdown().await;
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn cancellation_mid_batch_returns_cleanly() -> Result<()> {
    init_tracing();
    let chain = MockChain::new(1_000);
    chain.hang_get_logs();
    let server = MockRpcServer::start(chain.clone()).await?;

    let config = ProcessorConfig::builder()
        .range_size(50)
        .fetcher_concurrency(2)
        .build()?;
    let (processor, mut logs_rx) = Processor::new(HttpRpc::new(server.url())?, config);

    let shutdown = CancellationToken::new();
    let handle = tokio::spawn(processor.run(shutdown.clone()));

    // Give the fetchers time to block inside eth_getLogs.
    tokio::time::sleep(Duration::from_millis(300)).await;
    shutdown.cancel();

    timeout(Duration::from_secs(2), handle)
        .await
        .expect("run should unwind promptly after cancellation")?
        .expect("cancellation is not an error");

    assert_eq!(
        logs_rx.recv().await,
        None,
        "log channel must close when run exits"
    );
    server.shutdown().await;
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn transient_get_logs_failures_are_retried() -> Result<()> {
    init_tracing();
    let chain = MockChain::new(10);
    chain.fail_get_logs_first(2);
    let server = MockRpcServer::start(chain.clone()).await?;

    let config = ProcessorConfig::builder()
        .range_size(100)
        .end_block(10)
        .build()?;
    let options = RpcClientOptions {
        max_attempts: 3,
        initial_backoff: Duration::from_millis(10),
        max_backoff: Duration::from_millis(50),
        ..RpcClientOptions::default()
    };
    let (processor, logs_rx) = Processor::new(HttpRpc::with_options(server.url(), options)?, config);

    processor.run(CancellationToken::new()).await?;
    let logs = drain_logs(logs_rx).await;

    assert_eq!(logs.len(), 1, "log should arrive once the retry succeeds");
    assert_eq!(chain.get_logs_calls(), 3, "two failures then one success");

    server.shutdown().await;
    Ok(())
}
