//! HTTP JSON-RPC client for Ethereum-compatible endpoints. Houses the
//! `HttpRpc` implementation of [`EthRpc`](crate::rpc::EthRpc), its typed
//! error cases, and the retry/backoff loop shared by every method.

use crate::rpc::helpers::{hex_qty_to_u64, u64_to_hex_qty};
use crate::rpc::options::RpcClientOptions;
use crate::rpc::types::{BlockHeader, Log, LogFilter, TxReceipt};
use crate::rpc::EthRpc;
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use jsonrpsee::core::client::{ClientT, Error as JsonRpcError};
use jsonrpsee::core::params::ArrayParams;
use jsonrpsee::http_client::{HttpClient, HttpClientBuilder};
use jsonrpsee::rpc_params;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, timeout};

/// RPC failure cases the pipeline may need to distinguish from generic
/// transport noise. Cancellation is not represented here: every call site
/// races the request against its cancellation scope.
#[derive(Debug)]
pub enum RpcError {
    Timeout {
        method: &'static str,
    },
    Rpc {
        method: &'static str,
        code: i32,
        message: String,
    },
}

impl std::fmt::Display for RpcError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RpcError::Timeout { method } => write!(f, "rpc method {method} timed out"),
            RpcError::Rpc {
                method,
                code,
                message,
            } => write!(f, "rpc {method} returned error {code}: {message}"),
        }
    }
}

impl std::error::Error for RpcError {}

/// JSON-RPC over HTTP client with per-request timeouts and exponential
/// retry backoff.
#[derive(Debug, Clone)]
pub struct HttpRpc {
    endpoint: Arc<String>,
    client: HttpClient,
    options: RpcClientOptions,
}

impl HttpRpc {
    /// Creates a client for the given endpoint with default options.
    pub fn new(url: impl Into<String>) -> Result<Self> {
        Self::with_options(url, RpcClientOptions::default())
    }

    /// Creates a client with explicit timeout/concurrency/retry options.
    pub fn with_options(url: impl Into<String>, options: RpcClientOptions) -> Result<Self> {
        options.validate()?;

        let endpoint = url.into();
        let client = HttpClientBuilder::default()
            .request_timeout(options.request_timeout)
            .build(&endpoint)
            .map_err(|err| anyhow!("failed to build RPC client: {err}"))?;

        Ok(Self {
            endpoint: Arc::new(endpoint),
            client,
            options,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Shared retry loop: each attempt runs under the configured request
    /// timeout; failures back off exponentially until `max_attempts`.
    async fn request_with_retry<R>(&self, method: &'static str, params: ArrayParams) -> Result<R>
    where
        R: DeserializeOwned,
    {
        let mut attempt = 0;
        let mut backoff = self.options.initial_backoff;

        loop {
            attempt += 1;

            match self.request_once(method, params.clone()).await {
                Ok(value) => return Ok(value),
                Err(err) => {
                    if attempt >= self.options.max_attempts {
                        return Err(err)
                            .with_context(|| format!("rpc {method} failed after {attempt} attempts"));
                    }
                    tracing::warn!(
                        method,
                        attempt,
                        backoff_ms = backoff.as_millis() as u64,
                        error = %err,
                        "rpc call failed; retrying"
                    );
                    sleep(backoff).await;
                    backoff = next_backoff(backoff, self.options.max_backoff);
                }
            }
        }
    }

    async fn request_once<R>(&self, method: &'static str, params: ArrayParams) -> Result<R>
    where
        R: DeserializeOwned,
    {
        let response = timeout(
            self.options.request_timeout,
            self.client.request::<R, _>(method, params),
        )
        .await
        .map_err(|_| RpcError::Timeout { method })?
        .map_err(|err| map_rpc_error(method, err))?;

        Ok(response)
    }
}

#[async_trait]
impl EthRpc for HttpRpc {
    async fn head(&self) -> Result<u64> {
        let raw: String = self
            .request_with_retry("eth_blockNumber", rpc_params![])
            .await?;
        hex_qty_to_u64(&raw).context("eth_blockNumber returned a malformed quantity")
    }

    async fn get_block(&self, number: u64) -> Result<BlockHeader> {
        let block: Option<BlockHeader> = self
            .request_with_retry(
                "eth_getBlockByNumber",
                rpc_params![u64_to_hex_qty(number), false],
            )
            .await?;
        block.ok_or_else(|| anyhow!("block {number} not found"))
    }

    async fn get_logs(&self, filter: &LogFilter) -> Result<Vec<Log>> {
        self.request_with_retry("eth_getLogs", rpc_params![filter])
            .await
    }

    async fn get_block_receipts(&self, number: u64) -> Result<Vec<TxReceipt>> {
        self.request_with_retry("eth_getBlockReceipts", rpc_params![u64_to_hex_qty(number)])
            .await
    }
}

fn map_rpc_error(method: &'static str, err: JsonRpcError) -> anyhow::Error {
    match err {
        JsonRpcError::Call(call) => RpcError::Rpc {
            method,
            code: call.code(),
            message: call.message().to_owned(),
        }
        .into(),
        JsonRpcError::RequestTimeout => RpcError::Timeout { method }.into(),
        other => anyhow!("rpc {method} call failed: {other}"),
    }
}

fn next_backoff(current: Duration, max_backoff: Duration) -> Duration {
    let mut next = current.saturating_mul(2);
    if next > max_backoff {
        next = max_backoff;
    }
    next
}
