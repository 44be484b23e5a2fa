use std::collections::HashSet;
use std::num::NonZeroU32;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use bitcoin::{BlockHash, Txid};
use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use reqwest::header;
use tracing::{debug, trace};

use crate::error::{CoreError, RpcError};
use crate::types::BlockHeight;

use super::super::types::{BlockInfo, ChainInfo, DecodedTx};
use super::super::{BitcoinRpc, RpcFactory};
use super::connection::{parse_connection, resolve_auth};
use super::parsing::{
    parse_block_hash, parse_block_info, parse_decoded_tx, parse_mempool, parse_opt_block_hash,
};
use super::protocol::{decode_response_body, JsonRpcRequest};

type DirectRateLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Everything needed to open a connection to the node.
#[derive(Debug, Clone)]
pub struct HttpRpcConfig {
    /// `http://host:port`, `https://...`, or a bare `host:port`.
    pub url: String,
    pub user: Option<String>,
    pub pass: Option<String>,
    /// Bitcoin Core `.cookie` file, used when no user/pass is given.
    pub cookie_file: Option<PathBuf>,
    /// Client-side cap on outbound requests per second, per connection.
    pub requests_per_second: Option<u32>,
}

/// Bitcoin Core JSON-RPC client over HTTP(S).
///
/// Each instance owns its own `reqwest` connection pool. Dropping the
/// client and building a new one is how the pipeline "reconnects".
pub struct HttpRpcClient {
    client: reqwest::Client,
    url: String,
    auth: Option<(String, String)>,
    limiter: Option<DirectRateLimiter>,
    next_id: AtomicU64,
}

impl HttpRpcClient {
    /// Create a new client.
    ///
    /// Authentication precedence:
    /// 1. explicit `user` + `pass`
    /// 2. cookie file (`username:password`) from `cookie_file`
    /// 3. no auth
    pub fn new(config: &HttpRpcConfig) -> Result<Self, CoreError> {
        let auth = resolve_auth(
            config.user.as_deref(),
            config.pass.as_deref(),
            config.cookie_file.as_deref(),
        )?;
        let url = parse_connection(&config.url)?;

        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(30))
            .tcp_nodelay(true)
            .build()
            .map_err(RpcError::Transport)?;

        let limiter = match config.requests_per_second {
            None => None,
            Some(limit) => {
                let limit = NonZeroU32::new(limit).ok_or_else(|| {
                    CoreError::Config("requests_per_second must be at least 1".to_owned())
                })?;
                Some(RateLimiter::direct(Quota::per_second(limit)))
            }
        };

        Ok(Self {
            client,
            url,
            auth,
            limiter,
            next_id: AtomicU64::new(initial_request_id()),
        })
    }

    async fn wait_for_rate_limit(&self) {
        if let Some(limiter) = &self.limiter {
            limiter.until_ready().await;
        }
    }

    async fn rpc_call(
        &self,
        method: &str,
        params: Vec<serde_json::Value>,
    ) -> Result<serde_json::Value, CoreError> {
        self.wait_for_rate_limit().await;
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        debug!(
            rpc.id = id,
            rpc.method = method,
            rpc.params = params.len(),
            "rpc call"
        );
        let req = JsonRpcRequest {
            jsonrpc: "2.0",
            id,
            method,
            params,
        };

        let mut builder = self
            .client
            .post(&self.url)
            .header(header::CONTENT_TYPE, "application/json")
            .json(&req);
        if let Some((ref user, ref pass)) = self.auth {
            builder = builder.basic_auth(user, Some(pass));
        }

        let response = builder.send().await.map_err(RpcError::Transport)?;
        let status = response.status();

        let body = response.text().await.map_err(RpcError::Transport)?;
        debug!(rpc.id = id, rpc.method = method, %status, body_len = body.len(), "rpc response");
        trace!(rpc.id = id, rpc.method = method, body = %body, "rpc response body");

        decode_response_body(&body)
    }
}

#[async_trait]
impl BitcoinRpc for HttpRpcClient {
    async fn get_raw_transaction(&self, txid: &Txid) -> Result<String, CoreError> {
        let raw = self
            .rpc_call(
                "getrawtransaction",
                vec![serde_json::json!(txid.to_string())],
            )
            .await
            .map_err(|err| normalize_getrawtransaction_error(txid, err))?;

        raw.as_str().map(str::to_owned).ok_or_else(|| {
            CoreError::InvalidTxData(format!("getrawtransaction returned non-string: {raw}"))
        })
    }

    async fn decode_raw_transaction(&self, raw_hex: &str) -> Result<DecodedTx, CoreError> {
        let raw = self
            .rpc_call("decoderawtransaction", vec![serde_json::json!(raw_hex)])
            .await?;
        parse_decoded_tx(&raw)
    }

    async fn get_transaction_block_hash(
        &self,
        txid: &Txid,
    ) -> Result<Option<BlockHash>, CoreError> {
        let raw = self
            .rpc_call(
                "getrawtransaction",
                vec![serde_json::json!(txid.to_string()), serde_json::json!(true)],
            )
            .await
            .map_err(|err| normalize_getrawtransaction_error(txid, err))?;
        parse_opt_block_hash(raw.get("blockhash"))
    }

    async fn decode_script(&self, script_hex: &str) -> Result<String, CoreError> {
        let raw = self
            .rpc_call("decodescript", vec![serde_json::json!(script_hex)])
            .await?;
        raw.get("asm")
            .and_then(serde_json::Value::as_str)
            .map(str::to_owned)
            .ok_or_else(|| CoreError::InvalidTxData("decodescript result missing asm".into()))
    }

    async fn get_block(&self, block_hash: &BlockHash) -> Result<BlockInfo, CoreError> {
        let raw = self
            .rpc_call(
                "getblock",
                vec![
                    serde_json::json!(block_hash.to_string()),
                    serde_json::json!(1),
                ],
            )
            .await?;
        parse_block_info(&raw)
    }

    async fn get_block_hash(&self, height: BlockHeight) -> Result<BlockHash, CoreError> {
        let raw = self
            .rpc_call("getblockhash", vec![serde_json::json!(height.0)])
            .await?;
        parse_block_hash(Some(&raw), "getblockhash result")
    }

    async fn get_raw_mempool(&self) -> Result<HashSet<Txid>, CoreError> {
        let raw = self
            .rpc_call("getrawmempool", vec![serde_json::json!(false)])
            .await?;
        parse_mempool(&raw)
    }

    async fn get_blockchain_info(&self) -> Result<ChainInfo, CoreError> {
        let raw = self.rpc_call("getblockchaininfo", Vec::new()).await?;
        let info: ChainInfo = serde_json::from_value(raw).map_err(|e| {
            CoreError::InvalidTxData(format!("invalid getblockchaininfo result: {e}"))
        })?;
        Ok(info)
    }
}

// ==============================================================================
// Connection Factory
// ==============================================================================

/// Builds a fresh [`HttpRpcClient`] for every `connect` call.
pub struct HttpRpcFactory {
    config: HttpRpcConfig,
}

impl HttpRpcFactory {
    /// Validates the configuration by building one client up front.
    pub fn new(config: HttpRpcConfig) -> Result<Self, CoreError> {
        HttpRpcClient::new(&config)?;
        Ok(Self { config })
    }
}

impl RpcFactory for HttpRpcFactory {
    fn connect(&self) -> Result<Arc<dyn BitcoinRpc>, CoreError> {
        Ok(Arc::new(HttpRpcClient::new(&self.config)?))
    }
}

fn initial_request_id() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(1)
}

// ==============================================================================
// RPC Error Normalization
// ==============================================================================

/// Convert Bitcoin Core "missing tx" JSON-RPC responses into `TxNotFound`.
///
/// Callers skip missing transactions; they are never retried.
fn normalize_getrawtransaction_error(txid: &Txid, err: CoreError) -> CoreError {
    match err {
        CoreError::Rpc(RpcError::ServerError { code, message })
            if is_tx_not_found_server_error(code, &message) =>
        {
            CoreError::TxNotFound(*txid)
        }
        other => other,
    }
}

fn is_tx_not_found_server_error(code: i64, message: &str) -> bool {
    if code != -5 {
        return false;
    }

    let msg = message.to_ascii_lowercase();
    msg.contains("not found") || msg.contains("no such mempool or blockchain transaction")
}
