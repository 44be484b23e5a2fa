//! Bitcoin Core RPC abstraction layer.
//!
//! Defines the [`BitcoinRpc`] trait and the [`RpcFactory`] used to obtain
//! fresh connections, and provides an HTTP JSON-RPC implementation
//! ([`HttpRpcClient`]) plus a test mock (`mock::MockRpc`).

mod http_adapter;
#[cfg(test)]
pub mod mock;
pub mod types;

use std::collections::HashSet;
use std::sync::Arc;

pub use http_adapter::{HttpRpcClient, HttpRpcConfig, HttpRpcFactory};
pub use types::{BlockInfo, ChainInfo, DecodedTx};

use async_trait::async_trait;
use bitcoin::{BlockHash, Txid};

use crate::error::CoreError;
use crate::types::BlockHeight;

/// Minimal trait covering the Bitcoin Core RPC methods the pipeline needs.
///
/// Implementations are expected to handle authentication and response
/// deserialization internally. A handle is not assumed to survive a
/// transport failure; callers obtain a new one from an [`RpcFactory`].
#[async_trait]
pub trait BitcoinRpc: Send + Sync {
    /// `getrawtransaction <txid>`: the serialized transaction as hex.
    async fn get_raw_transaction(&self, txid: &Txid) -> Result<String, CoreError>;

    /// `decoderawtransaction <hex>`.
    async fn decode_raw_transaction(&self, raw_hex: &str) -> Result<DecodedTx, CoreError>;

    /// Fetch and decode a transaction in two round-trips.
    async fn get_transaction(&self, txid: &Txid) -> Result<DecodedTx, CoreError> {
        let raw_hex = self.get_raw_transaction(txid).await?;
        self.decode_raw_transaction(&raw_hex).await
    }

    /// `getrawtransaction <txid> true`, reduced to its `blockhash`.
    /// Returns `None` for transactions that are still in the mempool.
    async fn get_transaction_block_hash(&self, txid: &Txid)
        -> Result<Option<BlockHash>, CoreError>;

    /// `decodescript <hex>`: the script's `asm` disassembly.
    async fn decode_script(&self, script_hex: &str) -> Result<String, CoreError>;

    /// `getblock <hash>` at verbosity 1.
    async fn get_block(&self, block_hash: &BlockHash) -> Result<BlockInfo, CoreError>;

    /// `getblockhash <height>`.
    async fn get_block_hash(&self, height: BlockHeight) -> Result<BlockHash, CoreError>;

    /// `getrawmempool`: the txids currently in the node's mempool.
    async fn get_raw_mempool(&self) -> Result<HashSet<Txid>, CoreError>;

    /// Fetch basic chain info (network, block count, pruning status).
    async fn get_blockchain_info(&self) -> Result<ChainInfo, CoreError>;
}

/// Produces RPC handles. Each retry unit asks for its own handle, and
/// asks again after a failure; nothing shares a handle across workers.
pub trait RpcFactory: Send + Sync {
    fn connect(&self) -> Result<Arc<dyn BitcoinRpc>, CoreError>;
}
