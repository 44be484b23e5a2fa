//! RPC-specific types that do not belong to the shared domain model.
//!
//! Decoded transaction inputs and outputs are represented directly as
//! [`TxInput`] / [`TxOutput`] from `crate::types`; this module only defines
//! the per-method response records.

use bitcoin::{BlockHash, Txid};
use serde::Deserialize;

use crate::types::{BlockHeight, TxInput, TxOutput};

// ==============================================================================
// Chain Info
// ==============================================================================

/// Basic chain information from `getblockchaininfo`.
#[derive(Debug, Clone, Deserialize)]
pub struct ChainInfo {
    pub chain: String,
    pub blocks: u64,
    #[serde(rename = "bestblockhash")]
    pub best_block_hash: BlockHash,
    pub pruned: bool,
}

// ==============================================================================
// Decoded Transaction
// ==============================================================================

/// A transaction as returned by `decoderawtransaction`.
///
/// This carries no block information: the decoded form only knows about
/// the serialized bytes. Block context is looked up separately.
#[derive(Debug, Clone)]
pub struct DecodedTx {
    pub txid: Txid,
    pub size: u64,
    pub vsize: u64,
    pub inputs: Vec<TxInput>,
    pub outputs: Vec<TxOutput>,
}

// ==============================================================================
// Block
// ==============================================================================

/// The subset of `getblock` (verbosity 1) that the pipeline reads.
#[derive(Debug, Clone)]
pub struct BlockInfo {
    pub hash: BlockHash,
    pub height: BlockHeight,
    /// Block header timestamp, unix seconds.
    pub time: u64,
    pub txids: Vec<Txid>,
}
