//! Domain types for the inscription pipeline.
//!
//! Contains the typed transaction model (`Transaction`, `TxInput`,
//! `TxOutput`), the containing-block summary (`BasicBlock`), and the
//! decoded inscription (`InscriptionContent`).

use bitcoin::{Amount, BlockHash, OutPoint, Txid};
use serde::{Deserialize, Serialize};

// ==============================================================================
// Block Height
// ==============================================================================

/// A Bitcoin block height, wrapped for type safety.
///
/// `#[serde(transparent)]` keeps the JSON representation a bare integer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BlockHeight(pub u32);

impl From<u32> for BlockHeight {
    fn from(h: u32) -> Self {
        Self(h)
    }
}

impl From<BlockHeight> for u32 {
    fn from(h: BlockHeight) -> Self {
        h.0
    }
}

impl std::ops::Deref for BlockHeight {
    type Target = u32;
    fn deref(&self) -> &u32 {
        &self.0
    }
}

impl std::fmt::Display for BlockHeight {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

// ==============================================================================
// Basic Block
// ==============================================================================

/// The block a transaction was mined in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BasicBlock {
    pub block_hash: BlockHash,
    pub block_height: BlockHeight,
    /// Header timestamp, unix seconds.
    pub timestamp: u64,
}

// ==============================================================================
// Transaction Types
// ==============================================================================

/// A transaction input. For coinbase inputs, `prevout` is `None`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TxInput {
    /// The outpoint being spent. `None` for coinbase inputs.
    pub prevout: Option<OutPoint>,
    pub sequence: u32,
    /// Hex-encoded witness stack elements. Never serialized: the metadata
    /// sidecar carries the transaction without witness data.
    #[serde(skip)]
    pub witness: Vec<String>,
}

/// A transaction output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TxOutput {
    /// Destination address, or empty for outputs without one (OP_RETURN,
    /// bare scripts).
    pub address: String,
    pub value: Amount,
    pub n: u32,
}

/// A transaction together with its containing block.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    #[serde(rename = "tx_id")]
    pub txid: Txid,
    /// `None` while the transaction is still in the mempool.
    pub block: Option<BasicBlock>,
    pub size: u64,
    pub vsize: u64,
    #[serde(rename = "vin")]
    pub inputs: Vec<TxInput>,
    #[serde(rename = "vout")]
    pub outputs: Vec<TxOutput>,
}

impl Transaction {
    pub fn is_mempool(&self) -> bool {
        self.block.is_none()
    }

    /// The witness element that carries an inscription envelope: the
    /// second stack item of the first input.
    pub fn envelope_witness(&self) -> Option<&str> {
        self.inputs
            .first()
            .and_then(|input| input.witness.get(1))
            .map(String::as_str)
    }
}

// ==============================================================================
// Inscription Content
// ==============================================================================

/// An inscription decoded from a witness envelope.
#[derive(Clone, PartialEq, Eq)]
pub struct InscriptionContent {
    pub content_type: String,
    /// Lowercase hex SHA-256 of `payload`.
    pub content_hash: String,
    pub content_length: usize,
    pub payload: Vec<u8>,
}

impl InscriptionContent {
    pub fn is_image(&self) -> bool {
        self.content_type.starts_with("image/")
    }
}

// Payloads are routinely tens of kilobytes; keep them out of log lines.
impl std::fmt::Debug for InscriptionContent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InscriptionContent")
            .field("content_type", &self.content_type)
            .field("content_hash", &self.content_hash)
            .field("content_length", &self.content_length)
            .finish_non_exhaustive()
    }
}
