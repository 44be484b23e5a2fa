//! Building the typed transaction model from RPC responses.
//!
//! Nothing here is cached: every lookup goes back to the node, so a
//! transaction fetched twice reflects whatever the node knows at the time.

use bitcoin::{Amount, BlockHash, Txid};
use futures::future::try_join_all;
use serde::Serialize;
use time::macros::format_description;
use time::OffsetDateTime;
use tracing::debug;

use crate::enrich::{checked_total, FeeSummary};
use crate::error::CoreError;
use crate::rpc::{BitcoinRpc, DecodedTx};
use crate::types::{BasicBlock, BlockHeight, InscriptionContent, Transaction, TxInput};

// ==============================================================================
// Blocks
// ==============================================================================

impl BasicBlock {
    pub async fn from_block_hash(
        rpc: &dyn BitcoinRpc,
        block_hash: &BlockHash,
    ) -> Result<Self, CoreError> {
        let block = rpc.get_block(block_hash).await?;
        Ok(Self {
            block_hash: block.hash,
            block_height: block.height,
            timestamp: block.time,
        })
    }

    pub async fn from_block_height(
        rpc: &dyn BitcoinRpc,
        height: BlockHeight,
    ) -> Result<Self, CoreError> {
        let block_hash = rpc.get_block_hash(height).await?;
        Self::from_block_hash(rpc, &block_hash).await
    }

    /// The block containing `txid`, or `None` if it is unconfirmed or the
    /// node no longer knows it.
    pub async fn from_txid(rpc: &dyn BitcoinRpc, txid: &Txid) -> Result<Option<Self>, CoreError> {
        let block_hash = match rpc.get_transaction_block_hash(txid).await {
            Ok(Some(hash)) => hash,
            Ok(None) | Err(CoreError::TxNotFound(_)) => return Ok(None),
            Err(err) => return Err(err),
        };
        Self::from_block_hash(rpc, &block_hash).await.map(Some)
    }

    /// Header time as `YYYY-MM-DD HH:MM:SS`, UTC.
    pub fn datetime(&self) -> Option<String> {
        let format = format_description!("[year]-[month]-[day] [hour]:[minute]:[second]");
        let timestamp = i64::try_from(self.timestamp).ok()?;
        OffsetDateTime::from_unix_timestamp(timestamp)
            .ok()?
            .format(&format)
            .ok()
    }
}

// ==============================================================================
// Transactions
// ==============================================================================

impl Transaction {
    /// Fetch, decode, and attach the containing block.
    pub async fn fetch(rpc: &dyn BitcoinRpc, txid: &Txid) -> Result<Self, CoreError> {
        let decoded = rpc.get_transaction(txid).await?;
        Self::from_decoded(rpc, decoded).await
    }

    pub async fn from_decoded(rpc: &dyn BitcoinRpc, decoded: DecodedTx) -> Result<Self, CoreError> {
        let block = BasicBlock::from_txid(rpc, &decoded.txid).await?;
        Ok(Self {
            txid: decoded.txid,
            block,
            size: decoded.size,
            vsize: decoded.vsize,
            inputs: decoded.inputs,
            outputs: decoded.outputs,
        })
    }

    pub fn total_output(&self) -> Result<Amount, CoreError> {
        checked_total(self.outputs.iter().map(|output| output.value))
            .ok_or_else(|| CoreError::InvalidTxData(format!("output total overflow in {}", self.txid)))
    }

    /// Resolve every input's value by fetching its funding transaction.
    /// One decoded-transaction lookup per input, issued concurrently.
    /// `None` if any input's value is unknown.
    pub async fn total_input(&self, rpc: &dyn BitcoinRpc) -> Result<Option<Amount>, CoreError> {
        let values = try_join_all(self.inputs.iter().map(|input| input_value(rpc, input))).await?;
        let Some(values) = values.into_iter().collect::<Option<Vec<_>>>() else {
            return Ok(None);
        };
        checked_total(values)
            .map(Some)
            .ok_or_else(|| CoreError::InvalidTxData(format!("input total overflow in {}", self.txid)))
    }

    pub async fn fee_summary(&self, rpc: &dyn BitcoinRpc) -> Result<FeeSummary, CoreError> {
        let total_input = self.total_input(rpc).await?;
        Ok(FeeSummary::new(total_input, self.total_output()?, self.vsize))
    }
}

/// Value of the output an input spends. Coinbase inputs spend nothing.
///
/// `None` when the funding transaction or the spent output cannot be found,
/// as happens for confirmed funding transactions on nodes without `-txindex`.
pub async fn input_value(rpc: &dyn BitcoinRpc, input: &TxInput) -> Result<Option<Amount>, CoreError> {
    let Some(prevout) = input.prevout else {
        return Ok(Some(Amount::ZERO));
    };
    let funding = match rpc.get_transaction(&prevout.txid).await {
        Ok(funding) => funding,
        Err(CoreError::TxNotFound(_)) => {
            debug!(funding_txid = %prevout.txid, "funding transaction unavailable");
            return Ok(None);
        }
        Err(err) => return Err(err),
    };
    let value = funding
        .outputs
        .get(prevout.vout as usize)
        .map(|output| output.value);
    if value.is_none() {
        debug!(funding_txid = %prevout.txid, vout = prevout.vout, "spent output missing");
    }
    Ok(value)
}

// ==============================================================================
// Artifact Metadata
// ==============================================================================

/// The JSON sidecar written next to an inscription payload.
///
/// Serializes as the transaction (without witness data) with the fee
/// figures and inscription fields merged in at the top level.
#[derive(Debug, Serialize)]
pub struct ArtifactMetadata<'a> {
    #[serde(flatten)]
    pub tx: &'a Transaction,
    #[serde(flatten)]
    pub fees: FeeSummary,
    pub content_type: &'a str,
    pub content_hash: &'a str,
    pub content_length: usize,
    /// When the artifact was produced, unix seconds.
    pub timestamp: i64,
    pub datetime: String,
}

impl<'a> ArtifactMetadata<'a> {
    pub fn new(
        tx: &'a Transaction,
        fees: FeeSummary,
        inscription: &'a InscriptionContent,
        now: OffsetDateTime,
    ) -> Self {
        let format = format_description!("[year]-[month]-[day] [hour]:[minute]:[second] UTC");
        let now = now.to_offset(time::UtcOffset::UTC);
        Self {
            tx,
            fees,
            content_type: &inscription.content_type,
            content_hash: &inscription.content_hash,
            content_length: inscription.content_length,
            timestamp: now.unix_timestamp(),
            datetime: now.format(&format).unwrap_or_default(),
        }
    }
}
