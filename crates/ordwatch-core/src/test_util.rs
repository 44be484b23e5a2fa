//! Shared test helpers for `ordwatch-core` unit tests.
//!
//! Consolidates builders for RPC records (`make_decoded_tx`, `make_block`),
//! domain types (`make_output`, `spending_input`), and inscription
//! envelopes (`envelope_asm`) so that tests across modules share one source
//! of truth for dummy data.

use bitcoin::hashes::Hash;
use bitcoin::{Amount, BlockHash, OutPoint, Txid};

use crate::rpc::types::{BlockInfo, DecodedTx};
use crate::types::{BlockHeight, TxInput, TxOutput};

// ==============================================================================
// Hash Helpers
// ==============================================================================

/// Create a deterministic `Txid` from a single distinguishing byte.
pub fn txid_from_byte(b: u8) -> Txid {
    let mut bytes = [0u8; 32];
    bytes[0] = b;
    Txid::from_byte_array(bytes)
}

pub fn block_hash_from_byte(b: u8) -> BlockHash {
    let mut bytes = [0u8; 32];
    bytes[31] = b;
    BlockHash::from_byte_array(bytes)
}

// ==============================================================================
// RPC Record Builders
// ==============================================================================

/// Build a `DecodedTx` with fixed size/vsize.
pub fn make_decoded_tx(txid: Txid, inputs: Vec<TxInput>, outputs: Vec<TxOutput>) -> DecodedTx {
    DecodedTx {
        txid,
        size: 250,
        vsize: 140,
        inputs,
        outputs,
    }
}

pub fn make_block(hash_byte: u8, height: u32, txids: Vec<Txid>) -> BlockInfo {
    BlockInfo {
        hash: block_hash_from_byte(hash_byte),
        height: BlockHeight(height),
        time: 1_700_000_000 + u64::from(height),
        txids,
    }
}

// ==============================================================================
// Domain Type Builders
// ==============================================================================

/// A spending input referencing `funding_txid:vout`, without witness.
pub fn spending_input(funding_txid: Txid, vout: u32) -> TxInput {
    witness_input(funding_txid, vout, Vec::new())
}

pub fn witness_input(funding_txid: Txid, vout: u32, witness: Vec<String>) -> TxInput {
    TxInput {
        prevout: Some(OutPoint::new(funding_txid, vout)),
        sequence: 0xFFFFFFFD,
        witness,
    }
}

pub fn make_output(sats: u64) -> TxOutput {
    TxOutput {
        address: "bcrt1qexampleaddress".to_owned(),
        value: Amount::from_sat(sats),
        n: 0,
    }
}

// ==============================================================================
// Envelope Builders
// ==============================================================================

/// An x-only key placeholder: 64 hex characters.
pub const TEST_XONLY_KEY: &str = "a5ba80e36bcdc8a2a0d4e7e23f7c0db6d935eb554f7f9b8c7c82c1a7d7e9f001";

/// Disassembly of a well-formed inscription tapscript, as `decodescript`
/// would print it. The payload is split into 520-byte pushes.
pub fn envelope_asm(content_type: &str, payload: &[u8]) -> String {
    let mut tokens = vec![
        TEST_XONLY_KEY.to_owned(),
        "OP_CHECKSIG".to_owned(),
        "0".to_owned(),
        "OP_IF".to_owned(),
        "6582895".to_owned(),
        "1".to_owned(),
        hex::encode(content_type),
        "0".to_owned(),
    ];
    tokens.extend(payload.chunks(520).map(hex::encode));
    tokens.push("OP_ENDIF".to_owned());
    tokens.join(" ")
}
