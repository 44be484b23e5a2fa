//! Inscription envelope decoding.
//!
//! An inscription lives in a taproot script-path witness as
//!
//! ```text
//! <32-byte key> OP_CHECKSIG [aux...] OP_FALSE OP_IF "ord" [aux...] OP_1
//! <content type> OP_0 <payload pushes...> OP_ENDIF
//! ```
//!
//! The decoder works on the node's `decodescript` disassembly, matching
//! token shapes only. It never validates signatures or script semantics,
//! and it never errors: anything that does not look like an envelope is
//! simply "no inscription".

use sha2::{Digest, Sha256};
use tracing::debug;

use crate::error::CoreError;
use crate::rpc::BitcoinRpc;
use crate::types::{InscriptionContent, Transaction};

/// `"ord"` pushed as three bytes, which the disassembler renders as the
/// little-endian script number 0x64726f.
const ORD_MAGIC: &str = "6582895";

/// Fetch the disassembly of `tx`'s envelope witness and decode it.
///
/// Returns `Ok(None)` when the transaction has no candidate witness element
/// or when the element is not an envelope. Only RPC failures are errors.
pub async fn extract_inscription(
    rpc: &dyn BitcoinRpc,
    tx: &Transaction,
) -> Result<Option<InscriptionContent>, CoreError> {
    let Some(witness_script) = tx.envelope_witness() else {
        return Ok(None);
    };

    let asm = rpc.decode_script(witness_script).await?;
    let inscription = decode_envelope(witness_script, &asm);
    if inscription.is_none() {
        debug!(txid = %tx.txid, "witness script is not an inscription envelope");
    }
    Ok(inscription)
}

/// Decode an envelope from `asm`, the disassembly of `witness_script_hex`.
///
/// The raw hex is consulted only when the disassembled payload pushes do
/// not concatenate into valid hex; see [`recover_payload_from_raw`].
pub fn decode_envelope(witness_script_hex: &str, asm: &str) -> Option<InscriptionContent> {
    let tokens: Vec<&str> = asm.split(' ').collect();

    // Structural anchors: key, checksig, and a closing endif.
    if tokens.len() < 2 || tokens[0].len() != 64 {
        return None;
    }
    if tokens[1] != "OP_CHECKSIG" || tokens.last() != Some(&"OP_ENDIF") {
        return None;
    }

    // Some inscribers put extra pushes and drops between the checksig and
    // the envelope, e.g. `756e69736174 aeb98c9e8601 OP_2DROP`.
    let marker = (2..tokens.len().saturating_sub(1))
        .find(|&i| tokens[i] == "0" && tokens[i + 1] == "OP_IF")?;

    if tokens.get(marker + 2) != Some(&ORD_MAGIC) {
        return None;
    }

    // More auxiliary fields may precede the content-type tag.
    let tag = (marker + 3..tokens.len()).find(|&i| tokens[i] == "1")?;
    let content_type = decode_content_type(tokens.get(tag + 1)?)?;
    if tokens.get(tag + 2) != Some(&"0") {
        return None;
    }

    // The disassembler emits a stray `-2` before the final endif on some
    // long payloads.
    let mut body_end = tokens.len() - 1;
    if tokens[body_end - 1] == "-2" {
        body_end -= 1;
    }
    let body = tokens.get(tag + 3..body_end).unwrap_or_default();
    let hex_data = body.concat();
    let content_length = hex_data.len() / 2;

    let payload = match hex::decode(&hex_data) {
        Ok(payload) => payload,
        Err(_) => recover_payload_from_raw(witness_script_hex, content_length)?,
    };

    Some(InscriptionContent {
        content_type,
        content_hash: content_hash(&payload),
        content_length: payload.len(),
        payload,
    })
}

/// Content types must be ASCII. Anything else is rejected rather than
/// decoded lossily.
fn decode_content_type(token: &str) -> Option<String> {
    let bytes = hex::decode(token).ok()?;
    if !bytes.is_ascii() {
        return None;
    }
    String::from_utf8(bytes).ok()
}

/// Recover the payload straight from the raw witness script.
///
/// When a payload push happens to disassemble as something other than hex
/// (a small number, an opcode name), the concatenated tokens are unusable.
/// The payload is still the tail of the script: the `2 * content_length`
/// hex characters right before the trailing `OP_ENDIF` byte.
fn recover_payload_from_raw(witness_script_hex: &str, content_length: usize) -> Option<Vec<u8>> {
    let end = witness_script_hex.len().checked_sub(2)?;
    let start = end.checked_sub(content_length * 2)?;
    hex::decode(witness_script_hex.get(start..end)?).ok()
}

pub fn content_hash(payload: &[u8]) -> String {
    hex::encode(Sha256::digest(payload))
}
