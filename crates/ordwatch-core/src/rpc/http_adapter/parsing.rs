use std::collections::HashSet;

use bitcoin::{Amount, BlockHash, OutPoint, Txid};

use crate::error::CoreError;
use crate::rpc::types::{BlockInfo, DecodedTx};
use crate::types::{BlockHeight, TxInput, TxOutput};

pub(super) fn parse_txid(
    value: Option<&serde_json::Value>,
    field: &str,
) -> Result<Txid, CoreError> {
    let value = value
        .and_then(serde_json::Value::as_str)
        .ok_or_else(|| CoreError::InvalidTxData(format!("missing {field}")))?;
    value
        .parse()
        .map_err(|e| CoreError::InvalidTxData(format!("invalid {field}: {e}")))
}

pub(super) fn parse_block_hash(
    value: Option<&serde_json::Value>,
    field: &str,
) -> Result<BlockHash, CoreError> {
    parse_opt_block_hash(value)?.ok_or_else(|| CoreError::InvalidTxData(format!("missing {field}")))
}

pub(super) fn parse_opt_block_hash(
    value: Option<&serde_json::Value>,
) -> Result<Option<BlockHash>, CoreError> {
    match value.and_then(serde_json::Value::as_str) {
        None => Ok(None),
        Some(s) => s
            .parse()
            .map(Some)
            .map_err(|e| CoreError::InvalidTxData(format!("invalid blockhash: {e}"))),
    }
}

pub(super) fn parse_integer_required<T, const SIGNED: bool>(
    value: Option<&serde_json::Value>,
    field: &str,
) -> Result<T, CoreError>
where
    T: TryFrom<i64> + TryFrom<u64>,
{
    parse_integer::<T, SIGNED, true>(value, field)?
        .ok_or_else(|| CoreError::InvalidTxData(format!("missing {field}")))
}

// Generic integer parser used by all concrete numeric helpers.
// `required=false` treats missing/null/type-mismatch as `Ok(None)`.
fn parse_integer<T, const SIGNED: bool, const REQUIRED: bool>(
    value: Option<&serde_json::Value>,
    field: &str,
) -> Result<Option<T>, CoreError>
where
    T: TryFrom<i64> + TryFrom<u64>,
{
    let missing_or_none = || {
        if REQUIRED {
            Err(CoreError::InvalidTxData(format!("missing {field}")))
        } else {
            Ok(None)
        }
    };

    let Some(value) = value else {
        return missing_or_none();
    };

    if SIGNED {
        let Some(n) = value.as_i64() else {
            return missing_or_none();
        };
        T::try_from(n)
            .map(Some)
            .map_err(|_| CoreError::InvalidTxData(format!("{field} out of range: {n}")))
    } else {
        let Some(n) = value.as_u64() else {
            return missing_or_none();
        };
        T::try_from(n)
            .map(Some)
            .map_err(|_| CoreError::InvalidTxData(format!("{field} out of range: {n}")))
    }
}

/// Map a `decoderawtransaction` result onto [`DecodedTx`].
pub(super) fn parse_decoded_tx(raw: &serde_json::Value) -> Result<DecodedTx, CoreError> {
    let txid = parse_txid(raw.get("txid"), "txid")?;
    let size = parse_integer_required::<u64, false>(raw.get("size"), "size")?;
    let vsize = parse_integer_required::<u64, false>(raw.get("vsize"), "vsize")?;

    let vin = raw
        .get("vin")
        .and_then(serde_json::Value::as_array)
        .ok_or_else(|| CoreError::InvalidTxData("missing vin array".into()))?;
    let vout = raw
        .get("vout")
        .and_then(serde_json::Value::as_array)
        .ok_or_else(|| CoreError::InvalidTxData("missing vout array".into()))?;

    Ok(DecodedTx {
        txid,
        size,
        vsize,
        inputs: parse_vin(vin)?,
        outputs: parse_vout(vout)?,
    })
}

pub(super) fn parse_vin(vin: &[serde_json::Value]) -> Result<Vec<TxInput>, CoreError> {
    vin.iter()
        .map(|input| {
            let sequence = parse_integer_required::<u32, false>(input.get("sequence"), "sequence")?;
            let is_coinbase = input.get("coinbase").is_some();

            let prevout = if is_coinbase {
                None
            } else {
                let prev_txid = parse_txid(input.get("txid"), "vin.txid")?;
                let prev_vout =
                    parse_integer_required::<u32, false>(input.get("vout"), "vin.vout")?;
                Some(OutPoint::new(prev_txid, prev_vout))
            };

            // Legacy (non-segwit) inputs carry no `txinwitness` at all.
            let witness = input
                .get("txinwitness")
                .and_then(serde_json::Value::as_array)
                .map(|items| {
                    items
                        .iter()
                        .filter_map(serde_json::Value::as_str)
                        .map(str::to_owned)
                        .collect()
                })
                .unwrap_or_default();

            Ok(TxInput {
                prevout,
                sequence,
                witness,
            })
        })
        .collect()
}

pub(super) fn parse_vout(vout: &[serde_json::Value]) -> Result<Vec<TxOutput>, CoreError> {
    vout.iter()
        .map(|output| {
            let value = parse_btc_amount(
                output
                    .get("value")
                    .ok_or_else(|| CoreError::InvalidTxData("missing value in vout".into()))?,
            )?;
            let n = parse_integer_required::<u32, false>(output.get("n"), "vout.n")?;

            let spk = output.get("scriptPubKey");
            let address = spk
                .and_then(|s| s.get("address"))
                .and_then(serde_json::Value::as_str)
                .or_else(|| {
                    // Pre-22.0 nodes report an `addresses` array instead.
                    spk.and_then(|s| s.get("addresses"))
                        .and_then(serde_json::Value::as_array)
                        .and_then(|a| a.first())
                        .and_then(serde_json::Value::as_str)
                })
                .unwrap_or_default()
                .to_owned();

            Ok(TxOutput { address, value, n })
        })
        .collect()
}

/// Map a `getblock` (verbosity 1) result onto [`BlockInfo`].
pub(super) fn parse_block_info(raw: &serde_json::Value) -> Result<BlockInfo, CoreError> {
    let hash = parse_block_hash(raw.get("hash"), "hash")?;
    let height = parse_integer_required::<u32, false>(raw.get("height"), "height")?;
    let time = parse_integer_required::<u64, false>(raw.get("time"), "time")?;
    let txids = raw
        .get("tx")
        .and_then(serde_json::Value::as_array)
        .ok_or_else(|| CoreError::InvalidTxData("missing tx array in block".into()))?
        .iter()
        .map(|txid| parse_txid(Some(txid), "block.tx"))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(BlockInfo {
        hash,
        height: BlockHeight(height),
        time,
        txids,
    })
}

/// `getrawmempool` returns an array of txids, or an object keyed by txid
/// when called verbose. Accept both.
pub(super) fn parse_mempool(raw: &serde_json::Value) -> Result<HashSet<Txid>, CoreError> {
    match raw {
        serde_json::Value::Array(items) => items
            .iter()
            .map(|txid| parse_txid(Some(txid), "mempool txid"))
            .collect(),
        serde_json::Value::Object(entries) => entries
            .keys()
            .map(|txid| {
                txid.parse()
                    .map_err(|e| CoreError::InvalidTxData(format!("invalid mempool txid: {e}")))
            })
            .collect(),
        other => Err(CoreError::InvalidTxData(format!(
            "unexpected getrawmempool result: {other}"
        ))),
    }
}

/// Parse a BTC amount from a JSON value into satoshis.
///
/// The conversion multiplies by 100,000,000 and truncates toward zero. It
/// works on the decimal text of the number rather than on `f64`, so values
/// such as `0.29` convert exactly instead of landing one satoshi short.
pub(super) fn parse_btc_amount(value: &serde_json::Value) -> Result<Amount, CoreError> {
    let text = match value {
        serde_json::Value::Number(n) => n.to_string(),
        serde_json::Value::String(s) => s.clone(),
        _ => {
            return Err(CoreError::InvalidTxData(format!(
                "expected numeric BTC amount, got: {value}"
            )))
        }
    };
    btc_text_to_sats(&text)
        .map(Amount::from_sat)
        .ok_or_else(|| CoreError::InvalidTxData(format!("invalid BTC amount `{text}`")))
}

fn btc_text_to_sats(text: &str) -> Option<u64> {
    let (mantissa, exponent) = match text.find(['e', 'E']) {
        Some(idx) => (&text[..idx], text[idx + 1..].parse::<i32>().ok()?),
        None => (text, 0),
    };
    let mantissa = mantissa.strip_prefix('+').unwrap_or(mantissa);
    let (int_part, frac_part) = mantissa.split_once('.').unwrap_or((mantissa, ""));
    if int_part.is_empty() && frac_part.is_empty() {
        return None;
    }
    if !int_part.bytes().chain(frac_part.bytes()).all(|b| b.is_ascii_digit()) {
        return None;
    }

    let digits = format!("{int_part}{frac_part}");
    let digits = digits.trim_start_matches('0');
    if digits.len() > 30 {
        return None;
    }
    let magnitude: u128 = if digits.is_empty() { 0 } else { digits.parse().ok()? };

    // sats = magnitude * 10^(8 + exponent - frac_len), truncated.
    let shift = 8 + exponent - i32::try_from(frac_part.len()).ok()?;
    let sats = if shift >= 0 {
        magnitude.checked_mul(10u128.checked_pow(u32::try_from(shift).ok()?)?)?
    } else {
        match 10u128.checked_pow(shift.unsigned_abs()) {
            Some(divisor) => magnitude / divisor,
            None => 0,
        }
    };
    u64::try_from(sats).ok()
}
