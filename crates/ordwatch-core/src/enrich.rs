//! Fee and feerate computation.

use bitcoin::Amount;
use serde::Serialize;

/// Resolved value totals and the derived fee figures of a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FeeSummary {
    /// `None` when some funding transaction could not be looked up.
    pub total_input: Option<Amount>,
    pub total_output: Amount,
    /// `None` without a known input total, or when outputs exceed it.
    pub fee: Option<Amount>,
    /// sat/vB. `None` without a fee or for a zero vsize.
    pub fee_rate: Option<f64>,
}

impl FeeSummary {
    pub fn new(total_input: Option<Amount>, total_output: Amount, vsize: u64) -> Self {
        let fee = total_input.and_then(|total_input| compute_fee(total_input, total_output));
        Self {
            total_input,
            total_output,
            fee,
            fee_rate: fee.and_then(|fee| compute_feerate(fee, vsize)),
        }
    }
}

/// Compute the transaction fee as sum(inputs) - sum(outputs).
#[must_use]
pub fn compute_fee(total_input: Amount, total_output: Amount) -> Option<Amount> {
    total_input.checked_sub(total_output)
}

/// Compute the feerate in sat/vB.
#[must_use]
pub fn compute_feerate(fee: Amount, vsize: u64) -> Option<f64> {
    if vsize == 0 {
        return None;
    }
    Some(fee.to_sat() as f64 / vsize as f64)
}

/// Sum amounts, failing on overflow.
pub fn checked_total(amounts: impl IntoIterator<Item = Amount>) -> Option<Amount> {
    amounts
        .into_iter()
        .try_fold(Amount::ZERO, |acc, value| acc.checked_add(value))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fee_summary_basic() {
        let summary = FeeSummary::new(
            Some(Amount::from_sat(150_000_000)),
            Amount::from_sat(149_990_000),
            250,
        );
        assert_eq!(summary.fee, Some(Amount::from_sat(10_000)));
        let rate = summary.fee_rate.expect("non-zero vsize");
        assert!((rate - 40.0).abs() < f64::EPSILON);
    }

    #[test]
    fn fee_is_none_when_outputs_exceed_inputs() {
        let summary = FeeSummary::new(Some(Amount::from_sat(1_000)), Amount::from_sat(2_000), 100);
        assert!(summary.fee.is_none());
        assert!(summary.fee_rate.is_none());
    }

    #[test]
    fn unknown_input_total_leaves_fee_unknown() {
        let summary = FeeSummary::new(None, Amount::from_sat(546), 150);
        assert_eq!(summary.total_output, Amount::from_sat(546));
        assert!(summary.fee.is_none());
        assert!(summary.fee_rate.is_none());
    }

    #[test]
    fn feerate_zero_vsize_is_none() {
        assert!(compute_feerate(Amount::from_sat(1_000), 0).is_none());
    }

    #[test]
    fn checked_total_sums_and_detects_overflow() {
        assert_eq!(
            checked_total([Amount::from_sat(5), Amount::from_sat(7)]),
            Some(Amount::from_sat(12))
        );
        assert!(checked_total([Amount::MAX, Amount::from_sat(1)]).is_none());
    }
}
