//! # Record Transformer
//!
//! Pure mapping from a [`Transaction`] to the [`RewardEvent`] it earns.

use bigdecimal::{BigDecimal, ToPrimitive, Zero};

use crate::constants::rewards::CURRENCY_UNITS_PER_POINT;
use crate::error::{BatchError, Result};
use crate::models::{RewardEvent, Transaction};

/// Converts one input record into one output record
///
/// Implementations must be free of side effects; the only expected failure is a value
/// that cannot be represented in the output.
pub trait RecordTransformer: Send + Sync {
    fn transform(&self, transaction: &Transaction) -> Result<RewardEvent>;
}

/// One point per ten currency units, truncated toward zero
#[derive(Debug, Clone, Copy, Default)]
pub struct RewardCalculator;

impl RecordTransformer for RewardCalculator {
    fn transform(&self, transaction: &Transaction) -> Result<RewardEvent> {
        let points = calculate_points(&transaction.amount).ok_or_else(|| {
            BatchError::NumericOverflow {
                customer_id: transaction.customer_id.clone(),
                amount: scientific(&transaction.amount),
            }
        })?;

        Ok(RewardEvent {
            customer_id: transaction.customer_id.clone(),
            points,
            amount: transaction.amount.clone(),
            timestamp: transaction.timestamp,
        })
    }
}

/// Integer digits beyond which `amount / 10` can never fit in an `i32`
const MAX_WHOLE_DIGITS: i64 = 12;

/// `trunc(amount / 10)`, or `None` when the result does not fit in an `i32`
///
/// The magnitude is bounded from the digit count and exponent before rescaling, so an
/// amount such as `1e100000000` is rejected without materialising its integer value.
pub fn calculate_points(amount: &BigDecimal) -> Option<i32> {
    if amount.is_zero() {
        return Some(0);
    }

    let (_, scale) = amount.as_bigint_and_exponent();
    let whole_digits = i64::try_from(amount.digits()).ok()?.checked_sub(scale)?;
    if whole_digits <= 0 {
        // |amount| < 1
        return Some(0);
    }
    if whole_digits > MAX_WHOLE_DIGITS {
        return None;
    }

    // with_scale(0) drops the fraction toward zero, so 9.99 -> 9 and -15.5 -> -15
    let whole_units = amount.with_scale(0).to_i64()?;
    i32::try_from(whole_units / CURRENCY_UNITS_PER_POINT).ok()
}

/// `<mantissa>e<exponent>`, bounded by the input's own length
fn scientific(amount: &BigDecimal) -> String {
    let (mantissa, scale) = amount.as_bigint_and_exponent();
    format!("{mantissa}e{}", -scale)
}
