use chrono::{DateTime, Duration, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

use crate::{
    error::SplitPaymentError,
    models::{MAX_PAYMENT_TERMS_DAYS, SplitPaymentConfig},
};

/// Digits kept after the decimal point for every stored amount.
pub const MINOR_UNIT_DP: u32 = 2;

/// Largest amount a `NUMERIC(14, 2)` column holds.
pub fn max_amount() -> Decimal {
    Decimal::new(99_999_999_999_999, MINOR_UNIT_DP)
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct AmountSplit {
    pub deposit_amount: Decimal,
    pub remaining_amount: Decimal,
    pub due_date: DateTime<Utc>,
}

/// Rounds half away from zero to the minor unit and pins the scale, so
/// amounts always render with two decimals ("300.00", not "300").
pub fn round_minor(amount: Decimal) -> Decimal {
    let mut rounded =
        amount.round_dp_with_strategy(MINOR_UNIT_DP, RoundingStrategy::MidpointAwayFromZero);
    rounded.rescale(MINOR_UNIT_DP);
    rounded
}

pub fn order_total(quantity: i32, unit_price: Decimal) -> Result<Decimal, SplitPaymentError> {
    if quantity <= 0 {
        return Err(SplitPaymentError::InvalidInput(
            "quantity must be positive".to_string(),
        ));
    }
    if unit_price <= Decimal::ZERO {
        return Err(SplitPaymentError::InvalidInput(
            "unit_price must be positive".to_string(),
        ));
    }

    let total = unit_price
        .checked_mul(Decimal::from(quantity))
        .map(round_minor)
        .ok_or_else(|| overflow("order total"))?;
    if total > max_amount() {
        return Err(overflow("order total"));
    }

    Ok(total)
}

fn overflow(what: &str) -> SplitPaymentError {
    SplitPaymentError::InvalidInput(format!("{what} exceeds the supported range"))
}

pub fn split(
    total_amount: Decimal,
    deposit_percentage: i32,
    terms_days: i32,
) -> Result<AmountSplit, SplitPaymentError> {
    split_at(total_amount, deposit_percentage, terms_days, Utc::now())
}

/// Splits `total_amount` into a deposit and a remainder. Only the deposit is
/// rounded; the remainder is the exact difference so both legs always add up
/// to the total.
pub fn split_at(
    total_amount: Decimal,
    deposit_percentage: i32,
    terms_days: i32,
    now: DateTime<Utc>,
) -> Result<AmountSplit, SplitPaymentError> {
    if !(1..=99).contains(&deposit_percentage) {
        return Err(SplitPaymentError::InvalidInput(
            "deposit percentage must be between 1 and 99".to_string(),
        ));
    }
    if total_amount < Decimal::ZERO {
        return Err(SplitPaymentError::InvalidInput(
            "total amount must not be negative".to_string(),
        ));
    }
    if total_amount > max_amount() {
        return Err(overflow("total amount"));
    }
    if !(0..=MAX_PAYMENT_TERMS_DAYS).contains(&terms_days) {
        return Err(SplitPaymentError::InvalidInput(format!(
            "payment terms must be between 0 and {MAX_PAYMENT_TERMS_DAYS} days"
        )));
    }

    let total_amount = round_minor(total_amount);
    let deposit_amount = total_amount
        .checked_mul(Decimal::from(deposit_percentage))
        .and_then(|scaled| scaled.checked_div(Decimal::ONE_HUNDRED))
        .map(round_minor)
        .ok_or_else(|| overflow("deposit amount"))?;
    let remaining_amount = total_amount - deposit_amount;
    let due_date = Duration::try_days(i64::from(terms_days))
        .and_then(|terms| now.checked_add_signed(terms))
        .ok_or_else(|| overflow("due date"))?;

    Ok(AmountSplit {
        deposit_amount,
        remaining_amount,
        due_date,
    })
}

/// Late fee owed on the remaining balance at `now`. Zero until the grace
/// period after `due_date` has fully elapsed.
pub fn late_fee(
    remaining_amount: Decimal,
    config: &SplitPaymentConfig,
    due_date: DateTime<Utc>,
    now: DateTime<Utc>,
) -> Decimal {
    if !config.late_fee_enabled {
        return Decimal::ZERO;
    }

    let grace_ends = Duration::try_days(i64::from(config.grace_period_days.max(0)))
        .and_then(|grace| due_date.checked_add_signed(grace));
    match grace_ends {
        Some(grace_ends) if now > grace_ends => {}
        _ => return Decimal::ZERO,
    }

    remaining_amount
        .checked_mul(config.late_fee_percentage)
        .and_then(|scaled| scaled.checked_div(Decimal::ONE_HUNDRED))
        .map(round_minor)
        .unwrap_or(Decimal::ZERO)
}
