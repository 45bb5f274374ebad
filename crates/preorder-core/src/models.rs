use std::{collections::BTreeSet, fmt, str::FromStr};

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::SplitPaymentError;

pub const TAG_SPLIT_PAYMENT: &str = "split-payment";
pub const TAG_DEPOSIT: &str = "deposit";
pub const TAG_FINAL_PAYMENT: &str = "final-payment";

pub const MAX_PAYMENT_TERMS_DAYS: i32 = 3650;
pub const MAX_GRACE_PERIOD_DAYS: i32 = 365;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum SplitPaymentStatus {
    PendingDeposit,
    DepositPaid,
    Completed,
    Cancelled,
    Refunded,
}

impl SplitPaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PendingDeposit => "pending_deposit",
            Self::DepositPaid => "deposit_paid",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
            Self::Refunded => "refunded",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled | Self::Refunded)
    }
}

impl fmt::Display for SplitPaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SplitPaymentStatus {
    type Err = SplitPaymentError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "pending_deposit" => Ok(Self::PendingDeposit),
            "deposit_paid" => Ok(Self::DepositPaid),
            "completed" => Ok(Self::Completed),
            "cancelled" => Ok(Self::Cancelled),
            "refunded" => Ok(Self::Refunded),
            other => Err(SplitPaymentError::InvalidInput(format!(
                "unknown split payment status: {other}"
            ))),
        }
    }
}

/// Per-shop split payment settings. A shop without a stored config behaves
/// as if `enabled` were false.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SplitPaymentConfig {
    pub shop_id: String,
    pub enabled: bool,
    pub default_percentage: i32,
    pub minimum_deposit: i32,
    pub maximum_deposit: i32,
    pub payment_terms_days: i32,
    pub auto_charge_remaining: bool,
    pub send_payment_reminders: bool,
    pub reminder_days_before: Vec<i32>,
    pub late_fee_enabled: bool,
    pub late_fee_percentage: Decimal,
    pub grace_period_days: i32,
    pub updated_at: DateTime<Utc>,
}

impl SplitPaymentConfig {
    pub fn new(shop_id: impl Into<String>) -> Self {
        Self {
            shop_id: shop_id.into(),
            enabled: false,
            default_percentage: 30,
            minimum_deposit: 10,
            maximum_deposit: 90,
            payment_terms_days: 30,
            auto_charge_remaining: false,
            send_payment_reminders: true,
            reminder_days_before: vec![7, 3, 1],
            late_fee_enabled: false,
            late_fee_percentage: Decimal::new(5, 0),
            grace_period_days: 3,
            updated_at: Utc::now(),
        }
    }

    /// Checks the percentage bounds and normalizes `reminder_days_before`
    /// into a descending list without duplicates.
    pub fn validate(mut self) -> Result<Self, SplitPaymentError> {
        for (field, value) in [
            ("default_percentage", self.default_percentage),
            ("minimum_deposit", self.minimum_deposit),
            ("maximum_deposit", self.maximum_deposit),
        ] {
            if !(1..=99).contains(&value) {
                return Err(SplitPaymentError::InvalidInput(format!(
                    "{field} must be between 1 and 99"
                )));
            }
        }

        if self.minimum_deposit > self.default_percentage
            || self.default_percentage > self.maximum_deposit
        {
            return Err(SplitPaymentError::InvalidInput(
                "minimum_deposit <= default_percentage <= maximum_deposit must hold".to_string(),
            ));
        }
        if !(0..=MAX_PAYMENT_TERMS_DAYS).contains(&self.payment_terms_days) {
            return Err(SplitPaymentError::InvalidInput(format!(
                "payment_terms_days must be between 0 and {MAX_PAYMENT_TERMS_DAYS}"
            )));
        }
        if !(0..=MAX_GRACE_PERIOD_DAYS).contains(&self.grace_period_days) {
            return Err(SplitPaymentError::InvalidInput(format!(
                "grace_period_days must be between 0 and {MAX_GRACE_PERIOD_DAYS}"
            )));
        }
        if self.late_fee_percentage < Decimal::ZERO
            || self.late_fee_percentage > Decimal::ONE_HUNDRED
        {
            return Err(SplitPaymentError::InvalidInput(
                "late_fee_percentage must be between 0 and 100".to_string(),
            ));
        }
        // Stored as NUMERIC(5, 2).
        if self.late_fee_percentage.normalize().scale() > 2 {
            return Err(SplitPaymentError::InvalidInput(
                "late_fee_percentage allows at most two decimal places".to_string(),
            ));
        }
        if self
            .reminder_days_before
            .iter()
            .any(|days| !(0..=MAX_PAYMENT_TERMS_DAYS).contains(days))
        {
            return Err(SplitPaymentError::InvalidInput(format!(
                "reminder_days_before offsets must be between 0 and {MAX_PAYMENT_TERMS_DAYS}"
            )));
        }

        self.reminder_days_before.sort_unstable_by(|a, b| b.cmp(a));
        self.reminder_days_before.dedup();

        Ok(self)
    }

    pub fn accepts_percentage(&self, percentage: i32) -> bool {
        (self.minimum_deposit..=self.maximum_deposit).contains(&percentage)
    }
}

/// Installed shop and the credentials used against the order platform.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Shop {
    pub shop_id: String,
    pub shop_domain: String,
    pub access_token: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BuyerInfo {
    pub email: String,
    pub name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LineInfo {
    pub product_id: String,
    pub variant_id: Option<String>,
    pub product_title: String,
    pub variant_title: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Address {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub address1: String,
    pub address2: Option<String>,
    pub city: String,
    pub province: Option<String>,
    pub zip: String,
    pub country: String,
    pub phone: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Addresses {
    pub shipping: Option<Address>,
    pub billing: Option<Address>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SplitPaymentOrder {
    pub id: Uuid,
    pub shop_id: String,
    pub customer_email: String,
    pub customer_name: Option<String>,
    pub product_id: String,
    pub variant_id: Option<String>,
    pub product_title: String,
    pub variant_title: Option<String>,
    pub quantity: i32,
    pub unit_price: Decimal,
    pub currency: String,
    pub total_amount: Decimal,
    pub deposit_percentage: i32,
    pub deposit_amount: Decimal,
    pub remaining_amount: Decimal,
    pub deposit_order_ref: Option<String>,
    pub remaining_order_ref: Option<String>,
    pub deposit_paid_order_id: Option<String>,
    pub remaining_paid_order_id: Option<String>,
    pub deposit_paid: bool,
    pub remaining_paid: bool,
    pub deposit_refunded: bool,
    pub remaining_refunded: bool,
    pub deposit_paid_at: Option<DateTime<Utc>>,
    pub remaining_paid_at: Option<DateTime<Utc>>,
    pub remaining_invoice_sent_at: Option<DateTime<Utc>>,
    pub due_date: DateTime<Utc>,
    pub status: SplitPaymentStatus,
    pub notes: Option<String>,
    pub tags: BTreeSet<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SplitPaymentOrder {
    /// Appends a line to `notes`, keeping earlier entries.
    pub fn append_note(&mut self, line: &str) {
        let line = line.trim();
        if line.is_empty() {
            return;
        }

        self.notes = Some(match self.notes.take() {
            Some(existing) if !existing.is_empty() => format!("{existing}\n{line}"),
            _ => line.to_string(),
        });
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ActivityLogEntry {
    pub id: Uuid,
    pub shop_id: String,
    pub action: String,
    pub resource_id: Option<String>,
    pub details: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl ActivityLogEntry {
    pub fn new(
        shop_id: impl Into<String>,
        action: impl Into<String>,
        resource_id: Option<String>,
        details: serde_json::Value,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            shop_id: shop_id.into(),
            action: action.into(),
            resource_id,
            details,
            created_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_rejects_default_outside_bounds() {
        let mut config = SplitPaymentConfig::new("shop-1");
        config.minimum_deposit = 40;
        config.default_percentage = 30;

        let err = config.validate().unwrap_err();
        assert!(matches!(err, SplitPaymentError::InvalidInput(_)));
    }

    #[test]
    fn config_rejects_percentages_outside_one_to_ninety_nine() {
        let mut config = SplitPaymentConfig::new("shop-1");
        config.maximum_deposit = 100;

        assert!(config.validate().is_err());
    }

    #[test]
    fn config_caps_day_counts() {
        let mut config = SplitPaymentConfig::new("shop-1");
        config.payment_terms_days = 1_000_000_000;
        assert!(matches!(
            config.validate(),
            Err(SplitPaymentError::InvalidInput(_))
        ));

        let mut config = SplitPaymentConfig::new("shop-1");
        config.grace_period_days = MAX_GRACE_PERIOD_DAYS + 1;
        assert!(config.validate().is_err());

        let mut config = SplitPaymentConfig::new("shop-1");
        config.payment_terms_days = MAX_PAYMENT_TERMS_DAYS;
        config.grace_period_days = MAX_GRACE_PERIOD_DAYS;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn config_rejects_late_fee_finer_than_cents() {
        let mut config = SplitPaymentConfig::new("shop-1");
        config.late_fee_percentage = Decimal::new(2555, 3);
        assert!(config.validate().is_err());

        let mut config = SplitPaymentConfig::new("shop-1");
        config.late_fee_percentage = Decimal::new(2500, 3);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn config_normalizes_reminder_offsets() {
        let mut config = SplitPaymentConfig::new("shop-1");
        config.reminder_days_before = vec![1, 7, 3, 7];

        let config = config.validate().unwrap();
        assert_eq!(config.reminder_days_before, vec![7, 3, 1]);
    }

    #[test]
    fn status_round_trips_through_its_string_form() {
        for status in [
            SplitPaymentStatus::PendingDeposit,
            SplitPaymentStatus::DepositPaid,
            SplitPaymentStatus::Completed,
            SplitPaymentStatus::Cancelled,
            SplitPaymentStatus::Refunded,
        ] {
            assert_eq!(status.as_str().parse::<SplitPaymentStatus>().unwrap(), status);
        }
        assert!("archived".parse::<SplitPaymentStatus>().is_err());
    }

    #[test]
    fn append_note_keeps_history() {
        let mut order = sample_order();
        order.append_note("first");
        order.append_note("  ");
        order.append_note("second");

        assert_eq!(order.notes.as_deref(), Some("first\nsecond"));
    }

    fn sample_order() -> SplitPaymentOrder {
        let now = Utc::now();
        SplitPaymentOrder {
            id: Uuid::new_v4(),
            shop_id: "shop-1".to_string(),
            customer_email: "buyer@example.com".to_string(),
            customer_name: None,
            product_id: "p-1".to_string(),
            variant_id: None,
            product_title: "Lamp".to_string(),
            variant_title: None,
            quantity: 1,
            unit_price: Decimal::new(1000, 0),
            currency: "USD".to_string(),
            total_amount: Decimal::new(1000, 0),
            deposit_percentage: 30,
            deposit_amount: Decimal::new(300, 0),
            remaining_amount: Decimal::new(700, 0),
            deposit_order_ref: None,
            remaining_order_ref: None,
            deposit_paid_order_id: None,
            remaining_paid_order_id: None,
            deposit_paid: false,
            remaining_paid: false,
            deposit_refunded: false,
            remaining_refunded: false,
            deposit_paid_at: None,
            remaining_paid_at: None,
            remaining_invoice_sent_at: None,
            due_date: now,
            status: SplitPaymentStatus::PendingDeposit,
            notes: None,
            tags: BTreeSet::new(),
            created_at: now,
            updated_at: now,
        }
    }
}
