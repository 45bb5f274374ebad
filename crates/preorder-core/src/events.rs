use serde::{Deserialize, Serialize};

use crate::{
    error::SplitPaymentError,
    models::{TAG_DEPOSIT, TAG_FINAL_PAYMENT, TAG_SPLIT_PAYMENT},
};

/// "Order paid" notification from the order platform, already verified.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExternalOrderCompletedEvent {
    pub order_ref: String,
    #[serde(default)]
    pub correlation_tags: Vec<String>,
    pub shop_domain: String,
    /// Id of the paid order when the platform issues a new one on completion.
    #[serde(default)]
    pub paid_order_ref: Option<String>,
}

impl ExternalOrderCompletedEvent {
    pub fn paid_order_ref(&self) -> &str {
        self.paid_order_ref.as_deref().unwrap_or(&self.order_ref)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PaymentLeg {
    Deposit,
    Remaining,
}

impl PaymentLeg {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Deposit => "deposit",
            Self::Remaining => "remaining",
        }
    }

    pub fn tag(&self) -> &'static str {
        match self {
            Self::Deposit => TAG_DEPOSIT,
            Self::Remaining => TAG_FINAL_PAYMENT,
        }
    }

    /// Resolves correlation tags into the leg they mark. Tags are compared
    /// case-insensitively after trimming; the platform echoes them back as
    /// a comma-separated string in some payloads.
    pub fn classify<S: AsRef<str>>(tags: &[S]) -> Result<Self, SplitPaymentError> {
        let normalized: Vec<String> = tags
            .iter()
            .flat_map(|tag| tag.as_ref().split(','))
            .map(|tag| tag.trim().to_ascii_lowercase())
            .filter(|tag| !tag.is_empty())
            .collect();

        if !normalized.iter().any(|tag| tag == TAG_SPLIT_PAYMENT) {
            return Err(SplitPaymentError::UnclassifiedEvent(format!(
                "missing {TAG_SPLIT_PAYMENT} tag"
            )));
        }

        let deposit = normalized.iter().any(|tag| tag == TAG_DEPOSIT);
        let remaining = normalized.iter().any(|tag| tag == TAG_FINAL_PAYMENT);

        match (deposit, remaining) {
            (true, false) => Ok(Self::Deposit),
            (false, true) => Ok(Self::Remaining),
            (true, true) => Err(SplitPaymentError::UnclassifiedEvent(format!(
                "both {TAG_DEPOSIT} and {TAG_FINAL_PAYMENT} tags present"
            ))),
            (false, false) => Err(SplitPaymentError::UnclassifiedEvent(format!(
                "neither {TAG_DEPOSIT} nor {TAG_FINAL_PAYMENT} tag present"
            ))),
        }
    }
}
