use thiserror::Error;
use uuid::Uuid;

use crate::models::SplitPaymentStatus;

#[derive(Debug, Error)]
pub enum SplitPaymentError {
    #[error("split payments are not enabled for shop {shop_id}")]
    FeatureDisabled { shop_id: String },

    #[error("deposit percentage {requested} is outside the allowed range {minimum}-{maximum}")]
    InvalidPercentage {
        requested: i32,
        minimum: i32,
        maximum: i32,
    },

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("deposit for split payment {0} has not been paid")]
    DepositNotPaid(Uuid),

    #[error("split payment {id} has no {leg} order reference")]
    MissingOrderReference { id: Uuid, leg: &'static str },

    #[error("cannot {action} split payment {id} in status {status}")]
    InvalidTransition {
        id: Uuid,
        status: SplitPaymentStatus,
        action: &'static str,
    },

    #[error("refund failed for split payment {id}: {source:#}")]
    RefundFailed {
        id: Uuid,
        #[source]
        source: anyhow::Error,
    },

    #[error("split payment order not found: {0}")]
    OrderNotFound(String),

    #[error("shop not found: {0}")]
    ShopNotFound(String),

    #[error("event is not a split payment event: {0}")]
    UnclassifiedEvent(String),

    #[error("order platform call failed: {0:#}")]
    Adapter(#[source] anyhow::Error),

    #[error("record store failure: {0:#}")]
    Store(#[source] anyhow::Error),
}

impl SplitPaymentError {
    /// True for failures caused by the caller's input rather than by state or
    /// infrastructure.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::FeatureDisabled { .. } | Self::InvalidPercentage { .. } | Self::InvalidInput(_)
        )
    }
}

pub type SplitPaymentResult<T> = Result<T, SplitPaymentError>;
