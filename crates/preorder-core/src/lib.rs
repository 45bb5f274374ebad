pub mod error;
pub mod events;
pub mod models;
pub mod split;
pub mod storage;

pub use error::{SplitPaymentError, SplitPaymentResult};
pub use events::{ExternalOrderCompletedEvent, PaymentLeg};
pub use models::{
    ActivityLogEntry, Address, Addresses, BuyerInfo, LineInfo, MAX_GRACE_PERIOD_DAYS,
    MAX_PAYMENT_TERMS_DAYS, Shop, SplitPaymentConfig, SplitPaymentOrder, SplitPaymentStatus,
    TAG_DEPOSIT, TAG_FINAL_PAYMENT, TAG_SPLIT_PAYMENT,
};
pub use split::{
    AmountSplit, MINOR_UNIT_DP, late_fee, max_amount, order_total, round_minor, split, split_at,
};
pub use storage::{ActivityLog, OrderFilter, SplitPaymentStore};
