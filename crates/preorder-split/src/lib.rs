pub mod orchestrator;
pub mod reminders;
pub mod webhook;

pub use orchestrator::{CreateSplitPayment, SplitPaymentOrchestrator};
pub use reminders::{ReminderSweepReport, reminder_due, run_reminder_sweep};
pub use webhook::{RouteOutcome, WebhookRouter};
