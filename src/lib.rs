pub mod config;
pub mod decimal;
pub mod errors;
pub mod events;
pub mod late_fee;
pub mod ledger;
pub mod payments;
pub mod schedule;
pub mod state;
pub mod sync;
pub mod types;
pub mod views;

// re-export key types
pub use config::FeeConfig;
pub use decimal::{Money, Rate};
pub use errors::{FeeError, Result};
pub use events::{Event, EventStore};
pub use late_fee::{
    BusinessCalendar, ClassOverride, LateFeeCalculation, LateFeeEngine, LateFeeRuleSet,
    LateFeeSlab, ShiftRule, WaiverReason,
};
pub use ledger::{
    distribute, Distribution, FeeLedger, MonthAllocation, MonthRange, MonthStatus,
    MonthlyFeeRecord, UnpaidSummary,
};
pub use payments::{
    GatewayConfig, PaymentOutcome, PaymentRequest, Receipt, SignatureVerifier, VerifiedPayment,
    WebhookEvent, WebhookEventKind,
};
pub use schedule::{FeeHeadSchedule, FeeScheduleResolver};
pub use state::{BackendReceipt, LedgerState, MergeSummary};
pub use sync::{
    ConnectivityMonitor, FeeService, LedgerBackend, MonitorHandle, PaymentPayload,
    PaymentSubmission, PostOutcome, ReceiptSyncer, SharedLedger, SyncReport, SyncSettings,
};
pub use types::{
    BillingMonth, FeeHeads, PaymentMethod, Student, StudentId, StudentStatus,
    TransportAssignment, MISCELLANEOUS, PREVIOUS_UNPAID, TRANSPORT, TUITION,
};
pub use views::StudentFeeView;

// re-export external dependencies that users will need
pub use chrono;
pub use hourglass_rs::{SafeTimeProvider, TimeSource};
pub use rust_decimal::Decimal;
pub use uuid::Uuid;
