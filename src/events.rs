use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::decimal::Money;
use crate::types::{BillingMonth, PaymentMethod, StudentId};

/// all events that can be emitted by the ledger
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Event {
    // ledger events
    FeeRecordCreated {
        student_id: StudentId,
        month: BillingMonth,
        head_total: Money,
    },
    LateFeeAssessed {
        student_id: StudentId,
        month: BillingMonth,
        amount: Money,
        overridden: bool,
        as_of: NaiveDate,
    },
    PaymentApplied {
        student_id: StudentId,
        month: BillingMonth,
        amount: Money,
        remaining_due: Money,
        receipt_number: String,
    },
    CarryForwardPosted {
        student_id: StudentId,
        month: BillingMonth,
        amount: Money,
        new_balance: Money,
    },
    MarkedPreviouslyCollected {
        student_id: StudentId,
        months: Vec<BillingMonth>,
        timestamp: DateTime<Utc>,
    },

    // receipt events
    ReceiptIssued {
        receipt_id: Uuid,
        receipt_number: String,
        student_id: StudentId,
        amount: Money,
        method: PaymentMethod,
        previous_unpaid: Option<Money>,
        timestamp: DateTime<Utc>,
    },
    ReceiptSynced {
        receipt_id: Uuid,
        receipt_number: String,
        backend_id: String,
    },
    SyncFailed {
        receipt_number: String,
        reason: String,
    },

    // configuration events
    ConfigurationChanged {
        version: u64,
        change: String,
    },
}

/// event store for collecting events during operations
#[derive(Debug, Default)]
pub struct EventStore {
    events: Vec<Event>,
}

impl EventStore {
    pub fn new() -> Self {
        Self { events: Vec::new() }
    }

    pub fn emit(&mut self, event: Event) {
        self.events.push(event);
    }

    pub fn take_events(&mut self) -> Vec<Event> {
        std::mem::take(&mut self.events)
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }
}
