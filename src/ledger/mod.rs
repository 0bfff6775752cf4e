pub mod distribution;
pub mod record;
pub mod reports;

use chrono::NaiveDate;
use hourglass_rs::SafeTimeProvider;
use std::collections::{BTreeMap, BTreeSet};
use uuid::Uuid;

use crate::config::FeeConfig;
use crate::decimal::Money;
use crate::errors::{FeeError, Result};
use crate::events::{Event, EventStore};
use crate::late_fee::{LateFeeCalculation, LateFeeEngine, LateFeeRuleSet};
use crate::payments::{PaymentOutcome, PaymentRequest, Receipt, VerifiedPayment, STATUS_COMPLETED};
use crate::state::{BackendReceipt, LedgerState, MergeSummary};
use crate::types::{
    BillingMonth, FeeHeads, PaymentMethod, Student, StudentId, TransportAssignment,
    PREVIOUS_UNPAID, TRANSPORT,
};

pub use distribution::{distribute, Distribution, MonthAllocation};
pub use record::{record_key, MonthlyFeeRecord, PREVIOUSLY_COLLECTED_REF};
pub use reports::{months_since_admission, MonthRange, MonthStatus, UnpaidSummary};

/// Fee records, receipts and the configuration they are computed under.
/// Mutations stage changes on copies of the affected records and commit
/// in one step, so a rejected payment leaves the ledger untouched.
pub struct FeeLedger {
    config: FeeConfig,
    state: LedgerState,
    students: BTreeMap<StudentId, Student>,
    transport: BTreeMap<StudentId, TransportAssignment>,
    pub events: EventStore,
}

impl FeeLedger {
    pub fn new(config: FeeConfig) -> Result<Self> {
        Self::with_state(config, LedgerState::new())
    }

    /// resume from persisted state
    pub fn with_state(config: FeeConfig, state: LedgerState) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            state,
            students: BTreeMap::new(),
            transport: BTreeMap::new(),
            events: EventStore::new(),
        })
    }

    pub fn config(&self) -> &FeeConfig {
        &self.config
    }

    pub fn state(&self) -> &LedgerState {
        &self.state
    }

    pub fn into_state(self) -> LedgerState {
        self.state
    }

    pub fn upsert_student(&mut self, student: Student) {
        self.students.insert(student.id.clone(), student);
    }

    pub fn student(&self, student_id: &str) -> Option<&Student> {
        self.students.get(student_id)
    }

    pub fn students(&self) -> impl Iterator<Item = &Student> {
        self.students.values()
    }

    pub fn assign_transport(&mut self, assignment: TransportAssignment) {
        self.transport.insert(assignment.student_id.clone(), assignment);
    }

    /// monthly fee of the student's active route, if any
    pub fn transport_fee(&self, student_id: &str) -> Option<Money> {
        self.transport
            .get(student_id)
            .filter(|a| a.active)
            .map(|a| a.fee)
    }

    /// schedule heads for the student's class, prorated by admission date
    pub fn resolve_heads(&self, student: &Student, month: BillingMonth) -> FeeHeads {
        self.config.resolver().resolve_heads_for_student(student, month)
    }

    pub fn record(&self, student_id: &str, month: BillingMonth) -> Option<&MonthlyFeeRecord> {
        self.state.record(student_id, month)
    }

    /// get the month's record, creating it from the schedule if absent
    pub fn ensure_record(&mut self, student_id: &str, month: BillingMonth) -> Result<&MonthlyFeeRecord> {
        let student = self.require_student(student_id)?.clone();
        if self.state.record(student_id, month).is_none() {
            let record = self.fresh_record(&student, month);
            self.insert_created(&student.id, month, record);
        }
        self.state
            .record(student_id, month)
            .ok_or_else(|| FeeError::UnknownStudent {
                student_id: student_id.to_string(),
            })
    }

    /// Amount still owed for a month. Uses the stored record when there is
    /// one, otherwise what a new record would hold. Unknown students owe
    /// nothing.
    pub fn due(&self, student_id: &str, month: BillingMonth) -> Money {
        match self.state.record(student_id, month) {
            Some(record) => record.due(),
            None => self
                .student(student_id)
                .map(|student| self.fresh_record(student, month).due())
                .unwrap_or(Money::ZERO),
        }
    }

    /// late fee for a month; zero for unknown students
    pub fn compute_late_fee(
        &self,
        student_id: &str,
        month: BillingMonth,
        as_of: NaiveDate,
        included_heads: &BTreeSet<String>,
    ) -> Money {
        self.late_fee_breakdown(student_id, month, as_of, included_heads)
            .map(|calc| calc.amount)
            .unwrap_or(Money::ZERO)
    }

    pub fn late_fee_breakdown(
        &self,
        student_id: &str,
        month: BillingMonth,
        as_of: NaiveDate,
        included_heads: &BTreeSet<String>,
    ) -> Option<LateFeeCalculation> {
        let student = self.student(student_id)?;
        let engine = LateFeeEngine::new(&self.config.late_fee_rules);
        Some(engine.calculate(&student.class_name, month, as_of, included_heads))
    }

    /// Settle one or more months for a student.
    ///
    /// Head overrides are written to every selected month. The late fee
    /// (override, or computed for the earliest month as of today) and the
    /// discount are split evenly across the months and replace what the
    /// records held. The tendered amount is applied month by month in the
    /// given order; any shortfall becomes a "Previous Unpaid" head on the
    /// month after today's month.
    pub fn record_payment(
        &mut self,
        request: PaymentRequest,
        time_provider: &SafeTimeProvider,
    ) -> Result<PaymentOutcome> {
        request.validate()?;
        let student = self.require_student(&request.student_id)?.clone();

        let now = time_provider.now();
        let today = now.date_naive();
        let months = request.distinct_months();
        // late fee is assessed on the earliest month, whatever the selection order
        let Some(&earliest) = months.iter().min() else {
            return Err(FeeError::EmptyMonthSelection);
        };

        // stage the selected months
        let mut created = Vec::new();
        let mut staged: Vec<(BillingMonth, MonthlyFeeRecord)> = months
            .iter()
            .map(|&month| {
                let record = match self.state.record(&student.id, month) {
                    Some(existing) => existing.clone(),
                    None => {
                        created.push(month);
                        self.fresh_record(&student, month)
                    }
                };
                (month, record)
            })
            .collect();

        for (_, record) in staged.iter_mut() {
            for (head, amount) in &request.head_overrides {
                record.heads.insert(head.clone(), *amount);
            }
        }

        let included_heads: BTreeSet<String> = staged
            .iter()
            .flat_map(|(_, record)| record.included_heads())
            .map(str::to_string)
            .collect();

        let late_fee = match request.late_fee_override {
            Some(fee) => fee,
            None => LateFeeEngine::new(&self.config.late_fee_rules).compute_late_fee(
                &student.class_name,
                earliest,
                today,
                &included_heads,
            ),
        };

        let late_shares = late_fee.split_even(staged.len());
        let discount_shares = request.discount.split_even(staged.len());
        for (((_, record), late), discount) in staged.iter_mut().zip(late_shares).zip(discount_shares) {
            record.late_fee = late;
            record.discount = discount;
        }

        let dues: Vec<(BillingMonth, Money)> =
            staged.iter().map(|(month, record)| (*month, record.due())).collect();
        let distribution = distribute(request.amount, &dues);

        if request.amount > distribution.total_due {
            return Err(FeeError::AmountExceedsDue {
                total_due: distribution.total_due,
                tendered: request.amount,
            });
        }

        // everything below commits
        for ((_, record), allocation) in staged.iter_mut().zip(&distribution.allocations) {
            record.paid += allocation.applied;
        }

        let previous_unpaid = distribution.shortfall();
        let mut receipt = None;
        let mut carried_to = None;

        if request.amount.is_positive() {
            let number = self.state.next_receipt_number(&self.config.receipt_prefix);
            for (_, record) in staged.iter_mut() {
                record.last_receipt_ref = Some(number.clone());
            }

            if previous_unpaid.is_positive() {
                let next = BillingMonth::from_date(today).next();
                carried_to = Some(next);

                match staged.iter_mut().find(|(month, _)| *month == next) {
                    Some((_, record)) => add_previous_unpaid(record, previous_unpaid),
                    None => {
                        let mut record = match self.state.record(&student.id, next) {
                            Some(existing) => existing.clone(),
                            None => {
                                created.push(next);
                                self.fresh_record(&student, next)
                            }
                        };
                        add_previous_unpaid(&mut record, previous_unpaid);
                        staged.push((next, record));
                    }
                }
            }

            receipt = Some(Receipt {
                id: Uuid::new_v4(),
                number,
                date: today,
                student_id: student.id.clone(),
                student_name: student.name.clone(),
                amount: request.amount,
                method: request.method,
                reference: request.reference.trim().to_string(),
                previous_unpaid: previous_unpaid.is_positive().then_some(previous_unpaid),
                months: months.clone(),
                status: STATUS_COMPLETED.to_string(),
                synced: false,
                backend_id: None,
            });
        }

        for month in &created {
            if let Some((_, record)) = staged.iter().find(|(m, _)| m == month) {
                self.events.emit(Event::FeeRecordCreated {
                    student_id: student.id.clone(),
                    month: *month,
                    head_total: record.head_total(),
                });
            }
        }

        if late_fee.is_positive() {
            self.events.emit(Event::LateFeeAssessed {
                student_id: student.id.clone(),
                month: earliest,
                amount: late_fee,
                overridden: request.late_fee_override.is_some(),
                as_of: today,
            });
        }

        let receipt_number = receipt.as_ref().map(|r| r.number.clone()).unwrap_or_default();
        for allocation in &distribution.allocations {
            self.events.emit(Event::PaymentApplied {
                student_id: student.id.clone(),
                month: allocation.month,
                amount: allocation.applied,
                remaining_due: allocation.remaining_due(),
                receipt_number: receipt_number.clone(),
            });
        }

        if let Some(next) = carried_to {
            let new_balance = staged
                .iter()
                .find(|(m, _)| *m == next)
                .and_then(|(_, r)| r.heads.get(PREVIOUS_UNPAID).copied())
                .unwrap_or(previous_unpaid);
            self.events.emit(Event::CarryForwardPosted {
                student_id: student.id.clone(),
                month: next,
                amount: previous_unpaid,
                new_balance,
            });
            tracing::info!(
                student_id = %student.id,
                month = %next,
                carried = %previous_unpaid,
                "shortfall carried forward"
            );
        }

        for (month, record) in staged {
            self.state.insert_record(&student.id, month, record);
        }

        if let Some(receipt) = &receipt {
            self.events.emit(Event::ReceiptIssued {
                receipt_id: receipt.id,
                receipt_number: receipt.number.clone(),
                student_id: receipt.student_id.clone(),
                amount: receipt.amount,
                method: receipt.method,
                previous_unpaid: receipt.previous_unpaid,
                timestamp: now,
            });
            tracing::info!(
                receipt = %receipt.number,
                student_id = %receipt.student_id,
                amount = %receipt.amount,
                method = %receipt.method,
                months = months.len(),
                "receipt issued"
            );
            self.state.receipts.push(receipt.clone());
        } else {
            tracing::debug!(
                student_id = %student.id,
                months = months.len(),
                "nothing tendered, records updated without a receipt"
            );
        }

        Ok(PaymentOutcome {
            receipt,
            allocations: distribution.allocations,
            total_due: distribution.total_due,
            late_fee,
            previous_unpaid,
            carried_to,
        })
    }

    /// Apply a verified gateway payment to the current month. Unlike
    /// [`FeeLedger::record_payment`] there is no month selection.
    pub fn record_gateway_payment(
        &mut self,
        student_id: &str,
        payment: &VerifiedPayment,
        time_provider: &SafeTimeProvider,
    ) -> Result<PaymentOutcome> {
        let current = BillingMonth::from_date(time_provider.now().date_naive());
        let request = PaymentRequest::new(
            student_id,
            vec![current],
            payment.amount(),
            PaymentMethod::Razorpay,
        )
        .with_reference(payment.payment_id());

        tracing::info!(
            student_id = %student_id,
            order_id = %payment.order_id(),
            payment_id = %payment.payment_id(),
            amount = %payment.amount(),
            "recording gateway payment"
        );

        self.record_payment(request, time_provider)
    }

    /// Force the months to settled for fees collected before the ledger
    /// existed: paid equals the head total, discount and late fee cleared.
    pub fn mark_previously_collected(
        &mut self,
        student_id: &str,
        months: &[BillingMonth],
        time_provider: &SafeTimeProvider,
    ) -> Result<()> {
        if months.is_empty() {
            return Err(FeeError::EmptyMonthSelection);
        }
        let student = self.require_student(student_id)?.clone();

        let mut distinct = BTreeSet::new();
        let months: Vec<BillingMonth> = months.iter().copied().filter(|m| distinct.insert(*m)).collect();

        for &month in &months {
            let mut record = match self.state.record(&student.id, month) {
                Some(existing) => existing.clone(),
                None => {
                    let record = self.fresh_record(&student, month);
                    self.events.emit(Event::FeeRecordCreated {
                        student_id: student.id.clone(),
                        month,
                        head_total: record.head_total(),
                    });
                    record
                }
            };
            record.paid = record.head_total();
            record.discount = Money::ZERO;
            record.late_fee = Money::ZERO;
            record.last_receipt_ref = Some(PREVIOUSLY_COLLECTED_REF.to_string());
            self.state.insert_record(&student.id, month, record);
        }

        tracing::warn!(
            student_id = %student.id,
            months = months.len(),
            "months marked as previously collected"
        );
        self.events.emit(Event::MarkedPreviouslyCollected {
            student_id: student.id,
            months,
            timestamp: time_provider.now(),
        });
        Ok(())
    }

    /// attach the backend id to a synced receipt
    pub fn mark_receipt_synced(&mut self, receipt_id: Uuid, backend_id: &str) -> Option<&Receipt> {
        let receipt = self.state.mark_synced(receipt_id, backend_id)?;
        self.events.emit(Event::ReceiptSynced {
            receipt_id,
            receipt_number: receipt.number.clone(),
            backend_id: backend_id.to_string(),
        });
        self.state.receipt(receipt_id)
    }

    pub fn record_sync_failure(&mut self, receipt_number: &str, reason: &str) {
        self.events.emit(Event::SyncFailed {
            receipt_number: receipt_number.to_string(),
            reason: reason.to_string(),
        });
    }

    pub fn merge_backend_receipts(&mut self, backend: Vec<BackendReceipt>) -> MergeSummary {
        let summary = self.state.merge_receipts(backend);
        tracing::info!(
            updated = summary.updated,
            added = summary.added,
            "backend receipts merged"
        );
        summary
    }

    // administrative configuration edits

    pub fn set_fee_head(&mut self, class_name: &str, head: &str, amount: Money) -> Result<()> {
        self.config.set_fee_head(class_name, head, amount)?;
        self.config_changed(format!("fee head {}/{} set to {}", class_name, head, amount));
        Ok(())
    }

    pub fn remove_fee_head(&mut self, class_name: &str, head: &str) -> Option<Money> {
        let removed = self.config.remove_fee_head(class_name, head)?;
        self.config_changed(format!("fee head {}/{} removed", class_name, head));
        Some(removed)
    }

    pub fn replace_late_fee_rules(&mut self, rules: LateFeeRuleSet) -> Result<()> {
        self.config.replace_late_fee_rules(rules)?;
        self.config_changed("late fee rules replaced".to_string());
        Ok(())
    }

    pub fn apply_class_overrides_json(&mut self, json: &str) -> Result<()> {
        self.config.apply_class_overrides_json(json)?;
        self.config_changed("class overrides replaced".to_string());
        Ok(())
    }

    pub fn set_holidays_from_list(&mut self, list: &str) -> Result<()> {
        self.config.set_holidays_from_list(list)?;
        self.config_changed(format!(
            "holidays set ({})",
            self.config.late_fee_rules.holidays.len()
        ));
        Ok(())
    }

    pub fn take_events(&mut self) -> Vec<Event> {
        self.events.take_events()
    }

    fn config_changed(&mut self, change: String) {
        tracing::info!(version = self.config.version, change = %change, "configuration changed");
        self.events.emit(Event::ConfigurationChanged {
            version: self.config.version,
            change,
        });
    }

    pub(crate) fn require_student(&self, student_id: &str) -> Result<&Student> {
        self.student(student_id).ok_or_else(|| FeeError::UnknownStudent {
            student_id: student_id.to_string(),
        })
    }

    /// a new record from the schedule, with the active route fee as Transport
    pub(crate) fn fresh_record(&self, student: &Student, month: BillingMonth) -> MonthlyFeeRecord {
        let mut heads = self.resolve_heads(student, month);
        if !heads.is_empty() {
            if let Some(fee) = self.transport_fee(&student.id) {
                heads.insert(TRANSPORT.to_string(), fee);
            }
        }
        MonthlyFeeRecord::new(heads)
    }

    fn insert_created(&mut self, student_id: &str, month: BillingMonth, record: MonthlyFeeRecord) {
        self.events.emit(Event::FeeRecordCreated {
            student_id: student_id.to_string(),
            month,
            head_total: record.head_total(),
        });
        self.state.insert_record(student_id, month, record);
    }
}

fn add_previous_unpaid(record: &mut MonthlyFeeRecord, amount: Money) {
    let entry = record
        .heads
        .entry(PREVIOUS_UNPAID.to_string())
        .or_insert(Money::ZERO);
    *entry += amount;
}
