/// best-effort receipt sync with the backend ledger
use async_trait::async_trait;
use chrono::NaiveDate;
use hourglass_rs::SafeTimeProvider;
use serde::{Deserialize, Serialize};
use std::env;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{timeout, MissedTickBehavior};
use uuid::Uuid;

use crate::decimal::Money;
use crate::errors::{FeeError, Result};
use crate::ledger::FeeLedger;
use crate::payments::{PaymentOutcome, PaymentRequest, Receipt, VerifiedPayment};

/// the ledger behind its single-writer lock
pub type SharedLedger = Arc<Mutex<FeeLedger>>;

pub fn shared(ledger: FeeLedger) -> SharedLedger {
    Arc::new(Mutex::new(ledger))
}

/// body of `POST /payments`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentPayload {
    pub student_id: String,
    pub amount: Money,
    pub payment_date: NaiveDate,
    pub payment_method: String,
    pub transaction_id: String,
    pub purpose: String,
    pub status: String,
    pub remarks: String,
}

impl PaymentPayload {
    pub fn from_receipt(receipt: &Receipt, backend_student_id: &str) -> Self {
        Self {
            student_id: backend_student_id.to_string(),
            amount: receipt.amount,
            payment_date: receipt.date,
            payment_method: receipt.method.to_string(),
            transaction_id: receipt.reference.clone(),
            purpose: receipt.purpose(),
            status: receipt.status.clone(),
            remarks: receipt.remarks(),
        }
    }
}

/// backend answer to a posted payment
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PostOutcome {
    /// stored; the backend may assign its own id
    Accepted { id: Option<String> },
    /// non-2xx response
    Rejected { status: u16, message: String },
}

/// the backend ledger of record
#[async_trait]
pub trait LedgerBackend: Send + Sync {
    async fn post_payment(&self, payload: &PaymentPayload) -> Result<PostOutcome>;

    async fn health_check(&self) -> Result<bool>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncSettings {
    /// bound on every backend call
    pub request_timeout: Duration,
    pub poll_interval: Duration,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_millis(8000),
            poll_interval: Duration::from_secs(10),
        }
    }
}

impl SyncSettings {
    /// `FEES_SYNC_TIMEOUT_MS` and `FEES_CONNECTIVITY_POLL_SECS`, defaults otherwise
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let parse = |key: &str| -> Result<Option<u64>> {
            match lookup(key) {
                None => Ok(None),
                Some(raw) => raw
                    .trim()
                    .parse::<u64>()
                    .ok()
                    .filter(|v| *v > 0)
                    .map(Some)
                    .ok_or_else(|| FeeError::InvalidConfiguration {
                        message: format!("{} must be a positive integer, got {:?}", key, raw),
                    }),
            }
        };

        Ok(Self {
            request_timeout: parse("FEES_SYNC_TIMEOUT_MS")?
                .map(Duration::from_millis)
                .unwrap_or(defaults.request_timeout),
            poll_interval: parse("FEES_CONNECTIVITY_POLL_SECS")?
                .map(Duration::from_secs)
                .unwrap_or(defaults.poll_interval),
        })
    }
}

/// what a sweep did
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SyncReport {
    pub synced: usize,
    /// student has no backend id yet
    pub skipped: usize,
    pub rejected: usize,
    /// the error that ended the sweep early
    pub aborted: Option<FeeError>,
    /// another sweep was already running
    pub already_running: bool,
}

struct PendingReceipt {
    id: Uuid,
    number: String,
    payload: Option<PaymentPayload>,
}

/// Pushes unsynced receipts to the backend in issue order. A rejected
/// receipt is skipped; a network error or timeout ends the sweep.
pub struct ReceiptSyncer {
    backend: Arc<dyn LedgerBackend>,
    settings: SyncSettings,
    sweep: Mutex<()>,
}

impl ReceiptSyncer {
    pub fn new(backend: Arc<dyn LedgerBackend>, settings: SyncSettings) -> Self {
        Self {
            backend,
            settings,
            sweep: Mutex::new(()),
        }
    }

    pub fn settings(&self) -> &SyncSettings {
        &self.settings
    }

    /// a timed out or failed health check counts as disconnected
    pub async fn check_connectivity(&self) -> bool {
        match timeout(self.settings.request_timeout, self.backend.health_check()).await {
            Ok(Ok(healthy)) => healthy,
            Ok(Err(e)) => {
                tracing::debug!(error = %e, "health check failed");
                false
            }
            Err(_) => {
                tracing::debug!(
                    timeout_ms = self.settings.request_timeout.as_millis() as u64,
                    "health check timed out"
                );
                false
            }
        }
    }

    /// Push every unsynced receipt in issue order. The ledger lock is not
    /// held across backend calls.
    pub async fn sync_pending(&self, ledger: &SharedLedger) -> SyncReport {
        let Ok(_guard) = self.sweep.try_lock() else {
            tracing::debug!("sync sweep already running");
            return SyncReport {
                already_running: true,
                ..SyncReport::default()
            };
        };

        let pending = {
            let ledger = ledger.lock().await;
            collect_pending(&ledger)
        };
        let mut report = SyncReport::default();
        if pending.is_empty() {
            return report;
        }

        tracing::info!(pending = pending.len(), "starting receipt sync sweep");

        for receipt in pending {
            let Some(payload) = receipt.payload else {
                report.skipped += 1;
                continue;
            };

            let millis = self.settings.request_timeout.as_millis() as u64;
            let result = match timeout(self.settings.request_timeout, self.backend.post_payment(&payload)).await {
                Ok(result) => result,
                Err(_) => Err(FeeError::Timeout { millis }),
            };

            match result {
                Ok(PostOutcome::Accepted { id }) => {
                    let backend_id = id.unwrap_or_else(|| receipt.number.clone());
                    ledger.lock().await.mark_receipt_synced(receipt.id, &backend_id);
                    tracing::info!(
                        receipt = %receipt.number,
                        backend_id = %backend_id,
                        "receipt synced"
                    );
                    report.synced += 1;
                }
                Ok(PostOutcome::Rejected { status, message }) => {
                    tracing::warn!(
                        receipt = %receipt.number,
                        status = status,
                        message = %message,
                        "backend rejected receipt"
                    );
                    ledger
                        .lock()
                        .await
                        .record_sync_failure(&receipt.number, &format!("rejected ({}): {}", status, message));
                    report.rejected += 1;
                }
                Err(e) => {
                    tracing::warn!(
                        receipt = %receipt.number,
                        error = %e,
                        "receipt sync aborted"
                    );
                    ledger.lock().await.record_sync_failure(&receipt.number, &e.to_string());
                    report.aborted = Some(e);
                    break;
                }
            }
        }

        tracing::info!(
            synced = report.synced,
            skipped = report.skipped,
            rejected = report.rejected,
            aborted = report.aborted.is_some(),
            "receipt sync sweep finished"
        );
        report
    }
}

fn collect_pending(ledger: &FeeLedger) -> Vec<PendingReceipt> {
    ledger
        .state()
        .pending_receipts()
        .map(|receipt| PendingReceipt {
            id: receipt.id,
            number: receipt.number.clone(),
            payload: ledger
                .student(&receipt.student_id)
                .and_then(|s| s.backend_id.as_deref())
                .map(|backend_id| PaymentPayload::from_receipt(receipt, backend_id)),
        })
        .collect()
}

/// handle to a running connectivity monitor
pub struct MonitorHandle {
    stop: watch::Sender<bool>,
    status: watch::Receiver<bool>,
    task: JoinHandle<()>,
}

impl MonitorHandle {
    pub fn is_connected(&self) -> bool {
        *self.status.borrow()
    }

    /// connectivity updates
    pub fn status(&self) -> watch::Receiver<bool> {
        self.status.clone()
    }

    /// stop polling and wait for the task to finish
    pub async fn stop(self) {
        let _ = self.stop.send(true);
        if let Err(e) = self.task.await {
            tracing::warn!(error = %e, "connectivity monitor ended abnormally");
        }
    }
}

/// polls backend health and sweeps pending receipts on reconnect
pub struct ConnectivityMonitor;

impl ConnectivityMonitor {
    pub fn spawn(syncer: Arc<ReceiptSyncer>, ledger: SharedLedger) -> MonitorHandle {
        let (stop_tx, mut stop_rx) = watch::channel(false);
        let (status_tx, status_rx) = watch::channel(false);
        let poll_interval = syncer.settings().poll_interval;

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(poll_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            let mut connected = false;

            loop {
                tokio::select! {
                    changed = stop_rx.changed() => {
                        if changed.is_err() || *stop_rx.borrow() {
                            tracing::info!("connectivity monitor stopping");
                            break;
                        }
                    }
                    _ = ticker.tick() => {
                        let now_connected = syncer.check_connectivity().await;
                        if now_connected != connected {
                            tracing::info!(connected = now_connected, "backend connectivity changed");
                            status_tx.send_replace(now_connected);
                        }
                        if now_connected && !connected {
                            syncer.sync_pending(&ledger).await;
                        }
                        connected = now_connected;
                    }
                }
            }
        });

        MonitorHandle {
            stop: stop_tx,
            status: status_rx,
            task,
        }
    }
}

/// a committed payment and the sync it kicked off, if any
pub struct PaymentSubmission {
    pub outcome: PaymentOutcome,
    pub sync: Option<JoinHandle<SyncReport>>,
}

/// Records payments on the shared ledger and pushes new receipts to the
/// backend in the background while connected.
pub struct FeeService {
    ledger: SharedLedger,
    syncer: Arc<ReceiptSyncer>,
    connected: watch::Receiver<bool>,
}

impl FeeService {
    pub fn new(ledger: SharedLedger, syncer: Arc<ReceiptSyncer>, connected: watch::Receiver<bool>) -> Self {
        Self {
            ledger,
            syncer,
            connected,
        }
    }

    pub fn ledger(&self) -> &SharedLedger {
        &self.ledger
    }

    pub async fn record_payment(
        &self,
        request: PaymentRequest,
        time_provider: &SafeTimeProvider,
    ) -> Result<PaymentSubmission> {
        let outcome = self.ledger.lock().await.record_payment(request, time_provider)?;
        Ok(self.after_commit(outcome))
    }

    pub async fn record_gateway_payment(
        &self,
        student_id: &str,
        payment: &VerifiedPayment,
        time_provider: &SafeTimeProvider,
    ) -> Result<PaymentSubmission> {
        let outcome = self
            .ledger
            .lock()
            .await
            .record_gateway_payment(student_id, payment, time_provider)?;
        Ok(self.after_commit(outcome))
    }

    fn after_commit(&self, outcome: PaymentOutcome) -> PaymentSubmission {
        let sync = (outcome.receipt.is_some() && *self.connected.borrow()).then(|| {
            let syncer = Arc::clone(&self.syncer);
            let ledger = Arc::clone(&self.ledger);
            tokio::spawn(async move { syncer.sync_pending(&ledger).await })
        });
        PaymentSubmission { outcome, sync }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FeeConfig;
    use crate::events::Event;
    use crate::schedule::FeeHeadSchedule;
    use crate::types::{BillingMonth, PaymentMethod, Student};
    use chrono::{TimeZone, Utc};
    use hourglass_rs::TimeSource;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicBool, Ordering};

    /// in-memory backend with scripted responses
    #[derive(Default)]
    struct FakeBackend {
        responses: std::sync::Mutex<VecDeque<Result<PostOutcome>>>,
        posted: std::sync::Mutex<Vec<PaymentPayload>>,
        healthy: AtomicBool,
        hang: AtomicBool,
    }

    impl FakeBackend {
        fn with_responses(responses: Vec<Result<PostOutcome>>) -> Arc<Self> {
            let backend = Self::default();
            *backend.responses.lock().unwrap() = responses.into();
            backend.healthy.store(true, Ordering::SeqCst);
            Arc::new(backend)
        }

        fn posted(&self) -> Vec<PaymentPayload> {
            self.posted.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl LedgerBackend for FakeBackend {
        async fn post_payment(&self, payload: &PaymentPayload) -> Result<PostOutcome> {
            if self.hang.load(Ordering::SeqCst) {
                tokio::time::sleep(Duration::from_secs(3600)).await;
            }
            self.posted.lock().unwrap().push(payload.clone());
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Ok(PostOutcome::Accepted { id: None }))
        }

        async fn health_check(&self) -> Result<bool> {
            Ok(self.healthy.load(Ordering::SeqCst))
        }
    }

    fn time() -> SafeTimeProvider {
        SafeTimeProvider::new(TimeSource::Test(Utc.with_ymd_and_hms(2026, 2, 5, 9, 0, 0).unwrap()))
    }

    fn feb() -> BillingMonth {
        BillingMonth::new(2026, 2).unwrap()
    }

    fn ledger_with_receipts(amounts: &[i64]) -> SharedLedger {
        let schedule = FeeHeadSchedule::new().with_class("I", [("Tuition", Money::from_major(1200))]);
        let mut ledger = FeeLedger::new(FeeConfig::with_schedule(schedule)).unwrap();
        ledger.upsert_student(Student::new("A-1", "Asha", "I").with_backend_id("srv-student-1"));
        ledger.upsert_student(Student::new("B-2", "Bilal", "I"));

        let time = time();
        for (i, amount) in amounts.iter().enumerate() {
            let student = if i % 3 == 2 { "B-2" } else { "A-1" };
            ledger
                .record_payment(
                    PaymentRequest::new(student, vec![feb()], Money::from_major(*amount), PaymentMethod::Cash)
                        .with_reference(format!("ref-{}", i)),
                    &time,
                )
                .unwrap();
        }
        ledger.take_events();
        shared(ledger)
    }

    fn settings() -> SyncSettings {
        SyncSettings {
            request_timeout: Duration::from_millis(50),
            poll_interval: Duration::from_secs(10),
        }
    }

    #[tokio::test]
    async fn test_sweep_marks_accepted_and_skips_unknown_backend_student() {
        let backend = FakeBackend::with_responses(vec![
            Ok(PostOutcome::Accepted { id: Some("p-1".to_string()) }),
            Ok(PostOutcome::Accepted { id: None }),
        ]);
        let syncer = ReceiptSyncer::new(backend.clone(), settings());
        // third receipt belongs to B-2, which has no backend id
        let ledger = ledger_with_receipts(&[100, 200, 300]);

        let report = syncer.sync_pending(&ledger).await;
        assert_eq!(report.synced, 2);
        assert_eq!(report.skipped, 1);
        assert!(report.aborted.is_none());

        let posted = backend.posted();
        assert_eq!(posted[0].student_id, "srv-student-1");
        assert_eq!(posted[0].purpose, "Fees 2026-02");
        assert_eq!(posted[0].remarks, "Carry ₹1100");
        assert_eq!(posted[0].transaction_id, "ref-0");

        let ledger = ledger.lock().await;
        let receipts = &ledger.state().receipts;
        assert_eq!(receipts[0].backend_id.as_deref(), Some("p-1"));
        assert_eq!(receipts[1].backend_id.as_deref(), Some("R-0002"));
        assert!(!receipts[2].synced);
    }

    #[tokio::test]
    async fn test_rejection_skips_and_network_error_aborts() {
        let backend = FakeBackend::with_responses(vec![
            Ok(PostOutcome::Rejected { status: 422, message: "bad".to_string() }),
            Err(FeeError::Offline),
        ]);
        let syncer = ReceiptSyncer::new(backend.clone(), settings());
        let ledger = ledger_with_receipts(&[100, 100, 100, 100]);

        let report = syncer.sync_pending(&ledger).await;
        assert_eq!(report.rejected, 1);
        assert_eq!(report.synced, 0);
        assert_eq!(report.aborted, Some(FeeError::Offline));
        // the fourth receipt was never attempted
        assert_eq!(backend.posted().len(), 2);

        let mut ledger = ledger.lock().await;
        assert_eq!(ledger.state().pending_receipts().count(), 4);
        let failures = ledger
            .take_events()
            .into_iter()
            .filter(|e| matches!(e, Event::SyncFailed { .. }))
            .count();
        assert_eq!(failures, 2);
    }

    #[tokio::test]
    async fn test_retry_after_abort_resumes_in_order() {
        let backend = FakeBackend::with_responses(vec![Err(FeeError::Offline)]);
        let syncer = ReceiptSyncer::new(backend.clone(), settings());
        let ledger = ledger_with_receipts(&[100, 100]);

        assert!(syncer.sync_pending(&ledger).await.aborted.is_some());
        let report = syncer.sync_pending(&ledger).await;
        assert_eq!(report.synced, 2);

        let refs: Vec<String> = backend.posted().iter().map(|p| p.transaction_id.clone()).collect();
        assert_eq!(refs, vec!["ref-0", "ref-0", "ref-1"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_aborts_sweep() {
        let backend = FakeBackend::with_responses(vec![]);
        backend.hang.store(true, Ordering::SeqCst);
        let syncer = ReceiptSyncer::new(backend.clone(), settings());
        let ledger = ledger_with_receipts(&[100]);

        let report = syncer.sync_pending(&ledger).await;
        assert_eq!(report.aborted, Some(FeeError::Timeout { millis: 50 }));
        assert!(report.aborted.as_ref().is_some_and(FeeError::is_network));
        assert_eq!(ledger.lock().await.state().pending_receipts().count(), 1);
    }

    #[tokio::test]
    async fn test_overlapping_sweep_returns_immediately() {
        let backend = FakeBackend::with_responses(vec![]);
        let syncer = ReceiptSyncer::new(backend, settings());
        let ledger = ledger_with_receipts(&[100]);

        let _held = syncer.sweep.lock().await;
        let report = syncer.sync_pending(&ledger).await;
        assert!(report.already_running);
        assert_eq!(report.synced, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_monitor_syncs_on_reconnect_and_stops() {
        let backend = FakeBackend::with_responses(vec![]);
        backend.healthy.store(false, Ordering::SeqCst);
        let syncer = Arc::new(ReceiptSyncer::new(backend.clone(), settings()));
        let ledger = ledger_with_receipts(&[100]);

        let handle = ConnectivityMonitor::spawn(syncer, ledger.clone());
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(!handle.is_connected());
        assert!(backend.posted().is_empty());

        backend.healthy.store(true, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert!(handle.is_connected());
        assert_eq!(ledger.lock().await.state().pending_receipts().count(), 0);

        handle.stop().await;
    }

    #[tokio::test]
    async fn test_service_syncs_after_payment_when_connected() {
        let backend = FakeBackend::with_responses(vec![]);
        let syncer = Arc::new(ReceiptSyncer::new(backend.clone(), settings()));
        let ledger = ledger_with_receipts(&[]);
        let (_tx, connected) = watch::channel(true);
        let service = FeeService::new(ledger.clone(), syncer, connected);

        let submission = service
            .record_payment(
                PaymentRequest::new("A-1", vec![feb()], Money::from_major(1200), PaymentMethod::Upi),
                &time(),
            )
            .await
            .unwrap();

        let report = submission.sync.unwrap().await.unwrap();
        assert_eq!(report.synced, 1);
        assert_eq!(backend.posted()[0].remarks, "");
        assert!(ledger.lock().await.state().receipts[0].synced);
    }

    #[tokio::test]
    async fn test_service_offline_commits_locally() {
        let backend = FakeBackend::with_responses(vec![]);
        let syncer = Arc::new(ReceiptSyncer::new(backend.clone(), settings()));
        let ledger = ledger_with_receipts(&[]);
        let (_tx, connected) = watch::channel(false);
        let service = FeeService::new(ledger.clone(), syncer, connected);

        let submission = service
            .record_payment(
                PaymentRequest::new("A-1", vec![feb()], Money::from_major(500), PaymentMethod::Cash),
                &time(),
            )
            .await
            .unwrap();

        assert!(submission.sync.is_none());
        assert!(submission.outcome.receipt.is_some());
        assert_eq!(service.ledger().lock().await.state().pending_receipts().count(), 1);
        assert!(backend.posted().is_empty());
    }

    #[test]
    fn test_settings_from_lookup() {
        let defaults = SyncSettings::from_lookup(|_| None).unwrap();
        assert_eq!(defaults, SyncSettings::default());

        let custom = SyncSettings::from_lookup(|key| match key {
            "FEES_SYNC_TIMEOUT_MS" => Some("5000".to_string()),
            _ => None,
        })
        .unwrap();
        assert_eq!(custom.request_timeout, Duration::from_millis(5000));
        assert_eq!(custom.poll_interval, Duration::from_secs(10));

        assert!(SyncSettings::from_lookup(|_| Some("soon".to_string())).is_err());
        assert!(SyncSettings::from_lookup(|_| Some("0".to_string())).is_err());
    }
}
