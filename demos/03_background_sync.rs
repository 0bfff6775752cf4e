/// background sync - commit locally, push receipts when the backend is reachable
use async_trait::async_trait;
use school_fees_rs::sync::shared;
use school_fees_rs::{
    BillingMonth, ConnectivityMonitor, FeeConfig, FeeHeadSchedule, FeeLedger, FeeService,
    LedgerBackend, Money, PaymentMethod, PaymentPayload, PaymentRequest, PostOutcome,
    ReceiptSyncer, Result, SafeTimeProvider, Student, SyncSettings, TimeSource,
};
use chrono::{TimeZone, Utc};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// stands in for the school's backend ledger
struct InMemoryBackend {
    online: AtomicBool,
    next_id: AtomicUsize,
}

#[async_trait]
impl LedgerBackend for InMemoryBackend {
    async fn post_payment(&self, payload: &PaymentPayload) -> Result<PostOutcome> {
        if !self.online.load(Ordering::SeqCst) {
            return Err(school_fees_rs::FeeError::Offline);
        }
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        println!("  backend stored payment {} for {} (₹{})", id, payload.student_id, payload.amount);
        Ok(PostOutcome::Accepted { id: Some(format!("pay-{}", id)) })
    }

    async fn health_check(&self) -> Result<bool> {
        Ok(self.online.load(Ordering::SeqCst))
    }
}

#[tokio::main]
async fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt().with_env_filter("info").try_init().ok();
    println!("=== background sync example ===\n");

    let schedule = FeeHeadSchedule::new().with_class("X", [("Tuition", Money::from_major(2500))]);
    let mut ledger = FeeLedger::new(FeeConfig::with_schedule(schedule))?;
    ledger.upsert_student(Student::new("S-310", "Ananya Rao", "X").with_backend_id("stu-310"));
    let ledger = shared(ledger);

    let backend = Arc::new(InMemoryBackend {
        online: AtomicBool::new(false),
        next_id: AtomicUsize::new(0),
    });
    let syncer = Arc::new(ReceiptSyncer::new(
        backend.clone(),
        SyncSettings {
            request_timeout: Duration::from_millis(500),
            poll_interval: Duration::from_millis(200),
        },
    ));
    let monitor = ConnectivityMonitor::spawn(Arc::clone(&syncer), Arc::clone(&ledger));
    let service = FeeService::new(Arc::clone(&ledger), syncer, monitor.status());

    let time = SafeTimeProvider::new(TimeSource::Test(
        Utc.with_ymd_and_hms(2026, 6, 3, 11, 0, 0).unwrap()
    ));

    // offline: the payment commits locally and waits
    let submission = service
        .record_payment(
            PaymentRequest::new("S-310", vec![BillingMonth::new(2026, 6)?], Money::from_major(2500), PaymentMethod::Cash),
            &time,
        )
        .await?;
    println!("recorded offline, sync started: {}", submission.sync.is_some());
    println!("pending receipts: {}", ledger.lock().await.state().pending_receipts().count());

    // backend comes back; the monitor notices and sweeps
    backend.online.store(true, Ordering::SeqCst);
    tokio::time::sleep(Duration::from_millis(500)).await;
    println!("connected: {}", monitor.is_connected());
    println!("pending receipts: {}", ledger.lock().await.state().pending_receipts().count());

    // online: the next payment syncs right away
    let submission = service
        .record_payment(
            PaymentRequest::new("S-310", vec![BillingMonth::new(2026, 7)?], Money::from_major(2500), PaymentMethod::Upi),
            &time,
        )
        .await?;
    if let Some(handle) = submission.sync {
        let report = handle.await?;
        println!("immediate sync: {} synced", report.synced);
    }

    monitor.stop().await;

    for receipt in &ledger.lock().await.state().receipts {
        println!(
            "{} ₹{} synced={} backend_id={}",
            receipt.number,
            receipt.amount,
            receipt.synced,
            receipt.backend_id.as_deref().unwrap_or("-")
        );
    }

    Ok(())
}
