/// quick start - bill a student and take a full payment
use school_fees_rs::{
    BillingMonth, FeeConfig, FeeHeadSchedule, FeeLedger, Money, PaymentMethod, PaymentRequest,
    SafeTimeProvider, Student, StudentFeeView, TimeSource,
};
use chrono::{TimeZone, Utc};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt().with_env_filter("info").try_init().ok();

    // class schedule: tuition plus a lab head
    let schedule = FeeHeadSchedule::new().with_class(
        "V",
        [("Tuition", Money::from_major(1500)), ("Lab", Money::from_major(300))],
    );
    let mut ledger = FeeLedger::new(FeeConfig::with_schedule(schedule))?;
    ledger.upsert_student(Student::new("S-101", "Meera Iyer", "V").with_section("A"));

    let time = SafeTimeProvider::new(TimeSource::Test(
        Utc.with_ymd_and_hms(2026, 4, 5, 10, 0, 0).unwrap()
    ));

    let april = BillingMonth::new(2026, 4)?;
    println!("april due: ₹{}", ledger.due("S-101", april));

    let outcome = ledger.record_payment(
        PaymentRequest::new("S-101", vec![april], Money::from_major(1800), PaymentMethod::Upi)
            .with_reference("UTR-88123"),
        &time,
    )?;

    if let Some(receipt) = &outcome.receipt {
        println!("receipt {} for ₹{} ({})", receipt.number, receipt.amount, receipt.purpose());
    }
    println!("april due after payment: ₹{}", ledger.due("S-101", april));

    println!("{}", StudentFeeView::from_ledger(&ledger, "S-101", &time)?.to_json_pretty()?);

    Ok(())
}
