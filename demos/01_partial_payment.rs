/// partial payment - shortfall carried to the next month as previous unpaid
use school_fees_rs::{
    BillingMonth, FeeConfig, FeeHeadSchedule, FeeLedger, Money, PaymentMethod, PaymentRequest,
    SafeTimeProvider, Student, TimeSource, TransportAssignment, PREVIOUS_UNPAID,
};
use chrono::{Duration, TimeZone, Utc};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt().with_env_filter("info").try_init().ok();
    println!("=== partial payment example ===\n");

    let schedule = FeeHeadSchedule::new().with_class("VIII", [("Tuition", Money::from_major(2000))]);
    let mut ledger = FeeLedger::new(FeeConfig::with_schedule(schedule))?;
    ledger.upsert_student(Student::new("S-204", "Kabir Shah", "VIII").with_admission_date(
        chrono::NaiveDate::from_ymd_opt(2026, 4, 1).ok_or("bad date")?,
    ));
    ledger.assign_transport(TransportAssignment {
        student_id: "S-204".to_string(),
        route_id: "R7".to_string(),
        stop: "Lake Road".to_string(),
        fee: Money::from_major(650),
        active: true,
    });

    let time = SafeTimeProvider::new(TimeSource::Test(
        Utc.with_ymd_and_hms(2026, 4, 8, 9, 0, 0).unwrap()
    ));
    let controller = time.test_control().unwrap();

    let april = BillingMonth::new(2026, 4)?;
    let may = april.next();
    println!("april due: ₹{} (tuition + route fee)", ledger.due("S-204", april));

    // pay 1500 of 2650
    let outcome = ledger.record_payment(
        PaymentRequest::new("S-204", vec![april], Money::from_major(1500), PaymentMethod::Cash),
        &time,
    )?;
    println!(
        "paid ₹1500, carried ₹{} to {}",
        outcome.previous_unpaid,
        outcome.carried_to.map(|m| m.to_string()).unwrap_or_default()
    );

    if let Some(record) = ledger.record("S-204", may) {
        println!("may heads: {:?}", record.heads);
        println!("may previous unpaid: ₹{}", record.heads.get(PREVIOUS_UNPAID).copied().unwrap_or(Money::ZERO));
    }

    // a month later, settle may including the carried amount and its late fee
    controller.advance(Duration::days(30));
    println!("\nadvanced to {}", time.now().format("%Y-%m-%d"));
    let may_due = ledger.due("S-204", may);
    println!("may due: ₹{}", may_due);

    let outcome = ledger.record_payment(
        PaymentRequest::new("S-204", vec![may], may_due, PaymentMethod::Card),
        &time,
    )?;
    println!("late fee applied: ₹{}, total due was ₹{}", outcome.late_fee, outcome.total_due);

    let summary = ledger.total_unpaid("S-204", &time)?;
    println!(
        "\nmonths since admission: {}, unpaid months: {}, total due: ₹{}",
        summary.months_count, summary.unpaid_months, summary.total_due
    );

    for event in ledger.take_events() {
        println!("event: {:?}", event);
    }

    Ok(())
}
