/// late fee rules - slabs, business days, holidays and class overrides
use school_fees_rs::{
    BillingMonth, LateFeeEngine, LateFeeRuleSet, LateFeeSlab, Money, ShiftRule,
};
use chrono::NaiveDate;
use std::collections::BTreeSet;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt().with_env_filter("info").try_init().ok();
    println!("=== late fee rules example ===\n");

    let mut rules = LateFeeRuleSet {
        cutoff_day: 10,
        cap: Money::from_major(250),
        slabs: vec![
            LateFeeSlab::new(1, Some(7), Money::from_major(10)),
            LateFeeSlab::new(8, None, Money::from_major(25)),
        ],
        ..LateFeeRuleSet::default()
    };
    rules.validate()?;

    let month = BillingMonth::new(2026, 2)?;
    let heads = BTreeSet::from(["Tuition".to_string()]);

    // calendar days
    for day in [10, 12, 17, 25] {
        let as_of = NaiveDate::from_ymd_opt(2026, 2, day).ok_or("bad date")?;
        let fee = LateFeeEngine::new(&rules).compute_late_fee("VI", month, as_of, &heads);
        println!("as of {}: ₹{}", as_of, fee);
    }

    // business days only, with a holiday and the due date moved off weekends
    rules.skip_saturday = true;
    rules.skip_sunday = true;
    rules.shift_rule = ShiftRule::NextBusinessDay;
    rules.set_holidays_from_list("2026-02-16, 2026-02-17")?;
    rules.validate()?;

    let as_of = NaiveDate::from_ymd_opt(2026, 2, 25).ok_or("bad date")?;
    let calc = LateFeeEngine::new(&rules).calculate("VI", month, as_of, &heads);
    println!(
        "\nbusiness days: due {:?}, {} chargeable days, ₹{} (uncapped ₹{})",
        calc.due_date, calc.chargeable_days, calc.amount, calc.uncapped_amount
    );

    // per-class override: later cutoff and a smaller cap for the junior classes
    rules.set_class_overrides_json(r#"{"I": {"cutoffDay": 15, "cap": 100}}"#)?;
    let junior = LateFeeEngine::new(&rules).calculate("I", month, as_of, &heads);
    println!("class I: due {:?}, ₹{}, capped: {}", junior.due_date, junior.amount, junior.cap_applied);

    // lab alone never attracts a late fee
    let lab_only = BTreeSet::from(["Lab".to_string()]);
    let waived = LateFeeEngine::new(&rules).calculate("VI", month, as_of, &lab_only);
    println!("lab only: ₹{} ({:?})", waived.amount, waived.waived);

    println!("\n{}", serde_json::to_string_pretty(&rules)?);

    Ok(())
}
