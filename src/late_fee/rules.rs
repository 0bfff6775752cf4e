use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::decimal::Money;
use crate::errors::{FeeError, Result};
use crate::types::parse_iso_date;

/// per-day tariff for a range of chargeable days
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LateFeeSlab {
    #[serde(alias = "from", default = "first_day")]
    pub from_day: u32,
    /// inclusive upper bound, `None` for open-ended
    #[serde(alias = "to", default)]
    pub to_day: Option<u32>,
    #[serde(alias = "perDay")]
    pub per_day_amount: Money,
}

fn first_day() -> u32 {
    1
}

impl LateFeeSlab {
    pub fn new(from_day: u32, to_day: Option<u32>, per_day_amount: Money) -> Self {
        Self {
            from_day,
            to_day,
            per_day_amount,
        }
    }

    pub fn contains(&self, day: u32) -> bool {
        day >= self.from_day && self.to_day.map_or(true, |to| day <= to)
    }
}

/// how a due date that falls on a non-business day moves
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum ShiftRule {
    #[default]
    #[serde(rename = "none")]
    None,
    #[serde(rename = "nextBusiness")]
    NextBusinessDay,
    #[serde(rename = "prevBusiness")]
    PreviousBusinessDay,
}

/// partial override of the global rules for one class
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ClassOverride {
    #[serde(default)]
    pub cutoff_day: Option<u32>,
    #[serde(default)]
    pub grace_days: Option<u32>,
    #[serde(default)]
    pub cap: Option<Money>,
    #[serde(default)]
    pub start_after: Option<u32>,
}

/// global late fee policy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LateFeeRuleSet {
    /// day of month fees fall due
    pub cutoff_day: u32,
    pub grace_days: u32,
    /// additional deferment after grace
    pub start_after: u32,
    /// zero means uncapped
    pub cap: Money,
    pub slabs: Vec<LateFeeSlab>,
    #[serde(alias = "skipSat")]
    pub skip_saturday: bool,
    #[serde(alias = "skipSun")]
    pub skip_sunday: bool,
    pub holidays: BTreeSet<NaiveDate>,
    pub shift_rule: ShiftRule,
    /// head name -> whether including that head makes the late fee apply
    pub apply_to_heads: BTreeMap<String, bool>,
    pub class_overrides: BTreeMap<String, ClassOverride>,
}

impl Default for LateFeeRuleSet {
    fn default() -> Self {
        Self {
            cutoff_day: 10,
            grace_days: 0,
            start_after: 0,
            cap: Money::from_major(200),
            slabs: Vec::new(),
            skip_saturday: false,
            skip_sunday: false,
            holidays: BTreeSet::new(),
            shift_rule: ShiftRule::None,
            apply_to_heads: BTreeMap::from([
                ("Tuition".to_string(), true),
                ("Transport".to_string(), true),
                ("Lab".to_string(), false),
                ("Activity".to_string(), false),
                ("Miscellaneous".to_string(), true),
            ]),
            class_overrides: BTreeMap::new(),
        }
    }
}

/// the global rules with one class's overrides applied
#[derive(Debug, Clone, Copy)]
pub struct EffectiveRules<'a> {
    pub cutoff_day: u32,
    pub grace_days: u32,
    pub start_after: u32,
    pub cap: Money,
    pub base: &'a LateFeeRuleSet,
}

impl LateFeeRuleSet {
    /// global fields overridden field-by-field by the class entry
    pub fn effective_for_class(&self, class_name: &str) -> EffectiveRules<'_> {
        let ovr = self.class_overrides.get(class_name);
        EffectiveRules {
            cutoff_day: ovr.and_then(|o| o.cutoff_day).unwrap_or(self.cutoff_day),
            grace_days: ovr.and_then(|o| o.grace_days).unwrap_or(self.grace_days),
            start_after: ovr.and_then(|o| o.start_after).unwrap_or(self.start_after),
            cap: ovr.and_then(|o| o.cap).unwrap_or(self.cap),
            base: self,
        }
    }

    /// heads whose inclusion triggers the late fee
    pub fn enabled_heads(&self) -> BTreeSet<&str> {
        self.apply_to_heads
            .iter()
            .filter(|(_, on)| **on)
            .map(|(head, _)| head.as_str())
            .collect()
    }

    /// An empty `included_heads` means the caller is collecting the late fee
    /// alone. With no enabled heads at all the gate is vacuous.
    pub fn head_gate_allows(&self, included_heads: &BTreeSet<String>) -> bool {
        let enabled = self.enabled_heads();
        if enabled.is_empty() || included_heads.is_empty() {
            return true;
        }
        included_heads.iter().any(|h| enabled.contains(h.as_str()))
    }

    /// per-day amount for the n-th chargeable day (1-based)
    pub fn rate_for_day(&self, day: u32) -> Money {
        self.slabs
            .iter()
            .find(|slab| slab.contains(day))
            .map(|slab| slab.per_day_amount)
            .unwrap_or(Money::ZERO)
    }

    /// cumulative slab charge over `days` chargeable days
    pub fn apply_slabs(&self, days: u32) -> Money {
        (1..=days).map(|day| self.rate_for_day(day)).sum()
    }

    pub fn validate(&self) -> Result<()> {
        validate_cutoff(self.cutoff_day, "global")?;
        if self.cap.is_negative() {
            return Err(invalid(format!("cap cannot be negative: {}", self.cap)));
        }

        let mut previous: Option<&LateFeeSlab> = None;
        for slab in &self.slabs {
            if slab.from_day == 0 {
                return Err(invalid("slab must start at day 1 or later".to_string()));
            }
            if let Some(to) = slab.to_day {
                if to < slab.from_day {
                    return Err(invalid(format!(
                        "slab {}-{} ends before it starts",
                        slab.from_day, to
                    )));
                }
            }
            if slab.per_day_amount.is_negative() {
                return Err(invalid(format!(
                    "slab from day {} has a negative per-day amount",
                    slab.from_day
                )));
            }
            if let Some(prev) = previous {
                match prev.to_day {
                    None => {
                        return Err(invalid(format!(
                            "open-ended slab from day {} must be last",
                            prev.from_day
                        )))
                    }
                    Some(prev_to) if prev_to >= slab.from_day => {
                        return Err(invalid(format!(
                            "slabs overlap or are out of order at day {}",
                            slab.from_day
                        )))
                    }
                    _ => {}
                }
            }
            previous = Some(slab);
        }

        for (class_name, ovr) in &self.class_overrides {
            if let Some(cutoff) = ovr.cutoff_day {
                validate_cutoff(cutoff, class_name)?;
            }
            if ovr.cap.map_or(false, |cap| cap.is_negative()) {
                return Err(invalid(format!("cap override for {} is negative", class_name)));
            }
        }

        Ok(())
    }

    /// replace class overrides from admin-entered JSON, keeping the
    /// current overrides if the input does not parse or validate
    pub fn set_class_overrides_json(&mut self, json: &str) -> Result<()> {
        let trimmed = json.trim();
        let overrides: BTreeMap<String, ClassOverride> = if trimmed.is_empty() {
            BTreeMap::new()
        } else {
            serde_json::from_str(trimmed)
                .map_err(|e| invalid(format!("per-class overrides: {}", e)))?
        };

        let mut candidate = self.clone();
        candidate.class_overrides = overrides;
        candidate.validate()?;

        self.class_overrides = candidate.class_overrides;
        Ok(())
    }

    /// replace holidays from a comma separated list of ISO dates
    pub fn set_holidays_from_list(&mut self, list: &str) -> Result<()> {
        self.holidays = parse_holidays(list)?;
        Ok(())
    }
}

/// parse "2026-03-08, 2026-08-15" into a date set; blanks are ignored
pub fn parse_holidays(list: &str) -> Result<BTreeSet<NaiveDate>> {
    list.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            parse_iso_date(s).map_err(|e| invalid(format!("holiday {}", e)))
        })
        .collect()
}

fn validate_cutoff(cutoff: u32, scope: &str) -> Result<()> {
    if !(1..=31).contains(&cutoff) {
        return Err(invalid(format!(
            "cutoff day for {} must be within 1..=31, got {}",
            scope, cutoff
        )));
    }
    Ok(())
}

fn invalid(message: String) -> FeeError {
    FeeError::InvalidConfiguration { message }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_slab_rules() -> LateFeeRuleSet {
        LateFeeRuleSet {
            slabs: vec![
                LateFeeSlab::new(1, Some(10), Money::from_major(10)),
                LateFeeSlab::new(11, None, Money::from_major(20)),
            ],
            ..LateFeeRuleSet::default()
        }
    }

    #[test]
    fn test_slab_accumulation_is_piecewise() {
        let rules = two_slab_rules();
        assert_eq!(rules.apply_slabs(0), Money::ZERO);
        assert_eq!(rules.apply_slabs(10), Money::from_major(100));
        assert_eq!(rules.apply_slabs(15), Money::from_major(200));
    }

    #[test]
    fn test_slab_gap_contributes_nothing() {
        let rules = LateFeeRuleSet {
            slabs: vec![
                LateFeeSlab::new(1, Some(5), Money::from_major(10)),
                LateFeeSlab::new(8, None, Money::from_major(20)),
            ],
            ..LateFeeRuleSet::default()
        };
        rules.validate().unwrap();
        assert_eq!(rules.apply_slabs(9), Money::from_major(90));
    }

    #[test]
    fn test_effective_rules_override_field_by_field() {
        let mut rules = two_slab_rules();
        rules
            .set_class_overrides_json(r#"{ "IX": { "cap": "300" }, "X": { "cutoffDay": 12 } }"#)
            .unwrap();

        let ix = rules.effective_for_class("IX");
        assert_eq!(ix.cap, Money::from_major(300));
        assert_eq!(ix.cutoff_day, 10);

        let x = rules.effective_for_class("X");
        assert_eq!(x.cutoff_day, 12);
        assert_eq!(x.cap, Money::from_major(200));

        let other = rules.effective_for_class("V");
        assert_eq!(other.cutoff_day, 10);
    }

    #[test]
    fn test_bad_override_json_keeps_previous() {
        let mut rules = two_slab_rules();
        rules.set_class_overrides_json(r#"{ "IX": { "graceDays": 3 } }"#).unwrap();

        let err = rules.set_class_overrides_json("{ not json").unwrap_err();
        assert!(matches!(err, FeeError::InvalidConfiguration { .. }));

        let err = rules
            .set_class_overrides_json(r#"{ "IX": { "graceDayz": 3 } }"#)
            .unwrap_err();
        assert!(matches!(err, FeeError::InvalidConfiguration { .. }));

        let err = rules
            .set_class_overrides_json(r#"{ "IX": { "cutoffDay": 40 } }"#)
            .unwrap_err();
        assert!(matches!(err, FeeError::InvalidConfiguration { .. }));

        assert_eq!(rules.class_overrides["IX"].grace_days, Some(3));
    }

    #[test]
    fn test_overlapping_slabs_rejected() {
        let rules = LateFeeRuleSet {
            slabs: vec![
                LateFeeSlab::new(1, Some(10), Money::from_major(10)),
                LateFeeSlab::new(10, None, Money::from_major(20)),
            ],
            ..LateFeeRuleSet::default()
        };
        assert!(rules.validate().is_err());

        let rules = LateFeeRuleSet {
            slabs: vec![
                LateFeeSlab::new(1, None, Money::from_major(10)),
                LateFeeSlab::new(11, None, Money::from_major(20)),
            ],
            ..LateFeeRuleSet::default()
        };
        assert!(rules.validate().is_err());
    }

    #[test]
    fn test_head_gate() {
        let rules = LateFeeRuleSet::default();
        let set = |heads: &[&str]| heads.iter().map(|h| h.to_string()).collect::<BTreeSet<_>>();

        assert!(rules.head_gate_allows(&set(&[])));
        assert!(rules.head_gate_allows(&set(&["Tuition", "Lab"])));
        assert!(!rules.head_gate_allows(&set(&["Lab", "Activity"])));

        let no_gates = LateFeeRuleSet {
            apply_to_heads: BTreeMap::from([("Lab".to_string(), false)]),
            ..LateFeeRuleSet::default()
        };
        assert!(no_gates.head_gate_allows(&set(&["Lab"])));
    }

    #[test]
    fn test_holiday_list_parsing() {
        let mut rules = LateFeeRuleSet::default();
        rules.set_holidays_from_list("2026-03-08, 2026-08-15,,").unwrap();
        assert_eq!(rules.holidays.len(), 2);

        assert!(rules.set_holidays_from_list("2026-13-01").is_err());
        assert_eq!(rules.holidays.len(), 2);
    }

    #[test]
    fn test_deserialize_stored_layout() {
        let json = r#"{
            "cutoffDay": 10, "graceDays": 0, "cap": "200", "startAfter": 0,
            "slabs": [{"from": 1, "to": 10, "perDay": "10"}, {"from": 11, "to": null, "perDay": "20"}],
            "skipSat": false, "skipSun": true, "holidays": ["2026-03-08"],
            "shiftRule": "nextBusiness"
        }"#;
        let rules: LateFeeRuleSet = serde_json::from_str(json).unwrap();
        assert_eq!(rules.slabs.len(), 2);
        assert!(rules.skip_sunday);
        assert_eq!(rules.shift_rule, ShiftRule::NextBusinessDay);
        // fields missing from the blob take defaults
        assert!(rules.apply_to_heads["Tuition"]);
    }
}
