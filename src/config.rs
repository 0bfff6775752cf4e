use serde::{Deserialize, Serialize};

use crate::decimal::Money;
use crate::errors::{FeeError, Result};
use crate::late_fee::{LateFeeRuleSet, LateFeeSlab};
use crate::schedule::{FeeHeadSchedule, FeeScheduleResolver};

/// fee engine configuration, injected into the ledger
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeeConfig {
    /// bumped by every administrative edit
    pub version: u64,
    pub fee_heads: FeeHeadSchedule,
    pub late_fee_rules: LateFeeRuleSet,
    /// single Tuition head used for classes missing from the schedule
    pub fallback_tuition: Money,
    pub receipt_prefix: String,
}

impl Default for FeeConfig {
    fn default() -> Self {
        Self {
            version: 1,
            fee_heads: FeeHeadSchedule::new(),
            late_fee_rules: LateFeeRuleSet::default(),
            fallback_tuition: Money::from_major(800),
            receipt_prefix: "R-".to_string(),
        }
    }
}

impl FeeConfig {
    /// two-slab policy: 10/day for the first ten days, 20/day after, capped at 200
    pub fn standard() -> Self {
        Self {
            late_fee_rules: LateFeeRuleSet {
                cutoff_day: 10,
                grace_days: 0,
                cap: Money::from_major(200),
                slabs: vec![
                    LateFeeSlab::new(1, Some(10), Money::from_major(10)),
                    LateFeeSlab::new(11, None, Money::from_major(20)),
                ],
                ..LateFeeRuleSet::default()
            },
            ..Self::default()
        }
    }

    /// standard policy over the given class schedule
    pub fn with_schedule(fee_heads: FeeHeadSchedule) -> Self {
        Self {
            fee_heads,
            ..Self::standard()
        }
    }

    pub fn resolver(&self) -> FeeScheduleResolver<'_> {
        FeeScheduleResolver::new(&self.fee_heads, self.fallback_tuition)
    }

    pub fn validate(&self) -> Result<()> {
        self.fee_heads.validate()?;
        self.late_fee_rules.validate()?;
        if self.fallback_tuition.is_negative() {
            return Err(FeeError::InvalidConfiguration {
                message: format!("fallback tuition cannot be negative: {}", self.fallback_tuition),
            });
        }
        if self.receipt_prefix.trim().is_empty() {
            return Err(FeeError::InvalidConfiguration {
                message: "receipt prefix cannot be empty".to_string(),
            });
        }
        Ok(())
    }

    pub fn set_fee_head(&mut self, class_name: &str, head: &str, amount: Money) -> Result<()> {
        self.fee_heads.set_head(class_name, head, amount)?;
        self.bump();
        Ok(())
    }

    pub fn remove_fee_head(&mut self, class_name: &str, head: &str) -> Option<Money> {
        let removed = self.fee_heads.remove_head(class_name, head);
        if removed.is_some() {
            self.bump();
        }
        removed
    }

    /// swap in a whole new rule set once it validates
    pub fn replace_late_fee_rules(&mut self, rules: LateFeeRuleSet) -> Result<()> {
        rules.validate()?;
        self.late_fee_rules = rules;
        self.bump();
        Ok(())
    }

    pub fn apply_class_overrides_json(&mut self, json: &str) -> Result<()> {
        self.late_fee_rules.set_class_overrides_json(json)?;
        self.bump();
        Ok(())
    }

    pub fn set_holidays_from_list(&mut self, list: &str) -> Result<()> {
        self.late_fee_rules.set_holidays_from_list(list)?;
        self.bump();
        Ok(())
    }

    pub fn to_json_pretty(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| FeeError::InvalidConfiguration {
            message: e.to_string(),
        })
    }

    /// parse and validate a stored configuration blob
    pub fn from_json(json: &str) -> Result<Self> {
        let config: FeeConfig =
            serde_json::from_str(json).map_err(|e| FeeError::InvalidConfiguration {
                message: e.to_string(),
            })?;
        config.validate()?;
        Ok(config)
    }

    fn bump(&mut self) {
        self.version += 1;
    }
}
