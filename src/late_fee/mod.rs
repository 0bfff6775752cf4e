pub mod calendar;
pub mod engine;
pub mod rules;

pub use calendar::{due_date, BusinessCalendar};
pub use engine::{LateFeeCalculation, LateFeeEngine, WaiverReason};
pub use rules::{
    parse_holidays, ClassOverride, EffectiveRules, LateFeeRuleSet, LateFeeSlab, ShiftRule,
};
