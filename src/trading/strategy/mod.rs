pub mod confluence_strategy;
pub mod profit_stop_loss;

pub use confluence_strategy::{confluence, Evaluation, RsiThresholds, SignalEvaluator, SkipReason};
pub use profit_stop_loss::{ProtectiveLevels, RiskPlan, RiskSizer};
