//! Promotion quota allocation and score optimization engine.
//!
//! Every operation is a pure function that returns a new collection built
//! from the caller's reports. Locked reports are never altered.

pub mod allocator;
pub mod config;
pub mod designator;
pub mod eligibility;
pub mod metrics;
pub mod model;
pub mod optimizer;
pub mod projection;
pub mod quota;
pub mod trajectory;

pub use allocator::{allocate, allocate_group};
pub use config::{OptimizerConfig, StrategyConfig, TargetConfig};
pub use designator::CompetitiveCategory;
pub use eligibility::{
    validate_against_traits, validate_justification, validate_rank_cap, validate_report,
    validate_withdrawal, PolicyViolation, RuleCode, Severity,
};
pub use metrics::{
    cumulative_average, flexibility, group_average, project_cumulative_average, quota_usage,
    sensitivity, trait_average, QuotaUsage,
};
pub use model::{
    GroupContext, GroupId, GroupStatus, MemberId, MemberStatus, Paygrade, RankCategory,
    Recommendation, Report, ReportId, SummaryGroup, SCORE_MAX, SCORE_MIN,
};
pub use optimizer::{
    optimize, optimize_with_summary, order_by_rank, propagate_rank_order, BalanceSummary,
    Optimization,
};
pub use projection::{project, RosterMember};
pub use quota::{
    combined_max, early_promote_max, effective_quota_size, must_promote_column, must_promote_max,
    quota_limits, MustPromoteColumn, QuotaLimits, QuotaRow, QUOTA_TABLE,
};
pub use trajectory::{
    adaptive_target, analyze_risk, distribute_by_rank, dynamic_target, optimized_trajectory, trend,
    RiskSummary, TrajectoryPoint,
};

#[derive(Debug, Clone, thiserror::Error, Eq, PartialEq)]
pub enum EngineError {
    #[error("validation error: {0}")]
    Validation(String),
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error("context error: {0}")]
    Context(String),
}

/// Rounds to two decimal places, the precision grades are reported at.
#[must_use]
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
