use std::collections::BTreeMap;

use serde::Serialize;

use crate::model::{GroupContext, Paygrade, Recommendation, Report, SummaryGroup};
use crate::quota::{combined_max, early_promote_max, effective_quota_size, must_promote_max};
use crate::round2;

const FULL_FLEXIBILITY_REPORTS: f64 = 20.0;

/// Mean of the positive trait grades, or 0.0 when there are none.
#[must_use]
pub fn trait_average(traits: &BTreeMap<String, f64>) -> f64 {
    mean_of_positive(traits.values().copied())
}

/// Mean score of the observed reports in a group, or 0.0 when empty.
#[must_use]
pub fn group_average(reports: &[Report]) -> f64 {
    mean_of_positive(
        reports
            .iter()
            .filter(|report| !report.is_not_observed())
            .map(|report| report.trait_average),
    )
}

/// Cumulative average after folding `new_scores` into `total_signed`
/// reports already averaging `current`.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn project_cumulative_average(current: f64, total_signed: u32, new_scores: &[f64]) -> f64 {
    let denominator = f64::from(total_signed) + new_scores.len() as f64;
    if denominator <= 0.0 {
        return 0.0;
    }
    let numerator = current * f64::from(total_signed) + new_scores.iter().sum::<f64>();
    round2(numerator / denominator)
}

/// Cumulative average over every group of one paygrade.
#[must_use]
pub fn cumulative_average(groups: &[SummaryGroup], paygrade: Paygrade) -> f64 {
    mean_of_positive(
        groups
            .iter()
            .filter(|group| Paygrade::parse_label(&group.paygrade) == Some(paygrade))
            .flat_map(|group| group.reports.iter())
            .map(|report| report.trait_average),
    )
}

/// How far one more report can move the cumulative average. Lower is more
/// stable.
#[must_use]
pub fn sensitivity(total_signed: u32) -> f64 {
    1.0 / (f64::from(total_signed) + 1.0)
}

/// Percentage of the way to the 20 signed reports that give a reporting
/// senior full flexibility.
#[must_use]
pub fn flexibility(total_signed: u32) -> f64 {
    (f64::from(total_signed) / FULL_FLEXIBILITY_REPORTS * 100.0).min(100.0)
}

#[derive(Debug, Clone, Copy, Serialize, Eq, PartialEq)]
pub struct QuotaUsage {
    pub size: usize,
    pub early_promote_max: usize,
    pub early_promote_used: usize,
    pub must_promote_max: usize,
    pub must_promote_used: usize,
    pub combined_max: usize,
    pub combined_remaining: usize,
}

impl QuotaUsage {
    #[must_use]
    pub fn is_over_quota(&self) -> bool {
        self.early_promote_used > self.early_promote_max
            || self.must_promote_used > self.must_promote_max
            || self.early_promote_used + self.must_promote_used > self.combined_max
    }
}

/// "N of M used" snapshot for the current recommendations of a group.
#[must_use]
pub fn quota_usage(reports: &[Report], context: &GroupContext) -> QuotaUsage {
    let size = effective_quota_size(reports);
    let early_promote_used = count(reports, Recommendation::EarlyPromote);
    let must_promote_used = count(reports, Recommendation::MustPromote);
    let combined = combined_max(size, context);

    QuotaUsage {
        size,
        early_promote_max: early_promote_max(size, context),
        early_promote_used,
        must_promote_max: must_promote_max(size, context, early_promote_used),
        must_promote_used,
        combined_max: combined,
        combined_remaining: combined.saturating_sub(early_promote_used + must_promote_used),
    }
}

fn count(reports: &[Report], recommendation: Recommendation) -> usize {
    reports
        .iter()
        .filter(|report| report.recommendation == recommendation)
        .count()
}

#[allow(clippy::cast_precision_loss)]
fn mean_of_positive(values: impl Iterator<Item = f64>) -> f64 {
    let (sum, count) = values
        .filter(|value| *value > 0.0)
        .fold((0.0, 0usize), |(sum, count), value| (sum + value, count + 1));
    if count == 0 {
        return 0.0;
    }
    round2(sum / count as f64)
}
