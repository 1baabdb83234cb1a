//! Greedy rank-order allocation of Early Promote and Must Promote.
//!
//! The caller's order is the merit order. Nothing is re-sorted here, so ties
//! in score are always broken by position.

use tracing::{debug, warn};

use crate::eligibility::is_blocked;
use crate::model::{GroupContext, Recommendation, Report, SummaryGroup};
use crate::quota::{early_promote_max, effective_quota_size, must_promote_max};

/// Assigns recommendations down a rank-ordered list of reports.
///
/// NotObserved and locked reports are passed through untouched; locked
/// Early Promote and Must Promote reports still consume quota. The output
/// has the same length and order as the input.
#[must_use]
pub fn allocate(reports: &[Report], context: &GroupContext) -> Vec<Report> {
    let size = effective_quota_size(reports);
    let early_max = early_promote_max(size, context);

    let mut allocated = reports.to_vec();
    let mut early_count = count_locked(reports, Recommendation::EarlyPromote);
    let mut newly_early = vec![false; allocated.len()];

    for (report, newly) in allocated.iter_mut().zip(newly_early.iter_mut()) {
        if !is_adjustable(report) || early_count >= early_max {
            continue;
        }
        if !is_blocked(report, Recommendation::EarlyPromote, context) {
            report.recommendation = Recommendation::EarlyPromote;
            early_count += 1;
            *newly = true;
        }
    }

    let must_max = must_promote_max(size, context, early_count);
    let mut must_count = count_locked(reports, Recommendation::MustPromote);

    for (report, newly) in allocated.iter_mut().zip(newly_early.iter()) {
        if !is_adjustable(report) || *newly {
            continue;
        }

        if must_count < must_max && !is_blocked(report, Recommendation::MustPromote, context) {
            report.recommendation = Recommendation::MustPromote;
            must_count += 1;
        } else if !is_blocked(report, Recommendation::Promotable, context) {
            report.recommendation = Recommendation::Promotable;
        } else if !matches!(
            report.recommendation,
            Recommendation::SignificantProblems | Recommendation::Progressing
        ) {
            report.recommendation = Recommendation::SignificantProblems;
        }
    }

    debug!(
        size,
        early_max,
        early_count,
        must_max,
        must_count,
        "allocated recommendations"
    );
    allocated
}

/// Allocates a summary group's reports in their stored order.
///
/// An unmappable paygrade is logged and the reports come back unchanged.
#[must_use]
pub fn allocate_group(group: &SummaryGroup) -> Vec<Report> {
    match group.context() {
        Ok(context) => allocate(&group.reports, &context),
        Err(err) => {
            warn!(
                group_id = %group.group_id,
                paygrade = group.paygrade.as_str(),
                error = %err,
                "skipping allocation for unmappable group context"
            );
            group.reports.clone()
        }
    }
}

fn is_adjustable(report: &Report) -> bool {
    !report.locked && !report.is_not_observed()
}

fn count_locked(reports: &[Report], recommendation: Recommendation) -> usize {
    reports
        .iter()
        .filter(|report| report.locked && report.recommendation == recommendation)
        .count()
}
