//! Water-filling of trait averages toward a target group average.
//!
//! Scores are balanced in integer hundredths so repeated small steps never
//! accumulate floating point drift.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;
use tracing::debug;

use crate::allocator::allocate_group;
use crate::config::OptimizerConfig;
use crate::model::{MemberId, Report, SummaryGroup};

/// Outcome of one balancing run alongside the adjusted reports.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Optimization {
    pub reports: Vec<Report>,
    pub summary: BalanceSummary,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq)]
pub struct BalanceSummary {
    pub active_count: usize,
    pub target_aggregate: f64,
    pub achieved_aggregate: f64,
    pub within_margin: bool,
    pub raise_rounds: u32,
    pub cut_rounds: u32,
}

/// Ranks, allocates and balances a group. See [`optimize_with_summary`].
#[must_use]
pub fn optimize(group: &SummaryGroup, rank_order: &[MemberId], config: &OptimizerConfig) -> Vec<Report> {
    optimize_with_summary(group, rank_order, config).reports
}

/// Orders `group` by `rank_order`, reallocates recommendations, then moves
/// unlocked scores in steps of `min_increment` until the active average
/// reaches the target.
///
/// A surplus is handed out top-down, round-robin, up to the working ceiling.
/// A deficit is recovered bottom-up down to the working floor. NotObserved
/// reports are excluded and locked reports are never changed.
#[must_use]
pub fn optimize_with_summary(
    group: &SummaryGroup,
    rank_order: &[MemberId],
    config: &OptimizerConfig,
) -> Optimization {
    let ranked = SummaryGroup {
        reports: order_by_rank(&group.reports, rank_order),
        ..group.clone()
    };
    let mut reports = allocate_group(&ranked);

    let active: Vec<usize> = reports
        .iter()
        .enumerate()
        .filter(|(_, report)| !report.is_not_observed())
        .map(|(index, _)| index)
        .collect();

    if active.is_empty() {
        return Optimization {
            reports,
            summary: BalanceSummary {
                active_count: 0,
                target_aggregate: config.target_aggregate,
                achieved_aggregate: 0.0,
                within_margin: false,
                raise_rounds: 0,
                cut_rounds: 0,
            },
        };
    }

    let mut scores: Vec<i64> = active
        .iter()
        .map(|index| to_hundredths(reports[*index].trait_average))
        .collect();
    let adjustable: Vec<usize> = active
        .iter()
        .enumerate()
        .filter(|(_, index)| !reports[**index].locked)
        .map(|(position, _)| position)
        .collect();

    let count = i64::try_from(active.len()).unwrap_or(i64::MAX);
    let budget = to_hundredths(config.target_aggregate).saturating_mul(count);
    let mut remaining = budget - scores.iter().sum::<i64>();

    let step = to_hundredths(config.min_increment).max(1);
    let ceiling = to_hundredths(config.working_ceiling);
    let floor = to_hundredths(config.working_floor);
    let tolerance = config.tolerance;

    let mut raise_rounds = 0;
    while exceeds(remaining, tolerance) && raise_rounds < config.max_raise_rounds {
        let mut moved = 0;
        for position in &adjustable {
            if !exceeds(remaining, tolerance) {
                break;
            }
            let score = &mut scores[*position];
            if *score >= ceiling {
                continue;
            }
            let delta = step.min(ceiling - *score);
            *score += delta;
            remaining -= delta;
            moved += 1;
        }
        if moved == 0 {
            break;
        }
        raise_rounds += 1;
    }

    let mut cut_rounds = 0;
    while exceeds(-remaining, tolerance) && cut_rounds < config.max_cut_rounds {
        let mut moved = 0;
        for position in adjustable.iter().rev() {
            if !exceeds(-remaining, tolerance) {
                break;
            }
            let score = &mut scores[*position];
            if *score <= floor {
                continue;
            }
            let delta = step.min(*score - floor);
            *score -= delta;
            remaining += delta;
            moved += 1;
        }
        if moved == 0 {
            break;
        }
        cut_rounds += 1;
    }

    for position in &adjustable {
        let report = &mut reports[active[*position]];
        if to_hundredths(report.trait_average) != scores[*position] {
            report.trait_average = from_hundredths(scores[*position]);
        }
    }

    let achieved_aggregate = average_hundredths(&scores);
    let summary = BalanceSummary {
        active_count: active.len(),
        target_aggregate: config.target_aggregate,
        achieved_aggregate,
        within_margin: (achieved_aggregate - config.target_aggregate).abs() <= config.margin + 1e-9,
        raise_rounds,
        cut_rounds,
    };
    debug!(
        group_id = %group.group_id,
        active = summary.active_count,
        target = summary.target_aggregate,
        achieved = summary.achieved_aggregate,
        raise_rounds,
        cut_rounds,
        "balanced group scores"
    );

    Optimization { reports, summary }
}

/// Re-plans every open group of one competitive group from a single global
/// rank order.
///
/// Each matching group that is not final or submitted is optimized against
/// the global order filtered to its own members, and that filtered order is
/// stored as the group's rank order. Other groups pass through unchanged.
#[must_use]
pub fn propagate_rank_order(
    groups: &[SummaryGroup],
    competitive_group_key: &str,
    global_order: &[MemberId],
    config: &OptimizerConfig,
) -> Vec<SummaryGroup> {
    groups
        .iter()
        .map(|group| {
            if group.competitive_group_key != competitive_group_key || !group.status.is_open() {
                return group.clone();
            }

            let members: BTreeSet<MemberId> =
                group.reports.iter().map(|report| report.member_id).collect();
            let local_order: Vec<MemberId> = global_order
                .iter()
                .copied()
                .filter(|member_id| members.contains(member_id))
                .collect();

            SummaryGroup {
                reports: optimize(group, &local_order, config),
                rank_order: local_order,
                ..group.clone()
            }
        })
        .collect()
}

/// Stable sort by position in `rank_order`; unranked reports go last.
#[must_use]
pub fn order_by_rank(reports: &[Report], rank_order: &[MemberId]) -> Vec<Report> {
    let positions: BTreeMap<MemberId, usize> = rank_order
        .iter()
        .enumerate()
        .map(|(position, member_id)| (*member_id, position))
        .rev()
        .collect();
    let mut ordered = reports.to_vec();
    ordered.sort_by_key(|report| {
        positions
            .get(&report.member_id)
            .copied()
            .unwrap_or(usize::MAX)
    });
    ordered
}

fn exceeds(remaining: i64, tolerance: f64) -> bool {
    from_hundredths(remaining) > tolerance
}

#[allow(clippy::cast_possible_truncation)]
fn to_hundredths(value: f64) -> i64 {
    (value * 100.0).round() as i64
}

#[allow(clippy::cast_precision_loss)]
fn from_hundredths(value: i64) -> f64 {
    value as f64 / 100.0
}

#[allow(clippy::cast_precision_loss)]
fn average_hundredths(scores: &[i64]) -> f64 {
    if scores.is_empty() {
        return 0.0;
    }
    let total: i64 = scores.iter().sum();
    crate::round2(total as f64 / 100.0 / scores.len() as f64)
}
