//! Cumulative average planning across the groups of one competitive group.
//!
//! Groups are walked in the caller's order, which is taken as chronological.
//! Closed groups contribute their actual scores; open groups receive the
//! highest average that keeps the running cumulative average on the target
//! chosen for that point.

use serde::Serialize;
use tracing::debug;

use crate::config::TargetConfig;
use crate::model::{GroupId, GroupStatus, Recommendation, Report, SummaryGroup, SCORE_MAX};
use crate::round2;

const TREND_LOOKBACK: usize = 3;
const URGENCY_HORIZON: u32 = 4;
const URGENCY_WEIGHT: f64 = 0.30;
const URGENCY_DEVIATION: f64 = 0.20;
const LOW_GAP: f64 = 0.40;

const EARLY_PROMOTE_BOOST: f64 = 0.40;
const MUST_PROMOTE_BOOST: f64 = 0.10;
const RANK_DECAY: f64 = 0.02;
const DISTRIBUTION_FLOOR: f64 = 2.00;
const BELOW_PROMOTABLE_CAP: f64 = 2.00;

/// One waypoint of a planned cumulative average.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct TrajectoryPoint {
    pub group_id: GroupId,
    pub name: String,
    pub competitive_group_key: String,
    /// Cumulative average after this group.
    pub cumulative_average: f64,
    pub target: f64,
    /// `target - cumulative_average`; negative means the target was overrun.
    pub margin: f64,
    pub projected: bool,
    /// Actual group average for closed groups, planned average for open ones.
    pub optimal_average: f64,
    pub member_count: usize,
    pub end_of_tour: bool,
}

/// Risk profile of a planned trajectory.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct RiskSummary {
    pub min_margin: f64,
    pub projected_average: f64,
    pub target: Option<f64>,
    pub is_critical: bool,
    pub last_point: Option<TrajectoryPoint>,
}

/// Target cumulative average for the next cycle given where the average
/// stands now.
///
/// Inside the safe zone the ideal target holds. Below it the target climbs
/// gradually, more slowly when far under the minimum. Above it the target
/// pulls back, and not at all past the ideal when `trend` is already falling.
#[must_use]
pub fn dynamic_target(current: f64, trend: f64, config: &TargetConfig) -> f64 {
    let approach = (config.safe_zone_min + config.ideal_target) / 2.0;

    if (config.safe_zone_min..=config.safe_zone_max).contains(&current) {
        return config.ideal_target;
    }
    if current < config.min_limit {
        if config.min_limit - current > LOW_GAP {
            return config.safe_zone_min;
        }
        return approach;
    }
    if current < config.safe_zone_min {
        return approach;
    }
    if current <= config.max_limit {
        if trend < 0.0 {
            return config.ideal_target;
        }
        return (config.safe_zone_max + config.ideal_target) / 2.0;
    }
    config.safe_zone_min
}

/// [`dynamic_target`] pushed harder toward the ideal as the remaining
/// reporting periods run out.
///
/// With four or more periods left, inside the safe zone, or within 0.20 of
/// the ideal, the dynamic target is returned as is.
#[must_use]
pub fn adaptive_target(current: f64, trend: f64, reports_remaining: u32, config: &TargetConfig) -> f64 {
    let base = dynamic_target(current, trend, config);
    if reports_remaining >= URGENCY_HORIZON
        || (config.safe_zone_min..=config.safe_zone_max).contains(&current)
    {
        return base;
    }

    let deviation = current - config.ideal_target;
    if deviation.abs() < URGENCY_DEVIATION {
        return base;
    }

    let urgency = (f64::from(URGENCY_HORIZON - reports_remaining) / 3.0).min(1.0);
    let push = deviation.abs() * urgency * URGENCY_WEIGHT;
    if deviation < 0.0 {
        (base + push).min(config.max_limit)
    } else {
        (base - push).max(config.min_limit)
    }
}

/// Change in cumulative average across the last three points.
#[must_use]
pub fn trend(points: &[TrajectoryPoint]) -> f64 {
    if points.len() < 2 {
        return 0.0;
    }
    let recent = &points[points.len().saturating_sub(TREND_LOOKBACK)..];
    match (recent.first(), recent.last()) {
        (Some(first), Some(last)) => last.cumulative_average - first.cumulative_average,
        _ => 0.0,
    }
}

/// Plans the cumulative average across `groups`, oldest first.
///
/// Final, submitted and review groups are historical and fold their scored
/// reports into the running totals. Every other group is planned at the
/// highest average, capped at 5.00 and never negative, that lands the
/// cumulative average on its adaptive target. Groups without reports are
/// skipped.
#[must_use]
pub fn optimized_trajectory(groups: &[SummaryGroup], config: &TargetConfig) -> Vec<TrajectoryPoint> {
    let future_total = groups
        .iter()
        .filter(|group| !is_historical(group.status) && !group.reports.is_empty())
        .count();
    let last_index = groups.iter().rposition(|group| !group.reports.is_empty());

    let mut points: Vec<TrajectoryPoint> = Vec::new();
    let mut total = 0.0;
    let mut count = 0usize;
    let mut future_seen = 0usize;

    for (index, group) in groups.iter().enumerate() {
        if group.reports.is_empty() {
            continue;
        }

        let historical = is_historical(group.status);
        let (optimal_average, planned_target) = if historical {
            let scored: Vec<f64> = group
                .reports
                .iter()
                .filter(|report| is_scored(report))
                .map(|report| report.trait_average)
                .collect();
            let sum: f64 = scored.iter().sum();
            total += sum;
            count += scored.len();
            if scored.is_empty() {
                (0.0, None)
            } else {
                (round2(sum / as_f64(scored.len())), None)
            }
        } else {
            let remaining = future_total.saturating_sub(future_seen + 1);
            future_seen += 1;
            let target = adaptive_target(
                running_average(total, count),
                trend(&points),
                u32::try_from(remaining).unwrap_or(u32::MAX),
                config,
            );

            let planned = group
                .reports
                .iter()
                .filter(|report| !report.is_not_observed())
                .count();
            let average = if planned == 0 {
                0.0
            } else {
                let allowed = target * as_f64(count + planned) - total;
                round2((allowed / as_f64(planned)).clamp(0.0, SCORE_MAX))
            };
            total += average * as_f64(planned);
            count += planned;
            (average, Some(target))
        };

        let cumulative_average = round2(running_average(total, count));
        let target = planned_target
            .unwrap_or_else(|| dynamic_target(cumulative_average, trend(&points), config));

        points.push(TrajectoryPoint {
            group_id: group.group_id,
            name: if group.name.is_empty() {
                group.competitive_group_key.clone()
            } else {
                group.name.clone()
            },
            competitive_group_key: group.competitive_group_key.clone(),
            cumulative_average,
            target,
            margin: round2(target - cumulative_average),
            projected: !historical,
            optimal_average,
            member_count: group.reports.len(),
            end_of_tour: Some(index) == last_index,
        });
    }

    debug!(
        groups = groups.len(),
        points = points.len(),
        projected = future_total,
        "planned cumulative trajectory"
    );
    points
}

/// Lowest margin and final standing of a trajectory. Any negative margin is
/// critical.
#[must_use]
pub fn analyze_risk(points: &[TrajectoryPoint]) -> RiskSummary {
    let Some(last) = points.last() else {
        return RiskSummary {
            min_margin: 0.0,
            projected_average: 0.0,
            target: None,
            is_critical: false,
            last_point: None,
        };
    };

    let min_margin = points
        .iter()
        .map(|point| point.margin)
        .fold(f64::INFINITY, f64::min);
    RiskSummary {
        min_margin,
        projected_average: last.cumulative_average,
        target: Some(last.target),
        is_critical: min_margin < 0.0,
        last_point: Some(last.clone()),
    }
}

/// Spreads `target_average` across rank-ordered reports.
///
/// Locked reports keep their score and their total is taken out of the
/// budget first. Unlocked reports start from the remaining per-member
/// average, gain 0.40 for Early Promote or 0.10 for Must Promote, lose 0.02
/// per rank position, and are shifted back so their mean matches the
/// remaining budget. Results are clamped to 2.00 and 5.00, with Progressing
/// and Significant Problems held at 2.00. NotObserved reports keep their
/// score and sit outside the budget and the rank positions.
#[must_use]
pub fn distribute_by_rank(reports: &[Report], target_average: f64) -> Vec<f64> {
    let active: Vec<usize> = reports
        .iter()
        .enumerate()
        .filter(|(_, report)| !report.is_not_observed())
        .map(|(index, _)| index)
        .collect();

    let mut scores: Vec<f64> = reports.iter().map(|report| round2(report.trait_average)).collect();
    let unlocked: Vec<(usize, usize)> = active
        .iter()
        .enumerate()
        .filter(|(_, index)| !reports[**index].locked)
        .map(|(position, index)| (position, *index))
        .collect();
    if unlocked.is_empty() {
        return scores;
    }

    let locked_total: f64 = active
        .iter()
        .filter(|index| reports[**index].locked)
        .map(|index| reports[*index].trait_average)
        .sum();
    let unlocked_target =
        (target_average * as_f64(active.len()) - locked_total) / as_f64(unlocked.len());

    let raw: Vec<f64> = unlocked
        .iter()
        .map(|(position, index)| {
            unlocked_target + recommendation_boost(reports[*index].recommendation)
                - as_f64(*position) * RANK_DECAY
        })
        .collect();
    let shift = unlocked_target - raw.iter().sum::<f64>() / as_f64(raw.len());

    for ((_, index), value) in unlocked.iter().zip(raw) {
        let cap = match reports[*index].recommendation {
            Recommendation::Progressing | Recommendation::SignificantProblems => BELOW_PROMOTABLE_CAP,
            _ => SCORE_MAX,
        };
        scores[*index] = round2((value + shift).clamp(DISTRIBUTION_FLOOR, cap));
    }
    scores
}

fn recommendation_boost(recommendation: Recommendation) -> f64 {
    match recommendation {
        Recommendation::EarlyPromote => EARLY_PROMOTE_BOOST,
        Recommendation::MustPromote => MUST_PROMOTE_BOOST,
        _ => 0.0,
    }
}

fn is_historical(status: GroupStatus) -> bool {
    matches!(status, GroupStatus::Final | GroupStatus::Submitted | GroupStatus::Review)
}

fn is_scored(report: &Report) -> bool {
    report.trait_average > 0.0 && !report.is_not_observed()
}

fn running_average(total: f64, count: usize) -> f64 {
    if count == 0 {
        return 0.0;
    }
    total / as_f64(count)
}

#[allow(clippy::cast_precision_loss)]
fn as_f64(value: usize) -> f64 {
    value as f64
}

#[cfg(test)]
mod tests {
    use ulid::Ulid;

    use super::*;
    use crate::allocator::tests::{group, report};

    fn assert_close(actual: f64, expected: f64) {
        assert!(
            (actual - expected).abs() < 1e-9,
            "expected {expected:.2}, got {actual:.2}"
        );
    }

    fn period(seed: u64, status: GroupStatus, size: u64, score: f64) -> SummaryGroup {
        let mut planned = group(
            "O-3",
            (1..=size).map(|member| report(seed * 100 + member, score)).collect(),
        );
        planned.group_id = GroupId(Ulid::from_parts(seed, 7));
        planned.status = status;
        planned
    }

    fn point(cumulative_average: f64, margin: f64) -> TrajectoryPoint {
        TrajectoryPoint {
            group_id: GroupId(Ulid::from_parts(1, 7)),
            name: "O-3 URL Active".to_string(),
            competitive_group_key: "O-3|URL".to_string(),
            cumulative_average,
            target: 4.00,
            margin,
            projected: true,
            optimal_average: cumulative_average,
            member_count: 4,
            end_of_tour: false,
        }
    }

    #[test]
    fn dynamic_target_follows_the_bands() {
        let config = TargetConfig::default();
        assert_close(dynamic_target(4.05, 0.0, &config), 4.00);
        assert_close(dynamic_target(3.10, 0.0, &config), 3.80);
        assert_close(dynamic_target(3.50, 0.0, &config), 3.90);
        assert_close(dynamic_target(3.70, 0.0, &config), 3.90);
        assert_close(dynamic_target(4.30, 0.0, &config), 4.10);
        assert_close(dynamic_target(4.30, -0.05, &config), 4.00);
        assert_close(dynamic_target(4.60, 0.0, &config), 3.80);
    }

    #[test]
    fn adaptive_target_adds_urgency_near_the_end() {
        let config = TargetConfig::default();
        assert_close(adaptive_target(3.50, 0.0, 4, &config), 3.90);
        assert_close(adaptive_target(3.50, 0.0, 1, &config), 4.05);
        assert_close(adaptive_target(3.50, 0.0, 3, &config), 3.90 + 0.50 * (1.0 / 3.0) * 0.30);
        assert_close(adaptive_target(4.60, 0.0, 0, &config), 3.62);
        assert_close(adaptive_target(3.90, 0.0, 0, &config), 4.00);
        // Far enough above the ideal to matter, but the pullback is held at
        // the minimum limit.
        assert_close(adaptive_target(5.00, 0.0, 0, &TargetConfig::around(3.00)), 2.60);
    }

    #[test]
    fn trend_uses_the_last_three_points() {
        assert_close(trend(&[]), 0.0);
        assert_close(trend(&[point(3.80, 0.0)]), 0.0);
        let points = [point(3.20, 0.0), point(3.80, 0.0), point(3.90, 0.0), point(4.10, 0.0)];
        assert!((trend(&points) - 0.30).abs() < 1e-9);
    }

    #[test]
    fn last_chance_below_target_pushes_the_plan_up() {
        let groups = [
            period(1, GroupStatus::Final, 10, 3.50),
            period(2, GroupStatus::Draft, 10, 0.0),
        ];
        let points = optimized_trajectory(&groups, &TargetConfig::default());

        assert_eq!(points.len(), 2);
        assert!(!points[0].projected);
        assert_close(points[0].optimal_average, 3.50);
        assert!(points[1].projected);
        assert!(points[1].end_of_tour);
        assert!(points[1].optimal_average > 4.00);
        assert_close(points[1].optimal_average, 4.60);
        assert_close(points[1].cumulative_average, 4.05);
    }

    #[test]
    fn last_chance_above_target_pulls_the_plan_down() {
        let groups = [
            period(1, GroupStatus::Submitted, 10, 4.60),
            period(2, GroupStatus::Planned, 10, 0.0),
        ];
        let points = optimized_trajectory(&groups, &TargetConfig::default());

        let correction = &points[1];
        assert!(correction.optimal_average < 3.50);
        assert!(correction.optimal_average >= 2.00);
        assert_close(correction.optimal_average, 2.64);
    }

    #[test]
    fn blown_budget_plans_zero() {
        let groups = [
            period(1, GroupStatus::Final, 100, 5.00),
            period(2, GroupStatus::Draft, 10, 0.0),
        ];
        let points = optimized_trajectory(&groups, &TargetConfig::around(3.00));
        let planned = points.iter().find(|point| point.projected);
        match planned {
            Some(found) => assert_close(found.optimal_average, 0.0),
            None => panic!("expected a projected point"),
        }
    }

    #[test]
    fn historical_groups_skip_unscored_reports() {
        let mut closed = period(1, GroupStatus::Review, 4, 4.00);
        closed.reports[3].recommendation = Recommendation::NotObserved;
        closed.reports[2].trait_average = 0.0;
        let empty = period(2, GroupStatus::Draft, 0, 0.0);
        let points = optimized_trajectory(&[closed, empty], &TargetConfig::default());

        assert_eq!(points.len(), 1);
        assert!(points[0].end_of_tour);
        assert_eq!(points[0].member_count, 4);
        assert_close(points[0].cumulative_average, 4.00);
        assert_close(points[0].target, 4.00);
        assert_close(points[0].margin, 0.0);
    }

    #[test]
    fn plans_land_on_target_without_history() {
        let groups = [
            period(1, GroupStatus::Draft, 5, 0.0),
            period(2, GroupStatus::Draft, 5, 0.0),
        ];
        let points = optimized_trajectory(&groups, &TargetConfig::default());
        // From an empty history the first plan climbs to the maximum limit
        // and the last one pulls the cumulative average back down.
        assert_close(points[0].optimal_average, 4.40);
        assert_close(points[1].optimal_average, 3.56);
        assert_close(points[1].cumulative_average, 3.98);
        assert!(points[1].end_of_tour);
    }

    #[test]
    fn risk_tracks_the_lowest_margin() {
        let summary = analyze_risk(&[point(3.90, 0.10), point(4.05, -0.05), point(4.00, 0.0)]);
        assert_close(summary.min_margin, -0.05);
        assert!(summary.is_critical);
        assert_close(summary.projected_average, 4.00);
        assert_eq!(summary.target, Some(4.00));

        let empty = analyze_risk(&[]);
        assert!(!empty.is_critical);
        assert_eq!(empty.last_point, None);
    }

    #[test]
    fn locked_scores_are_fixed_mass() {
        let mut reports = vec![report(1, 5.00), report(2, 3.00), report(3, 3.00)];
        reports[0].locked = true;
        reports[0].recommendation = Recommendation::EarlyPromote;
        reports[1].recommendation = Recommendation::MustPromote;
        reports[2].recommendation = Recommendation::MustPromote;

        let spread = distribute_by_rank(&reports, 4.00);
        assert_close(spread[0], 5.00);
        assert_close(spread[1], 3.51);
        assert_close(spread[2], 3.49);
    }

    #[test]
    fn all_locked_reports_keep_their_scores() {
        let mut reports = vec![report(1, 5.00), report(2, 4.00)];
        for entry in &mut reports {
            entry.locked = true;
        }
        assert_eq!(distribute_by_rank(&reports, 3.00), vec![5.00, 4.00]);
        assert!(distribute_by_rank(&[], 4.00).is_empty());
    }

    #[test]
    fn rank_decay_orders_equal_recommendations() {
        let reports: Vec<Report> = (1..=4).map(|seed| report(seed, 3.00)).collect();
        let spread = distribute_by_rank(&reports, 4.00);
        for (actual, expected) in spread.iter().zip([4.03, 4.01, 3.99, 3.97]) {
            assert_close(*actual, expected);
        }
    }

    #[test]
    fn below_promotable_recommendations_are_held_at_the_floor() {
        let mut single = vec![report(1, 3.00)];
        single[0].recommendation = Recommendation::SignificantProblems;
        assert_close(distribute_by_rank(&single, 4.00)[0], 2.00);

        single[0].recommendation = Recommendation::Progressing;
        assert_close(distribute_by_rank(&single, 4.00)[0], 2.00);

        single[0].recommendation = Recommendation::Promotable;
        assert_close(distribute_by_rank(&single, 4.00)[0], 4.00);
    }

    #[test]
    fn not_observed_reports_stay_outside_the_budget() {
        let mut reports = vec![report(1, 3.00), report(2, 0.0), report(3, 3.00)];
        reports[1].recommendation = Recommendation::NotObserved;
        let spread = distribute_by_rank(&reports, 4.00);
        assert_close(spread[0], 4.01);
        assert_close(spread[1], 0.0);
        assert_close(spread[2], 3.99);
    }
}
