//! Forward projection of trait averages from rank order.
//!
//! The top-ranked member gets a breakout ceiling, the lowest-ranked
//! Promotable member anchors the ballast floor, and everyone in between is
//! spread linearly across that range.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::StrategyConfig;
use crate::model::{MemberId, MemberStatus, SCORE_MAX, SCORE_MIN};
use crate::round2;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RosterMember {
    pub member_id: MemberId,
    pub rank_order: u32,
    #[serde(default)]
    pub reports_remaining: u32,
    #[serde(default)]
    pub status: Option<MemberStatus>,
    #[serde(default)]
    pub locked: bool,
    #[serde(default)]
    pub projected_score: Option<f64>,
}

impl RosterMember {
    fn has_status(&self, status: MemberStatus) -> bool {
        self.status == Some(status)
    }
}

/// Projects a score for every unlocked member of `roster`.
///
/// The result is ordered by rank (stable for equal ranks). Locked members
/// keep their existing `projected_score` and take no part in locating the
/// ceiling or the floor anchor.
#[must_use]
pub fn project(roster: &[RosterMember], target: f64, config: &StrategyConfig) -> Vec<RosterMember> {
    let mut projected = roster.to_vec();
    projected.sort_by_key(|member| member.rank_order);

    let working: Vec<usize> = projected
        .iter()
        .enumerate()
        .filter(|(_, member)| !member.locked)
        .map(|(index, _)| index)
        .collect();

    let Some(&first) = working.first() else {
        return projected;
    };

    let ceiling = ceiling_grade(&projected[first], target, config);
    let anchor = working
        .iter()
        .rposition(|index| projected[*index].has_status(MemberStatus::Promotable));
    let floor = match anchor {
        Some(_) => (target - config.ballast_deduction).max(config.min_ballast_grade),
        None => config.min_ballast_grade,
    };

    debug!(
        target,
        ceiling,
        floor,
        anchor = ?anchor,
        members = working.len(),
        "projecting roster grades"
    );

    for (position, index) in working.iter().enumerate() {
        let member = &mut projected[*index];
        let mut grade = interpolate(position, anchor, ceiling, floor);

        if member.has_status(MemberStatus::Retiring) && grade > target {
            grade = target;
        }

        member.projected_score = Some(round2(grade.clamp(SCORE_MIN, SCORE_MAX)));
    }

    projected
}

fn ceiling_grade(leader: &RosterMember, target: f64, config: &StrategyConfig) -> f64 {
    let mut ceiling = target + config.breakout_bonus
        - config.reports_remaining_factor * f64::from(leader.reports_remaining);
    if !leader.has_status(MemberStatus::Transferring) {
        ceiling = ceiling.min(config.max_grade_cap);
    }
    ceiling.min(SCORE_MAX)
}

#[allow(clippy::cast_precision_loss)]
fn interpolate(position: usize, anchor: Option<usize>, ceiling: f64, floor: f64) -> f64 {
    match anchor {
        None => ceiling,
        Some(_) if position == 0 => ceiling,
        Some(anchor) if position <= anchor => {
            let step = (ceiling - floor) / anchor as f64;
            ceiling - step * position as f64
        }
        // Below the anchor the grade holds at the floor.
        Some(_) => floor,
    }
}
