//! Early Promote / Must Promote quota lookup.
//!
//! Groups of up to [`TABLE_MAX_SIZE`] members read their limits from
//! [`QUOTA_TABLE`]. Larger groups use percentage formulas.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::model::{GroupContext, Paygrade, Report};

pub const TABLE_MAX_SIZE: usize = 30;

const EARLY_PROMOTE_PERCENT_LARGE: usize = 20;
const LOW_COMBINED_PERCENT: usize = 60;
const MID_COMBINED_PERCENT: usize = 60;
const HIGH_COMBINED_PERCENT: usize = 50;
const TOP_COMBINED_PERCENT: usize = 40;

/// Which Must Promote column of the quota table applies to a paygrade.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum MustPromoteColumn {
    Low,
    Mid,
    High,
    Top,
}

impl MustPromoteColumn {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Mid => "mid",
            Self::High => "high",
            Self::Top => "top",
        }
    }

    fn combined_percent(self) -> usize {
        match self {
            Self::Low => LOW_COMBINED_PERCENT,
            Self::Mid => MID_COMBINED_PERCENT,
            Self::High => HIGH_COMBINED_PERCENT,
            Self::Top => TOP_COMBINED_PERCENT,
        }
    }
}

/// Must Promote quotas per column. `None` means the table sets no limit.
#[derive(Debug, Clone, Copy, Serialize, Eq, PartialEq)]
pub struct MustPromoteQuotas {
    pub low: Option<usize>,
    pub mid: Option<usize>,
    pub high: Option<usize>,
    pub top: Option<usize>,
}

impl MustPromoteQuotas {
    #[must_use]
    pub fn get(&self, column: MustPromoteColumn) -> Option<usize> {
        match column {
            MustPromoteColumn::Low => self.low,
            MustPromoteColumn::Mid => self.mid,
            MustPromoteColumn::High => self.high,
            MustPromoteColumn::Top => self.top,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Eq, PartialEq)]
pub struct QuotaRow {
    pub size: usize,
    pub early_promote: usize,
    pub must_promote: MustPromoteQuotas,
}

const fn row(size: usize, early_promote: usize, mid: usize, high: usize, top: usize) -> QuotaRow {
    QuotaRow {
        size,
        early_promote,
        must_promote: MustPromoteQuotas {
            low: None,
            mid: Some(mid),
            high: Some(high),
            top: Some(top),
        },
    }
}

/// Regulatory quota table for groups of 1 through 30 members.
pub const QUOTA_TABLE: [QuotaRow; TABLE_MAX_SIZE] = [
    row(1, 1, 0, 0, 0),
    row(2, 1, 1, 1, 1),
    row(3, 1, 1, 1, 1),
    row(4, 1, 2, 1, 1),
    row(5, 1, 2, 2, 1),
    row(6, 2, 2, 1, 1),
    row(7, 2, 3, 2, 1),
    row(8, 2, 3, 2, 2),
    row(9, 2, 4, 3, 2),
    row(10, 2, 4, 3, 2),
    row(11, 3, 4, 3, 2),
    row(12, 3, 5, 3, 2),
    row(13, 3, 5, 4, 3),
    row(14, 3, 6, 4, 3),
    row(15, 3, 6, 5, 3),
    row(16, 4, 6, 4, 3),
    row(17, 4, 7, 5, 3),
    row(18, 4, 7, 5, 4),
    row(19, 4, 8, 6, 4),
    row(20, 4, 8, 6, 4),
    row(21, 5, 8, 6, 4),
    row(22, 5, 9, 6, 4),
    row(23, 5, 9, 7, 5),
    row(24, 5, 10, 7, 5),
    row(25, 5, 10, 8, 5),
    row(26, 6, 10, 7, 5),
    row(27, 6, 11, 8, 5),
    row(28, 6, 11, 8, 6),
    row(29, 6, 12, 9, 6),
    row(30, 6, 12, 9, 6),
];

#[must_use]
pub fn quota_row(size: usize) -> Option<&'static QuotaRow> {
    size.checked_sub(1)
        .and_then(|index| QUOTA_TABLE.get(index))
        .filter(|candidate| candidate.size == size)
}

/// Column selection by paygrade. Non-LDO O1/O2 and flag officers have none.
#[must_use]
pub fn must_promote_column(context: &GroupContext) -> Option<MustPromoteColumn> {
    match context.paygrade {
        Paygrade::E1 | Paygrade::E2 | Paygrade::E3 | Paygrade::E4 | Paygrade::W1 | Paygrade::W2 => {
            Some(MustPromoteColumn::Low)
        }
        Paygrade::O1 | Paygrade::O2 => context.is_ldo.then_some(MustPromoteColumn::Low),
        Paygrade::E5 | Paygrade::E6 | Paygrade::O3 => Some(MustPromoteColumn::Mid),
        Paygrade::E7
        | Paygrade::E8
        | Paygrade::E9
        | Paygrade::W3
        | Paygrade::W4
        | Paygrade::W5
        | Paygrade::O4 => Some(MustPromoteColumn::High),
        Paygrade::O5 | Paygrade::O6 => Some(MustPromoteColumn::Top),
        Paygrade::O7 | Paygrade::O8 | Paygrade::O9 | Paygrade::O10 => None,
    }
}

#[must_use]
pub fn early_promote_max(size: usize, context: &GroupContext) -> usize {
    if size == 0 || context.is_capped_at_promotable() {
        return 0;
    }

    if size == 2 {
        return 1;
    }

    if size <= TABLE_MAX_SIZE {
        return quota_row(size).map_or(0, |row| row.early_promote);
    }

    ceil_percent(size, EARLY_PROMOTE_PERCENT_LARGE)
}

/// Combined Early Promote plus Must Promote limit for a group.
///
/// Above 30 members, O7-O10 groups get their Early Promote limit here
/// rather than zero, so a flag officer allocation never reports more
/// quota tiers assigned than the combined limit allows.
#[must_use]
pub fn combined_max(size: usize, context: &GroupContext) -> usize {
    if size == 0 || context.is_capped_at_promotable() {
        return 0;
    }

    if size > TABLE_MAX_SIZE {
        return must_promote_column(context).map_or_else(
            || early_promote_max(size, context),
            |column| ceil_percent(size, column.combined_percent()),
        );
    }

    let early = early_promote_max(size, context);
    early + must_promote_max(size, context, early)
}

/// Must Promote limit after `early_promote_used` Early Promote slots are taken.
///
/// Unused Early Promote slots roll into Must Promote for table-driven sizes.
/// The table's "no limit" column is held to a 60% combined cap so some
/// members always remain at Promotable or below.
#[must_use]
pub fn must_promote_max(size: usize, context: &GroupContext, early_promote_used: usize) -> usize {
    if size == 0 || context.is_capped_at_promotable() {
        return 0;
    }

    let Some(column) = must_promote_column(context) else {
        return 0;
    };

    let used = early_promote_used.min(size);

    if size > TABLE_MAX_SIZE {
        return combined_max(size, context).saturating_sub(used);
    }

    let Some(row) = quota_row(size) else {
        return 0;
    };

    match row.must_promote.get(column) {
        None => ceil_percent(size, LOW_COMBINED_PERCENT).saturating_sub(used),
        Some(base) => base + early_promote_max(size, context).saturating_sub(used),
    }
}

/// Quota size counts every report that is not NotObserved.
#[must_use]
pub fn effective_quota_size(reports: &[Report]) -> usize {
    reports
        .iter()
        .filter(|report| !report.is_not_observed())
        .count()
}

/// Snapshot of the limits for one group, used for "N of M used" displays.
#[derive(Debug, Clone, Copy, Serialize, Eq, PartialEq)]
pub struct QuotaLimits {
    pub size: usize,
    pub column: Option<MustPromoteColumn>,
    pub early_promote_max: usize,
    pub must_promote_max: usize,
    pub combined_max: usize,
}

#[must_use]
pub fn quota_limits(size: usize, context: &GroupContext, early_promote_used: usize) -> QuotaLimits {
    let limits = QuotaLimits {
        size,
        column: must_promote_column(context),
        early_promote_max: early_promote_max(size, context),
        must_promote_max: must_promote_max(size, context, early_promote_used),
        combined_max: combined_max(size, context),
    };
    debug!(
        size,
        paygrade = context.paygrade.as_str(),
        early_promote_max = limits.early_promote_max,
        must_promote_max = limits.must_promote_max,
        combined_max = limits.combined_max,
        "computed quota limits"
    );
    limits
}

/// `ceil(size * percent / 100)` without forming `size * percent`.
fn ceil_percent(size: usize, percent: usize) -> usize {
    size / 100 * percent + (size % 100 * percent).div_ceil(100)
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    fn context(paygrade: Paygrade) -> GroupContext {
        GroupContext::new(paygrade)
    }

    #[test]
    fn table_rows_are_keyed_by_size() {
        for (index, row) in QUOTA_TABLE.iter().enumerate() {
            assert_eq!(row.size, index + 1);
            assert_eq!(row.must_promote.low, None);
        }
        assert!(quota_row(0).is_none());
        assert!(quota_row(31).is_none());
    }

    #[test]
    fn mid_column_group_of_six() {
        let ctx = context(Paygrade::O3);
        assert_eq!(early_promote_max(6, &ctx), 2);
        assert_eq!(must_promote_max(6, &ctx, 2), 2);
        assert_eq!(6 - early_promote_max(6, &ctx) - must_promote_max(6, &ctx, 2), 2);
    }

    #[test]
    fn group_of_two_allows_one_early_promote() {
        for paygrade in [Paygrade::E3, Paygrade::E6, Paygrade::O4, Paygrade::O5] {
            assert_eq!(early_promote_max(2, &context(paygrade)), 1);
        }
    }

    #[test]
    fn non_ldo_ensigns_receive_no_quota() {
        for paygrade in [Paygrade::O1, Paygrade::O2] {
            let ctx = context(paygrade);
            for size in [1, 2, 10, 30, 31, 120] {
                assert_eq!(early_promote_max(size, &ctx), 0);
                assert_eq!(must_promote_max(size, &ctx, 0), 0);
                assert_eq!(combined_max(size, &ctx), 0);
            }
        }
    }

    #[test]
    fn ldo_ensigns_use_table_values() {
        let ctx = context(Paygrade::O1).with_ldo(true);
        assert_eq!(early_promote_max(10, &ctx), 2);
        assert_eq!(must_promote_column(&ctx), Some(MustPromoteColumn::Low));
    }

    #[test]
    fn large_groups_use_percentages() {
        let mid = context(Paygrade::E5);
        assert_eq!(early_promote_max(31, &mid), 7);
        assert_eq!(early_promote_max(100, &mid), 20);

        assert_eq!(combined_max(40, &mid), 24);
        assert_eq!(combined_max(40, &context(Paygrade::E8)), 20);
        assert_eq!(combined_max(40, &context(Paygrade::O5)), 16);
        assert_eq!(combined_max(40, &context(Paygrade::O2)), 0);
        assert_eq!(must_promote_max(40, &mid, 8), 16);
    }

    #[test]
    fn low_column_applies_combined_sixty_percent_cap() {
        let ctx = context(Paygrade::E3);
        assert_eq!(must_promote_max(10, &ctx, 2), 4);
        assert_eq!(must_promote_max(10, &ctx, 0), 6);
        assert_eq!(combined_max(10, &ctx), 6);
    }

    #[test]
    fn unused_early_promote_rolls_into_must_promote() {
        let ctx = context(Paygrade::E6);
        assert_eq!(must_promote_max(10, &ctx, 2), 4);
        assert_eq!(must_promote_max(10, &ctx, 1), 5);
        assert_eq!(must_promote_max(10, &ctx, 0), 6);
    }

    #[test]
    fn early_promote_used_is_clamped_to_size() {
        let ctx = context(Paygrade::E3);
        assert_eq!(must_promote_max(5, &ctx, 500), 0);
        assert_eq!(must_promote_max(40, &ctx, usize::MAX), 0);
    }

    #[test]
    fn flag_officers_have_no_must_promote_column() {
        let ctx = context(Paygrade::O8);
        assert_eq!(must_promote_column(&ctx), None);
        assert_eq!(must_promote_max(12, &ctx, 0), 0);
        assert_eq!(combined_max(40, &ctx), 8);
        assert_eq!(combined_max(12, &ctx), early_promote_max(12, &ctx));
    }

    #[test]
    fn very_large_sizes_do_not_overflow() {
        let size = usize::MAX / 10;
        let enlisted = context(Paygrade::E5);
        assert_eq!(early_promote_max(size, &enlisted), size.div_ceil(5));

        let officer = context(Paygrade::O3);
        assert_eq!(combined_max(size, &officer), (size * 3).div_ceil(5));
        assert_eq!(
            must_promote_max(size, &officer, size.div_ceil(5)),
            (size * 3).div_ceil(5) - size.div_ceil(5)
        );

        assert_eq!(early_promote_max(usize::MAX, &enlisted), usize::MAX.div_ceil(5));
        assert_eq!(ceil_percent(101, 20), 21);
        assert_eq!(ceil_percent(100, 20), 20);
    }

    #[test]
    fn empty_group_has_no_quota() {
        let ctx = context(Paygrade::E5);
        assert_eq!(early_promote_max(0, &ctx), 0);
        assert_eq!(must_promote_max(0, &ctx, 0), 0);
        assert_eq!(combined_max(0, &ctx), 0);
    }

    // Before the 60% combined cap, a "no limit" column let every member who
    // missed Early Promote receive Must Promote, leaving nobody at Promotable.
    #[test]
    fn low_column_cap_never_consumes_whole_group() {
        let ctx = context(Paygrade::E2);
        for size in 3..=TABLE_MAX_SIZE {
            let early = early_promote_max(size, &ctx);
            for used in 0..=early {
                let must = must_promote_max(size, &ctx, used);
                assert!(
                    used + must < size,
                    "size {size}, used {used}: {must} must promote leaves no promotable"
                );
            }
        }
    }

    #[test]
    fn quota_limits_snapshot_matches_individual_queries() {
        let ctx = context(Paygrade::O4);
        let limits = quota_limits(13, &ctx, 1);
        assert_eq!(limits.column, Some(MustPromoteColumn::High));
        assert_eq!(limits.early_promote_max, 3);
        assert_eq!(limits.must_promote_max, 4 + 2);
        assert_eq!(limits.combined_max, 3 + 4);
    }

    proptest! {
        #[test]
        fn combined_never_exceeds_group_size(
            size in 0usize..200,
            grade_index in 0usize..Paygrade::ALL.len(),
            ldo in any::<bool>(),
        ) {
            let ctx = GroupContext::new(Paygrade::ALL[grade_index]).with_ldo(ldo);
            let early = early_promote_max(size, &ctx);
            prop_assert!(early <= size);
            prop_assert!(early + must_promote_max(size, &ctx, early) <= size.max(2));
        }

        #[test]
        fn must_promote_shrinks_as_early_promote_is_used(
            size in 1usize..120,
            used in 0usize..60,
            grade_index in 0usize..Paygrade::ALL.len(),
        ) {
            let ctx = GroupContext::new(Paygrade::ALL[grade_index]);
            prop_assert!(must_promote_max(size, &ctx, used + 1) <= must_promote_max(size, &ctx, used));
        }
    }
}
