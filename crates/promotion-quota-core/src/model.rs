use std::collections::{BTreeMap, BTreeSet};
use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};
use ulid::Ulid;

use crate::designator::CompetitiveCategory;
use crate::EngineError;

/// Lowest grade a trait or a trait average can hold.
pub const SCORE_MIN: f64 = 1.00;
/// Highest grade a trait or a trait average can hold.
pub const SCORE_MAX: f64 = 5.00;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct ReportId(pub Ulid);

impl Display for ReportId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct MemberId(pub Ulid);

impl Display for MemberId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct GroupId(pub Ulid);

impl Display for GroupId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Promotion recommendation carried by a single report.
///
/// Serialized with the short block codes used on the evaluation form.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum Recommendation {
    #[serde(rename = "NOB")]
    NotObserved,
    #[serde(rename = "SP")]
    SignificantProblems,
    #[serde(rename = "Prog")]
    Progressing,
    #[serde(rename = "P")]
    Promotable,
    #[serde(rename = "MP")]
    MustPromote,
    #[serde(rename = "EP")]
    EarlyPromote,
}

impl Recommendation {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NotObserved => "NOB",
            Self::SignificantProblems => "SP",
            Self::Progressing => "Prog",
            Self::Promotable => "P",
            Self::MustPromote => "MP",
            Self::EarlyPromote => "EP",
        }
    }

    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "NOB" => Some(Self::NotObserved),
            "SP" => Some(Self::SignificantProblems),
            "Prog" => Some(Self::Progressing),
            "P" => Some(Self::Promotable),
            "MP" => Some(Self::MustPromote),
            "EP" => Some(Self::EarlyPromote),
            _ => None,
        }
    }

    #[must_use]
    pub fn is_promotable_or_higher(self) -> bool {
        matches!(
            self,
            Self::Promotable | Self::MustPromote | Self::EarlyPromote
        )
    }

    #[must_use]
    pub fn is_quota_tier(self) -> bool {
        matches!(self, Self::MustPromote | Self::EarlyPromote)
    }
}

impl Display for Recommendation {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RankCategory {
    Enlisted,
    Officer,
    Warrant,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum Paygrade {
    E1,
    E2,
    E3,
    E4,
    E5,
    E6,
    E7,
    E8,
    E9,
    W1,
    W2,
    W3,
    W4,
    W5,
    O1,
    O2,
    O3,
    O4,
    O5,
    O6,
    O7,
    O8,
    O9,
    O10,
}

impl Paygrade {
    pub const ALL: [Self; 24] = [
        Self::E1,
        Self::E2,
        Self::E3,
        Self::E4,
        Self::E5,
        Self::E6,
        Self::E7,
        Self::E8,
        Self::E9,
        Self::W1,
        Self::W2,
        Self::W3,
        Self::W4,
        Self::W5,
        Self::O1,
        Self::O2,
        Self::O3,
        Self::O4,
        Self::O5,
        Self::O6,
        Self::O7,
        Self::O8,
        Self::O9,
        Self::O10,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::E1 => "E1",
            Self::E2 => "E2",
            Self::E3 => "E3",
            Self::E4 => "E4",
            Self::E5 => "E5",
            Self::E6 => "E6",
            Self::E7 => "E7",
            Self::E8 => "E8",
            Self::E9 => "E9",
            Self::W1 => "W1",
            Self::W2 => "W2",
            Self::W3 => "W3",
            Self::W4 => "W4",
            Self::W5 => "W5",
            Self::O1 => "O1",
            Self::O2 => "O2",
            Self::O3 => "O3",
            Self::O4 => "O4",
            Self::O5 => "O5",
            Self::O6 => "O6",
            Self::O7 => "O7",
            Self::O8 => "O8",
            Self::O9 => "O9",
            Self::O10 => "O10",
        }
    }

    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|grade| grade.as_str() == value)
    }

    /// Accepts display labels such as `O-3`, `o3` or ` E-5 `.
    #[must_use]
    pub fn parse_label(label: &str) -> Option<Self> {
        let normalized = label.trim().replace('-', "").to_ascii_uppercase();
        Self::parse(&normalized)
    }

    #[must_use]
    pub fn category(self) -> RankCategory {
        match self {
            Self::E1
            | Self::E2
            | Self::E3
            | Self::E4
            | Self::E5
            | Self::E6
            | Self::E7
            | Self::E8
            | Self::E9 => RankCategory::Enlisted,
            Self::W1 | Self::W2 | Self::W3 | Self::W4 | Self::W5 => RankCategory::Warrant,
            _ => RankCategory::Officer,
        }
    }

    #[must_use]
    pub fn is_ensign_or_ltjg(self) -> bool {
        matches!(self, Self::O1 | Self::O2)
    }
}

impl Display for Paygrade {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-group facts that select quota columns and relax paygrade restrictions.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq)]
pub struct GroupContext {
    pub paygrade: Paygrade,
    pub rank_category: RankCategory,
    pub is_ldo: bool,
    pub is_cwo: bool,
}

impl GroupContext {
    #[must_use]
    pub fn new(paygrade: Paygrade) -> Self {
        let rank_category = paygrade.category();
        Self {
            paygrade,
            rank_category,
            is_ldo: false,
            is_cwo: rank_category == RankCategory::Warrant,
        }
    }

    #[must_use]
    pub fn with_ldo(mut self, is_ldo: bool) -> Self {
        self.is_ldo = is_ldo;
        self
    }

    #[must_use]
    pub fn with_cwo(mut self, is_cwo: bool) -> Self {
        self.is_cwo = is_cwo;
        self
    }

    /// Derives a context from a paygrade label and an officer designator.
    ///
    /// # Errors
    /// Returns [`EngineError::Context`] when the paygrade label does not map
    /// to a known paygrade.
    pub fn from_labels(paygrade_label: &str, designator: &str) -> Result<Self, EngineError> {
        let paygrade = Paygrade::parse_label(paygrade_label).ok_or_else(|| {
            EngineError::Context(format!("unmappable paygrade label '{paygrade_label}'"))
        })?;

        let category = CompetitiveCategory::classify(designator);
        let is_ldo = matches!(
            category,
            CompetitiveCategory::LdoActive | CompetitiveCategory::LdoCwoReserve
        );
        let is_cwo = matches!(
            category,
            CompetitiveCategory::CwoActive | CompetitiveCategory::LdoCwoReserve
        ) || paygrade.category() == RankCategory::Warrant;

        Ok(Self::new(paygrade).with_ldo(is_ldo).with_cwo(is_cwo))
    }

    /// Non-LDO ensigns and lieutenants (junior grade) are capped at Promotable.
    #[must_use]
    pub fn is_capped_at_promotable(&self) -> bool {
        self.paygrade.is_ensign_or_ltjg() && !self.is_ldo
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Hash)]
pub enum MemberStatus {
    Promotable,
    Transferring,
    Retiring,
    #[serde(other)]
    Other,
}

/// One evaluation record for one member in one cycle.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Report {
    pub report_id: ReportId,
    pub member_id: MemberId,
    pub trait_average: f64,
    pub recommendation: Recommendation,
    #[serde(default)]
    pub traits: BTreeMap<String, f64>,
    #[serde(default)]
    pub locked: bool,
    #[serde(default)]
    pub status: Option<MemberStatus>,
    #[serde(default)]
    pub reports_remaining: u32,
    /// Comments justifying a partial NotObserved report.
    #[serde(default)]
    pub justification: Option<String>,
    /// Recommendation carried by the member's previous report, if any.
    #[serde(default)]
    pub previous_recommendation: Option<Recommendation>,
    #[serde(default)]
    pub withdrawal_recorded: bool,
}

impl Report {
    #[must_use]
    pub fn is_not_observed(&self) -> bool {
        self.recommendation == Recommendation::NotObserved
    }

    /// A NotObserved report that still carries a graded trait average.
    #[must_use]
    pub fn is_partial_not_observed(&self) -> bool {
        self.is_not_observed() && self.trait_average > 0.0
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum GroupStatus {
    Draft,
    Planned,
    Review,
    Submitted,
    Final,
}

impl GroupStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Planned => "planned",
            Self::Review => "review",
            Self::Submitted => "submitted",
            Self::Final => "final",
        }
    }

    /// Final and submitted groups are closed to re-planning.
    #[must_use]
    pub fn is_open(self) -> bool {
        !matches!(self, Self::Final | Self::Submitted)
    }
}

/// A competitive group as handed over by the roster/cycle builder.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SummaryGroup {
    pub group_id: GroupId,
    pub name: String,
    pub paygrade: String,
    #[serde(default)]
    pub designator: String,
    #[serde(default)]
    pub competitive_group_key: String,
    #[serde(default = "default_group_status")]
    pub status: GroupStatus,
    #[serde(default)]
    pub rank_order: Vec<MemberId>,
    pub reports: Vec<Report>,
}

impl SummaryGroup {
    /// Context derived from the group's paygrade label and designator.
    ///
    /// # Errors
    /// Returns [`EngineError::Context`] when the paygrade label is unmappable.
    pub fn context(&self) -> Result<GroupContext, EngineError> {
        GroupContext::from_labels(&self.paygrade, &self.designator)
    }
}

impl SummaryGroup {
    /// Checks score ranges and report identity before the group is handed to
    /// the engine.
    ///
    /// # Errors
    /// Returns [`EngineError::Validation`] for duplicate report or member ids,
    /// observed scores outside the grading scale, or trait grades outside it.
    pub fn validate(&self) -> Result<(), EngineError> {
        let mut report_ids = BTreeSet::new();
        let mut member_ids = BTreeSet::new();

        for report in &self.reports {
            if !report_ids.insert(report.report_id) {
                return Err(EngineError::Validation(format!(
                    "duplicate report_id {} in group {}",
                    report.report_id, self.group_id
                )));
            }
            if !member_ids.insert(report.member_id) {
                return Err(EngineError::Validation(format!(
                    "member {} appears more than once in group {}",
                    report.member_id, self.group_id
                )));
            }
            if !report.is_not_observed() && !(SCORE_MIN..=SCORE_MAX).contains(&report.trait_average) {
                return Err(EngineError::Validation(format!(
                    "report {} trait_average {} MUST be in [{SCORE_MIN:.2}, {SCORE_MAX:.2}]",
                    report.report_id, report.trait_average
                )));
            }
            if let Some((name, grade)) = report
                .traits
                .iter()
                .find(|(_, grade)| !(SCORE_MIN..=SCORE_MAX).contains(*grade))
            {
                return Err(EngineError::Validation(format!(
                    "report {} trait {name} grade {grade} MUST be in [{SCORE_MIN:.2}, {SCORE_MAX:.2}]",
                    report.report_id
                )));
            }
        }

        Ok(())
    }
}

fn default_group_status() -> GroupStatus {
    GroupStatus::Draft
}
