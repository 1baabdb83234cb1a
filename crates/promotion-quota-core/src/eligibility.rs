use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::model::{GroupContext, Recommendation, Report};

/// Well-known trait keys. Reports may carry other keys as well.
pub mod trait_ids {
    pub const PROFESSIONAL_KNOWLEDGE: &str = "PROFESSIONAL_KNOWLEDGE";
    pub const LEADERSHIP: &str = "LEADERSHIP";
    pub const MILITARY_BEARING_CHARACTER: &str = "MILITARY_BEARING_CHARACTER";
    pub const COMMAND_CLIMATE_EO: &str = "COMMAND_CLIMATE_EO";
    pub const TEAMWORK: &str = "TEAMWORK";
    pub const SENIOR_LEADERSHIP: &str = "SENIOR_LEADERSHIP";
    pub const MISSION_ACCOMPLISHMENT: &str = "MISSION_ACCOMPLISHMENT";
}

const GRADE_EPSILON: f64 = 1e-9;
const CLIMATE_MINIMUM: f64 = 3.0;
const MAX_TWOS_FOR_PROMOTABLE: usize = 2;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Hash)]
pub enum RuleCode {
    #[serde(rename = "BLOCKS_PROMOTABLE_PLUS_ON_1_0")]
    BlocksPromotablePlusOnOne,
    #[serde(rename = "BLOCKS_MP_EP_ON_2_0")]
    BlocksQuotaTierOnTwo,
    #[serde(rename = "MAX_TWO_2_0_FOR_PROMOTABLE")]
    MaxTwoTwosForPromotable,
    #[serde(rename = "EO_MUST_BE_3_0_OR_SP")]
    ClimateBelowThreeRequiresSp,
    #[serde(rename = "O1_O2_MAX_PROMOTABLE")]
    EnsignLtjgMaxPromotable,
    #[serde(rename = "NOB_REQUIRES_JUSTIFICATION")]
    NotObservedRequiresJustification,
    #[serde(rename = "SP_REQUIRES_WITHDRAWAL")]
    SignificantProblemsRequiresWithdrawal,
}

impl RuleCode {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::BlocksPromotablePlusOnOne => "BLOCKS_PROMOTABLE_PLUS_ON_1_0",
            Self::BlocksQuotaTierOnTwo => "BLOCKS_MP_EP_ON_2_0",
            Self::MaxTwoTwosForPromotable => "MAX_TWO_2_0_FOR_PROMOTABLE",
            Self::ClimateBelowThreeRequiresSp => "EO_MUST_BE_3_0_OR_SP",
            Self::EnsignLtjgMaxPromotable => "O1_O2_MAX_PROMOTABLE",
            Self::NotObservedRequiresJustification => "NOB_REQUIRES_JUSTIFICATION",
            Self::SignificantProblemsRequiresWithdrawal => "SP_REQUIRES_WITHDRAWAL",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Hash)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Error,
    Warning,
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct PolicyViolation {
    pub code: RuleCode,
    pub message: String,
    pub severity: Severity,
    pub affected_fields: Vec<String>,
}

impl PolicyViolation {
    fn error(code: RuleCode, message: &str, affected_fields: &[&str]) -> Self {
        Self {
            code,
            message: message.to_string(),
            severity: Severity::Error,
            affected_fields: affected_fields.iter().map(ToString::to_string).collect(),
        }
    }

    #[must_use]
    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }
}

/// Command Climate / Equal Opportunity trait keys.
#[must_use]
pub fn is_climate_trait(trait_id: &str) -> bool {
    let upper = trait_id.to_ascii_uppercase();
    upper == "EO"
        || upper.ends_with("_EO")
        || upper.contains("CLIMATE")
        || upper.contains("EQUAL_OPPORTUNITY")
}

#[must_use]
pub fn is_character_trait(trait_id: &str) -> bool {
    trait_id.to_ascii_uppercase().contains("CHARACTER")
}

fn grade_equals(grade: f64, expected: f64) -> bool {
    (grade - expected).abs() < GRADE_EPSILON
}

/// Checks a candidate recommendation against the member's trait grades.
///
/// The group context is accepted for parity with [`validate_rank_cap`];
/// none of the trait rules currently depend on it.
#[must_use]
pub fn validate_against_traits(
    traits: &BTreeMap<String, f64>,
    candidate: Recommendation,
    _context: &GroupContext,
) -> Vec<PolicyViolation> {
    let mut violations = Vec::new();

    if candidate.is_promotable_or_higher() && traits.values().any(|grade| grade_equals(*grade, 1.0)) {
        violations.push(PolicyViolation::error(
            RuleCode::BlocksPromotablePlusOnOne,
            "Any trait grade of 1.0 prevents Promotable, Must Promote, or Early Promote recommendations.",
            &["recommendation", "traits"],
        ));
    }

    if candidate.is_quota_tier() && traits.values().any(|grade| grade_equals(*grade, 2.0)) {
        violations.push(PolicyViolation::error(
            RuleCode::BlocksQuotaTierOnTwo,
            "Any trait grade of 2.0 prevents Must Promote or Early Promote recommendations.",
            &["recommendation", "traits"],
        ));
    }

    if candidate == Recommendation::Promotable {
        let counted_twos = traits
            .iter()
            .filter(|(key, grade)| {
                grade_equals(**grade, 2.0) && !is_climate_trait(key) && !is_character_trait(key)
            })
            .count();
        if counted_twos > MAX_TWOS_FOR_PROMOTABLE {
            violations.push(PolicyViolation::error(
                RuleCode::MaxTwoTwosForPromotable,
                "Promotable recommendation allows at most two 2.0 grades (excluding Character/EO).",
                &["recommendation", "traits"],
            ));
        }
    }

    if !matches!(
        candidate,
        Recommendation::SignificantProblems | Recommendation::NotObserved
    ) {
        for (key, grade) in traits {
            if is_climate_trait(key) && *grade < CLIMATE_MINIMUM {
                violations.push(PolicyViolation::error(
                    RuleCode::ClimateBelowThreeRequiresSp,
                    "Command Climate/Equal Opportunity grade below 3.0 requires a Significant Problems recommendation.",
                    &["recommendation", key.as_str()],
                ));
            }
        }
    }

    violations
}

/// Non-LDO O1/O2 members cannot go above Promotable.
#[must_use]
pub fn validate_rank_cap(context: &GroupContext, candidate: Recommendation) -> Vec<PolicyViolation> {
    if context.is_capped_at_promotable() && candidate.is_quota_tier() {
        return vec![PolicyViolation::error(
            RuleCode::EnsignLtjgMaxPromotable,
            "Ensign and LTJG (non-LDO) cannot receive higher than Promotable.",
            &["recommendation"],
        )];
    }
    Vec::new()
}

/// Partial NotObserved reports need non-blank justification text.
#[must_use]
pub fn validate_justification(
    is_partial_not_observed: bool,
    justification: Option<&str>,
) -> Vec<PolicyViolation> {
    let has_text = justification.is_some_and(|text| !text.trim().is_empty());
    if is_partial_not_observed && !has_text {
        return vec![PolicyViolation::error(
            RuleCode::NotObservedRequiresJustification,
            "Partial NOB evaluations require justification text.",
            &["justification"],
        )];
    }
    Vec::new()
}

/// Dropping from Promotable-or-higher to Significant Problems needs a
/// recorded withdrawal.
#[must_use]
pub fn validate_withdrawal(
    previous: Option<Recommendation>,
    next: Recommendation,
    withdrawal_recorded: bool,
) -> Vec<PolicyViolation> {
    let was_promotable = previous.is_some_and(Recommendation::is_promotable_or_higher);
    if was_promotable && next == Recommendation::SignificantProblems && !withdrawal_recorded {
        return vec![PolicyViolation::error(
            RuleCode::SignificantProblemsRequiresWithdrawal,
            "A Significant Problems recommendation following a previous Promotable or higher recommendation requires a formal withdrawal.",
            &["withdrawal_recorded", "recommendation"],
        )];
    }
    Vec::new()
}

/// Trait and rank-cap violations that stop the allocator from assigning
/// `candidate` to `report`.
#[must_use]
pub fn blocking_violations(
    report: &Report,
    candidate: Recommendation,
    context: &GroupContext,
) -> Vec<PolicyViolation> {
    let mut violations = validate_against_traits(&report.traits, candidate, context);
    violations.extend(validate_rank_cap(context, candidate));
    if !violations.is_empty() {
        debug!(
            report_id = %report.report_id,
            candidate = candidate.as_str(),
            codes = ?violations.iter().map(|violation| violation.code.as_str()).collect::<Vec<_>>(),
            "recommendation blocked"
        );
    }
    violations
}

#[must_use]
pub fn is_blocked(report: &Report, candidate: Recommendation, context: &GroupContext) -> bool {
    !blocking_violations(report, candidate, context).is_empty()
}

/// Every rule that applies to a report's current recommendation: trait
/// rules, the ensign cap, partial NotObserved justification and the
/// Significant Problems withdrawal.
#[must_use]
pub fn validate_report(report: &Report, context: &GroupContext) -> Vec<PolicyViolation> {
    let candidate = report.recommendation;
    let mut violations = validate_against_traits(&report.traits, candidate, context);
    violations.extend(validate_rank_cap(context, candidate));
    violations.extend(validate_justification(
        report.is_partial_not_observed(),
        report.justification.as_deref(),
    ));
    violations.extend(validate_withdrawal(
        report.previous_recommendation,
        candidate,
        report.withdrawal_recorded,
    ));
    violations
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Paygrade;

    fn traits(entries: &[(&str, f64)]) -> BTreeMap<String, f64> {
        entries
            .iter()
            .map(|(key, grade)| ((*key).to_string(), *grade))
            .collect()
    }

    fn codes(violations: &[PolicyViolation]) -> Vec<RuleCode> {
        violations.iter().map(|violation| violation.code).collect()
    }

    fn mid_context() -> GroupContext {
        GroupContext::new(Paygrade::O3)
    }

    #[test]
    fn grade_of_one_blocks_promotable_and_above() {
        let grades = traits(&[
            (trait_ids::LEADERSHIP, 1.0),
            (trait_ids::TEAMWORK, 4.0),
            (trait_ids::COMMAND_CLIMATE_EO, 4.0),
        ]);
        for candidate in [Recommendation::Promotable, Recommendation::MustPromote, Recommendation::EarlyPromote] {
            let found = codes(&validate_against_traits(&grades, candidate, &mid_context()));
            assert_eq!(
                found.iter().filter(|code| **code == RuleCode::BlocksPromotablePlusOnOne).count(),
                1
            );
        }
        for candidate in [Recommendation::SignificantProblems, Recommendation::NotObserved] {
            assert!(validate_against_traits(&grades, candidate, &mid_context()).is_empty());
        }
    }

    #[test]
    fn grade_of_two_blocks_quota_tiers_only() {
        let grades = traits(&[(trait_ids::TEAMWORK, 2.0), (trait_ids::LEADERSHIP, 4.0)]);
        assert_eq!(
            codes(&validate_against_traits(&grades, Recommendation::EarlyPromote, &mid_context())),
            vec![RuleCode::BlocksQuotaTierOnTwo]
        );
        assert!(validate_against_traits(&grades, Recommendation::Promotable, &mid_context()).is_empty());
    }

    #[test]
    fn promotable_tolerates_two_counted_twos() {
        let two = traits(&[
            (trait_ids::TEAMWORK, 2.0),
            (trait_ids::LEADERSHIP, 2.0),
            (trait_ids::PROFESSIONAL_KNOWLEDGE, 4.0),
        ]);
        assert!(validate_against_traits(&two, Recommendation::Promotable, &mid_context()).is_empty());

        let three = traits(&[
            (trait_ids::TEAMWORK, 2.0),
            (trait_ids::LEADERSHIP, 2.0),
            (trait_ids::PROFESSIONAL_KNOWLEDGE, 2.0),
        ]);
        assert_eq!(
            codes(&validate_against_traits(&three, Recommendation::Promotable, &mid_context())),
            vec![RuleCode::MaxTwoTwosForPromotable]
        );
    }

    #[test]
    fn character_twos_do_not_count_toward_promotable_limit() {
        let grades = traits(&[
            (trait_ids::TEAMWORK, 2.0),
            (trait_ids::LEADERSHIP, 2.0),
            (trait_ids::MILITARY_BEARING_CHARACTER, 2.0),
        ]);
        assert!(validate_against_traits(&grades, Recommendation::Promotable, &mid_context()).is_empty());
    }

    #[test]
    fn low_climate_grade_requires_significant_problems() {
        let grades = traits(&[(trait_ids::COMMAND_CLIMATE_EO, 2.5), (trait_ids::TEAMWORK, 4.0)]);
        let violations = validate_against_traits(&grades, Recommendation::Promotable, &mid_context());
        assert_eq!(codes(&violations), vec![RuleCode::ClimateBelowThreeRequiresSp]);
        assert!(violations[0]
            .affected_fields
            .contains(&trait_ids::COMMAND_CLIMATE_EO.to_string()));

        let progressing = validate_against_traits(&grades, Recommendation::Progressing, &mid_context());
        assert_eq!(codes(&progressing), vec![RuleCode::ClimateBelowThreeRequiresSp]);

        assert!(validate_against_traits(&grades, Recommendation::SignificantProblems, &mid_context()).is_empty());
    }

    #[test]
    fn climate_trait_detection_handles_variants() {
        assert!(is_climate_trait("COMMAND_CLIMATE_EO"));
        assert!(is_climate_trait("eo"));
        assert!(is_climate_trait("Organizational_Climate"));
        assert!(!is_climate_trait("LEADERSHIP"));
        assert!(!is_climate_trait("GEOSPATIAL"));
        assert!(is_character_trait("MILITARY_BEARING_CHARACTER"));
    }

    #[test]
    fn rank_cap_applies_to_non_ldo_ensigns() {
        let ensign = GroupContext::new(Paygrade::O1);
        assert_eq!(
            codes(&validate_rank_cap(&ensign, Recommendation::MustPromote)),
            vec![RuleCode::EnsignLtjgMaxPromotable]
        );
        assert!(validate_rank_cap(&ensign, Recommendation::Promotable).is_empty());

        let ldo = GroupContext::new(Paygrade::O2).with_ldo(true);
        assert!(validate_rank_cap(&ldo, Recommendation::EarlyPromote).is_empty());
    }

    #[test]
    fn partial_not_observed_needs_justification() {
        assert_eq!(validate_justification(true, None).len(), 1);
        assert_eq!(validate_justification(true, Some("   \t")).len(), 1);
        assert!(validate_justification(true, Some("Deployed mid-period")).is_empty());
        assert!(validate_justification(false, None).is_empty());
    }

    #[test]
    fn withdrawal_required_when_dropping_to_significant_problems() {
        let violations = validate_withdrawal(
            Some(Recommendation::MustPromote),
            Recommendation::SignificantProblems,
            false,
        );
        assert_eq!(codes(&violations), vec![RuleCode::SignificantProblemsRequiresWithdrawal]);
        assert!(validate_withdrawal(
            Some(Recommendation::MustPromote),
            Recommendation::SignificantProblems,
            true
        )
        .is_empty());
        assert!(validate_withdrawal(
            Some(Recommendation::Progressing),
            Recommendation::SignificantProblems,
            false
        )
        .is_empty());
        assert!(validate_withdrawal(None, Recommendation::SignificantProblems, false).is_empty());
    }

    fn graded_report(recommendation: Recommendation, trait_average: f64) -> Report {
        Report {
            report_id: crate::model::ReportId(ulid::Ulid::from_parts(1, 1)),
            member_id: crate::model::MemberId(ulid::Ulid::from_parts(1, 2)),
            trait_average,
            recommendation,
            traits: BTreeMap::new(),
            locked: false,
            status: None,
            reports_remaining: 0,
            justification: None,
            previous_recommendation: None,
            withdrawal_recorded: false,
        }
    }

    #[test]
    fn report_validation_runs_every_rule() {
        let mut report = graded_report(Recommendation::EarlyPromote, 4.0);
        report.traits = traits(&[(trait_ids::TEAMWORK, 2.0)]);
        assert_eq!(
            codes(&validate_report(&report, &GroupContext::new(Paygrade::O2))),
            vec![RuleCode::BlocksQuotaTierOnTwo, RuleCode::EnsignLtjgMaxPromotable]
        );
        assert!(validate_report(&graded_report(Recommendation::Promotable, 4.0), &mid_context()).is_empty());
    }

    #[test]
    fn report_validation_checks_partial_not_observed_comments() {
        let mut partial = graded_report(Recommendation::NotObserved, 3.4);
        assert_eq!(
            codes(&validate_report(&partial, &mid_context())),
            vec![RuleCode::NotObservedRequiresJustification]
        );
        partial.justification = Some("Detached for schooling mid-period".to_string());
        assert!(validate_report(&partial, &mid_context()).is_empty());

        let full = graded_report(Recommendation::NotObserved, 0.0);
        assert!(validate_report(&full, &mid_context()).is_empty());
    }

    #[test]
    fn report_validation_checks_withdrawal_history() {
        let mut dropped = graded_report(Recommendation::SignificantProblems, 2.4);
        dropped.previous_recommendation = Some(Recommendation::Promotable);
        assert_eq!(
            codes(&validate_report(&dropped, &mid_context())),
            vec![RuleCode::SignificantProblemsRequiresWithdrawal]
        );
        dropped.withdrawal_recorded = true;
        assert!(validate_report(&dropped, &mid_context()).is_empty());
    }

    #[test]
    fn violation_serializes_with_wire_codes() {
        let violations = validate_rank_cap(&GroupContext::new(Paygrade::O2), Recommendation::EarlyPromote);
        let encoded = match serde_json::to_value(&violations[0]) {
            Ok(value) => value,
            Err(err) => panic!("serialize violation: {err}"),
        };
        assert_eq!(encoded["code"], "O1_O2_MAX_PROMOTABLE");
        assert_eq!(encoded["severity"], "ERROR");
    }
}
