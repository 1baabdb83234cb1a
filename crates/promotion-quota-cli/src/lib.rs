//! `pq` command surface over the promotion quota engine.
//!
//! Hosts embed the CLI through [`run_cli`]. Every `--json` payload carries a
//! `contract_version` whose schema lives under `contracts/v1/schemas`.

use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use clap::{Args, Parser, Subcommand};
use promotion_quota_core::{
    allocate_group, analyze_risk, optimize_with_summary, optimized_trajectory, project,
    propagate_rank_order, quota_limits, quota_usage, validate_report, BalanceSummary,
    CompetitiveCategory, GroupContext, MemberId, OptimizerConfig, PolicyViolation, QuotaLimits,
    QuotaUsage, Report, ReportId, RiskSummary, RosterMember, StrategyConfig, SummaryGroup,
    TargetConfig, TrajectoryPoint,
};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use tracing::debug;
use ulid::Ulid;

pub mod tracing_setup;

use tracing_setup::Verbosity;

#[derive(Debug, Parser)]
#[command(name = "pq")]
#[command(about = "Promotion quota allocation and score planning")]
pub struct Cli {
    /// Debug-level logs on stderr.
    #[arg(long, short, global = true)]
    pub verbose: bool,

    /// Errors only on stderr.
    #[arg(long, short, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    command: Command,
}

impl Cli {
    #[must_use]
    pub const fn verbosity(&self) -> Verbosity {
        Verbosity::from_flags(self.verbose, self.quiet)
    }
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Early Promote / Must Promote limits for a group size.
    Quota(QuotaArgs),
    /// Validate current recommendations of a group file.
    Check(GroupArgs),
    /// Allocate recommendations down the group's stored order.
    Allocate(GroupArgs),
    /// Rank, allocate and balance scores toward a target average.
    Optimize(OptimizeArgs),
    /// Project grades for a roster from rank order.
    Project(ProjectArgs),
    /// Re-plan every open group of a competitive group from one rank order.
    Propagate(PropagateArgs),
    /// Plan the cumulative average across groups, oldest first.
    Trajectory(TrajectoryArgs),
}

#[derive(Debug, Args)]
pub struct QuotaArgs {
    #[arg(long)]
    paygrade: String,
    #[arg(long, default_value = "")]
    designator: String,
    #[arg(long)]
    ldo: bool,
    #[arg(long)]
    cwo: bool,
    #[arg(long)]
    size: usize,
    #[arg(long)]
    early_promote_used: Option<usize>,
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Args)]
pub struct GroupArgs {
    #[arg(long)]
    group: PathBuf,
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Args)]
pub struct OptimizeArgs {
    #[arg(long)]
    group: PathBuf,
    /// Member ids in rank order; defaults to the group's stored rank order.
    #[arg(long, value_delimiter = ',')]
    rank: Vec<String>,
    #[arg(long)]
    config: Option<PathBuf>,
    #[arg(long)]
    target: Option<f64>,
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Args)]
pub struct ProjectArgs {
    #[arg(long)]
    roster: PathBuf,
    #[arg(long)]
    target: f64,
    #[arg(long)]
    config: Option<PathBuf>,
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Args)]
pub struct PropagateArgs {
    #[arg(long)]
    groups: PathBuf,
    #[arg(long)]
    key: String,
    #[arg(long, value_delimiter = ',', required = true)]
    rank: Vec<String>,
    #[arg(long)]
    config: Option<PathBuf>,
    #[arg(long)]
    target: Option<f64>,
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Args)]
pub struct TrajectoryArgs {
    /// Groups in chronological order.
    #[arg(long)]
    groups: PathBuf,
    /// Only plan groups of this competitive group.
    #[arg(long)]
    key: Option<String>,
    #[arg(long, conflicts_with = "target")]
    config: Option<PathBuf>,
    /// Ideal cumulative average; bands are derived around it.
    #[arg(long)]
    target: Option<f64>,
    #[arg(long)]
    json: bool,
}

/// Executes the parsed CLI command.
///
/// # Errors
/// Returns an error when input files cannot be read or decoded, configuration
/// is invalid, or `check` finds ERROR-severity violations or quota overruns.
pub fn run_cli(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Quota(args) => run_quota(&args),
        Command::Check(args) => run_check(&args),
        Command::Allocate(args) => run_allocate(&args),
        Command::Optimize(args) => run_optimize(&args),
        Command::Project(args) => run_project(&args),
        Command::Propagate(args) => run_propagate(&args),
        Command::Trajectory(args) => run_trajectory(&args),
    }
}

fn run_quota(args: &QuotaArgs) -> Result<()> {
    let mut context = GroupContext::from_labels(&args.paygrade, &args.designator)
        .map_err(|err| anyhow!(err.to_string()))?;
    context.is_ldo |= args.ldo;
    context.is_cwo |= args.cwo;

    let limits = quota_limits(args.size, &context, args.early_promote_used.unwrap_or(0));
    if args.json {
        let payload = QuotaPayload {
            contract_version: "quota.v1".to_string(),
            generated_at: generated_at()?,
            context,
            limits,
        };
        println!("{}", serde_json::to_string_pretty(&payload)?);
    } else {
        print_quota_limits(&context, CompetitiveCategory::classify(&args.designator), &limits);
    }
    Ok(())
}

fn run_check(args: &GroupArgs) -> Result<()> {
    let group = load_group(&args.group)?;
    let context = group
        .context()
        .map_err(|err| anyhow!(err.to_string()))
        .with_context(|| format!("group {} has no usable context", group.group_id))?;

    let findings: Vec<ReportFindings> = group
        .reports
        .iter()
        .map(|report| ReportFindings {
            report_id: report.report_id,
            member_id: report.member_id,
            violations: validate_report(report, &context),
        })
        .filter(|finding| !finding.violations.is_empty())
        .collect();
    let quota = quota_usage(&group.reports, &context);
    let passed = !quota.is_over_quota()
        && findings
            .iter()
            .all(|finding| finding.violations.iter().all(|violation| !violation.is_error()));

    if args.json {
        let payload = CheckPayload {
            contract_version: "check.v1".to_string(),
            generated_at: generated_at()?,
            group_id: group.group_id.to_string(),
            passed,
            quota,
            findings: findings.clone(),
        };
        println!("{}", serde_json::to_string_pretty(&payload)?);
    } else {
        print_check(&group, &quota, &findings, passed);
    }

    if !passed {
        let codes = findings
            .iter()
            .flat_map(|finding| {
                finding
                    .violations
                    .iter()
                    .map(move |violation| format!("{}:{}", finding.report_id, violation.code.as_str()))
            })
            .collect::<Vec<_>>();
        return Err(anyhow!(
            "group {} failed policy check: over_quota={} violations=[{}]",
            group.group_id,
            quota.is_over_quota(),
            codes.join("; ")
        ));
    }
    Ok(())
}

fn run_allocate(args: &GroupArgs) -> Result<()> {
    let group = load_group(&args.group)?;
    let reports = allocate_group(&group);
    let quota = group
        .context()
        .ok()
        .map(|context| quota_usage(&reports, &context));

    if args.json {
        let payload = AllocationPayload {
            contract_version: "allocation.v1".to_string(),
            generated_at: generated_at()?,
            group_id: group.group_id.to_string(),
            quota,
            reports,
        };
        println!("{}", serde_json::to_string_pretty(&payload)?);
    } else {
        print_reports(&reports);
        if let Some(quota) = quota {
            print_quota_usage(&quota);
        }
    }
    Ok(())
}

fn run_optimize(args: &OptimizeArgs) -> Result<()> {
    let group = load_group(&args.group)?;
    let config = load_optimizer_config(args.config.as_deref(), args.target)?;
    let rank_order = if args.rank.is_empty() {
        group.rank_order.clone()
    } else {
        parse_member_ids(&args.rank)?
    };

    let outcome = optimize_with_summary(&group, &rank_order, &config);
    if args.json {
        let payload = OptimizationPayload {
            contract_version: "optimization.v1".to_string(),
            generated_at: generated_at()?,
            group_id: group.group_id.to_string(),
            rank_order,
            summary: outcome.summary,
            reports: outcome.reports,
        };
        println!("{}", serde_json::to_string_pretty(&payload)?);
    } else {
        print_reports(&outcome.reports);
        print_balance_summary(&outcome.summary);
    }
    Ok(())
}

fn run_project(args: &ProjectArgs) -> Result<()> {
    let roster: Vec<RosterMember> = read_json(&args.roster)?;
    let config = match args.config.as_deref() {
        Some(path) => StrategyConfig::from_json(&read_json::<serde_json::Value>(path)?)
            .map_err(|err| anyhow!(err.to_string()))?,
        None => StrategyConfig::default(),
    };

    let members = project(&roster, args.target, &config);
    if args.json {
        let payload = ProjectionPayload {
            contract_version: "projection.v1".to_string(),
            generated_at: generated_at()?,
            target: args.target,
            members,
        };
        println!("{}", serde_json::to_string_pretty(&payload)?);
    } else {
        print_projection(args.target, &members);
    }
    Ok(())
}

fn run_propagate(args: &PropagateArgs) -> Result<()> {
    let groups: Vec<SummaryGroup> = read_json(&args.groups)?;
    for group in &groups {
        group
            .validate()
            .map_err(|err| anyhow!(err.to_string()))
            .with_context(|| format!("invalid group in {}", args.groups.display()))?;
    }
    let config = load_optimizer_config(args.config.as_deref(), args.target)?;
    let global_order = parse_member_ids(&args.rank)?;

    let planned = propagate_rank_order(&groups, &args.key, &global_order, &config);
    if args.json {
        let payload = PropagationPayload {
            contract_version: "propagation.v1".to_string(),
            generated_at: generated_at()?,
            competitive_group_key: args.key.clone(),
            groups: planned,
        };
        println!("{}", serde_json::to_string_pretty(&payload)?);
    } else {
        for group in &planned {
            println!("group={} name={} status={}", group.group_id, group.name, group.status.as_str());
            print_reports(&group.reports);
        }
    }
    Ok(())
}

fn run_trajectory(args: &TrajectoryArgs) -> Result<()> {
    let groups: Vec<SummaryGroup> = read_json(&args.groups)?;
    for group in &groups {
        group
            .validate()
            .map_err(|err| anyhow!(err.to_string()))
            .with_context(|| format!("invalid group in {}", args.groups.display()))?;
    }
    let config = load_target_config(args.config.as_deref(), args.target)?;
    let selected: Vec<SummaryGroup> = groups
        .into_iter()
        .filter(|group| match args.key.as_deref() {
            Some(key) => group.competitive_group_key == key,
            None => true,
        })
        .collect();

    let points = optimized_trajectory(&selected, &config);
    let risk = analyze_risk(&points);
    if args.json {
        let payload = TrajectoryPayload {
            contract_version: "trajectory.v1".to_string(),
            generated_at: generated_at()?,
            competitive_group_key: args.key.clone(),
            config,
            points,
            risk,
        };
        println!("{}", serde_json::to_string_pretty(&payload)?);
    } else {
        print_trajectory(&points, &risk);
    }
    Ok(())
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed reading {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("failed decoding JSON from {}", path.display()))
}

fn load_group(path: &Path) -> Result<SummaryGroup> {
    let group: SummaryGroup = read_json(path)?;
    group
        .validate()
        .map_err(|err| anyhow!(err.to_string()))
        .with_context(|| format!("invalid group in {}", path.display()))?;
    debug!(
        path = %path.display(),
        group_id = %group.group_id,
        reports = group.reports.len(),
        "loaded summary group"
    );
    Ok(group)
}

fn load_optimizer_config(path: Option<&Path>, target: Option<f64>) -> Result<OptimizerConfig> {
    let mut config = match path {
        Some(path) => OptimizerConfig::from_json(&read_json::<serde_json::Value>(path)?)
            .map_err(|err| anyhow!(err.to_string()))?,
        None => OptimizerConfig::default(),
    };
    if let Some(target) = target {
        config = config.with_target(target);
        config.validate().map_err(|err| anyhow!(err.to_string()))?;
    }
    Ok(config)
}

fn load_target_config(path: Option<&Path>, target: Option<f64>) -> Result<TargetConfig> {
    let config = match (path, target) {
        (Some(path), _) => TargetConfig::from_json(&read_json::<serde_json::Value>(path)?)
            .map_err(|err| anyhow!(err.to_string()))?,
        (None, Some(target)) => TargetConfig::around(target),
        (None, None) => TargetConfig::default(),
    };
    config.validate().map_err(|err| anyhow!(err.to_string()))?;
    Ok(config)
}

fn parse_member_ids(raw: &[String]) -> Result<Vec<MemberId>> {
    raw.iter()
        .map(|value| {
            Ulid::from_string(value.trim())
                .map(MemberId)
                .map_err(|err| anyhow!("invalid member id '{value}': {err}"))
        })
        .collect()
}

fn generated_at() -> Result<String> {
    OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .context("failed formatting generated_at timestamp")
}

fn print_quota_limits(context: &GroupContext, category: CompetitiveCategory, limits: &QuotaLimits) {
    println!(
        "paygrade={} category={} ldo={} cwo={} size={} column={}",
        context.paygrade,
        category.as_str(),
        if context.is_ldo { "yes" } else { "no" },
        if context.is_cwo { "yes" } else { "no" },
        limits.size,
        limits.column.map_or("none", |column| column.as_str())
    );
    println!(
        "early_promote_max={} must_promote_max={} combined_max={}",
        limits.early_promote_max, limits.must_promote_max, limits.combined_max
    );
}

fn print_quota_usage(quota: &QuotaUsage) {
    println!(
        "size={} early_promote={}/{} must_promote={}/{} combined_remaining={}",
        quota.size,
        quota.early_promote_used,
        quota.early_promote_max,
        quota.must_promote_used,
        quota.must_promote_max,
        quota.combined_remaining
    );
}

fn print_reports(reports: &[Report]) {
    println!(
        "{:<5} {:<28} {:<5} {:<7} locked",
        "rank", "member_id", "rec", "score"
    );
    println!("{}", "-".repeat(56));
    for (index, report) in reports.iter().enumerate() {
        println!(
            "{:<5} {:<28} {:<5} {:<7.2} {}",
            index + 1,
            report.member_id,
            report.recommendation.as_str(),
            report.trait_average,
            if report.locked { "yes" } else { "no" }
        );
    }
}

fn print_balance_summary(summary: &BalanceSummary) {
    println!(
        "active={} target={:.2} achieved={:.2} within_margin={} raise_rounds={} cut_rounds={}",
        summary.active_count,
        summary.target_aggregate,
        summary.achieved_aggregate,
        if summary.within_margin { "yes" } else { "no" },
        summary.raise_rounds,
        summary.cut_rounds
    );
}

fn print_check(group: &SummaryGroup, quota: &QuotaUsage, findings: &[ReportFindings], passed: bool) {
    println!("group={} passed={}", group.group_id, if passed { "yes" } else { "no" });
    print_quota_usage(quota);
    if findings.is_empty() {
        return;
    }
    println!("{:<28} {:<32} message", "report_id", "code");
    println!("{}", "-".repeat(100));
    for finding in findings {
        for violation in &finding.violations {
            println!(
                "{:<28} {:<32} {}",
                finding.report_id,
                violation.code.as_str(),
                violation.message
            );
        }
    }
}

fn print_projection(target: f64, members: &[RosterMember]) {
    println!("target={target:.2}");
    println!("{:<6} {:<28} {:<8} projected", "rank", "member_id", "locked");
    println!("{}", "-".repeat(56));
    for member in members {
        println!(
            "{:<6} {:<28} {:<8} {}",
            member.rank_order,
            member.member_id,
            if member.locked { "yes" } else { "no" },
            member
                .projected_score
                .map_or_else(|| "n/a".to_string(), |score| format!("{score:.2}"))
        );
    }
}

fn print_trajectory(points: &[TrajectoryPoint], risk: &RiskSummary) {
    println!(
        "{:<28} {:<9} {:<8} {:<8} {:<8} members",
        "group_id", "kind", "planned", "cumul", "margin"
    );
    println!("{}", "-".repeat(72));
    for point in points {
        println!(
            "{:<28} {:<9} {:<8.2} {:<8.2} {:<8.2} {}",
            point.group_id,
            if point.projected { "projected" } else { "actual" },
            point.optimal_average,
            point.cumulative_average,
            point.margin,
            point.member_count
        );
    }
    println!(
        "projected_average={:.2} min_margin={:.2} critical={}",
        risk.projected_average,
        risk.min_margin,
        if risk.is_critical { "yes" } else { "no" }
    );
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReportFindings {
    report_id: ReportId,
    member_id: MemberId,
    violations: Vec<PolicyViolation>,
}

#[derive(Debug, Serialize)]
pub struct QuotaPayload {
    contract_version: String,
    generated_at: String,
    context: GroupContext,
    limits: QuotaLimits,
}

#[derive(Debug, Serialize)]
pub struct CheckPayload {
    contract_version: String,
    generated_at: String,
    group_id: String,
    passed: bool,
    quota: QuotaUsage,
    findings: Vec<ReportFindings>,
}

#[derive(Debug, Serialize)]
pub struct AllocationPayload {
    contract_version: String,
    generated_at: String,
    group_id: String,
    quota: Option<QuotaUsage>,
    reports: Vec<Report>,
}

#[derive(Debug, Serialize)]
pub struct OptimizationPayload {
    contract_version: String,
    generated_at: String,
    group_id: String,
    rank_order: Vec<MemberId>,
    summary: BalanceSummary,
    reports: Vec<Report>,
}

#[derive(Debug, Serialize)]
pub struct ProjectionPayload {
    contract_version: String,
    generated_at: String,
    target: f64,
    members: Vec<RosterMember>,
}

#[derive(Debug, Serialize)]
pub struct PropagationPayload {
    contract_version: String,
    generated_at: String,
    competitive_group_key: String,
    groups: Vec<SummaryGroup>,
}

#[derive(Debug, Serialize)]
pub struct TrajectoryPayload {
    contract_version: String,
    generated_at: String,
    competitive_group_key: Option<String>,
    config: TargetConfig,
    points: Vec<TrajectoryPoint>,
    risk: RiskSummary,
}
