use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use crate::filter::FeedFilter;

use super::model::Schedule;
use super::rules;

/// Which rules fire and how hard tolerance breaches hit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ComplianceLevel {
    /// Every rule, every finding an error.
    Strict,
    /// Structural findings and missing GTFS references are errors;
    /// tolerance breaches are warnings.
    #[default]
    Standard,
    /// Structural rules only.
    Lenient,
}

#[derive(Debug, Clone)]
pub struct ValidationConfig {
    pub compliance: ComplianceLevel,
    pub time_tolerance_seconds: i64,
    pub min_layover_seconds: i64,
    pub max_duty_length_seconds: i64,
    pub max_continuous_driving_seconds: i64,
    pub min_break_duration_seconds: i64,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        // UK domestic drivers' hours shape the defaults: 5h30 at the wheel,
        // a 30-minute break, and a 13-hour spreadover.
        Self {
            compliance: ComplianceLevel::Standard,
            time_tolerance_seconds: 60,
            min_layover_seconds: 300,
            max_duty_length_seconds: 13 * 3600,
            max_continuous_driving_seconds: 5 * 3600 + 1800,
            min_break_duration_seconds: 1800,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IssueCategory {
    Structural,
    GtfsReferential,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IssueSeverity {
    Error,
    Warning,
}

/// One finding. `code` is stable (`E001`…/`W007`…) so callers can build
/// suppression lists against it.
#[derive(Debug, Clone)]
pub struct Issue {
    pub code: String,
    pub category: IssueCategory,
    pub severity: IssueSeverity,
    pub message: String,
    pub context: BTreeMap<String, Value>,
}

impl Issue {
    pub fn new(
        severity: IssueSeverity,
        number: u16,
        category: IssueCategory,
        message: impl Into<String>,
    ) -> Self {
        let prefix = match severity {
            IssueSeverity::Error => 'E',
            IssueSeverity::Warning => 'W',
        };
        Self {
            code: format!("{prefix}{number:03}"),
            category,
            severity,
            message: message.into(),
            context: BTreeMap::new(),
        }
    }

    pub fn with_context<V: Serialize>(mut self, name: impl Into<String>, value: V) -> Self {
        let serialized = serde_json::to_value(value).unwrap_or(Value::Null);
        self.context.insert(name.into(), serialized);
        self
    }
}

#[derive(Debug, Clone, Default)]
pub struct ValidationReport {
    pub issues: Vec<Issue>,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.error_count() == 0
    }

    pub fn error_count(&self) -> usize {
        self.issues
            .iter()
            .filter(|issue| issue.severity == IssueSeverity::Error)
            .count()
    }

    pub fn warning_count(&self) -> usize {
        self.issues
            .iter()
            .filter(|issue| issue.severity == IssueSeverity::Warning)
            .count()
    }
}

pub struct RuleContext<'a> {
    pub config: &'a ValidationConfig,
    pub gtfs: Option<&'a FeedFilter<'a>>,
}

impl RuleContext<'_> {
    /// Severity for a tolerance breach under the active compliance level.
    pub fn tolerance_severity(&self) -> IssueSeverity {
        match self.config.compliance {
            ComplianceLevel::Strict => IssueSeverity::Error,
            _ => IssueSeverity::Warning,
        }
    }
}

pub trait ScheduleRule: Send + Sync {
    fn name(&self) -> &'static str;
    fn category(&self) -> IssueCategory;
    fn validate(&self, schedule: &Schedule, ctx: &RuleContext<'_>, issues: &mut Vec<Issue>);
}

/// Run the rule set selected by the compliance level. GTFS-referential rules
/// need a filter; without one they are skipped.
pub fn validate_schedule(
    schedule: &Schedule,
    gtfs: Option<&FeedFilter<'_>>,
    config: &ValidationConfig,
) -> ValidationReport {
    let ctx = RuleContext { config, gtfs };
    let mut issues = Vec::new();
    for rule in rules::default_rules() {
        if rule.category() == IssueCategory::GtfsReferential
            && (config.compliance == ComplianceLevel::Lenient || gtfs.is_none())
        {
            continue;
        }
        let before = issues.len();
        rule.validate(schedule, &ctx, &mut issues);
        debug!(
            rule = rule.name(),
            findings = issues.len() - before,
            "schedule rule finished"
        );
    }
    ValidationReport { issues }
}
