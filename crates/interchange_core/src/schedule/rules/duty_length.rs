use crate::schedule::model::Schedule;
use crate::schedule::validate::{
    Issue, IssueCategory, IssueSeverity, RuleContext, ScheduleRule,
};

/// A duty's spreadover (first start to last end) has a ceiling.
#[derive(Debug, Default)]
pub struct DutyLengthRule;

impl ScheduleRule for DutyLengthRule {
    fn name(&self) -> &'static str {
        "duty_length"
    }

    fn category(&self) -> IssueCategory {
        IssueCategory::Structural
    }

    fn validate(&self, schedule: &Schedule, ctx: &RuleContext<'_>, issues: &mut Vec<Issue>) {
        for (duty, indexes) in schedule.duties() {
            if duty.is_empty() {
                continue;
            }
            let start = indexes
                .iter()
                .filter_map(|&index| schedule.rows[index].start_time)
                .map(|time| time.total_seconds() as i64)
                .min();
            let end = indexes
                .iter()
                .filter_map(|&index| schedule.rows[index].end_time)
                .map(|time| time.total_seconds() as i64)
                .max();
            let (Some(start), Some(end)) = (start, end) else {
                continue;
            };
            let length = end - start;
            if length > ctx.config.max_duty_length_seconds {
                issues.push(
                    Issue::new(
                        IssueSeverity::Error,
                        3,
                        IssueCategory::Structural,
                        "duty exceeds the maximum spreadover",
                    )
                    .with_context("duty", duty.clone())
                    .with_context("lengthSeconds", length)
                    .with_context("maxSeconds", ctx.config.max_duty_length_seconds),
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schedule::model::ScheduleRow;
    use crate::schedule::validate::ValidationConfig;
    use interchange_model::GtfsTime;

    fn duty_row(duty: &str, start: &str, end: &str) -> ScheduleRow {
        ScheduleRow {
            duty_id: Some(duty.into()),
            start_time: Some(GtfsTime::parse(start).unwrap()),
            end_time: Some(GtfsTime::parse(end).unwrap()),
            ..Default::default()
        }
    }

    #[test]
    fn flags_overlong_duty() {
        let schedule = Schedule::new(vec![
            duty_row("D1", "05:00:00", "10:00:00"),
            duty_row("D1", "11:00:00", "18:30:00"),
        ]);
        let config = ValidationConfig::default();
        let ctx = RuleContext {
            config: &config,
            gtfs: None,
        };
        let mut issues = Vec::new();
        DutyLengthRule.validate(&schedule, &ctx, &mut issues);
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].code, "E003");
    }

    #[test]
    fn passes_duty_within_ceiling() {
        let schedule = Schedule::new(vec![duty_row("D1", "06:00:00", "14:00:00")]);
        let config = ValidationConfig::default();
        let ctx = RuleContext {
            config: &config,
            gtfs: None,
        };
        let mut issues = Vec::new();
        DutyLengthRule.validate(&schedule, &ctx, &mut issues);
        assert!(issues.is_empty());
    }
}
