use crate::schedule::model::Schedule;
use crate::schedule::validate::{
    Issue, IssueCategory, IssueSeverity, RuleContext, ScheduleRule,
};

/// Every row must end at or after it starts.
#[derive(Debug, Default)]
pub struct TimeOrderRule;

impl ScheduleRule for TimeOrderRule {
    fn name(&self) -> &'static str {
        "time_order"
    }

    fn category(&self) -> IssueCategory {
        IssueCategory::Structural
    }

    fn validate(&self, schedule: &Schedule, _ctx: &RuleContext<'_>, issues: &mut Vec<Issue>) {
        for (index, row) in schedule.rows.iter().enumerate() {
            let (Some(start), Some(end)) = (row.start_time, row.end_time) else {
                continue;
            };
            if end < start {
                issues.push(
                    Issue::new(
                        IssueSeverity::Error,
                        1,
                        IssueCategory::Structural,
                        "row ends before it starts",
                    )
                    .with_context("row", index)
                    .with_context("startTime", start.to_string())
                    .with_context("endTime", end.to_string()),
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

    fn ctx_config() -> ValidationConfig {
        ValidationConfig::default()
    }

    #[test]
    fn flags_inverted_rows() {
        let schedule = Schedule::new(vec![ScheduleRow {
            start_time: Some(GtfsTime::parse("09:00:00").unwrap()),
            end_time: Some(GtfsTime::parse("08:00:00").unwrap()),
            ..Default::default()
        }]);
        let config = ctx_config();
        let ctx = RuleContext {
            config: &config,
            gtfs: None,
        };
        let mut issues = Vec::new();
        TimeOrderRule.validate(&schedule, &ctx, &mut issues);
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].code, "E001");
    }

    #[test]
    fn next_day_times_are_in_order() {
        let schedule = Schedule::new(vec![ScheduleRow {
            start_time: Some(GtfsTime::parse("23:30:00").unwrap()),
            end_time: Some(GtfsTime::parse("24:15:00").unwrap()),
            ..Default::default()
        }]);
        let config = ctx_config();
        let ctx = RuleContext {
            config: &config,
            gtfs: None,
        };
        let mut issues = Vec::new();
        TimeOrderRule.validate(&schedule, &ctx, &mut issues);
        assert!(issues.is_empty());
    }
}
