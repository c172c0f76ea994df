use crate::schedule::model::Schedule;
use crate::schedule::validate::{
    Issue, IssueCategory, IssueSeverity, RuleContext, ScheduleRule,
};

/// Driving rows accumulate; only a break row (or idle gap) at least
/// `min_break_duration_seconds` long resets the clock.
#[derive(Debug, Default)]
pub struct ContinuousDrivingRule;

impl ScheduleRule for ContinuousDrivingRule {
    fn name(&self) -> &'static str {
        "continuous_driving"
    }

    fn category(&self) -> IssueCategory {
        IssueCategory::Structural
    }

    fn validate(&self, schedule: &Schedule, ctx: &RuleContext<'_>, issues: &mut Vec<Issue>) {
        for (duty, indexes) in schedule.duties() {
            if duty.is_empty() {
                continue;
            }
            let mut driven: i64 = 0;
            let mut worst: i64 = 0;
            let mut previous_end: Option<i64> = None;

            for &index in &indexes {
                let row = &schedule.rows[index];
                let (Some(start), Some(end)) = (row.start_time, row.end_time) else {
                    continue;
                };
                let start = start.total_seconds() as i64;
                let end = end.total_seconds() as i64;

                if let Some(previous) = previous_end {
                    if start - previous >= ctx.config.min_break_duration_seconds {
                        driven = 0;
                    }
                }

                if row.row_type.is_driving() {
                    driven += (end - start).max(0);
                    worst = worst.max(driven);
                } else if end - start >= ctx.config.min_break_duration_seconds {
                    driven = 0;
                }
                previous_end = Some(end);
            }

            if worst > ctx.config.max_continuous_driving_seconds {
                issues.push(
                    Issue::new(
                        IssueSeverity::Error,
                        4,
                        IssueCategory::Structural,
                        "continuous driving exceeds the cap without an adequate break",
                    )
                    .with_context("duty", duty.clone())
                    .with_context("continuousSeconds", worst)
                    .with_context("maxSeconds", ctx.config.max_continuous_driving_seconds)
                    .with_context(
                        "minBreakSeconds",
                        ctx.config.min_break_duration_seconds,
                    ),
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schedule::model::{RowType, ScheduleRow};
    use crate::schedule::validate::ValidationConfig;
    use interchange_model::GtfsTime;

    fn row(duty: &str, row_type: RowType, start: &str, end: &str) -> ScheduleRow {
        ScheduleRow {
            duty_id: Some(duty.into()),
            row_type,
            start_time: Some(GtfsTime::parse(start).unwrap()),
            end_time: Some(GtfsTime::parse(end).unwrap()),
            ..Default::default()
        }
    }

    fn run(schedule: &Schedule) -> Vec<Issue> {
        let config = ValidationConfig::default();
        let ctx = RuleContext {
            config: &config,
            gtfs: None,
        };
        let mut issues = Vec::new();
        ContinuousDrivingRule.validate(schedule, &ctx, &mut issues);
        issues
    }

    #[test]
    fn six_hours_at_the_wheel_is_flagged() {
        let schedule = Schedule::new(vec![
            row("D1", RowType::Revenue, "06:00:00", "09:00:00"),
            row("D1", RowType::Revenue, "09:05:00", "12:05:00"),
        ]);
        let issues = run(&schedule);
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].code, "E004");
    }

    #[test]
    fn an_adequate_break_resets_the_clock() {
        let schedule = Schedule::new(vec![
            row("D1", RowType::Revenue, "06:00:00", "09:00:00"),
            row("D1", RowType::Break, "09:00:00", "09:40:00"),
            row("D1", RowType::Revenue, "09:40:00", "12:40:00"),
        ]);
        assert!(run(&schedule).is_empty());
    }

    #[test]
    fn an_idle_gap_counts_as_rest() {
        let schedule = Schedule::new(vec![
            row("D1", RowType::Revenue, "06:00:00", "09:00:00"),
            row("D1", RowType::Revenue, "10:00:00", "13:00:00"),
        ]);
        assert!(run(&schedule).is_empty());
    }
}
