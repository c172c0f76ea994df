use crate::schedule::model::{RowType, Schedule};
use crate::schedule::validate::{
    Issue, IssueCategory, IssueSeverity, RuleContext, ScheduleRule,
};

/// Adjacent rows of a block must chain spatially, and consecutive
/// revenue trips need at least the configured layover between them.
#[derive(Debug, Default)]
pub struct BlockContinuityRule;

impl ScheduleRule for BlockContinuityRule {
    fn name(&self) -> &'static str {
        "block_continuity"
    }

    fn category(&self) -> IssueCategory {
        IssueCategory::Structural
    }

    fn validate(&self, schedule: &Schedule, ctx: &RuleContext<'_>, issues: &mut Vec<Issue>) {
        for (block, indexes) in schedule.blocks() {
            for pair in indexes.windows(2) {
                let previous = &schedule.rows[pair[0]];
                let next = &schedule.rows[pair[1]];

                if let (Some(previous_end), Some(next_start)) =
                    (previous.end_place.as_deref(), next.start_place.as_deref())
                {
                    if previous_end != next_start {
                        issues.push(
                            Issue::new(
                                IssueSeverity::Error,
                                2,
                                IssueCategory::Structural,
                                "adjacent rows in block do not share an endpoint",
                            )
                            .with_context("block", block.clone())
                            .with_context("endPlace", previous_end)
                            .with_context("nextStartPlace", next_start),
                        );
                    }
                }

                if previous.row_type == RowType::Revenue && next.row_type == RowType::Revenue {
                    if let (Some(end), Some(start)) = (previous.end_time, next.start_time) {
                        let gap = start.total_seconds() as i64 - end.total_seconds() as i64;
                        if gap >= 0 && gap < ctx.config.min_layover_seconds {
                            issues.push(
                                Issue::new(
                                    IssueSeverity::Error,
                                    2,
                                    IssueCategory::Structural,
                                    "layover between revenue trips is below the floor",
                                )
                                .with_context("block", block.clone())
                                .with_context("gapSeconds", gap)
                                .with_context(
                                    "minLayoverSeconds",
                                    ctx.config.min_layover_seconds,
                                ),
                            );
                        }
                    }
                }
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

    fn revenue(block: &str, from: &str, to: &str, start: &str, end: &str) -> ScheduleRow {
        ScheduleRow {
            block: Some(block.into()),
            start_place: Some(from.into()),
            end_place: Some(to.into()),
            start_time: Some(GtfsTime::parse(start).unwrap()),
            end_time: Some(GtfsTime::parse(end).unwrap()),
            row_type: RowType::Revenue,
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
        BlockContinuityRule.validate(schedule, &ctx, &mut issues);
        issues
    }

    #[test]
    fn detects_spatial_break() {
        let schedule = Schedule::new(vec![
            revenue("B1", "A", "B", "08:00:00", "08:30:00"),
            revenue("B1", "C", "D", "09:00:00", "09:30:00"),
        ]);
        let issues = run(&schedule);
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].code, "E002");
    }

    #[test]
    fn detects_short_layover() {
        let schedule = Schedule::new(vec![
            revenue("B1", "A", "B", "08:00:00", "08:30:00"),
            revenue("B1", "B", "A", "08:32:00", "09:00:00"),
        ]);
        let issues = run(&schedule);
        assert_eq!(issues.len(), 1);
        assert!(issues[0].message.contains("layover"));
    }

    #[test]
    fn passes_chained_block_with_layover() {
        let schedule = Schedule::new(vec![
            revenue("B1", "A", "B", "08:00:00", "08:30:00"),
            revenue("B1", "B", "A", "08:40:00", "09:10:00"),
        ]);
        assert!(run(&schedule).is_empty());
    }
}
