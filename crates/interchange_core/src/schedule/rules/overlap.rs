use crate::schedule::model::Schedule;
use crate::schedule::validate::{
    Issue, IssueCategory, IssueSeverity, RuleContext, ScheduleRule,
};

/// One vehicle cannot do two things at once; rows within a block must
/// not overlap in time.
#[derive(Debug, Default)]
pub struct OverlapRule;

impl ScheduleRule for OverlapRule {
    fn name(&self) -> &'static str {
        "block_overlap"
    }

    fn category(&self) -> IssueCategory {
        IssueCategory::Structural
    }

    fn validate(&self, schedule: &Schedule, _ctx: &RuleContext<'_>, issues: &mut Vec<Issue>) {
        for (block, indexes) in schedule.blocks() {
            if block.is_empty() {
                continue;
            }
            for pair in indexes.windows(2) {
                let previous = &schedule.rows[pair[0]];
                let next = &schedule.rows[pair[1]];
                let (Some(previous_end), Some(next_start)) = (previous.end_time, next.start_time)
                else {
                    continue;
                };
                if next_start < previous_end {
                    issues.push(
                        Issue::new(
                            IssueSeverity::Error,
                            5,
                            IssueCategory::Structural,
                            "rows in block overlap in time",
                        )
                        .with_context("block", block.clone())
                        .with_context("previousEnd", previous_end.to_string())
                        .with_context("nextStart", next_start.to_string()),
                    );
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

    fn row(block: &str, start: &str, end: &str) -> ScheduleRow {
        ScheduleRow {
            block: Some(block.into()),
            start_time: Some(GtfsTime::parse(start).unwrap()),
            end_time: Some(GtfsTime::parse(end).unwrap()),
            ..Default::default()
        }
    }

    #[test]
    fn detects_overlapping_rows() {
        let schedule = Schedule::new(vec![
            row("B1", "08:00:00", "09:00:00"),
            row("B1", "08:45:00", "09:30:00"),
        ]);
        let config = ValidationConfig::default();
        let ctx = RuleContext {
            config: &config,
            gtfs: None,
        };
        let mut issues = Vec::new();
        OverlapRule.validate(&schedule, &ctx, &mut issues);
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].code, "E005");
    }

    #[test]
    fn different_blocks_may_overlap() {
        let schedule = Schedule::new(vec![
            row("B1", "08:00:00", "09:00:00"),
            row("B2", "08:30:00", "09:30:00"),
        ]);
        let config = ValidationConfig::default();
        let ctx = RuleContext {
            config: &config,
            gtfs: None,
        };
        let mut issues = Vec::new();
        OverlapRule.validate(&schedule, &ctx, &mut issues);
        assert!(issues.is_empty());
    }
}
