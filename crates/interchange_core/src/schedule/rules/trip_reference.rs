use crate::schedule::model::{RowType, Schedule};
use crate::schedule::validate::{
    Issue, IssueCategory, IssueSeverity, RuleContext, ScheduleRule,
};

/// Every revenue row's trip must exist in the GTFS reference.
#[derive(Debug, Default)]
pub struct TripReferenceRule;

impl ScheduleRule for TripReferenceRule {
    fn name(&self) -> &'static str {
        "trip_reference"
    }

    fn category(&self) -> IssueCategory {
        IssueCategory::GtfsReferential
    }

    fn validate(&self, schedule: &Schedule, ctx: &RuleContext<'_>, issues: &mut Vec<Issue>) {
        let Some(gtfs) = ctx.gtfs else {
            return;
        };
        for (index, row) in schedule.rows.iter().enumerate() {
            if row.row_type != RowType::Revenue {
                continue;
            }
            let Some(trip_id) = row.trip_id.as_deref() else {
                issues.push(
                    Issue::new(
                        IssueSeverity::Error,
                        6,
                        IssueCategory::GtfsReferential,
                        "revenue row has no trip_id",
                    )
                    .with_context("row", index),
                );
                continue;
            };
            if gtfs.trip(trip_id).is_none() {
                issues.push(
                    Issue::new(
                        IssueSeverity::Error,
                        6,
                        IssueCategory::GtfsReferential,
                        "trip_id does not resolve in the GTFS feed",
                    )
                    .with_context("row", index)
                    .with_context("tripId", trip_id),
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::csv_reader::CsvTable;
    use crate::feed::GtfsFeed;
    use crate::filter::FeedFilter;
    use crate::schedule::model::ScheduleRow;
    use crate::schedule::validate::ValidationConfig;
    use interchange_model::Trip;

    fn feed_with_trip(trip_id: &str) -> GtfsFeed {
        let mut feed = GtfsFeed::default();
        feed.trips = CsvTable::from_rows(vec![Trip {
            trip_id: trip_id.into(),
            route_id: "r1".into(),
            service_id: "svc".into(),
            ..Default::default()
        }]);
        feed
    }

    #[test]
    fn resolving_trip_passes_and_missing_trip_fails() {
        let feed = feed_with_trip("T1");
        let filter = FeedFilter::new(&feed);
        let config = ValidationConfig::default();
        let ctx = RuleContext {
            config: &config,
            gtfs: Some(&filter),
        };

        let schedule = Schedule::new(vec![
            ScheduleRow {
                trip_id: Some("T1".into()),
                row_type: RowType::Revenue,
                ..Default::default()
            },
            ScheduleRow {
                trip_id: Some("T404".into()),
                row_type: RowType::Revenue,
                ..Default::default()
            },
        ]);
        let mut issues = Vec::new();
        TripReferenceRule.validate(&schedule, &ctx, &mut issues);
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].code, "E006");
    }
}
