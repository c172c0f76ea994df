use crate::schedule::model::{RowType, Schedule};
use crate::schedule::validate::{Issue, IssueCategory, RuleContext, ScheduleRule};

/// A revenue row's start time should match the trip's first departure.
#[derive(Debug, Default)]
pub struct StartTimeMatchRule;

impl ScheduleRule for StartTimeMatchRule {
    fn name(&self) -> &'static str {
        "start_time_match"
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
            let (Some(trip_id), Some(start)) = (row.trip_id.as_deref(), row.start_time) else {
                continue;
            };
            let stop_times = gtfs.stop_times_for_trip(trip_id);
            let Some(first_departure) = stop_times
                .first()
                .and_then(|st| st.departure_time.or(st.arrival_time))
            else {
                continue;
            };
            let deviation =
                (start.total_seconds() as i64 - first_departure.total_seconds() as i64).abs();
            if deviation > ctx.config.time_tolerance_seconds {
                issues.push(
                    Issue::new(
                        ctx.tolerance_severity(),
                        7,
                        IssueCategory::GtfsReferential,
                        "schedule start deviates from GTFS",
                    )
                    .with_context("row", index)
                    .with_context("tripId", trip_id)
                    .with_context("scheduleStart", start.to_string())
                    .with_context("gtfsDeparture", first_departure.to_string())
                    .with_context("deviationSeconds", deviation),
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
    use crate::schedule::validate::{ComplianceLevel, IssueSeverity, ValidationConfig};
    use interchange_model::{GtfsTime, StopTime, Trip};

    fn feed() -> GtfsFeed {
        let mut feed = GtfsFeed::default();
        feed.trips = CsvTable::from_rows(vec![Trip {
            trip_id: "T1".into(),
            route_id: "r1".into(),
            service_id: "svc".into(),
            ..Default::default()
        }]);
        feed.stop_times = CsvTable::from_rows(vec![
            StopTime {
                trip_id: "T1".into(),
                stop_id: "s1".into(),
                stop_sequence: 1,
                departure_time: Some(GtfsTime::parse("08:02:30").unwrap()),
                arrival_time: Some(GtfsTime::parse("08:02:30").unwrap()),
                ..Default::default()
            },
            StopTime {
                trip_id: "T1".into(),
                stop_id: "s2".into(),
                stop_sequence: 2,
                departure_time: Some(GtfsTime::parse("08:30:00").unwrap()),
                arrival_time: Some(GtfsTime::parse("08:30:00").unwrap()),
                ..Default::default()
            },
        ]);
        feed
    }

    fn schedule() -> Schedule {
        Schedule::new(vec![ScheduleRow {
            trip_id: Some("T1".into()),
            row_type: RowType::Revenue,
            start_time: Some(GtfsTime::parse("08:00:00").unwrap()),
            ..Default::default()
        }])
    }

    #[test]
    fn standard_compliance_warns_on_deviation() {
        let feed = feed();
        let filter = FeedFilter::new(&feed);
        let config = ValidationConfig {
            time_tolerance_seconds: 60,
            ..Default::default()
        };
        let ctx = RuleContext {
            config: &config,
            gtfs: Some(&filter),
        };
        let mut issues = Vec::new();
        StartTimeMatchRule.validate(&schedule(), &ctx, &mut issues);
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].code, "W007");
        assert_eq!(issues[0].severity, IssueSeverity::Warning);
    }

    #[test]
    fn strict_compliance_raises_an_error() {
        let feed = feed();
        let filter = FeedFilter::new(&feed);
        let config = ValidationConfig {
            compliance: ComplianceLevel::Strict,
            time_tolerance_seconds: 60,
            ..Default::default()
        };
        let ctx = RuleContext {
            config: &config,
            gtfs: Some(&filter),
        };
        let mut issues = Vec::new();
        StartTimeMatchRule.validate(&schedule(), &ctx, &mut issues);
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].code, "E007");
    }

    #[test]
    fn deviation_within_tolerance_passes() {
        let feed = feed();
        let filter = FeedFilter::new(&feed);
        let config = ValidationConfig {
            time_tolerance_seconds: 180,
            ..Default::default()
        };
        let ctx = RuleContext {
            config: &config,
            gtfs: Some(&filter),
        };
        let mut issues = Vec::new();
        StartTimeMatchRule.validate(&schedule(), &ctx, &mut issues);
        assert!(issues.is_empty());
    }
}
