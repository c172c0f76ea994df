use crate::schedule::model::{RowType, Schedule};
use crate::schedule::validate::{Issue, IssueCategory, RuleContext, ScheduleRule};

/// A revenue row's end time should match the trip's last arrival.
#[derive(Debug, Default)]
pub struct EndTimeMatchRule;

impl ScheduleRule for EndTimeMatchRule {
    fn name(&self) -> &'static str {
        "end_time_match"
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
            let (Some(trip_id), Some(end)) = (row.trip_id.as_deref(), row.end_time) else {
                continue;
            };
            let stop_times = gtfs.stop_times_for_trip(trip_id);
            let Some(last_arrival) = stop_times
                .last()
                .and_then(|st| st.arrival_time.or(st.departure_time))
            else {
                continue;
            };
            let deviation =
                (end.total_seconds() as i64 - last_arrival.total_seconds() as i64).abs();
            if deviation > ctx.config.time_tolerance_seconds {
                issues.push(
                    Issue::new(
                        ctx.tolerance_severity(),
                        8,
                        IssueCategory::GtfsReferential,
                        "schedule end deviates from GTFS",
                    )
                    .with_context("row", index)
                    .with_context("tripId", trip_id)
                    .with_context("scheduleEnd", end.to_string())
                    .with_context("gtfsArrival", last_arrival.to_string())
                    .with_context("deviationSeconds", deviation),
                );
            }
        }
    }
}
