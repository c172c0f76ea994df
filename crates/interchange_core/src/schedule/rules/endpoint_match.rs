use crate::filter::FeedFilter;
use crate::geo::haversine_meters;
use crate::schedule::model::{RowType, Schedule};
use crate::schedule::validate::{Issue, IssueCategory, RuleContext, ScheduleRule};

/// Two stops closer than this are the same place for matching purposes.
const PLACE_MATCH_METERS: f64 = 25.0;

/// A revenue row's endpoints should be the trip's first and last stops,
/// by id or by coordinate proximity when the ids differ.
#[derive(Debug, Default)]
pub struct EndpointMatchRule;

impl ScheduleRule for EndpointMatchRule {
    fn name(&self) -> &'static str {
        "endpoint_match"
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
                continue;
            };
            let stop_times = gtfs.stop_times_for_trip(trip_id);
            let (Some(first), Some(last)) = (stop_times.first(), stop_times.last()) else {
                continue;
            };

            if let Some(place) = row.start_place.as_deref() {
                if !place_matches(
                    gtfs,
                    place,
                    &first.stop_id,
                    row.start_lat,
                    row.start_lon,
                ) {
                    issues.push(endpoint_issue(
                        ctx,
                        index,
                        trip_id,
                        "start_place does not match the trip's first stop",
                        place,
                        &first.stop_id,
                    ));
                }
            }
            if let Some(place) = row.end_place.as_deref() {
                if !place_matches(gtfs, place, &last.stop_id, row.end_lat, row.end_lon) {
                    issues.push(endpoint_issue(
                        ctx,
                        index,
                        trip_id,
                        "end_place does not match the trip's last stop",
                        place,
                        &last.stop_id,
                    ));
                }
            }
        }
    }
}

fn endpoint_issue(
    ctx: &RuleContext<'_>,
    row: usize,
    trip_id: &str,
    message: &str,
    place: &str,
    stop_id: &str,
) -> Issue {
    Issue::new(
        ctx.tolerance_severity(),
        9,
        IssueCategory::GtfsReferential,
        message,
    )
    .with_context("row", row)
    .with_context("tripId", trip_id)
    .with_context("place", place)
    .with_context("stopId", stop_id)
}

/// Id equality first; otherwise compare coordinates. The place's position
/// comes from the GTFS stop of that id when it exists, else from the
/// row-embedded coordinates.
fn place_matches(
    gtfs: &FeedFilter<'_>,
    place: &str,
    stop_id: &str,
    row_lat: Option<f64>,
    row_lon: Option<f64>,
) -> bool {
    if place == stop_id {
        return true;
    }
    let Some(stop) = gtfs.stop(stop_id) else {
        return false;
    };
    let (Some(stop_lat), Some(stop_lon)) = (stop.stop_lat, stop.stop_lon) else {
        return false;
    };
    let place_coords = gtfs
        .stop(place)
        .and_then(|s| Some((s.stop_lat?, s.stop_lon?)))
        .or_else(|| Some((row_lat?, row_lon?)));
    match place_coords {
        Some((lat, lon)) => {
            haversine_meters(lat, lon, stop_lat, stop_lon) <= PLACE_MATCH_METERS
        }
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::csv_reader::CsvTable;
    use crate::feed::GtfsFeed;
    use crate::schedule::model::ScheduleRow;
    use crate::schedule::validate::ValidationConfig;
    use interchange_model::{GtfsTime, Stop, StopTime, Trip};

    fn feed() -> GtfsFeed {
        let mut feed = GtfsFeed::default();
        feed.stops = CsvTable::from_rows(vec![
            Stop {
                stop_id: "s1".into(),
                stop_lat: Some(51.5000),
                stop_lon: Some(-0.1000),
                ..Default::default()
            },
            // About 11 meters north of s1.
            Stop {
                stop_id: "s1_alias".into(),
                stop_lat: Some(51.5001),
                stop_lon: Some(-0.1000),
                ..Default::default()
            },
            Stop {
                stop_id: "s2".into(),
                stop_lat: Some(51.6000),
                stop_lon: Some(-0.2000),
                ..Default::default()
            },
        ]);
        feed.trips = CsvTable::from_rows(vec![Trip {
            trip_id: "T1".into(),
            ..Default::default()
        }]);
        feed.stop_times = CsvTable::from_rows(vec![
            StopTime {
                trip_id: "T1".into(),
                stop_id: "s1".into(),
                stop_sequence: 1,
                arrival_time: Some(GtfsTime::parse("08:00:00").unwrap()),
                ..Default::default()
            },
            StopTime {
                trip_id: "T1".into(),
                stop_id: "s2".into(),
                stop_sequence: 2,
                arrival_time: Some(GtfsTime::parse("08:30:00").unwrap()),
                ..Default::default()
            },
        ]);
        feed
    }

    fn run(schedule: &Schedule, feed: &GtfsFeed) -> Vec<Issue> {
        let filter = FeedFilter::new(feed);
        let config = ValidationConfig::default();
        let ctx = RuleContext {
            config: &config,
            gtfs: Some(&filter),
        };
        let mut issues = Vec::new();
        EndpointMatchRule.validate(schedule, &ctx, &mut issues);
        issues
    }

    #[test]
    fn id_equality_matches() {
        let feed = feed();
        let schedule = Schedule::new(vec![ScheduleRow {
            trip_id: Some("T1".into()),
            row_type: RowType::Revenue,
            start_place: Some("s1".into()),
            end_place: Some("s2".into()),
            ..Default::default()
        }]);
        assert!(run(&schedule, &feed).is_empty());
    }

    #[test]
    fn nearby_alias_stop_matches_by_coordinates() {
        let feed = feed();
        let schedule = Schedule::new(vec![ScheduleRow {
            trip_id: Some("T1".into()),
            row_type: RowType::Revenue,
            start_place: Some("s1_alias".into()),
            end_place: Some("s2".into()),
            ..Default::default()
        }]);
        assert!(run(&schedule, &feed).is_empty());
    }

    #[test]
    fn distant_place_is_flagged() {
        let feed = feed();
        let schedule = Schedule::new(vec![ScheduleRow {
            trip_id: Some("T1".into()),
            row_type: RowType::Revenue,
            start_place: Some("s2".into()),
            end_place: Some("s2".into()),
            ..Default::default()
        }]);
        let issues = run(&schedule, &feed);
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].code, "W009");
    }
}
