use interchange_model::{GtfsTime, StopTime, Timepoint};

use crate::notice::Notice;
use crate::notice::NoticeContainer;
use crate::txc::TimingLink;

/// Walk a journey pattern's timing links from the journey's departure time,
/// accumulating run and wait times into absolute stop times. The cursor keeps
/// whole seconds past 24:00, which GTFS times represent directly.
pub(crate) fn expand_stop_times(
    trip_id: &str,
    departure_seconds: i32,
    links: &[&TimingLink],
    warnings: &mut NoticeContainer,
) -> Vec<StopTime> {
    let mut stop_times = Vec::with_capacity(links.len() + 1);
    let Some(first) = links.first() else {
        return stop_times;
    };

    let mut cursor = departure_seconds;
    let arrival = cursor;
    cursor += first.from_wait_seconds.unwrap_or(0) as i32;
    stop_times.push(stop_time(
        trip_id,
        &first.from_stop,
        1,
        arrival,
        cursor,
        first.from_timing_status.as_deref(),
    ));

    for (index, link) in links.iter().enumerate() {
        let run_time = match link.run_time_seconds {
            Some(seconds) => seconds as i32,
            None => {
                warnings.push(
                    Notice::warning("txc_missing_runtime", "timing link has no RunTime")
                        .with_context_field("tripId", trip_id)
                        .with_context_field("linkId", link.id.clone()),
                );
                0
            }
        };
        cursor += run_time;
        let arrival = cursor;
        cursor += link.to_wait_seconds.unwrap_or(0) as i32;
        if let Some(next) = links.get(index + 1) {
            cursor += next.from_wait_seconds.unwrap_or(0) as i32;
        }
        stop_times.push(stop_time(
            trip_id,
            &link.to_stop,
            index as u32 + 2,
            arrival,
            cursor,
            link.to_timing_status.as_deref(),
        ));
    }

    stop_times
}

fn stop_time(
    trip_id: &str,
    stop_id: &str,
    sequence: u32,
    arrival: i32,
    departure: i32,
    timing_status: Option<&str>,
) -> StopTime {
    StopTime {
        trip_id: trip_id.to_string(),
        arrival_time: Some(GtfsTime::from_seconds(arrival)),
        departure_time: Some(GtfsTime::from_seconds(departure)),
        stop_id: stop_id.to_string(),
        stop_sequence: sequence,
        timepoint: timepoint_from_status(timing_status),
        ..Default::default()
    }
}

/// NaPTAN timing status to GTFS timepoint: a principal timing point carries
/// guaranteed times, anything else is approximate. Absent status stays
/// unset.
fn timepoint_from_status(status: Option<&str>) -> Option<Timepoint> {
    match status {
        Some("PTP") | Some("principalTimingPoint") => Some(Timepoint::Exact),
        Some(_) => Some(Timepoint::Approximate),
        None => None,
    }
}
