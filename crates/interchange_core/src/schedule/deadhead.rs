use interchange_model::GtfsTime;
use tracing::debug;

use crate::filter::FeedFilter;
use crate::geo::haversine_meters;

use super::model::{RowType, Schedule, ScheduleRow};

#[derive(Debug, Clone)]
pub struct InferenceOptions {
    /// Depot used when a row carries none.
    pub default_depot: Option<String>,
    /// Straight-line speed assumed for estimated movements.
    pub reference_speed_kmh: f64,
    /// Slack required on top of the estimated travel time before an
    /// interlining deadhead is inserted.
    pub min_layover_seconds: i64,
}

impl Default for InferenceOptions {
    fn default() -> Self {
        Self {
            default_depot: None,
            reference_speed_kmh: 30.0,
            min_layover_seconds: 300,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InferenceReport {
    pub pull_out_count: usize,
    pub pull_in_count: usize,
    pub interlining_count: usize,
    /// Blocks where a needed movement could not be estimated or does not fit
    /// its temporal gap.
    pub incomplete_blocks: Vec<String>,
}

/// Insert the non-revenue movements a block implies but does not list:
/// a pull-out before the first revenue trip, a pull-in after the last, and
/// interlining deadheads between revenue trips that end and start at
/// different places. GTFS stop coordinates override row-embedded ones when a
/// filter is supplied.
pub fn infer_deadheads(
    schedule: &mut Schedule,
    gtfs: Option<&FeedFilter<'_>>,
    options: &InferenceOptions,
) -> InferenceReport {
    let mut report = InferenceReport::default();
    let mut inserted: Vec<ScheduleRow> = Vec::new();

    for (block, indexes) in schedule.blocks() {
        let mut incomplete = false;
        let revenue: Vec<usize> = indexes
            .iter()
            .copied()
            .filter(|&index| schedule.rows[index].row_type == RowType::Revenue)
            .collect();
        if revenue.is_empty() {
            continue;
        }

        let has_pull_out = indexes
            .iter()
            .any(|&index| schedule.rows[index].row_type == RowType::PullOut);
        let has_pull_in = indexes
            .iter()
            .any(|&index| schedule.rows[index].row_type == RowType::PullIn);

        let first = &schedule.rows[revenue[0]];
        let depot = first
            .depot
            .clone()
            .or_else(|| options.default_depot.clone());
        if let Some(depot) = &depot {
            if !has_pull_out && first.start_place.as_deref() != Some(depot.as_str()) {
                match synth_movement(
                    gtfs,
                    options,
                    depot,
                    place_coords(gtfs, depot, None),
                    first.start_place.as_deref(),
                    start_coords(gtfs, first),
                    first.start_time,
                    Anchor::Before,
                ) {
                    Some(mut row) => {
                        row.row_type = RowType::PullOut;
                        fill_from(&mut row, first, &block, depot);
                        inserted.push(row);
                        report.pull_out_count += 1;
                    }
                    None => incomplete = true,
                }
            }

            let last = &schedule.rows[revenue[revenue.len() - 1]];
            if !has_pull_in && last.end_place.as_deref() != Some(depot.as_str()) {
                match synth_movement(
                    gtfs,
                    options,
                    last.end_place.as_deref().unwrap_or_default(),
                    end_coords(gtfs, last),
                    Some(depot.as_str()),
                    place_coords(gtfs, depot, None),
                    last.end_time,
                    Anchor::After,
                ) {
                    Some(mut row) => {
                        row.row_type = RowType::PullIn;
                        fill_from(&mut row, last, &block, depot);
                        inserted.push(row);
                        report.pull_in_count += 1;
                    }
                    None => incomplete = true,
                }
            }
        }

        for pair in revenue.windows(2) {
            let before = &schedule.rows[pair[0]];
            let after = &schedule.rows[pair[1]];
            let (Some(end_place), Some(start_place)) =
                (before.end_place.as_deref(), after.start_place.as_deref())
            else {
                continue;
            };
            if end_place == start_place {
                continue;
            }
            let (Some(end_time), Some(start_time)) = (before.end_time, after.start_time) else {
                incomplete = true;
                continue;
            };
            let from = place_coords(gtfs, end_place, end_coords(gtfs, before));
            let to = place_coords(gtfs, start_place, start_coords(gtfs, after));
            let (Some(from), Some(to)) = (from, to) else {
                incomplete = true;
                continue;
            };
            let travel = travel_seconds(from, to, options.reference_speed_kmh);
            let gap = start_time.total_seconds() as i64 - end_time.total_seconds() as i64;
            if gap >= travel + options.min_layover_seconds {
                let mut row = ScheduleRow {
                    row_type: RowType::Deadhead,
                    start_place: Some(end_place.to_string()),
                    end_place: Some(start_place.to_string()),
                    start_time: Some(end_time),
                    end_time: Some(end_time.plus_seconds(travel as i32)),
                    start_lat: Some(from.0),
                    start_lon: Some(from.1),
                    end_lat: Some(to.0),
                    end_lon: Some(to.1),
                    ..Default::default()
                };
                row.block = before.block.clone();
                row.run_number = before.run_number.clone();
                row.duty_id = before.duty_id.clone();
                row.depot = before.depot.clone();
                inserted.push(row);
                report.interlining_count += 1;
            } else {
                incomplete = true;
            }
        }

        if incomplete {
            report.incomplete_blocks.push(block.clone());
        }
    }

    debug!(
        pull_outs = report.pull_out_count,
        pull_ins = report.pull_in_count,
        interlinings = report.interlining_count,
        incomplete = report.incomplete_blocks.len(),
        "deadhead inference finished"
    );

    if !inserted.is_empty() {
        schedule.rows.extend(inserted);
        resort_by_block(schedule);
    }
    report
}

enum Anchor {
    /// The synthesized row ends when the anchor row starts.
    Before,
    /// The synthesized row starts when the anchor row ends.
    After,
}

#[allow(clippy::too_many_arguments)]
fn synth_movement(
    _gtfs: Option<&FeedFilter<'_>>,
    options: &InferenceOptions,
    from_place: &str,
    from: Option<(f64, f64)>,
    to_place: Option<&str>,
    to: Option<(f64, f64)>,
    anchor_time: Option<GtfsTime>,
    anchor: Anchor,
) -> Option<ScheduleRow> {
    let from = from?;
    let to = to?;
    let to_place = to_place?;
    let anchor_time = anchor_time?;
    let travel = travel_seconds(from, to, options.reference_speed_kmh) as i32;
    let (start_time, end_time) = match anchor {
        Anchor::Before => {
            let start = anchor_time.total_seconds().saturating_sub(travel).max(0);
            (GtfsTime::from_seconds(start), anchor_time)
        }
        Anchor::After => (anchor_time, anchor_time.plus_seconds(travel)),
    };
    Some(ScheduleRow {
        start_place: Some(from_place.to_string()),
        end_place: Some(to_place.to_string()),
        start_time: Some(start_time),
        end_time: Some(end_time),
        start_lat: Some(from.0),
        start_lon: Some(from.1),
        end_lat: Some(to.0),
        end_lon: Some(to.1),
        ..Default::default()
    })
}

fn fill_from(row: &mut ScheduleRow, anchor: &ScheduleRow, block: &str, depot: &str) {
    if !block.is_empty() {
        row.block = Some(block.to_string());
    }
    row.run_number = anchor.run_number.clone();
    row.duty_id = anchor.duty_id.clone();
    row.vehicle_class = anchor.vehicle_class.clone();
    row.vehicle_type = anchor.vehicle_type.clone();
    row.depot = Some(depot.to_string());
}

/// GTFS coordinates win over row-embedded ones.
fn place_coords(
    gtfs: Option<&FeedFilter<'_>>,
    place: &str,
    row_coords: Option<(f64, f64)>,
) -> Option<(f64, f64)> {
    if let Some(filter) = gtfs {
        if let Some(stop) = filter.stop(place) {
            if let (Some(lat), Some(lon)) = (stop.stop_lat, stop.stop_lon) {
                return Some((lat, lon));
            }
        }
    }
    row_coords
}

fn start_coords(gtfs: Option<&FeedFilter<'_>>, row: &ScheduleRow) -> Option<(f64, f64)> {
    let embedded = row.start_lat.zip(row.start_lon);
    match row.start_place.as_deref() {
        Some(place) => place_coords(gtfs, place, embedded),
        None => embedded,
    }
}

fn end_coords(gtfs: Option<&FeedFilter<'_>>, row: &ScheduleRow) -> Option<(f64, f64)> {
    let embedded = row.end_lat.zip(row.end_lon);
    match row.end_place.as_deref() {
        Some(place) => place_coords(gtfs, place, embedded),
        None => embedded,
    }
}

/// Straight-line travel time at the reference speed, rounded up to a whole
/// minute.
fn travel_seconds(from: (f64, f64), to: (f64, f64), speed_kmh: f64) -> i64 {
    let meters = haversine_meters(from.0, from.1, to.0, to.1);
    let seconds = meters * 3.6 / speed_kmh;
    let seconds = seconds.ceil() as i64;
    (seconds + 59) / 60 * 60
}

/// Re-establish block grouping (first-seen order) with rows sorted by start
/// time inside each block.
fn resort_by_block(schedule: &mut Schedule) {
    let order: Vec<usize> = schedule
        .blocks()
        .into_iter()
        .flat_map(|(_, indexes)| indexes)
        .collect();
    let rows = std::mem::take(&mut schedule.rows);
    schedule.rows = order.into_iter().map(|index| rows[index].clone()).collect();
}
