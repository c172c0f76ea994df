use std::collections::HashMap;
use std::io::Read;
use std::path::Path;

use csv::{ReaderBuilder, StringRecord};
use tracing::debug;

use interchange_model::GtfsTime;

use crate::csv_reader::normalize_header;
use crate::error::ScheduleError;
use crate::notice::{Notice, NoticeContainer};

use super::model::{RowType, Schedule, ScheduleRow};

/// Canonical schedule columns and their accepted header synonyms, in claim
/// order. Exact canonical names are claimed first across the whole table, so
/// a bare `type` header resolves to `row_type` unless an explicit
/// `row_type`/`activity_type` column exists, in which case `type` is free to
/// mean `vehicle_type`.
const SYNONYMS: &[(&str, &[&str])] = &[
    ("block", &["block_id", "vehicle_block"]),
    ("run_number", &["run", "run_id", "driver_run"]),
    ("trip_id", &["trip", "journey_id", "journey_ref"]),
    ("start_place", &["origin", "from", "start_stop"]),
    ("end_place", &["destination", "to", "end_stop"]),
    ("start_time", &["depart", "departure"]),
    ("end_time", &["arrive", "arrival"]),
    ("depot", &["garage", "depot_code", "garage_code"]),
    ("row_type", &["activity_type", "type"]),
    ("vehicle_class", &["veh_class", "class"]),
    ("vehicle_type", &["veh_type", "type"]),
    ("start_lat", &["origin_lat", "from_lat"]),
    ("start_lon", &["origin_lon", "from_lon"]),
    ("end_lat", &["destination_lat", "to_lat"]),
    ("end_lon", &["destination_lon", "to_lon"]),
    ("route_shape_id", &["shape_id", "route_shape"]),
    ("duty_id", &["duty"]),
    ("shift_id", &["shift"]),
];

fn map_columns(
    headers: &[String],
    overrides: Option<&HashMap<String, String>>,
) -> HashMap<&'static str, usize> {
    let mut claimed = vec![false; headers.len()];
    let mut mapping: HashMap<&'static str, usize> = HashMap::new();

    let mut claim = |canonical: &'static str,
                     header: &str,
                     claimed: &mut Vec<bool>,
                     mapping: &mut HashMap<&'static str, usize>| {
        if mapping.contains_key(canonical) {
            return;
        }
        if let Some(position) = headers
            .iter()
            .enumerate()
            .position(|(index, name)| !claimed[index] && name.as_str() == header)
        {
            claimed[position] = true;
            mapping.insert(canonical, position);
        }
    };

    // Caller-supplied mappings win outright.
    if let Some(overrides) = overrides {
        for (canonical, _) in SYNONYMS {
            if let Some(header) = overrides.get(*canonical) {
                claim(canonical, &normalize_header(header), &mut claimed, &mut mapping);
            }
        }
    }

    // Exact canonical names next, then synonyms in declaration order.
    for (canonical, _) in SYNONYMS {
        claim(canonical, canonical, &mut claimed, &mut mapping);
    }
    for (canonical, synonyms) in SYNONYMS {
        for synonym in *synonyms {
            claim(canonical, synonym, &mut claimed, &mut mapping);
        }
    }

    mapping
}

fn field<'r>(record: &'r StringRecord, mapping: &HashMap<&str, usize>, name: &str) -> Option<&'r str> {
    mapping
        .get(name)
        .and_then(|&index| record.get(index))
        .map(str::trim)
        .filter(|value| !value.is_empty())
}

/// Schedule times tolerate a missing seconds component ("07:30").
fn parse_time(value: &str) -> Option<GtfsTime> {
    GtfsTime::parse(value)
        .or_else(|_| GtfsTime::parse(&format!("{value}:00")))
        .ok()
}

pub fn load_schedule_csv(
    path: impl AsRef<Path>,
    overrides: Option<&HashMap<String, String>>,
) -> Result<(Schedule, NoticeContainer), ScheduleError> {
    let path = path.as_ref();
    let file = std::fs::File::open(path).map_err(|source| ScheduleError::Io {
        file: path.display().to_string(),
        source,
    })?;
    read_schedule(std::io::BufReader::new(file), overrides)
}

pub fn read_schedule<R: Read>(
    reader: R,
    overrides: Option<&HashMap<String, String>>,
) -> Result<(Schedule, NoticeContainer), ScheduleError> {
    let mut notices = NoticeContainer::new();
    let mut csv_reader = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(reader);

    let mut header_record = StringRecord::new();
    let has_headers = csv_reader
        .read_record(&mut header_record)
        .map_err(|source| ScheduleError::Io {
            file: "<schedule>".to_string(),
            source: std::io::Error::new(std::io::ErrorKind::InvalidData, source),
        })?;
    if !has_headers {
        return Ok((Schedule::default(), notices));
    }

    let headers: Vec<String> = header_record
        .iter()
        .map(|name| normalize_header(name.trim_start_matches('\u{feff}')))
        .collect();
    let mapping = map_columns(&headers, overrides);
    for required in ["start_time", "end_time"] {
        if !mapping.contains_key(required) {
            return Err(ScheduleError::MissingColumn {
                column: if required == "start_time" {
                    "start_time"
                } else {
                    "end_time"
                },
            });
        }
    }

    let mut rows = Vec::new();
    let mut record = StringRecord::new();
    let mut line: u64 = 1;
    loop {
        let more = csv_reader
            .read_record(&mut record)
            .map_err(|source| ScheduleError::Io {
                file: "<schedule>".to_string(),
                source: std::io::Error::new(std::io::ErrorKind::InvalidData, source),
            })?;
        if !more {
            break;
        }
        line = record.position().map(|pos| pos.line()).unwrap_or(line + 1);
        if record.len() != headers.len() {
            notices.push(
                Notice::warning(
                    "schedule_row_field_count_mismatch",
                    format!("expected {} fields, found {}", headers.len(), record.len()),
                )
                .with_location("<schedule>", line),
            );
            continue;
        }

        let row_type = match field(&record, &mapping, "row_type") {
            Some(raw) => match RowType::parse(raw) {
                Some(parsed) => parsed,
                None => {
                    notices.push(
                        Notice::warning(
                            "schedule_unknown_row_type",
                            "unknown row type; treating as revenue",
                        )
                        .with_location("<schedule>", line)
                        .with_context_field("value", raw),
                    );
                    RowType::Revenue
                }
            },
            None => RowType::Revenue,
        };

        let parse_coord = |name: &str| -> Option<f64> {
            field(&record, &mapping, name).and_then(|value| value.parse().ok())
        };
        let time = |name: &str, notices: &mut NoticeContainer| -> Option<GtfsTime> {
            let raw = field(&record, &mapping, name)?;
            match parse_time(raw) {
                Some(parsed) => Some(parsed),
                None => {
                    notices.push(
                        Notice::warning("schedule_invalid_time", "time failed to parse")
                            .with_location("<schedule>", line)
                            .with_field(name.to_string())
                            .with_context_field("value", raw),
                    );
                    None
                }
            }
        };

        let owned = |name: &str| field(&record, &mapping, name).map(str::to_string);
        let start_time = time("start_time", &mut notices);
        let end_time = time("end_time", &mut notices);
        rows.push(ScheduleRow {
            run_number: owned("run_number"),
            block: owned("block"),
            trip_id: owned("trip_id"),
            start_place: owned("start_place"),
            end_place: owned("end_place"),
            start_time,
            end_time,
            depot: owned("depot"),
            vehicle_class: owned("vehicle_class"),
            vehicle_type: owned("vehicle_type"),
            start_lat: parse_coord("start_lat"),
            start_lon: parse_coord("start_lon"),
            end_lat: parse_coord("end_lat"),
            end_lon: parse_coord("end_lon"),
            route_shape_id: owned("route_shape_id"),
            duty_id: owned("duty_id"),
            shift_id: owned("shift_id"),
            row_type,
        });
    }

    debug!(rows = rows.len(), notices = notices.len(), "read schedule CSV");
    Ok((Schedule::new(rows), notices))
}
