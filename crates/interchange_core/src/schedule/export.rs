use std::path::Path;

use crate::error::ScheduleError;

use super::model::{Schedule, ScheduleRow};

/// Named column sets for schedule export.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportPreset {
    Default,
    Minimal,
    Extended,
    Optibus,
    Hastus,
    GtfsBlock,
}

impl ExportPreset {
    pub fn from_name(name: &str) -> Result<Self, ScheduleError> {
        match name.trim().to_ascii_lowercase().as_str() {
            "default" => Ok(ExportPreset::Default),
            "minimal" => Ok(ExportPreset::Minimal),
            "extended" => Ok(ExportPreset::Extended),
            "optibus" => Ok(ExportPreset::Optibus),
            "hastus" => Ok(ExportPreset::Hastus),
            "gtfs_block" => Ok(ExportPreset::GtfsBlock),
            other => Err(ScheduleError::UnknownPreset {
                name: other.to_string(),
            }),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ExportPreset::Default => "default",
            ExportPreset::Minimal => "minimal",
            ExportPreset::Extended => "extended",
            ExportPreset::Optibus => "optibus",
            ExportPreset::Hastus => "hastus",
            ExportPreset::GtfsBlock => "gtfs_block",
        }
    }

    pub fn columns(&self) -> &'static [&'static str] {
        match self {
            ExportPreset::Default => &[
                "block",
                "run_number",
                "trip_id",
                "row_type",
                "start_place",
                "end_place",
                "start_time",
                "end_time",
                "depot",
            ],
            ExportPreset::Minimal => &["block", "trip_id", "start_time", "end_time"],
            ExportPreset::Extended => &[
                "block",
                "run_number",
                "duty_id",
                "shift_id",
                "trip_id",
                "row_type",
                "start_place",
                "end_place",
                "start_time",
                "end_time",
                "start_lat",
                "start_lon",
                "end_lat",
                "end_lon",
                "depot",
                "vehicle_class",
                "vehicle_type",
                "route_shape_id",
            ],
            ExportPreset::Optibus => &[
                "duty_id",
                "block",
                "trip_id",
                "start_place",
                "end_place",
                "start_time",
                "end_time",
                "vehicle_type",
            ],
            ExportPreset::Hastus => &[
                "run_number",
                "block",
                "trip_id",
                "start_time",
                "end_time",
                "start_place",
                "end_place",
                "row_type",
            ],
            ExportPreset::GtfsBlock => &[
                "block",
                "trip_id",
                "start_time",
                "end_time",
                "route_shape_id",
            ],
        }
    }
}

fn row_value(row: &ScheduleRow, column: &str) -> String {
    let opt = |value: &Option<String>| value.clone().unwrap_or_default();
    let time = |value: &Option<interchange_model::GtfsTime>| {
        value.map(|t| t.to_string()).unwrap_or_default()
    };
    let coord = |value: &Option<f64>| value.map(|v| v.to_string()).unwrap_or_default();
    match column {
        "block" => opt(&row.block),
        "run_number" => opt(&row.run_number),
        "trip_id" => opt(&row.trip_id),
        "row_type" => row.row_type.as_str().to_string(),
        "start_place" => opt(&row.start_place),
        "end_place" => opt(&row.end_place),
        "start_time" => time(&row.start_time),
        "end_time" => time(&row.end_time),
        "depot" => opt(&row.depot),
        "vehicle_class" => opt(&row.vehicle_class),
        "vehicle_type" => opt(&row.vehicle_type),
        "start_lat" => coord(&row.start_lat),
        "start_lon" => coord(&row.start_lon),
        "end_lat" => coord(&row.end_lat),
        "end_lon" => coord(&row.end_lon),
        "route_shape_id" => opt(&row.route_shape_id),
        "duty_id" => opt(&row.duty_id),
        "shift_id" => opt(&row.shift_id),
        _ => String::new(),
    }
}

pub fn export_csv_string(
    schedule: &Schedule,
    columns: &[&str],
) -> Result<String, ScheduleError> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer
        .write_record(columns)
        .map_err(|source| csv_io_error(source))?;
    for row in &schedule.rows {
        let record: Vec<String> = columns
            .iter()
            .map(|column| row_value(row, column))
            .collect();
        writer
            .write_record(&record)
            .map_err(|source| csv_io_error(source))?;
    }
    let bytes = writer
        .into_inner()
        .map_err(|source| csv_io_error(source.into_error().into()))?;
    String::from_utf8(bytes).map_err(|source| ScheduleError::Io {
        file: "<export>".to_string(),
        source: std::io::Error::new(std::io::ErrorKind::InvalidData, source),
    })
}

pub fn export_with_preset(
    schedule: &Schedule,
    preset: ExportPreset,
) -> Result<String, ScheduleError> {
    export_csv_string(schedule, preset.columns())
}

pub fn write_schedule_csv(
    schedule: &Schedule,
    path: impl AsRef<Path>,
    columns: &[&str],
) -> Result<(), ScheduleError> {
    let contents = export_csv_string(schedule, columns)?;
    std::fs::write(path.as_ref(), contents).map_err(|source| ScheduleError::Io {
        file: path.as_ref().display().to_string(),
        source,
    })
}

fn csv_io_error(source: csv::Error) -> ScheduleError {
    ScheduleError::Io {
        file: "<export>".to_string(),
        source: std::io::Error::new(std::io::ErrorKind::InvalidData, source),
    }
}
