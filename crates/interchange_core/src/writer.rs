use std::io::{Cursor, Write};
use std::path::Path;

use rustc_hash::FxHashMap;
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipWriter};

use interchange_model::{
    Agency, Calendar, CalendarDate, Route, Shape, Stop, StopTime, Trip,
};

use crate::csv_reader::CsvTable;
use crate::error::FeedError;
use crate::feed::{
    GtfsFeed, AGENCY_FILE, CALENDAR_DATES_FILE, CALENDAR_FILE, ROUTES_FILE, SHAPES_FILE,
    STOPS_FILE, STOP_TIMES_FILE, TRIPS_FILE,
};

struct Column<T> {
    name: &'static str,
    required: bool,
    value: fn(&T) -> String,
}

impl<T> Column<T> {
    fn required(name: &'static str, value: fn(&T) -> String) -> Self {
        Self {
            name,
            required: true,
            value,
        }
    }

    fn optional(name: &'static str, value: fn(&T) -> String) -> Self {
        Self {
            name,
            required: false,
            value,
        }
    }
}

fn opt(value: &Option<String>) -> String {
    value.clone().unwrap_or_default()
}

fn opt_f64(value: &Option<f64>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

fn agency_spec() -> Vec<Column<Agency>> {
    vec![
        Column::optional("agency_id", |a| opt(&a.agency_id)),
        Column::required("agency_name", |a| a.agency_name.clone()),
        Column::required("agency_url", |a| a.agency_url.clone()),
        Column::required("agency_timezone", |a| a.agency_timezone.clone()),
        Column::optional("agency_lang", |a| opt(&a.agency_lang)),
        Column::optional("agency_phone", |a| opt(&a.agency_phone)),
        Column::optional("agency_fare_url", |a| opt(&a.agency_fare_url)),
        Column::optional("agency_email", |a| opt(&a.agency_email)),
    ]
}

fn stop_spec() -> Vec<Column<Stop>> {
    vec![
        Column::required("stop_id", |s| s.stop_id.clone()),
        Column::optional("stop_code", |s| opt(&s.stop_code)),
        Column::optional("stop_name", |s| opt(&s.stop_name)),
        Column::optional("stop_desc", |s| opt(&s.stop_desc)),
        Column::optional("stop_lat", |s| opt_f64(&s.stop_lat)),
        Column::optional("stop_lon", |s| opt_f64(&s.stop_lon)),
        Column::optional("zone_id", |s| opt(&s.zone_id)),
        Column::optional("stop_url", |s| opt(&s.stop_url)),
        Column::optional("location_type", |s| {
            s.location_type.map(|v| v.gtfs_value().to_string()).unwrap_or_default()
        }),
        Column::optional("parent_station", |s| opt(&s.parent_station)),
        Column::optional("stop_timezone", |s| opt(&s.stop_timezone)),
        Column::optional("platform_code", |s| opt(&s.platform_code)),
    ]
}

fn route_spec() -> Vec<Column<Route>> {
    vec![
        Column::required("route_id", |r| r.route_id.clone()),
        Column::optional("agency_id", |r| opt(&r.agency_id)),
        Column::optional("route_short_name", |r| opt(&r.route_short_name)),
        Column::optional("route_long_name", |r| opt(&r.route_long_name)),
        Column::optional("route_desc", |r| opt(&r.route_desc)),
        Column::required("route_type", |r| r.route_type.to_code().to_string()),
        Column::optional("route_url", |r| opt(&r.route_url)),
        Column::optional("route_color", |r| {
            r.route_color.map(|c| c.to_string()).unwrap_or_default()
        }),
        Column::optional("route_text_color", |r| {
            r.route_text_color.map(|c| c.to_string()).unwrap_or_default()
        }),
        Column::optional("route_sort_order", |r| {
            r.route_sort_order.map(|v| v.to_string()).unwrap_or_default()
        }),
    ]
}

fn trip_spec() -> Vec<Column<Trip>> {
    vec![
        Column::required("route_id", |t| t.route_id.clone()),
        Column::required("service_id", |t| t.service_id.clone()),
        Column::required("trip_id", |t| t.trip_id.clone()),
        Column::optional("trip_headsign", |t| opt(&t.trip_headsign)),
        Column::optional("trip_short_name", |t| opt(&t.trip_short_name)),
        Column::optional("direction_id", |t| {
            t.direction_id.map(|v| v.gtfs_value().to_string()).unwrap_or_default()
        }),
        Column::optional("block_id", |t| opt(&t.block_id)),
        Column::optional("shape_id", |t| opt(&t.shape_id)),
    ]
}

fn stop_time_spec() -> Vec<Column<StopTime>> {
    vec![
        Column::required("trip_id", |st| st.trip_id.clone()),
        Column::required("arrival_time", |st| {
            st.arrival_time.map(|t| t.to_string()).unwrap_or_default()
        }),
        Column::required("departure_time", |st| {
            st.departure_time.map(|t| t.to_string()).unwrap_or_default()
        }),
        Column::required("stop_id", |st| st.stop_id.clone()),
        Column::required("stop_sequence", |st| st.stop_sequence.to_string()),
        Column::optional("stop_headsign", |st| opt(&st.stop_headsign)),
        Column::optional("pickup_type", |st| {
            st.pickup_type.map(|v| v.gtfs_value().to_string()).unwrap_or_default()
        }),
        Column::optional("drop_off_type", |st| {
            st.drop_off_type.map(|v| v.gtfs_value().to_string()).unwrap_or_default()
        }),
        Column::optional("shape_dist_traveled", |st| opt_f64(&st.shape_dist_traveled)),
        Column::optional("timepoint", |st| {
            st.timepoint.map(|v| v.gtfs_value().to_string()).unwrap_or_default()
        }),
    ]
}

fn calendar_spec() -> Vec<Column<Calendar>> {
    vec![
        Column::required("service_id", |c| c.service_id.clone()),
        Column::required("monday", |c| c.monday.gtfs_value().to_string()),
        Column::required("tuesday", |c| c.tuesday.gtfs_value().to_string()),
        Column::required("wednesday", |c| c.wednesday.gtfs_value().to_string()),
        Column::required("thursday", |c| c.thursday.gtfs_value().to_string()),
        Column::required("friday", |c| c.friday.gtfs_value().to_string()),
        Column::required("saturday", |c| c.saturday.gtfs_value().to_string()),
        Column::required("sunday", |c| c.sunday.gtfs_value().to_string()),
        Column::required("start_date", |c| c.start_date.to_string()),
        Column::required("end_date", |c| c.end_date.to_string()),
    ]
}

fn calendar_date_spec() -> Vec<Column<CalendarDate>> {
    vec![
        Column::required("service_id", |c| c.service_id.clone()),
        Column::required("date", |c| c.date.to_string()),
        Column::required("exception_type", |c| c.exception_type.gtfs_value().to_string()),
    ]
}

fn shape_spec() -> Vec<Column<Shape>> {
    vec![
        Column::required("shape_id", |s| s.shape_id.clone()),
        Column::required("shape_pt_lat", |s| s.shape_pt_lat.to_string()),
        Column::required("shape_pt_lon", |s| s.shape_pt_lon.to_string()),
        Column::required("shape_pt_sequence", |s| s.shape_pt_sequence.to_string()),
        Column::optional("shape_dist_traveled", |s| opt_f64(&s.shape_dist_traveled)),
    ]
}

/// Stop-times are emitted grouped by trip (first-seen order) then by
/// stop_sequence, so writes are canonical regardless of input interleaving.
fn stop_time_order(table: &CsvTable<StopTime>) -> Vec<usize> {
    let mut group_rank: FxHashMap<&str, usize> = FxHashMap::default();
    for stop_time in &table.rows {
        let next_rank = group_rank.len();
        group_rank.entry(stop_time.trip_id.as_str()).or_insert(next_rank);
    }
    let mut order: Vec<usize> = (0..table.rows.len()).collect();
    order.sort_by_key(|&index| {
        let stop_time = &table.rows[index];
        (
            group_rank[stop_time.trip_id.as_str()],
            stop_time.stop_sequence,
            index,
        )
    });
    order
}

fn render_table<T>(
    spec: &[Column<T>],
    table: &CsvTable<T>,
    order: Option<&[usize]>,
) -> Result<Vec<u8>, csv::Error> {
    // A column is emitted when required, or when any record carries a value.
    let mut active: Vec<&Column<T>> = Vec::with_capacity(spec.len());
    for column in spec {
        if column.required || table.rows.iter().any(|row| !(column.value)(row).is_empty()) {
            active.push(column);
        }
    }

    let mut extra_names: Vec<String> = Vec::new();
    for extras in &table.extras {
        for name in extras.keys() {
            if !extra_names.contains(name) {
                extra_names.push(name.clone());
            }
        }
    }

    let mut writer = csv::Writer::from_writer(Vec::new());
    let mut header: Vec<&str> = active.iter().map(|column| column.name).collect();
    header.extend(extra_names.iter().map(String::as_str));
    writer.write_record(&header)?;

    let indexes: Vec<usize> = match order {
        Some(order) => order.to_vec(),
        None => (0..table.rows.len()).collect(),
    };
    for index in indexes {
        let row = &table.rows[index];
        let mut record: Vec<String> =
            active.iter().map(|column| (column.value)(row)).collect();
        for name in &extra_names {
            let value = table
                .extras
                .get(index)
                .and_then(|extras| extras.get(name))
                .cloned()
                .unwrap_or_default();
            record.push(value);
        }
        writer.write_record(&record)?;
    }

    writer.into_inner().map_err(|e| e.into_error().into())
}

pub(crate) fn table_bytes(feed: &GtfsFeed, file: &str) -> Result<Option<Vec<u8>>, FeedError> {
    let bytes = match file {
        AGENCY_FILE => Some(render_table(&agency_spec(), &feed.agencies, None)),
        STOPS_FILE => Some(render_table(&stop_spec(), &feed.stops, None)),
        ROUTES_FILE => Some(render_table(&route_spec(), &feed.routes, None)),
        TRIPS_FILE => Some(render_table(&trip_spec(), &feed.trips, None)),
        STOP_TIMES_FILE => {
            let order = stop_time_order(&feed.stop_times);
            Some(render_table(
                &stop_time_spec(),
                &feed.stop_times,
                Some(&order[..]),
            ))
        }
        CALENDAR_FILE => feed
            .calendar
            .as_ref()
            .map(|table| render_table(&calendar_spec(), table, None)),
        CALENDAR_DATES_FILE => feed
            .calendar_dates
            .as_ref()
            .map(|table| render_table(&calendar_date_spec(), table, None)),
        SHAPES_FILE => feed
            .shapes
            .as_ref()
            .map(|table| render_table(&shape_spec(), table, None)),
        _ => None,
    };
    match bytes {
        Some(Ok(bytes)) => Ok(Some(bytes)),
        Some(Err(source)) => Err(FeedError::Parse {
            file: file.to_string(),
            line: 0,
            column: String::new(),
            reason: source.to_string(),
        }),
        None => Ok(None),
    }
}

pub fn write_to_directory(feed: &GtfsFeed, path: impl AsRef<Path>) -> Result<(), FeedError> {
    let path = path.as_ref();
    std::fs::create_dir_all(path).map_err(|source| FeedError::Io {
        file: path.display().to_string(),
        source,
    })?;
    for file in crate::feed::WRITE_ORDER {
        if let Some(bytes) = table_bytes(feed, file)? {
            std::fs::write(path.join(file), bytes).map_err(|source| FeedError::Io {
                file: file.to_string(),
                source,
            })?;
        }
    }
    Ok(())
}

/// Deterministic zip: entries in canonical order, deflate, and a fixed
/// modification timestamp so identical feeds produce identical bytes.
pub fn write_to_zip_bytes(feed: &GtfsFeed) -> Result<Vec<u8>, FeedError> {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    let options = FileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .last_modified_time(zip::DateTime::default());

    for file in crate::feed::WRITE_ORDER {
        if let Some(bytes) = table_bytes(feed, file)? {
            writer
                .start_file(*file, options)
                .map_err(|source| FeedError::Zip {
                    file: file.to_string(),
                    source,
                })?;
            writer.write_all(&bytes).map_err(|source| FeedError::Io {
                file: file.to_string(),
                source,
            })?;
        }
    }

    let cursor = writer.finish().map_err(|source| FeedError::Zip {
        file: "<zip>".to_string(),
        source,
    })?;
    Ok(cursor.into_inner())
}

pub fn write_to_zip(feed: &GtfsFeed, path: impl AsRef<Path>) -> Result<(), FeedError> {
    let bytes = write_to_zip_bytes(feed)?;
    std::fs::write(path.as_ref(), bytes).map_err(|source| FeedError::Io {
        file: path.as_ref().display().to_string(),
        source,
    })
}

impl GtfsFeed {
    pub fn write_to_directory(&self, path: impl AsRef<Path>) -> Result<(), FeedError> {
        write_to_directory(self, path)
    }

    pub fn write_to_zip(&self, path: impl AsRef<Path>) -> Result<(), FeedError> {
        write_to_zip(self, path)
    }

    pub fn write_to_zip_bytes(&self) -> Result<Vec<u8>, FeedError> {
        write_to_zip_bytes(self)
    }

    /// Column-major snapshot for external dataframe adapters.
    pub fn columnar(&self) -> Vec<ColumnarTable> {
        columnar_snapshot(self)
    }
}

/// A column-major snapshot of one table, for external dataframe adapters.
#[derive(Debug, Clone)]
pub struct ColumnarTable {
    pub name: String,
    pub columns: Vec<(String, Vec<String>)>,
}

fn columnar_table<T>(name: &str, spec: &[Column<T>], table: &CsvTable<T>) -> ColumnarTable {
    let columns = spec
        .iter()
        .map(|column| {
            (
                column.name.to_string(),
                table.rows.iter().map(|row| (column.value)(row)).collect(),
            )
        })
        .collect();
    ColumnarTable {
        name: name.to_string(),
        columns,
    }
}

pub fn columnar_snapshot(feed: &GtfsFeed) -> Vec<ColumnarTable> {
    let mut tables = vec![
        columnar_table(AGENCY_FILE, &agency_spec(), &feed.agencies),
        columnar_table(STOPS_FILE, &stop_spec(), &feed.stops),
        columnar_table(ROUTES_FILE, &route_spec(), &feed.routes),
        columnar_table(TRIPS_FILE, &trip_spec(), &feed.trips),
        columnar_table(STOP_TIMES_FILE, &stop_time_spec(), &feed.stop_times),
    ];
    if let Some(calendar) = &feed.calendar {
        tables.push(columnar_table(CALENDAR_FILE, &calendar_spec(), calendar));
    }
    if let Some(calendar_dates) = &feed.calendar_dates {
        tables.push(columnar_table(
            CALENDAR_DATES_FILE,
            &calendar_date_spec(),
            calendar_dates,
        ));
    }
    if let Some(shapes) = &feed.shapes {
        tables.push(columnar_table(SHAPES_FILE, &shape_spec(), shapes));
    }
    tables
}
