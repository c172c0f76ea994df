use std::path::Path;

use rustc_hash::{FxHashMap, FxHashSet};
use tracing::debug;
use url::Url;

use interchange_model::{
    Agency, Calendar, CalendarDate, Route, Shape, Stop, StopTime, Trip,
};

use crate::cancel::CancelToken;
use crate::csv_reader::{read_table, CsvTable, ReadOptions};
use crate::error::FeedError;
use crate::input::GtfsInput;
use crate::notice::{Notice, NoticeContainer};

pub const AGENCY_FILE: &str = "agency.txt";
pub const STOPS_FILE: &str = "stops.txt";
pub const ROUTES_FILE: &str = "routes.txt";
pub const TRIPS_FILE: &str = "trips.txt";
pub const STOP_TIMES_FILE: &str = "stop_times.txt";
pub const CALENDAR_FILE: &str = "calendar.txt";
pub const CALENDAR_DATES_FILE: &str = "calendar_dates.txt";
pub const SHAPES_FILE: &str = "shapes.txt";

pub const REQUIRED_FILES: &[&str] = &[
    AGENCY_FILE,
    STOPS_FILE,
    ROUTES_FILE,
    TRIPS_FILE,
    STOP_TIMES_FILE,
];

/// Canonical table order for writing and zip entry layout.
pub const WRITE_ORDER: &[&str] = &[
    AGENCY_FILE,
    STOPS_FILE,
    ROUTES_FILE,
    TRIPS_FILE,
    STOP_TIMES_FILE,
    CALENDAR_FILE,
    CALENDAR_DATES_FILE,
    SHAPES_FILE,
];

pub const AGENCY_COLUMNS: &[&str] = &[
    "agency_id",
    "agency_name",
    "agency_url",
    "agency_timezone",
    "agency_lang",
    "agency_phone",
    "agency_fare_url",
    "agency_email",
];

pub const STOP_COLUMNS: &[&str] = &[
    "stop_id",
    "stop_code",
    "stop_name",
    "stop_desc",
    "stop_lat",
    "stop_lon",
    "zone_id",
    "stop_url",
    "location_type",
    "parent_station",
    "stop_timezone",
    "platform_code",
];

pub const ROUTE_COLUMNS: &[&str] = &[
    "route_id",
    "agency_id",
    "route_short_name",
    "route_long_name",
    "route_desc",
    "route_type",
    "route_url",
    "route_color",
    "route_text_color",
    "route_sort_order",
];

pub const TRIP_COLUMNS: &[&str] = &[
    "route_id",
    "service_id",
    "trip_id",
    "trip_headsign",
    "trip_short_name",
    "direction_id",
    "block_id",
    "shape_id",
];

pub const STOP_TIME_COLUMNS: &[&str] = &[
    "trip_id",
    "arrival_time",
    "departure_time",
    "stop_id",
    "stop_sequence",
    "stop_headsign",
    "pickup_type",
    "drop_off_type",
    "shape_dist_traveled",
    "timepoint",
];

pub const CALENDAR_COLUMNS: &[&str] = &[
    "service_id",
    "monday",
    "tuesday",
    "wednesday",
    "thursday",
    "friday",
    "saturday",
    "sunday",
    "start_date",
    "end_date",
];

pub const CALENDAR_DATE_COLUMNS: &[&str] = &["service_id", "date", "exception_type"];

pub const SHAPE_COLUMNS: &[&str] = &[
    "shape_id",
    "shape_pt_lat",
    "shape_pt_lon",
    "shape_pt_sequence",
    "shape_dist_traveled",
];

#[derive(Debug, Clone, Default)]
pub struct LoadOptions {
    /// Surface the first row-level parse failure instead of skipping the row.
    pub strict: bool,
    /// Retain unknown columns for byte-faithful writes.
    pub round_trip: bool,
    pub cancel: Option<CancelToken>,
}

impl LoadOptions {
    fn read_options(&self) -> ReadOptions {
        ReadOptions {
            strict: self.strict,
            round_trip: self.round_trip,
        }
    }

    fn check_cancelled(&self) -> Result<(), FeedError> {
        match &self.cancel {
            Some(token) if token.is_cancelled() => Err(FeedError::Cancelled),
            _ => Ok(()),
        }
    }
}

/// One GTFS feed: the eight entity collections, exclusively owned.
#[derive(Debug, Clone, Default)]
pub struct GtfsFeed {
    pub agencies: CsvTable<Agency>,
    pub stops: CsvTable<Stop>,
    pub routes: CsvTable<Route>,
    pub trips: CsvTable<Trip>,
    pub stop_times: CsvTable<StopTime>,
    pub calendar: Option<CsvTable<Calendar>>,
    pub calendar_dates: Option<CsvTable<CalendarDate>>,
    pub shapes: Option<CsvTable<Shape>>,
}

impl GtfsFeed {
    pub fn load_from_directory(path: impl AsRef<Path>) -> Result<Self, FeedError> {
        Self::from_input(&GtfsInput::from_path(path)?, &LoadOptions::default())
    }

    pub fn load_from_zip(path: impl AsRef<Path>) -> Result<Self, FeedError> {
        Self::from_input(&GtfsInput::from_path(path)?, &LoadOptions::default())
    }

    pub fn load_from_zip_bytes(bytes: Vec<u8>) -> Result<Self, FeedError> {
        Self::from_input(&GtfsInput::from_zip_bytes(bytes)?, &LoadOptions::default())
    }

    pub fn from_input(input: &GtfsInput, options: &LoadOptions) -> Result<Self, FeedError> {
        let mut notices = NoticeContainer::new();
        Self::from_input_with_notices(input, options, &mut notices)
    }

    pub fn from_input_with_notices(
        input: &GtfsInput,
        options: &LoadOptions,
        notices: &mut NoticeContainer,
    ) -> Result<Self, FeedError> {
        check_required_files(input)?;

        let read_options = options.read_options();
        let mut feed = GtfsFeed::default();

        options.check_cancelled()?;
        feed.agencies = read_required(input, AGENCY_FILE, AGENCY_COLUMNS, read_options, notices)?;
        options.check_cancelled()?;
        feed.stops = read_required(input, STOPS_FILE, STOP_COLUMNS, read_options, notices)?;
        options.check_cancelled()?;
        feed.routes = read_required(input, ROUTES_FILE, ROUTE_COLUMNS, read_options, notices)?;
        options.check_cancelled()?;
        feed.trips = read_required(input, TRIPS_FILE, TRIP_COLUMNS, read_options, notices)?;
        options.check_cancelled()?;
        feed.stop_times = read_required(
            input,
            STOP_TIMES_FILE,
            STOP_TIME_COLUMNS,
            read_options,
            notices,
        )?;

        options.check_cancelled()?;
        feed.calendar = read_optional(input, CALENDAR_FILE, CALENDAR_COLUMNS, read_options, notices)?;
        options.check_cancelled()?;
        feed.calendar_dates = read_optional(
            input,
            CALENDAR_DATES_FILE,
            CALENDAR_DATE_COLUMNS,
            read_options,
            notices,
        )?;
        options.check_cancelled()?;
        feed.shapes = read_optional(input, SHAPES_FILE, SHAPE_COLUMNS, read_options, notices)?;

        debug!(
            agencies = feed.agencies.len(),
            stops = feed.stops.len(),
            routes = feed.routes.len(),
            trips = feed.trips.len(),
            stop_times = feed.stop_times.len(),
            "loaded GTFS feed"
        );
        Ok(feed)
    }

    /// Semantic validation: reference integrity and record invariants.
    /// Returns the warnings on success; errors surface as
    /// `FeedError::Validation`.
    pub fn validate(&self) -> Result<Vec<Notice>, FeedError> {
        let notices = self.check();
        let errors: Vec<Notice> = notices.errors().cloned().collect();
        let warnings: Vec<Notice> = notices.warnings().cloned().collect();
        if errors.is_empty() {
            Ok(warnings)
        } else {
            Err(FeedError::Validation { errors, warnings })
        }
    }

    /// Run all semantic checks, collecting every finding.
    pub fn check(&self) -> NoticeContainer {
        let mut notices = NoticeContainer::new();
        self.check_agencies(&mut notices);
        self.check_stops(&mut notices);
        self.check_routes(&mut notices);
        self.check_trips(&mut notices);
        self.check_stop_times(&mut notices);
        self.check_calendar(&mut notices);
        self.check_shapes(&mut notices);
        notices
    }

    fn check_agencies(&self, notices: &mut NoticeContainer) {
        if self.agencies.len() > 1 {
            for (index, agency) in self.agencies.rows.iter().enumerate() {
                if agency.agency_id.as_deref().unwrap_or("").is_empty() {
                    notices.push(
                        Notice::error(
                            "missing_agency_id",
                            "agency_id is required when the feed has more than one agency",
                        )
                        .with_location(AGENCY_FILE, self.agencies.row_number(index)),
                    );
                }
            }
        }
        for (index, agency) in self.agencies.rows.iter().enumerate() {
            check_url(
                notices,
                AGENCY_FILE,
                "agency_url",
                self.agencies.row_number(index),
                Some(&agency.agency_url),
            );
        }
    }

    fn check_stops(&self, notices: &mut NoticeContainer) {
        let mut seen: FxHashMap<&str, u64> = FxHashMap::default();
        for (index, stop) in self.stops.rows.iter().enumerate() {
            let row = self.stops.row_number(index);
            let id = stop.stop_id.trim();
            if id.is_empty() {
                continue;
            }
            if let Some(previous) = seen.insert(id, row) {
                notices.push(
                    Notice::error("duplicate_key", "duplicate stop_id")
                        .with_location(STOPS_FILE, row)
                        .with_field("stop_id")
                        .with_context_field("entityId", id)
                        .with_context_field("oldCsvRowNumber", previous),
                );
            }
            if let Some(lat) = stop.stop_lat {
                if !(-90.0..=90.0).contains(&lat) {
                    notices.push(
                        Notice::error("coordinate_out_of_range", "stop_lat outside [-90, 90]")
                            .with_location(STOPS_FILE, row)
                            .with_field("stop_lat")
                            .with_context_field("value", lat),
                    );
                }
            }
            if let Some(lon) = stop.stop_lon {
                if !(-180.0..=180.0).contains(&lon) {
                    notices.push(
                        Notice::error("coordinate_out_of_range", "stop_lon outside [-180, 180]")
                            .with_location(STOPS_FILE, row)
                            .with_field("stop_lon")
                            .with_context_field("value", lon),
                    );
                }
            }
            check_url(notices, STOPS_FILE, "stop_url", row, stop.stop_url.as_deref());
        }
    }

    fn check_routes(&self, notices: &mut NoticeContainer) {
        let agency_ids: FxHashSet<&str> = self
            .agencies
            .rows
            .iter()
            .filter_map(|agency| agency.agency_id.as_deref())
            .collect();
        for (index, route) in self.routes.rows.iter().enumerate() {
            let row = self.routes.row_number(index);
            if !route.has_name() {
                notices.push(
                    Notice::error(
                        "route_both_short_and_long_name_missing",
                        "route must carry a short or long name",
                    )
                    .with_location(ROUTES_FILE, row)
                    .with_context_field("routeId", route.route_id.trim()),
                );
            }
            if let Some(agency_id) = route.agency_id.as_deref() {
                if !agency_id.is_empty() && !agency_ids.contains(agency_id) {
                    notices.push(
                        Notice::error("foreign_key_violation", "agency_id not found in agency.txt")
                            .with_location(ROUTES_FILE, row)
                            .with_field("agency_id")
                            .with_context_field("fieldValue", agency_id),
                    );
                }
            }
            check_url(notices, ROUTES_FILE, "route_url", row, route.route_url.as_deref());
        }
    }

    fn check_trips(&self, notices: &mut NoticeContainer) {
        let route_ids: FxHashSet<&str> =
            self.routes.rows.iter().map(|route| route.route_id.trim()).collect();
        let mut service_ids: FxHashSet<&str> = FxHashSet::default();
        if let Some(calendar) = &self.calendar {
            service_ids.extend(calendar.rows.iter().map(|row| row.service_id.trim()));
        }
        if let Some(calendar_dates) = &self.calendar_dates {
            service_ids.extend(calendar_dates.rows.iter().map(|row| row.service_id.trim()));
        }
        let shape_ids: FxHashSet<&str> = self
            .shapes
            .as_ref()
            .map(|shapes| shapes.rows.iter().map(|row| row.shape_id.trim()).collect())
            .unwrap_or_default();

        for (index, trip) in self.trips.rows.iter().enumerate() {
            let row = self.trips.row_number(index);
            if !route_ids.contains(trip.route_id.trim()) {
                notices.push(
                    Notice::error("foreign_key_violation", "route_id not found in routes.txt")
                        .with_location(TRIPS_FILE, row)
                        .with_field("route_id")
                        .with_context_field("fieldValue", trip.route_id.trim()),
                );
            }
            if !service_ids.contains(trip.service_id.trim()) {
                notices.push(
                    Notice::error(
                        "foreign_key_violation",
                        "service_id not found in calendar.txt or calendar_dates.txt",
                    )
                    .with_location(TRIPS_FILE, row)
                    .with_field("service_id")
                    .with_context_field("fieldValue", trip.service_id.trim()),
                );
            }
            if let Some(shape_id) = trip.shape_id.as_deref() {
                if !shape_id.is_empty() && !shape_ids.contains(shape_id) {
                    notices.push(
                        Notice::warning("foreign_key_violation", "shape_id not found in shapes.txt")
                            .with_location(TRIPS_FILE, row)
                            .with_field("shape_id")
                            .with_context_field("fieldValue", shape_id),
                    );
                }
            }
        }
    }

    fn check_stop_times(&self, notices: &mut NoticeContainer) {
        let trip_ids: FxHashSet<&str> =
            self.trips.rows.iter().map(|trip| trip.trip_id.trim()).collect();
        let stop_ids: FxHashSet<&str> =
            self.stops.rows.iter().map(|stop| stop.stop_id.trim()).collect();

        let mut by_trip: FxHashMap<&str, Vec<usize>> = FxHashMap::default();
        for (index, stop_time) in self.stop_times.rows.iter().enumerate() {
            let row = self.stop_times.row_number(index);
            let trip_id = stop_time.trip_id.trim();
            if !trip_ids.contains(trip_id) {
                notices.push(
                    Notice::error("foreign_key_violation", "trip_id not found in trips.txt")
                        .with_location(STOP_TIMES_FILE, row)
                        .with_field("trip_id")
                        .with_context_field("fieldValue", trip_id),
                );
            }
            if !stop_ids.contains(stop_time.stop_id.trim()) {
                notices.push(
                    Notice::error("foreign_key_violation", "stop_id not found in stops.txt")
                        .with_location(STOP_TIMES_FILE, row)
                        .with_field("stop_id")
                        .with_context_field("fieldValue", stop_time.stop_id.trim()),
                );
            }
            by_trip.entry(trip_id).or_default().push(index);
        }

        for (trip_id, mut indexes) in by_trip {
            indexes.sort_by_key(|&index| self.stop_times.rows[index].stop_sequence);
            if indexes.len() < 2 {
                notices.push(
                    Notice::warning("trip_with_single_stop_time", "trip visits fewer than two stops")
                        .with_context_field("tripId", trip_id),
                );
            }
            let mut previous_sequence: Option<u32> = None;
            let mut previous_departure: Option<i32> = None;
            for &index in &indexes {
                let stop_time = &self.stop_times.rows[index];
                let row = self.stop_times.row_number(index);
                if previous_sequence == Some(stop_time.stop_sequence) {
                    notices.push(
                        Notice::error("duplicate_key", "duplicate stop_sequence within trip")
                            .with_location(STOP_TIMES_FILE, row)
                            .with_field("stop_sequence")
                            .with_context_field("tripId", trip_id)
                            .with_context_field("stopSequence", stop_time.stop_sequence),
                    );
                }
                previous_sequence = Some(stop_time.stop_sequence);
                let arrival = stop_time.arrival_time.map(|time| time.total_seconds());
                let departure = stop_time.departure_time.map(|time| time.total_seconds());
                if let (Some(arrival), Some(previous)) = (arrival, previous_departure) {
                    if arrival < previous {
                        notices.push(
                            Notice::error(
                                "stop_time_out_of_order",
                                "arrival precedes previous departure",
                            )
                            .with_location(STOP_TIMES_FILE, row)
                            .with_context_field("tripId", trip_id),
                        );
                    }
                }
                if let (Some(arrival), Some(departure)) = (arrival, departure) {
                    if departure < arrival {
                        notices.push(
                            Notice::error(
                                "stop_time_out_of_order",
                                "departure precedes arrival at the same stop",
                            )
                            .with_location(STOP_TIMES_FILE, row)
                            .with_context_field("tripId", trip_id),
                        );
                    }
                }
                if departure.is_some() {
                    previous_departure = departure;
                } else if arrival.is_some() {
                    previous_departure = arrival;
                }
            }
        }
    }

    fn check_calendar(&self, notices: &mut NoticeContainer) {
        if let Some(calendar) = &self.calendar {
            for (index, row) in calendar.rows.iter().enumerate() {
                if row.start_date > row.end_date {
                    notices.push(
                        Notice::error(
                            "start_and_end_range_out_of_order",
                            "calendar start_date must be <= end_date",
                        )
                        .with_location(CALENDAR_FILE, calendar.row_number(index))
                        .with_context_field("entityId", row.service_id.trim())
                        .with_context_field("startValue", row.start_date.to_string())
                        .with_context_field("endValue", row.end_date.to_string()),
                    );
                }
            }
        }
        if let Some(calendar_dates) = &self.calendar_dates {
            let mut seen: FxHashMap<(&str, String), u64> = FxHashMap::default();
            for (index, row) in calendar_dates.rows.iter().enumerate() {
                let row_number = calendar_dates.row_number(index);
                let service_id = row.service_id.trim();
                if service_id.is_empty() {
                    continue;
                }
                let key = (service_id, row.date.to_string());
                if let Some(previous) = seen.insert(key, row_number) {
                    notices.push(
                        Notice::error("duplicate_key", "duplicate service_id/date in calendar_dates")
                            .with_location(CALENDAR_DATES_FILE, row_number)
                            .with_context_field("entityId", service_id)
                            .with_context_field("oldCsvRowNumber", previous),
                    );
                }
            }
        }
    }

    fn check_shapes(&self, notices: &mut NoticeContainer) {
        let Some(shapes) = &self.shapes else {
            return;
        };
        let mut by_shape: FxHashMap<&str, Vec<usize>> = FxHashMap::default();
        for (index, point) in shapes.rows.iter().enumerate() {
            by_shape.entry(point.shape_id.trim()).or_default().push(index);
        }
        for (shape_id, indexes) in by_shape {
            let mut previous: Option<u32> = None;
            for &index in &indexes {
                let sequence = shapes.rows[index].shape_pt_sequence;
                if let Some(previous) = previous {
                    if sequence <= previous {
                        notices.push(
                            Notice::error(
                                "shape_sequence_not_increasing",
                                "shape_pt_sequence must strictly increase",
                            )
                            .with_location(SHAPES_FILE, shapes.row_number(index))
                            .with_context_field("shapeId", shape_id),
                        );
                    }
                }
                previous = Some(sequence);
            }
        }
    }
}

fn check_url(
    notices: &mut NoticeContainer,
    file: &str,
    field: &str,
    row: u64,
    value: Option<&str>,
) {
    let Some(value) = value else {
        return;
    };
    if value.is_empty() {
        return;
    }
    if Url::parse(value).is_err() {
        notices.push(
            Notice::warning("invalid_url", "value does not parse as a URL")
                .with_location(file, row)
                .with_field(field)
                .with_context_field("fieldValue", value),
        );
    }
}

pub(crate) fn check_required_files(input: &GtfsInput) -> Result<(), FeedError> {
    let mut missing: Vec<String> = REQUIRED_FILES
        .iter()
        .filter(|name| !input.has_file(name))
        .map(|name| name.to_string())
        .collect();
    if !input.has_file(CALENDAR_FILE) && !input.has_file(CALENDAR_DATES_FILE) {
        missing.push(CALENDAR_FILE.to_string());
        missing.push(CALENDAR_DATES_FILE.to_string());
    }
    if missing.is_empty() {
        Ok(())
    } else {
        Err(FeedError::FeedFileMissing { missing })
    }
}

fn read_required<T: serde::de::DeserializeOwned>(
    input: &GtfsInput,
    file: &'static str,
    columns: &[&str],
    options: ReadOptions,
    notices: &mut NoticeContainer,
) -> Result<CsvTable<T>, FeedError> {
    let reader = input.open(file)?.ok_or_else(|| FeedError::FeedFileMissing {
        missing: vec![file.to_string()],
    })?;
    let table = read_table(file, reader, columns, options, notices)?;
    if table.is_empty() {
        notices.push_empty_table(file);
    }
    Ok(table)
}

fn read_optional<T: serde::de::DeserializeOwned>(
    input: &GtfsInput,
    file: &'static str,
    columns: &[&str],
    options: ReadOptions,
    notices: &mut NoticeContainer,
) -> Result<Option<CsvTable<T>>, FeedError> {
    match input.open(file)? {
        Some(reader) => Ok(Some(read_table(file, reader, columns, options, notices)?)),
        None => Ok(None),
    }
}
