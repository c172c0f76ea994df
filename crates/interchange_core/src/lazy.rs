use std::io::Write;
use std::sync::{Mutex, OnceLock};

use serde::de::DeserializeOwned;
use tracing::debug;
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipWriter};

use interchange_model::{
    Agency, Calendar, CalendarDate, Route, Shape, Stop, StopTime, Trip,
};

use crate::csv_reader::{count_rows, read_table, CsvTable};
use crate::error::FeedError;
use crate::feed::{
    check_required_files, GtfsFeed, LoadOptions, AGENCY_COLUMNS, AGENCY_FILE, CALENDAR_COLUMNS,
    CALENDAR_DATES_FILE, CALENDAR_DATE_COLUMNS, CALENDAR_FILE, ROUTES_FILE, ROUTE_COLUMNS,
    SHAPES_FILE, SHAPE_COLUMNS, STOPS_FILE, STOP_COLUMNS, STOP_TIMES_FILE, STOP_TIME_COLUMNS,
    TRIPS_FILE, TRIP_COLUMNS, WRITE_ORDER,
};
use crate::input::GtfsInput;
use crate::notice::NoticeContainer;

/// Single-initialization guard: the first caller builds, concurrent callers
/// block on the per-slot mutex and observe the built value. A failed build is
/// not cached; the next caller retries.
struct LazySlot<T> {
    lock: Mutex<()>,
    cell: OnceLock<T>,
}

impl<T> LazySlot<T> {
    fn new() -> Self {
        Self {
            lock: Mutex::new(()),
            cell: OnceLock::new(),
        }
    }

    fn get(&self) -> Option<&T> {
        self.cell.get()
    }

    fn get_or_build<F>(&self, build: F) -> Result<&T, FeedError>
    where
        F: FnOnce() -> Result<T, FeedError>,
    {
        if let Some(value) = self.cell.get() {
            return Ok(value);
        }
        let _guard = self.lock.lock().unwrap();
        if let Some(value) = self.cell.get() {
            return Ok(value);
        }
        let built = build()?;
        Ok(self.cell.get_or_init(move || built))
    }
}

/// A feed handle that parses nothing up front. Each table materializes on
/// first access and stays cached; counts use a streaming scanner that never
/// allocates row records.
pub struct LazyFeed {
    input: GtfsInput,
    options: LoadOptions,
    notices: Mutex<NoticeContainer>,
    agencies: LazySlot<CsvTable<Agency>>,
    stops: LazySlot<CsvTable<Stop>>,
    routes: LazySlot<CsvTable<Route>>,
    trips: LazySlot<CsvTable<Trip>>,
    stop_times: LazySlot<CsvTable<StopTime>>,
    calendar: LazySlot<Option<CsvTable<Calendar>>>,
    calendar_dates: LazySlot<Option<CsvTable<CalendarDate>>>,
    shapes: LazySlot<Option<CsvTable<Shape>>>,
    counts: [LazySlot<u64>; 8],
}

impl LazyFeed {
    pub fn open(input: GtfsInput, options: LoadOptions) -> Result<Self, FeedError> {
        check_required_files(&input)?;
        Ok(Self {
            input,
            options,
            notices: Mutex::new(NoticeContainer::new()),
            agencies: LazySlot::new(),
            stops: LazySlot::new(),
            routes: LazySlot::new(),
            trips: LazySlot::new(),
            stop_times: LazySlot::new(),
            calendar: LazySlot::new(),
            calendar_dates: LazySlot::new(),
            shapes: LazySlot::new(),
            counts: std::array::from_fn(|_| LazySlot::new()),
        })
    }

    pub fn open_directory(path: impl AsRef<std::path::Path>) -> Result<Self, FeedError> {
        Self::open(GtfsInput::from_path(path)?, LoadOptions::default())
    }

    pub fn open_zip(path: impl AsRef<std::path::Path>) -> Result<Self, FeedError> {
        Self::open(GtfsInput::from_path(path)?, LoadOptions::default())
    }

    pub fn open_zip_bytes(bytes: Vec<u8>) -> Result<Self, FeedError> {
        Self::open(GtfsInput::from_zip_bytes(bytes)?, LoadOptions::default())
    }

    fn parse_required<T: DeserializeOwned>(
        &self,
        file: &'static str,
        columns: &[&str],
    ) -> Result<CsvTable<T>, FeedError> {
        let reader = self
            .input
            .open(file)?
            .ok_or_else(|| FeedError::FeedFileMissing {
                missing: vec![file.to_string()],
            })?;
        let mut notices = NoticeContainer::new();
        let table = read_table(
            file,
            reader,
            columns,
            crate::csv_reader::ReadOptions {
                strict: self.options.strict,
                round_trip: self.options.round_trip,
            },
            &mut notices,
        )?;
        debug!(file, rows = table.len(), "materialized lazy table");
        self.notices.lock().unwrap().merge(notices);
        Ok(table)
    }

    fn parse_optional<T: DeserializeOwned>(
        &self,
        file: &'static str,
        columns: &[&str],
    ) -> Result<Option<CsvTable<T>>, FeedError> {
        if !self.input.has_file(file) {
            return Ok(None);
        }
        self.parse_required(file, columns).map(Some)
    }

    pub fn agencies(&self) -> Result<&CsvTable<Agency>, FeedError> {
        self.agencies
            .get_or_build(|| self.parse_required(AGENCY_FILE, AGENCY_COLUMNS))
    }

    pub fn stops(&self) -> Result<&CsvTable<Stop>, FeedError> {
        self.stops
            .get_or_build(|| self.parse_required(STOPS_FILE, STOP_COLUMNS))
    }

    pub fn routes(&self) -> Result<&CsvTable<Route>, FeedError> {
        self.routes
            .get_or_build(|| self.parse_required(ROUTES_FILE, ROUTE_COLUMNS))
    }

    pub fn trips(&self) -> Result<&CsvTable<Trip>, FeedError> {
        self.trips
            .get_or_build(|| self.parse_required(TRIPS_FILE, TRIP_COLUMNS))
    }

    pub fn stop_times(&self) -> Result<&CsvTable<StopTime>, FeedError> {
        self.stop_times
            .get_or_build(|| self.parse_required(STOP_TIMES_FILE, STOP_TIME_COLUMNS))
    }

    pub fn calendar(&self) -> Result<Option<&CsvTable<Calendar>>, FeedError> {
        self.calendar
            .get_or_build(|| self.parse_optional(CALENDAR_FILE, CALENDAR_COLUMNS))
            .map(Option::as_ref)
    }

    pub fn calendar_dates(&self) -> Result<Option<&CsvTable<CalendarDate>>, FeedError> {
        self.calendar_dates
            .get_or_build(|| self.parse_optional(CALENDAR_DATES_FILE, CALENDAR_DATE_COLUMNS))
            .map(Option::as_ref)
    }

    pub fn shapes(&self) -> Result<Option<&CsvTable<Shape>>, FeedError> {
        self.shapes
            .get_or_build(|| self.parse_optional(SHAPES_FILE, SHAPE_COLUMNS))
            .map(Option::as_ref)
    }

    fn materialized_len(&self, file: &str) -> Option<u64> {
        match file {
            AGENCY_FILE => self.agencies.get().map(|t| t.len() as u64),
            STOPS_FILE => self.stops.get().map(|t| t.len() as u64),
            ROUTES_FILE => self.routes.get().map(|t| t.len() as u64),
            TRIPS_FILE => self.trips.get().map(|t| t.len() as u64),
            STOP_TIMES_FILE => self.stop_times.get().map(|t| t.len() as u64),
            CALENDAR_FILE => self
                .calendar
                .get()
                .map(|t| t.as_ref().map(|t| t.len() as u64).unwrap_or(0)),
            CALENDAR_DATES_FILE => self
                .calendar_dates
                .get()
                .map(|t| t.as_ref().map(|t| t.len() as u64).unwrap_or(0)),
            SHAPES_FILE => self
                .shapes
                .get()
                .map(|t| t.as_ref().map(|t| t.len() as u64).unwrap_or(0)),
            _ => None,
        }
    }

    /// Row count for one table. Uses the materialized table when present,
    /// otherwise a streaming scan; either way the answer is cached.
    pub fn count(&self, file: &str) -> Result<u64, FeedError> {
        let Some(slot_index) = WRITE_ORDER.iter().position(|name| name == &file) else {
            return Ok(0);
        };
        if let Some(len) = self.materialized_len(file) {
            return Ok(len);
        }
        let counted = self.counts[slot_index].get_or_build(|| match self.input.open(file)? {
            Some(reader) => count_rows(reader).map_err(|source| FeedError::Parse {
                file: file.to_string(),
                line: 0,
                column: String::new(),
                reason: source.to_string(),
            }),
            None => Ok(0),
        })?;
        Ok(*counted)
    }

    pub fn agency_count(&self) -> Result<u64, FeedError> {
        self.count(AGENCY_FILE)
    }

    pub fn stop_count(&self) -> Result<u64, FeedError> {
        self.count(STOPS_FILE)
    }

    pub fn route_count(&self) -> Result<u64, FeedError> {
        self.count(ROUTES_FILE)
    }

    pub fn trip_count(&self) -> Result<u64, FeedError> {
        self.count(TRIPS_FILE)
    }

    pub fn stop_time_count(&self) -> Result<u64, FeedError> {
        self.count(STOP_TIMES_FILE)
    }

    /// Diagnostics gathered by the tables materialized so far.
    pub fn notices(&self) -> NoticeContainer {
        self.notices.lock().unwrap().clone()
    }

    /// Materialize every table and produce an owned feed.
    pub fn to_feed(&self) -> Result<GtfsFeed, FeedError> {
        Ok(GtfsFeed {
            agencies: self.agencies()?.clone(),
            stops: self.stops()?.clone(),
            routes: self.routes()?.clone(),
            trips: self.trips()?.clone(),
            stop_times: self.stop_times()?.clone(),
            calendar: self.calendar()?.cloned(),
            calendar_dates: self.calendar_dates()?.cloned(),
            shapes: self.shapes()?.cloned(),
        })
    }

    fn partial_feed(&self) -> GtfsFeed {
        GtfsFeed {
            agencies: self.agencies.get().cloned().unwrap_or_default(),
            stops: self.stops.get().cloned().unwrap_or_default(),
            routes: self.routes.get().cloned().unwrap_or_default(),
            trips: self.trips.get().cloned().unwrap_or_default(),
            stop_times: self.stop_times.get().cloned().unwrap_or_default(),
            calendar: self.calendar.get().cloned().flatten(),
            calendar_dates: self.calendar_dates.get().cloned().flatten(),
            shapes: self.shapes.get().cloned().flatten(),
        }
    }

    /// Write the feed back out. Materialized tables are re-serialized;
    /// untouched tables pass through with their original bytes.
    pub fn write_to_zip_bytes(&self) -> Result<Vec<u8>, FeedError> {
        let partial = self.partial_feed();
        let mut writer = ZipWriter::new(std::io::Cursor::new(Vec::new()));
        let options = FileOptions::default()
            .compression_method(CompressionMethod::Deflated)
            .last_modified_time(zip::DateTime::default());

        for file in WRITE_ORDER {
            let bytes = if self.materialized_len(file).is_some() {
                crate::writer::table_bytes(&partial, file)?
            } else {
                self.input.read_file(file)?
            };
            if let Some(bytes) = bytes {
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
}
