use std::sync::OnceLock;

use compact_str::CompactString;
use rustc_hash::FxHashMap;

use interchange_model::{
    Agency, Calendar, CalendarDate, ExceptionType, GtfsDate, Route, Shape, Stop, StopTime, Trip,
};

use crate::dates::DateInput;
use crate::error::DateParseError;
use crate::feed::GtfsFeed;

/// Query facade over a borrowed feed. Every index family is built on first
/// touch behind its own `OnceLock`, so concurrent readers either see the
/// built index or block while the first caller builds it; afterwards lookups
/// are amortized O(1).
pub struct FeedFilter<'a> {
    feed: &'a GtfsFeed,
    ids: OnceLock<IdIndex>,
    trip_index: OnceLock<TripIndex>,
    stop_index: OnceLock<StopIndex>,
    service_index: OnceLock<ServiceIndex>,
    shape_index: OnceLock<ShapeIndex>,
}

#[derive(Default)]
struct IdIndex {
    agencies: FxHashMap<CompactString, usize>,
    stops: FxHashMap<CompactString, usize>,
    routes: FxHashMap<CompactString, usize>,
    trips: FxHashMap<CompactString, usize>,
    calendars: FxHashMap<CompactString, usize>,
}

#[derive(Default)]
struct TripIndex {
    trips_by_route: FxHashMap<CompactString, Vec<usize>>,
    trips_by_service: FxHashMap<CompactString, Vec<usize>>,
    routes_by_agency: FxHashMap<CompactString, Vec<usize>>,
    /// Sorted by stop_sequence once, at build time.
    stop_times_by_trip: FxHashMap<CompactString, Vec<usize>>,
}

#[derive(Default)]
struct StopIndex {
    stop_times_by_stop: FxHashMap<CompactString, Vec<usize>>,
}

#[derive(Default)]
struct ServiceIndex {
    exceptions_by_service: FxHashMap<CompactString, Vec<usize>>,
}

#[derive(Default)]
struct ShapeIndex {
    points_by_shape: FxHashMap<CompactString, Vec<usize>>,
}

impl<'a> FeedFilter<'a> {
    pub fn new(feed: &'a GtfsFeed) -> Self {
        Self {
            feed,
            ids: OnceLock::new(),
            trip_index: OnceLock::new(),
            stop_index: OnceLock::new(),
            service_index: OnceLock::new(),
            shape_index: OnceLock::new(),
        }
    }

    pub fn feed(&self) -> &'a GtfsFeed {
        self.feed
    }

    fn ids(&self) -> &IdIndex {
        self.ids.get_or_init(|| {
            let mut index = IdIndex::default();
            for (position, agency) in self.feed.agencies.rows.iter().enumerate() {
                let key = agency.agency_id.as_deref().unwrap_or("");
                index.agencies.entry(key.into()).or_insert(position);
            }
            for (position, stop) in self.feed.stops.rows.iter().enumerate() {
                index
                    .stops
                    .entry(stop.stop_id.as_str().into())
                    .or_insert(position);
            }
            for (position, route) in self.feed.routes.rows.iter().enumerate() {
                index
                    .routes
                    .entry(route.route_id.as_str().into())
                    .or_insert(position);
            }
            for (position, trip) in self.feed.trips.rows.iter().enumerate() {
                index
                    .trips
                    .entry(trip.trip_id.as_str().into())
                    .or_insert(position);
            }
            if let Some(calendar) = &self.feed.calendar {
                for (position, row) in calendar.rows.iter().enumerate() {
                    index
                        .calendars
                        .entry(row.service_id.as_str().into())
                        .or_insert(position);
                }
            }
            index
        })
    }

    fn trip_index(&self) -> &TripIndex {
        self.trip_index.get_or_init(|| {
            let mut index = TripIndex::default();
            for (position, trip) in self.feed.trips.rows.iter().enumerate() {
                index
                    .trips_by_route
                    .entry(trip.route_id.as_str().into())
                    .or_default()
                    .push(position);
                index
                    .trips_by_service
                    .entry(trip.service_id.as_str().into())
                    .or_default()
                    .push(position);
            }
            for (position, route) in self.feed.routes.rows.iter().enumerate() {
                let key = route.agency_id.as_deref().unwrap_or("");
                index
                    .routes_by_agency
                    .entry(key.into())
                    .or_default()
                    .push(position);
            }
            for (position, stop_time) in self.feed.stop_times.rows.iter().enumerate() {
                index
                    .stop_times_by_trip
                    .entry(stop_time.trip_id.as_str().into())
                    .or_default()
                    .push(position);
            }
            for positions in index.stop_times_by_trip.values_mut() {
                positions.sort_by_key(|&position| {
                    self.feed.stop_times.rows[position].stop_sequence
                });
            }
            index
        })
    }

    fn stop_index(&self) -> &StopIndex {
        self.stop_index.get_or_init(|| {
            let mut index = StopIndex::default();
            for (position, stop_time) in self.feed.stop_times.rows.iter().enumerate() {
                index
                    .stop_times_by_stop
                    .entry(stop_time.stop_id.as_str().into())
                    .or_default()
                    .push(position);
            }
            index
        })
    }

    fn service_index(&self) -> &ServiceIndex {
        self.service_index.get_or_init(|| {
            let mut index = ServiceIndex::default();
            if let Some(calendar_dates) = &self.feed.calendar_dates {
                for (position, row) in calendar_dates.rows.iter().enumerate() {
                    index
                        .exceptions_by_service
                        .entry(row.service_id.as_str().into())
                        .or_default()
                        .push(position);
                }
            }
            index
        })
    }

    fn shape_index(&self) -> &ShapeIndex {
        self.shape_index.get_or_init(|| {
            let mut index = ShapeIndex::default();
            if let Some(shapes) = &self.feed.shapes {
                for (position, point) in shapes.rows.iter().enumerate() {
                    index
                        .points_by_shape
                        .entry(point.shape_id.as_str().into())
                        .or_default()
                        .push(position);
                }
                for positions in index.points_by_shape.values_mut() {
                    positions
                        .sort_by_key(|&position| shapes.rows[position].shape_pt_sequence);
                }
            }
            index
        })
    }

    pub fn agency(&self, agency_id: &str) -> Option<&'a Agency> {
        self.ids()
            .agencies
            .get(agency_id)
            .map(|&position| &self.feed.agencies.rows[position])
    }

    pub fn stop(&self, stop_id: &str) -> Option<&'a Stop> {
        self.ids()
            .stops
            .get(stop_id)
            .map(|&position| &self.feed.stops.rows[position])
    }

    pub fn route(&self, route_id: &str) -> Option<&'a Route> {
        self.ids()
            .routes
            .get(route_id)
            .map(|&position| &self.feed.routes.rows[position])
    }

    pub fn trip(&self, trip_id: &str) -> Option<&'a Trip> {
        self.ids()
            .trips
            .get(trip_id)
            .map(|&position| &self.feed.trips.rows[position])
    }

    pub fn calendar(&self, service_id: &str) -> Option<&'a Calendar> {
        let calendar = self.feed.calendar.as_ref()?;
        self.ids()
            .calendars
            .get(service_id)
            .map(|&position| &calendar.rows[position])
    }

    pub fn trips_for_route(&self, route_id: &str) -> Vec<&'a Trip> {
        self.trip_index()
            .trips_by_route
            .get(route_id)
            .map(|positions| {
                positions
                    .iter()
                    .map(|&position| &self.feed.trips.rows[position])
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn trips_for_service(&self, service_id: &str) -> Vec<&'a Trip> {
        self.trip_index()
            .trips_by_service
            .get(service_id)
            .map(|positions| {
                positions
                    .iter()
                    .map(|&position| &self.feed.trips.rows[position])
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn stop_times_for_trip(&self, trip_id: &str) -> Vec<&'a StopTime> {
        self.trip_index()
            .stop_times_by_trip
            .get(trip_id)
            .map(|positions| {
                positions
                    .iter()
                    .map(|&position| &self.feed.stop_times.rows[position])
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn stops_for_trip(&self, trip_id: &str) -> Vec<&'a Stop> {
        self.stop_times_for_trip(trip_id)
            .into_iter()
            .filter_map(|stop_time| self.stop(&stop_time.stop_id))
            .collect()
    }

    pub fn stop_times_for_route(&self, route_id: &str) -> Vec<&'a StopTime> {
        let mut collected = Vec::new();
        for trip in self.trips_for_route(route_id) {
            collected.extend(self.stop_times_for_trip(&trip.trip_id));
        }
        collected
    }

    /// Stops served by a route, deduplicated in first-seen order.
    pub fn stops_for_route(&self, route_id: &str) -> Vec<&'a Stop> {
        let mut seen: FxHashMap<&str, ()> = FxHashMap::default();
        let mut stops = Vec::new();
        for stop_time in self.stop_times_for_route(route_id) {
            let stop_id = stop_time.stop_id.as_str();
            if seen.insert(stop_id, ()).is_none() {
                if let Some(stop) = self.stop(stop_id) {
                    stops.push(stop);
                }
            }
        }
        stops
    }

    pub fn stop_times_for_stop(&self, stop_id: &str) -> Vec<&'a StopTime> {
        self.stop_index()
            .stop_times_by_stop
            .get(stop_id)
            .map(|positions| {
                positions
                    .iter()
                    .map(|&position| &self.feed.stop_times.rows[position])
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Trips calling at a stop, deduplicated in first-seen order.
    pub fn trips_for_stop(&self, stop_id: &str) -> Vec<&'a Trip> {
        let mut seen: FxHashMap<&str, ()> = FxHashMap::default();
        let mut trips = Vec::new();
        for stop_time in self.stop_times_for_stop(stop_id) {
            let trip_id = stop_time.trip_id.as_str();
            if seen.insert(trip_id, ()).is_none() {
                if let Some(trip) = self.trip(trip_id) {
                    trips.push(trip);
                }
            }
        }
        trips
    }

    pub fn routes_for_stop(&self, stop_id: &str) -> Vec<&'a Route> {
        let mut seen: FxHashMap<&str, ()> = FxHashMap::default();
        let mut routes = Vec::new();
        for trip in self.trips_for_stop(stop_id) {
            let route_id = trip.route_id.as_str();
            if seen.insert(route_id, ()).is_none() {
                if let Some(route) = self.route(route_id) {
                    routes.push(route);
                }
            }
        }
        routes
    }

    pub fn routes_for_agency(&self, agency_id: &str) -> Vec<&'a Route> {
        self.trip_index()
            .routes_by_agency
            .get(agency_id)
            .map(|positions| {
                positions
                    .iter()
                    .map(|&position| &self.feed.routes.rows[position])
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn trips_for_agency(&self, agency_id: &str) -> Vec<&'a Trip> {
        let mut trips = Vec::new();
        for route in self.routes_for_agency(agency_id) {
            trips.extend(self.trips_for_route(&route.route_id));
        }
        trips
    }

    pub fn shape_for_trip(&self, trip_id: &str) -> Option<Vec<&'a Shape>> {
        let trip = self.trip(trip_id)?;
        let shape_id = trip.shape_id.as_deref()?;
        let shapes = self.feed.shapes.as_ref()?;
        let positions = self.shape_index().points_by_shape.get(shape_id)?;
        Some(
            positions
                .iter()
                .map(|&position| &shapes.rows[position])
                .collect(),
        )
    }

    /// Calendars net-active on a date after applying calendar_dates
    /// exceptions. Services defined only by exceptions are represented by a
    /// synthetic all-false calendar pinned to the date.
    pub fn active_services_on(
        &self,
        date: impl Into<DateInput>,
    ) -> Result<Vec<Calendar>, DateParseError> {
        let date = date.into().resolve()?;
        let gtfs_date = GtfsDate::from_naive_date(date);

        let mut state: FxHashMap<&str, bool> = FxHashMap::default();
        if let Some(calendar) = &self.feed.calendar {
            for row in &calendar.rows {
                let active = row.is_active_on(date);
                state.insert(row.service_id.as_str(), active);
            }
        }

        // Exception rows override in file order; the last row wins for a
        // duplicated (service_id, date) pair.
        let mut exception_only: Vec<&str> = Vec::new();
        if let Some(calendar_dates) = &self.feed.calendar_dates {
            for row in &calendar_dates.rows {
                if row.date != gtfs_date {
                    continue;
                }
                let service_id = row.service_id.as_str();
                let active = matches!(row.exception_type, ExceptionType::Added);
                if !state.contains_key(service_id)
                    && !exception_only.contains(&service_id)
                {
                    exception_only.push(service_id);
                }
                state.insert(service_id, active);
            }
        }

        let mut active_calendars = Vec::new();
        if let Some(calendar) = &self.feed.calendar {
            for row in &calendar.rows {
                if state.get(row.service_id.as_str()).copied().unwrap_or(false) {
                    active_calendars.push(row.clone());
                }
            }
        }
        for service_id in exception_only {
            if state.get(service_id).copied().unwrap_or(false) {
                active_calendars.push(Calendar {
                    service_id: service_id.to_string(),
                    start_date: gtfs_date,
                    end_date: gtfs_date,
                    ..Default::default()
                });
            }
        }
        Ok(active_calendars)
    }

    /// Trips whose service is active on the date, in trips-table order.
    pub fn trips_on_date(
        &self,
        date: impl Into<DateInput>,
    ) -> Result<Vec<&'a Trip>, DateParseError> {
        let active = self.active_services_on(date)?;
        let active_ids: FxHashMap<&str, ()> = active
            .iter()
            .map(|calendar| (calendar.service_id.as_str(), ()))
            .collect();
        // Borrow trips from the feed, not the temporary calendars.
        Ok(self
            .feed
            .trips
            .rows
            .iter()
            .filter(|trip| active_ids.contains_key(trip.service_id.as_str()))
            .collect())
    }

    pub fn route_stop_count(&self, route_id: &str) -> usize {
        self.stops_for_route(route_id).len()
    }

    pub fn route_trip_count(&self, route_id: &str) -> usize {
        self.trip_index()
            .trips_by_route
            .get(route_id)
            .map(Vec::len)
            .unwrap_or(0)
    }

    pub fn stop_trip_count(&self, stop_id: &str) -> usize {
        self.trips_for_stop(stop_id).len()
    }

    /// First departure to last arrival, in seconds. `None` when the trip is
    /// unknown or has no timed stops.
    pub fn trip_duration_seconds(&self, trip_id: &str) -> Option<i32> {
        let stop_times = self.stop_times_for_trip(trip_id);
        let first = stop_times
            .iter()
            .find_map(|st| st.departure_time.or(st.arrival_time))?;
        let last = stop_times
            .iter()
            .rev()
            .find_map(|st| st.arrival_time.or(st.departure_time))?;
        Some(last.total_seconds() - first.total_seconds())
    }

    /// The date range over which a service is defined, from its calendar row
    /// or, failing that, the extremes of its exception dates.
    pub fn service_span(&self, service_id: &str) -> Option<(GtfsDate, GtfsDate)> {
        if let Some(calendar) = self.calendar(service_id) {
            return Some((calendar.start_date, calendar.end_date));
        }
        let calendar_dates = self.feed.calendar_dates.as_ref()?;
        let positions = self.service_index().exceptions_by_service.get(service_id)?;
        let dates: Vec<GtfsDate> = positions
            .iter()
            .map(|&position| calendar_dates.rows[position].date)
            .collect();
        let start = *dates.iter().min()?;
        let end = *dates.iter().max()?;
        Some((start, end))
    }

    pub fn exceptions_for_service(&self, service_id: &str) -> Vec<&'a CalendarDate> {
        let Some(calendar_dates) = self.feed.calendar_dates.as_ref() else {
            return Vec::new();
        };
        self.service_index()
            .exceptions_by_service
            .get(service_id)
            .map(|positions| {
                positions
                    .iter()
                    .map(|&position| &calendar_dates.rows[position])
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::csv_reader::CsvTable;
    use interchange_model::{GtfsTime, ServiceAvailability};

    fn feed_with_exceptions() -> GtfsFeed {
        let mut feed = GtfsFeed::default();
        feed.agencies = CsvTable::from_rows(vec![Agency {
            agency_id: Some("A".into()),
            agency_name: "Acme".into(),
            agency_url: "http://a".into(),
            agency_timezone: "UTC".into(),
            ..Default::default()
        }]);
        feed.stops = CsvTable::from_rows(vec![
            Stop {
                stop_id: "s1".into(),
                ..Default::default()
            },
            Stop {
                stop_id: "s2".into(),
                ..Default::default()
            },
        ]);
        feed.routes = CsvTable::from_rows(vec![Route {
            route_id: "r1".into(),
            agency_id: Some("A".into()),
            route_short_name: Some("1".into()),
            ..Default::default()
        }]);
        feed.trips = CsvTable::from_rows(vec![
            Trip {
                route_id: "r1".into(),
                service_id: "svc".into(),
                trip_id: "t1".into(),
                ..Default::default()
            },
            Trip {
                route_id: "r1".into(),
                service_id: "extra".into(),
                trip_id: "t2".into(),
                ..Default::default()
            },
        ]);
        feed.stop_times = CsvTable::from_rows(vec![
            StopTime {
                trip_id: "t1".into(),
                arrival_time: Some(GtfsTime::parse("08:00:00").unwrap()),
                departure_time: Some(GtfsTime::parse("08:00:00").unwrap()),
                stop_id: "s1".into(),
                stop_sequence: 1,
                ..Default::default()
            },
            StopTime {
                trip_id: "t1".into(),
                arrival_time: Some(GtfsTime::parse("08:30:00").unwrap()),
                departure_time: Some(GtfsTime::parse("08:30:00").unwrap()),
                stop_id: "s2".into(),
                stop_sequence: 2,
                ..Default::default()
            },
        ]);
        feed.calendar = Some(CsvTable::from_rows(vec![Calendar {
            service_id: "svc".into(),
            monday: ServiceAvailability::Available,
            tuesday: ServiceAvailability::Available,
            wednesday: ServiceAvailability::Available,
            thursday: ServiceAvailability::Available,
            friday: ServiceAvailability::Available,
            start_date: GtfsDate::parse("20250101").unwrap(),
            end_date: GtfsDate::parse("20251231").unwrap(),
            ..Default::default()
        }]));
        feed.calendar_dates = Some(CsvTable::from_rows(vec![
            CalendarDate {
                service_id: "svc".into(),
                date: GtfsDate::parse("20250704").unwrap(),
                exception_type: ExceptionType::Removed,
            },
            CalendarDate {
                service_id: "extra".into(),
                date: GtfsDate::parse("20250705").unwrap(),
                exception_type: ExceptionType::Added,
            },
        ]));
        feed
    }

    #[test]
    fn by_id_lookups_resolve() {
        let feed = feed_with_exceptions();
        let filter = FeedFilter::new(&feed);
        assert!(filter.stop("s1").is_some());
        assert!(filter.route("r1").is_some());
        assert!(filter.trip("t1").is_some());
        assert!(filter.agency("A").is_some());
        assert!(filter.calendar("svc").is_some());
        assert!(filter.stop("nope").is_none());
    }

    #[test]
    fn relational_joins_follow_references() {
        let feed = feed_with_exceptions();
        let filter = FeedFilter::new(&feed);
        assert_eq!(filter.trips_for_route("r1").len(), 2);
        assert_eq!(filter.stop_times_for_trip("t1").len(), 2);
        assert_eq!(filter.stops_for_trip("t1").len(), 2);
        assert_eq!(filter.routes_for_stop("s1").len(), 1);
        assert_eq!(filter.route_trip_count("r1"), 2);
        assert_eq!(filter.route_stop_count("r1"), 2);
        assert_eq!(filter.stop_trip_count("s2"), 1);
    }

    #[test]
    fn exception_removes_base_active_service() {
        let feed = feed_with_exceptions();
        let filter = FeedFilter::new(&feed);

        // 2025-07-04 is a Friday, base-active, removed by exception.
        let active = filter.active_services_on("2025-07-04").unwrap();
        assert!(active.is_empty());

        let active = filter.active_services_on("2025-07-03").unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].service_id, "svc");
    }

    #[test]
    fn exception_only_service_gets_synthetic_calendar() {
        let feed = feed_with_exceptions();
        let filter = FeedFilter::new(&feed);

        // 2025-07-05 is a Saturday: svc inactive, "extra" added by exception.
        let active = filter.active_services_on("2025-07-05").unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].service_id, "extra");
        assert!(!active[0].runs_on_weekday(chrono::Weekday::Sat));
        assert_eq!(active[0].start_date, GtfsDate::parse("20250705").unwrap());

        let trips = filter.trips_on_date("2025-07-05").unwrap();
        assert_eq!(trips.len(), 1);
        assert_eq!(trips[0].trip_id, "t2");
    }

    #[test]
    fn invalid_date_string_is_raised() {
        let feed = feed_with_exceptions();
        let filter = FeedFilter::new(&feed);
        assert!(filter.active_services_on("07/04/2025").is_err());
    }

    #[test]
    fn trip_duration_spans_first_departure_to_last_arrival() {
        let feed = feed_with_exceptions();
        let filter = FeedFilter::new(&feed);
        assert_eq!(filter.trip_duration_seconds("t1"), Some(1800));
        assert_eq!(filter.trip_duration_seconds("missing"), None);
    }
}
