mod calendar;
mod shapes;
mod stop_times;

use std::hash::{Hash, Hasher};

use chrono::{Days, NaiveDate};
use rustc_hash::{FxHashMap, FxHashSet, FxHasher};
use tracing::debug;

#[cfg(feature = "parallel")]
use rayon::prelude::*;

use interchange_model::{
    Agency, Calendar, CalendarDate, DirectionId, Route, RouteType, Shape, Stop, StopTime, Trip,
};

pub use crate::bank_holidays::Region;
use crate::cancel::CancelToken;
use crate::csv_reader::CsvTable;
use crate::error::ConvertError;
use crate::feed::GtfsFeed;
use crate::notice::{Notice, NoticeContainer};
use crate::txc::{OperatingProfile, Service, TimingLink, TxcDocument};

#[derive(Debug, Clone)]
pub struct ConvertOptions {
    /// Emit one shape per distinct journey pattern.
    pub include_shapes: bool,
    /// Override the service window start; defaults to the OperatingPeriod.
    pub calendar_start: Option<NaiveDate>,
    /// Override the service window end; defaults to the OperatingPeriod.
    pub calendar_end: Option<NaiveDate>,
    /// Bank-holiday table used to resolve symbolic holiday names.
    pub region: Region,
    /// Agency timezone when the operator carries none.
    pub default_timezone: String,
    /// Agency URL when the operator carries none.
    pub default_agency_url: String,
    pub cancel: Option<CancelToken>,
}

impl Default for ConvertOptions {
    fn default() -> Self {
        Self {
            include_shapes: false,
            calendar_start: None,
            calendar_end: None,
            region: Region::England,
            default_timezone: "Europe/London".to_string(),
            default_agency_url: "http://www.example.com".to_string(),
            cancel: None,
        }
    }
}

impl ConvertOptions {
    fn check_cancelled(&self) -> Result<(), ConvertError> {
        match &self.cancel {
            Some(token) if token.is_cancelled() => Err(ConvertError::Cancelled),
            _ => Ok(()),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConversionStats {
    pub agencies: usize,
    pub stops: usize,
    pub routes: usize,
    pub trips: usize,
    pub stop_times: usize,
    pub calendars: usize,
    pub calendar_exceptions: usize,
    pub shapes_generated: usize,
}

pub struct ConversionOutcome {
    pub feed: GtfsFeed,
    pub stats: ConversionStats,
    pub warnings: NoticeContainer,
}

pub fn convert(
    document: &TxcDocument,
    options: &ConvertOptions,
) -> Result<ConversionOutcome, ConvertError> {
    convert_documents(
        std::slice::from_ref(document),
        options,
        false,
        &crate::progress::NoOpProgressHandler,
    )
}

/// Convert several documents into one merged feed. Trip ids are scoped by a
/// per-document discriminator so journeys from different files cannot
/// collide; agencies, stops, routes, and shapes merge on their natural keys.
pub fn convert_batch(
    documents: &[TxcDocument],
    options: &ConvertOptions,
) -> Result<ConversionOutcome, ConvertError> {
    convert_batch_with_progress(documents, options, &crate::progress::NoOpProgressHandler)
}

pub fn convert_batch_with_progress(
    documents: &[TxcDocument],
    options: &ConvertOptions,
    progress: &dyn crate::progress::ProgressHandler,
) -> Result<ConversionOutcome, ConvertError> {
    progress.set_total_files(documents.len());
    convert_documents(documents, options, documents.len() > 1, progress)
}

struct PendingTrip {
    trip: Trip,
    stop_times: Vec<StopTime>,
    profile: OperatingProfile,
    profile_key: String,
    window: (NaiveDate, NaiveDate),
}

struct MappedDocument {
    agencies: Vec<Agency>,
    stops: Vec<Stop>,
    routes: Vec<Route>,
    shapes: Vec<Shape>,
    trips: Vec<PendingTrip>,
    warnings: NoticeContainer,
}

fn convert_documents(
    documents: &[TxcDocument],
    options: &ConvertOptions,
    scope_trip_ids: bool,
    progress: &dyn crate::progress::ProgressHandler,
) -> Result<ConversionOutcome, ConvertError> {
    let discriminators: Vec<Option<String>> = documents
        .iter()
        .enumerate()
        .map(|(ordinal, document)| {
            scope_trip_ids.then(|| document_discriminator(document, ordinal))
        })
        .collect();

    let map_one = |(ordinal, (document, discriminator)): (
        usize,
        (&TxcDocument, &Option<String>),
    )| {
        let label = document
            .file_name
            .clone()
            .unwrap_or_else(|| format!("document {ordinal}"));
        progress.on_start_file(&label);
        let mapped = map_document(document, options, discriminator.as_deref());
        progress.on_finish_file(&label);
        mapped
    };

    #[cfg(feature = "parallel")]
    let mapped: Vec<MappedDocument> = documents
        .par_iter()
        .zip(discriminators.par_iter())
        .enumerate()
        .map(map_one)
        .collect::<Result<_, ConvertError>>()?;

    #[cfg(not(feature = "parallel"))]
    let mapped: Vec<MappedDocument> = documents
        .iter()
        .zip(discriminators.iter())
        .enumerate()
        .map(map_one)
        .collect::<Result<_, ConvertError>>()?;

    merge_documents(mapped, options)
}

/// Stable per-document trip-id scope: a hash of the file name when there is
/// one (re-ordering named documents keeps ids stable), else the ordinal.
fn document_discriminator(document: &TxcDocument, ordinal: usize) -> String {
    match &document.file_name {
        Some(name) => {
            let mut hasher = FxHasher::default();
            name.hash(&mut hasher);
            format!("{:08x}", hasher.finish() & 0xffff_ffff)
        }
        None => format!("doc{ordinal}"),
    }
}

fn map_document(
    document: &TxcDocument,
    options: &ConvertOptions,
    discriminator: Option<&str>,
) -> Result<MappedDocument, ConvertError> {
    options.check_cancelled()?;

    let mut mapped = MappedDocument {
        agencies: Vec::new(),
        stops: Vec::new(),
        routes: Vec::new(),
        shapes: Vec::new(),
        trips: Vec::new(),
        warnings: NoticeContainer::new(),
    };

    for operator in &document.operators {
        let agency_id = if operator.code.is_empty() {
            if operator.id.is_empty() {
                return Err(ConvertError::Mapping {
                    source_type: "Operator",
                    target_type: "Agency",
                    field: "code",
                    reason: "operator has neither a code nor an id".to_string(),
                });
            }
            mapped.warnings.push(
                Notice::warning("txc_missing_operator_code", "operator has no code; using id")
                    .with_context_field("operatorId", operator.id.clone()),
            );
            operator.id.clone()
        } else {
            operator.code.clone()
        };
        mapped.agencies.push(Agency {
            agency_id: Some(agency_id),
            agency_name: operator
                .trading_name
                .clone()
                .unwrap_or_else(|| operator.short_name.clone()),
            agency_url: options.default_agency_url.clone(),
            agency_timezone: options.default_timezone.clone(),
            ..Default::default()
        });
    }

    for stop_point in &document.stop_points {
        mapped.stops.push(Stop {
            stop_id: stop_point.atco_code.clone(),
            stop_name: Some(stop_point.common_name.clone()),
            stop_code: stop_point.indicator.clone(),
            stop_lat: stop_point.location.map(|location| location.latitude),
            stop_lon: stop_point.location.map(|location| location.longitude),
            ..Default::default()
        });
    }

    // Operator attr-id to agency_id, for RegisteredOperatorRef resolution.
    let operator_codes: FxHashMap<&str, &str> = document
        .operators
        .iter()
        .zip(&mapped.agencies)
        .filter_map(|(operator, agency)| {
            agency
                .agency_id
                .as_deref()
                .map(|code| (operator.id.as_str(), code))
        })
        .collect();
    let default_agency = mapped
        .agencies
        .first()
        .and_then(|agency| agency.agency_id.clone());

    for service in &document.services {
        let agency_id = service
            .registered_operator_ref
            .as_deref()
            .and_then(|operator_ref| operator_codes.get(operator_ref))
            .map(|code| code.to_string())
            .or_else(|| default_agency.clone());
        for line in &service.lines {
            mapped.routes.push(Route {
                route_id: format!("{}:{}", service.service_code, line.id),
                agency_id: agency_id.clone(),
                route_short_name: Some(line.name.clone()),
                route_long_name: service.description.clone(),
                route_type: mode_to_route_type(service.mode.as_deref()),
                ..Default::default()
            });
        }
    }

    let services_by_code: FxHashMap<&str, &Service> = document
        .services
        .iter()
        .map(|service| (service.service_code.as_str(), service))
        .collect();
    let sections_by_id: FxHashMap<&str, _> = document
        .journey_pattern_sections
        .iter()
        .map(|section| (section.id.as_str(), section))
        .collect();
    let mut shapes_seen: FxHashSet<String> = FxHashSet::default();

    for journey in &document.vehicle_journeys {
        let Some(service) = services_by_code.get(journey.service_ref.as_str()) else {
            mapped.warnings.push(
                Notice::warning("txc_unresolved_ref", "vehicle journey references unknown service")
                    .with_context_field("vehicleJourney", journey.code.clone())
                    .with_context_field("serviceRef", journey.service_ref.clone()),
            );
            continue;
        };

        let pattern = journey
            .journey_pattern_ref
            .as_deref()
            .and_then(|pattern_ref| service.journey_pattern(pattern_ref));
        let Some(pattern) = pattern else {
            skip_journey(&mut mapped.warnings, &journey.code, "journey pattern not found");
            continue;
        };

        let mut links: Vec<&TimingLink> = Vec::new();
        for section_ref in &pattern.section_refs {
            match sections_by_id.get(section_ref.as_str()) {
                Some(section) => links.extend(section.timing_links.iter()),
                None => mapped.warnings.push(
                    Notice::warning(
                        "txc_unresolved_ref",
                        "journey pattern references unknown section",
                    )
                    .with_context_field("journeyPattern", pattern.id.clone())
                    .with_context_field("sectionRef", section_ref.clone()),
                ),
            }
        }
        if links.is_empty() {
            skip_journey(&mut mapped.warnings, &journey.code, "journey pattern has no timing links");
            continue;
        }

        let Some(departure) = journey.departure_seconds else {
            skip_journey(&mut mapped.warnings, &journey.code, "no departure time");
            continue;
        };

        let line = service
            .lines
            .iter()
            .find(|line| line.id == journey.line_ref)
            .or_else(|| service.lines.first());
        let Some(line) = line else {
            skip_journey(&mut mapped.warnings, &journey.code, "service has no lines");
            continue;
        };

        let Some(window) = resolve_window(service, options) else {
            skip_journey(&mut mapped.warnings, &journey.code, "service has no operating period");
            continue;
        };

        let profile = journey
            .operating_profile
            .clone()
            .or_else(|| service.operating_profile.clone())
            .unwrap_or_else(|| {
                mapped.warnings.push(
                    Notice::warning(
                        "txc_missing_operating_profile",
                        "no operating profile; assuming Monday to Friday",
                    )
                    .with_context_field("vehicleJourney", journey.code.clone()),
                );
                OperatingProfile {
                    weekdays: [true, true, true, true, true, false, false],
                    ..Default::default()
                }
            });

        let trip_id = match discriminator {
            Some(scope) => format!("{scope}:{}", journey.code),
            None => journey.code.clone(),
        };

        let shape_id = if options.include_shapes {
            if shapes_seen.insert(pattern.id.clone()) {
                let rows = shapes::shape_for_pattern(&pattern.id, pattern, document);
                mapped.shapes.extend(rows);
            }
            let has_points = mapped
                .shapes
                .iter()
                .any(|shape| shape.shape_id == pattern.id);
            has_points.then(|| pattern.id.clone())
        } else {
            None
        };

        let stop_times =
            stop_times::expand_stop_times(&trip_id, departure, &links, &mut mapped.warnings);

        let profile_key = format!("{}|{}|{}", window.0, window.1, profile.shape_key());
        mapped.trips.push(PendingTrip {
            trip: Trip {
                route_id: format!("{}:{}", service.service_code, line.id),
                service_id: String::new(),
                trip_id,
                trip_headsign: pattern
                    .destination_display
                    .clone()
                    .or_else(|| service.destination.clone()),
                trip_short_name: journey.ticket_machine_journey_code.clone(),
                direction_id: direction_from(pattern.direction.as_deref()),
                shape_id,
                ..Default::default()
            },
            stop_times,
            profile,
            profile_key,
            window,
        });
    }

    debug!(
        trips = mapped.trips.len(),
        warnings = mapped.warnings.len(),
        "pre-mapped TransXChange document"
    );
    Ok(mapped)
}

fn skip_journey(warnings: &mut NoticeContainer, journey_code: &str, reason: &str) {
    warnings.push(
        Notice::warning("txc_vj_skipped", reason.to_string())
            .with_context_field("vehicleJourney", journey_code.to_string()),
    );
}

/// Service window: per-field option overrides, then the OperatingPeriod. An
/// open-ended period is capped one year past its start.
fn resolve_window(
    service: &Service,
    options: &ConvertOptions,
) -> Option<(NaiveDate, NaiveDate)> {
    let start = options.calendar_start.or(service.operating_period.start)?;
    let end = options
        .calendar_end
        .or(service.operating_period.end)
        .or_else(|| start.checked_add_days(Days::new(364)))?;
    Some((start, end))
}

fn direction_from(direction: Option<&str>) -> Option<DirectionId> {
    match direction {
        Some("inbound") | Some("inboundAndOutbound") => Some(DirectionId::Inbound),
        Some("outbound") | Some("circular") | Some("clockwise") => Some(DirectionId::Outbound),
        _ => None,
    }
}

fn mode_to_route_type(mode: Option<&str>) -> RouteType {
    match mode.unwrap_or("bus") {
        "tram" => RouteType::Tram,
        "underground" | "metro" => RouteType::Subway,
        "rail" => RouteType::Rail,
        "ferry" => RouteType::Ferry,
        "trolleyBus" => RouteType::Trolleybus,
        _ => RouteType::Bus,
    }
}

fn merge_documents(
    mapped: Vec<MappedDocument>,
    options: &ConvertOptions,
) -> Result<ConversionOutcome, ConvertError> {
    let mut warnings = NoticeContainer::new();
    let mut agencies: Vec<Agency> = Vec::new();
    let mut stops: Vec<Stop> = Vec::new();
    let mut routes: Vec<Route> = Vec::new();
    let mut shapes: Vec<Shape> = Vec::new();
    let mut trips: Vec<Trip> = Vec::new();
    let mut stop_times: Vec<StopTime> = Vec::new();
    let mut calendars: Vec<Calendar> = Vec::new();
    let mut calendar_dates: Vec<CalendarDate> = Vec::new();

    let mut agency_keys: FxHashSet<String> = FxHashSet::default();
    let mut stop_keys: FxHashSet<String> = FxHashSet::default();
    let mut route_keys: FxHashSet<String> = FxHashSet::default();
    let mut shape_keys: FxHashSet<String> = FxHashSet::default();
    let mut trip_keys: FxHashSet<String> = FxHashSet::default();
    let mut service_ids: FxHashMap<String, String> = FxHashMap::default();

    for document in mapped {
        options.check_cancelled()?;
        warnings.merge(document.warnings);

        for agency in document.agencies {
            let key = agency.agency_id.clone().unwrap_or_default();
            if agency_keys.insert(key) {
                agencies.push(agency);
            }
        }
        for stop in document.stops {
            if stop_keys.insert(stop.stop_id.clone()) {
                stops.push(stop);
            }
        }
        for route in document.routes {
            if route_keys.insert(route.route_id.clone()) {
                routes.push(route);
            }
        }
        // First document wins for a shared journey-pattern id; every row of
        // a dropped duplicate is skipped.
        let mut dropped_shapes: FxHashSet<String> = FxHashSet::default();
        for shape in document.shapes {
            if shape.shape_pt_sequence == 1 && !shape_keys.insert(shape.shape_id.clone()) {
                dropped_shapes.insert(shape.shape_id.clone());
                continue;
            }
            if !dropped_shapes.contains(&shape.shape_id) {
                shapes.push(shape);
            }
        }

        for pending in document.trips {
            if !trip_keys.insert(pending.trip.trip_id.clone()) {
                warnings.push(
                    Notice::warning("txc_duplicate_trip", "duplicate vehicle journey code dropped")
                        .with_context_field("tripId", pending.trip.trip_id.clone()),
                );
                continue;
            }
            let service_id = match service_ids.get(&pending.profile_key) {
                Some(existing) => existing.clone(),
                None => {
                    let minted = format!("svc_{}", service_ids.len() + 1);
                    service_ids.insert(pending.profile_key.clone(), minted.clone());
                    let (calendar, dates) = calendar::expand_profile(
                        &minted,
                        &pending.profile,
                        pending.window,
                        options.region,
                        &mut warnings,
                    )?;
                    calendars.push(calendar);
                    calendar_dates.extend(dates);
                    minted
                }
            };
            let mut trip = pending.trip;
            trip.service_id = service_id;
            trips.push(trip);
            stop_times.extend(pending.stop_times);
        }
    }

    let stats = ConversionStats {
        agencies: agencies.len(),
        stops: stops.len(),
        routes: routes.len(),
        trips: trips.len(),
        stop_times: stop_times.len(),
        calendars: calendars.len(),
        calendar_exceptions: calendar_dates.len(),
        shapes_generated: shape_keys.len(),
    };

    let feed = GtfsFeed {
        agencies: CsvTable::from_rows(agencies),
        stops: CsvTable::from_rows(stops),
        routes: CsvTable::from_rows(routes),
        trips: CsvTable::from_rows(trips),
        stop_times: CsvTable::from_rows(stop_times),
        calendar: Some(CsvTable::from_rows(calendars)),
        calendar_dates: (!calendar_dates.is_empty())
            .then(|| CsvTable::from_rows(calendar_dates)),
        shapes: (!shapes.is_empty()).then(|| CsvTable::from_rows(shapes)),
    };

    Ok(ConversionOutcome {
        feed,
        stats,
        warnings,
    })
}
