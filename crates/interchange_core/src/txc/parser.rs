use std::path::Path;

use chrono::NaiveDate;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use tracing::debug;

use crate::error::TxcError;
use crate::notice::{Notice, NOTICE_CODE_TXC_PARSE_FAILED};

use super::model::{
    DateRange, JourneyPattern, JourneyPatternSection, Line, Location, OperatingProfile, Operator,
    RouteLink, RouteSection, Service, StopPoint, TimingLink, TxcDocument, TxcRoute, VehicleJourney,
};
use super::parse_duration_seconds;

const SUPPORTED_VERSIONS: &[&str] = &["2.4", "2.5"];

impl TxcDocument {
    /// Load a document from disk. Only the file-level failures are hard
    /// errors; malformed XML soft-fails into an empty document with a
    /// diagnostic in `notices`.
    pub fn load(path: impl AsRef<Path>) -> Result<TxcDocument, TxcError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(TxcError::NotFound {
                path: path.to_path_buf(),
            });
        }
        let bytes = std::fs::read(path).map_err(|source| TxcError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut document = TxcDocument::from_bytes(&bytes);
        document.file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned());
        Ok(document)
    }

    pub fn from_str(text: &str) -> TxcDocument {
        TxcDocument::from_bytes(text.as_bytes())
    }

    pub fn from_bytes(bytes: &[u8]) -> TxcDocument {
        let mut parser = TxcParser::default();
        parser.run(bytes);
        debug!(
            services = parser.document.services.len(),
            vehicle_journeys = parser.document.vehicle_journeys.len(),
            stop_points = parser.document.stop_points.len(),
            "parsed TransXChange document"
        );
        parser.document
    }
}

/// Event-driven parser state. Elements are matched by local name only;
/// TransXChange documents in the wild mix default and prefixed namespaces.
/// Unknown elements fall through every match arm and are skipped.
#[derive(Default)]
struct TxcParser {
    document: TxcDocument,
    path: Vec<String>,
    text: String,

    operator: Option<Operator>,
    stop_point: Option<StopPoint>,
    route: Option<TxcRoute>,
    route_section: Option<RouteSection>,
    route_link: Option<RouteLink>,
    pattern_section: Option<JourneyPatternSection>,
    timing_link: Option<TimingLink>,
    service: Option<Service>,
    line: Option<Line>,
    journey_pattern: Option<JourneyPattern>,
    vehicle_journey: Option<VehicleJourney>,
    profile: Option<OperatingProfile>,

    in_from: bool,
    in_to: bool,
    in_operating_period: bool,
    in_regular_days: bool,
    in_ticket_machine: bool,
    in_other_public_holiday: bool,
    /// Some(true) inside DaysOfOperation, Some(false) inside
    /// DaysOfNonOperation, scoped to BankHolidayOperation.
    bank_mode: Option<bool>,
    /// Same, scoped to SpecialDaysOperation.
    special_mode: Option<bool>,
    date_range: Option<(Option<NaiveDate>, Option<NaiveDate>)>,
    latitude: Option<f64>,
    longitude: Option<f64>,
}

impl TxcParser {
    fn run(&mut self, bytes: &[u8]) {
        let mut reader = Reader::from_reader(bytes);
        reader.config_mut().trim_text(true);
        let mut buffer = Vec::new();

        loop {
            match reader.read_event_into(&mut buffer) {
                Ok(Event::Start(ref element)) => {
                    let name = local_name(element);
                    self.handle_enter(&name, element);
                    self.path.push(name);
                    self.text.clear();
                }
                Ok(Event::Empty(ref element)) => {
                    let name = local_name(element);
                    self.handle_enter(&name, element);
                }
                Ok(Event::Text(ref event)) => {
                    match event.unescape() {
                        Ok(text) => self.text.push_str(&text),
                        Err(_) => self
                            .text
                            .push_str(&String::from_utf8_lossy(event.as_ref())),
                    };
                }
                Ok(Event::End(ref element)) => {
                    let name = String::from_utf8_lossy(element.local_name().as_ref()).into_owned();
                    let text = std::mem::take(&mut self.text);
                    self.handle_exit(&name, text);
                    self.path.pop();
                }
                Ok(Event::Eof) => break,
                Ok(_) => {}
                Err(error) => {
                    self.document.notices.push(
                        Notice::error(NOTICE_CODE_TXC_PARSE_FAILED, error.to_string())
                            .with_context_field("bytePosition", reader.buffer_position()),
                    );
                    break;
                }
            }
            buffer.clear();
        }
    }

    fn parent(&self) -> &str {
        self.path.last().map(String::as_str).unwrap_or("")
    }

    fn in_element(&self, name: &str) -> bool {
        self.path.iter().any(|element| element == name)
    }

    fn handle_enter(&mut self, name: &str, element: &BytesStart<'_>) {
        match name {
            "TransXChange" => {
                let version = attribute(element, "SchemaVersion").unwrap_or_default();
                if !version.is_empty() && !SUPPORTED_VERSIONS.iter().any(|v| version.starts_with(v))
                {
                    self.document.notices.push(
                        Notice::warning(
                            "txc_unsupported_version",
                            "schema version is neither 2.4 nor 2.5",
                        )
                        .with_context_field("schemaVersion", version.clone()),
                    );
                }
                self.document.schema_version = version;
            }
            "Operator" | "LicensedOperator" if self.parent() == "Operators" => {
                self.operator = Some(Operator {
                    id: attribute(element, "id").unwrap_or_default(),
                    ..Default::default()
                });
            }
            "AnnotatedStopPointRef" => self.stop_point = Some(StopPoint::default()),
            "StopPoint" if self.parent() == "StopPoints" => {
                self.stop_point = Some(StopPoint::default())
            }
            "Route" if self.parent() == "Routes" => {
                self.route = Some(TxcRoute {
                    id: attribute(element, "id").unwrap_or_default(),
                    ..Default::default()
                });
            }
            "RouteSection" => {
                self.route_section = Some(RouteSection {
                    id: attribute(element, "id").unwrap_or_default(),
                    ..Default::default()
                });
            }
            "RouteLink" => {
                self.route_link = Some(RouteLink {
                    id: attribute(element, "id").unwrap_or_default(),
                    ..Default::default()
                });
            }
            "JourneyPatternSection" => {
                self.pattern_section = Some(JourneyPatternSection {
                    id: attribute(element, "id").unwrap_or_default(),
                    ..Default::default()
                });
            }
            "JourneyPatternTimingLink" => {
                self.timing_link = Some(TimingLink {
                    id: attribute(element, "id").unwrap_or_default(),
                    ..Default::default()
                });
            }
            "Service" if self.parent() == "Services" => self.service = Some(Service::default()),
            "Line" if self.parent() == "Lines" => {
                self.line = Some(Line {
                    id: attribute(element, "id").unwrap_or_default(),
                    ..Default::default()
                });
            }
            "JourneyPattern" => {
                self.journey_pattern = Some(JourneyPattern {
                    id: attribute(element, "id").unwrap_or_default(),
                    ..Default::default()
                });
            }
            "VehicleJourney" if self.parent() == "VehicleJourneys" => {
                self.vehicle_journey = Some(VehicleJourney::default());
            }
            "OperatingProfile" => self.profile = Some(OperatingProfile::default()),
            "From" => self.in_from = true,
            "To" => self.in_to = true,
            "OperatingPeriod" => self.in_operating_period = true,
            "DaysOfWeek" if self.in_element("RegularDayType") => self.in_regular_days = true,
            "TicketMachine" => self.in_ticket_machine = true,
            "OtherPublicHoliday" => self.in_other_public_holiday = true,
            "DaysOfOperation" => {
                if self.in_element("BankHolidayOperation") {
                    self.bank_mode = Some(true);
                } else if self.in_element("SpecialDaysOperation") {
                    self.special_mode = Some(true);
                }
            }
            "DaysOfNonOperation" => {
                if self.in_element("BankHolidayOperation") {
                    self.bank_mode = Some(false);
                } else if self.in_element("SpecialDaysOperation") {
                    self.special_mode = Some(false);
                }
            }
            "DateRange" => self.date_range = Some((None, None)),
            "Location" => {
                self.latitude = None;
                self.longitude = None;
            }
            "HolidaysOnly" if self.in_element("RegularDayType") => {
                if let Some(profile) = &mut self.profile {
                    profile.holidays_only = true;
                }
            }
            other => {
                if self.in_regular_days {
                    if let Some(profile) = &mut self.profile {
                        apply_day_of_week(profile, other);
                    }
                } else if self.bank_mode.is_some()
                    && self.profile.is_some()
                    && !self.in_other_public_holiday
                {
                    // Symbolic bank-holiday element, e.g. <GoodFriday/>.
                    let operating = self.bank_mode.unwrap_or(true);
                    if let Some(profile) = &mut self.profile {
                        if operating {
                            profile.bank_holiday_operation.push(other.to_string());
                        } else {
                            profile.bank_holiday_non_operation.push(other.to_string());
                        }
                    }
                }
            }
        }
    }

    fn handle_exit(&mut self, name: &str, text: String) {
        match name {
            "NationalOperatorCode" => {
                if let Some(operator) = &mut self.operator {
                    operator.code = text;
                }
            }
            "OperatorCode" => {
                if let Some(operator) = &mut self.operator {
                    if operator.code.is_empty() {
                        operator.code = text;
                    }
                }
            }
            "OperatorShortName" => {
                if let Some(operator) = &mut self.operator {
                    operator.short_name = text;
                }
            }
            "TradingName" => {
                if let Some(operator) = &mut self.operator {
                    operator.trading_name = non_empty(text);
                }
            }
            "LicenceNumber" => {
                if let Some(operator) = &mut self.operator {
                    operator.licence_number = non_empty(text);
                }
            }
            "Operator" | "LicensedOperator" => {
                if let Some(operator) = self.operator.take() {
                    self.document.operators.push(operator);
                }
            }

            "StopPointRef" | "AtcoCode" => self.assign_stop_ref(text),
            "CommonName" => {
                if let Some(stop_point) = &mut self.stop_point {
                    stop_point.common_name = text;
                }
            }
            "Indicator" => {
                if let Some(stop_point) = &mut self.stop_point {
                    stop_point.indicator = non_empty(text);
                }
            }
            "LocalityName" => {
                if let Some(stop_point) = &mut self.stop_point {
                    stop_point.locality = non_empty(text);
                }
            }
            "Latitude" => self.latitude = text.trim().parse().ok(),
            "Longitude" => self.longitude = text.trim().parse().ok(),
            "Location" => {
                if let (Some(latitude), Some(longitude)) = (self.latitude, self.longitude) {
                    let location = Location {
                        latitude,
                        longitude,
                    };
                    if let Some(route_link) = &mut self.route_link {
                        route_link.track.push(location);
                    } else if let Some(stop_point) = &mut self.stop_point {
                        stop_point.location = Some(location);
                    }
                }
                self.latitude = None;
                self.longitude = None;
            }
            "AnnotatedStopPointRef" | "StopPoint" => {
                if let Some(stop_point) = self.stop_point.take() {
                    self.document.stop_points.push(stop_point);
                }
            }

            "Distance" => {
                if let Some(route_link) = &mut self.route_link {
                    route_link.distance_meters = text.trim().parse().ok();
                }
            }
            "RouteLink" => {
                if let (Some(section), Some(link)) =
                    (&mut self.route_section, self.route_link.take())
                {
                    section.links.push(link);
                }
            }
            "RouteSection" => {
                if let Some(section) = self.route_section.take() {
                    self.document.route_sections.push(section);
                }
            }
            "RouteSectionRef" => {
                if let Some(route) = &mut self.route {
                    route.route_section_refs.push(text);
                }
            }
            "Route" => {
                if let Some(route) = self.route.take() {
                    self.document.routes.push(route);
                }
            }

            "RunTime" => {
                if let Some(timing_link) = &mut self.timing_link {
                    timing_link.run_time_seconds = parse_duration_seconds(&text);
                }
            }
            "WaitTime" => {
                if let Some(timing_link) = &mut self.timing_link {
                    let wait = parse_duration_seconds(&text);
                    if self.in_from {
                        timing_link.from_wait_seconds = wait;
                    } else if self.in_to {
                        timing_link.to_wait_seconds = wait;
                    }
                }
            }
            "TimingStatus" => {
                if let Some(timing_link) = &mut self.timing_link {
                    if self.in_from {
                        timing_link.from_timing_status = non_empty(text);
                    } else if self.in_to {
                        timing_link.to_timing_status = non_empty(text);
                    }
                }
            }
            "RouteLinkRef" => {
                if let Some(timing_link) = &mut self.timing_link {
                    timing_link.route_link_ref = non_empty(text);
                }
            }
            "JourneyPatternTimingLink" => {
                if let (Some(section), Some(link)) =
                    (&mut self.pattern_section, self.timing_link.take())
                {
                    section.timing_links.push(link);
                }
            }
            "JourneyPatternSection" => {
                if let Some(section) = self.pattern_section.take() {
                    self.document.journey_pattern_sections.push(section);
                }
            }
            "From" => self.in_from = false,
            "To" => self.in_to = false,

            "ServiceCode" => {
                if let Some(service) = &mut self.service {
                    service.service_code = text;
                }
            }
            "PrivateCode" => self.assign_private_code(text),
            "LineName" => {
                if let Some(line) = &mut self.line {
                    line.name = text;
                }
            }
            "Line" => {
                if let (Some(service), Some(line)) = (&mut self.service, self.line.take()) {
                    service.lines.push(line);
                }
            }
            "Description" if !self.in_other_public_holiday => {
                if let Some(route) = &mut self.route {
                    route.description = non_empty(text);
                } else if let Some(service) = &mut self.service {
                    service.description = non_empty(text);
                }
            }
            "Mode" => {
                if let Some(service) = &mut self.service {
                    service.mode = non_empty(text);
                }
            }
            "RegisteredOperatorRef" => {
                if let Some(service) = &mut self.service {
                    service.registered_operator_ref = non_empty(text);
                }
            }
            "Origin" => {
                if let Some(service) = &mut self.service {
                    service.origin = non_empty(text);
                }
            }
            "Destination" => {
                if let Some(service) = &mut self.service {
                    service.destination = non_empty(text);
                }
            }
            "StartDate" | "EndDate" => self.assign_date(name, &text),
            "OperatingPeriod" => self.in_operating_period = false,
            "DateRange" => {
                if let (Some((Some(start), end)), Some(profile)) =
                    (self.date_range.take(), self.profile.as_mut())
                {
                    let range = DateRange {
                        start,
                        end: end.unwrap_or(start),
                    };
                    match self.special_mode {
                        Some(true) => profile.special_operation.push(range),
                        Some(false) => profile.special_non_operation.push(range),
                        None => {}
                    }
                }
            }
            "Date" => {
                // OtherPublicHoliday carries an explicit date instead of a
                // symbolic name (TXC 2.5).
                if self.in_other_public_holiday {
                    if let (Ok(date), Some(profile)) =
                        (parse_date(&text), self.profile.as_mut())
                    {
                        let range = DateRange { start: date, end: date };
                        match self.bank_mode {
                            Some(true) => profile.special_operation.push(range),
                            Some(false) => profile.special_non_operation.push(range),
                            None => {}
                        }
                    }
                }
            }
            "OtherPublicHoliday" => self.in_other_public_holiday = false,
            "DaysOfOperation" | "DaysOfNonOperation" => {
                if self.in_element("BankHolidayOperation") {
                    self.bank_mode = None;
                } else if self.in_element("SpecialDaysOperation") {
                    self.special_mode = None;
                }
            }
            "DaysOfWeek" => self.in_regular_days = false,
            "WeekNumber" => {
                if let Some(profile) = &mut self.profile {
                    if let Ok(week) = text.trim().parse() {
                        profile.periodic_weeks.push(week);
                    }
                }
            }
            "OperatingProfile" => {
                if let Some(profile) = self.profile.take() {
                    if let Some(vehicle_journey) = &mut self.vehicle_journey {
                        vehicle_journey.operating_profile = Some(profile);
                    } else if let Some(service) = &mut self.service {
                        service.operating_profile = Some(profile);
                    }
                }
            }

            "Direction" => {
                if let Some(journey_pattern) = &mut self.journey_pattern {
                    journey_pattern.direction = non_empty(text);
                }
            }
            "DestinationDisplay" => {
                if let Some(journey_pattern) = &mut self.journey_pattern {
                    journey_pattern.destination_display = non_empty(text);
                }
            }
            "RouteRef" => {
                if let Some(journey_pattern) = &mut self.journey_pattern {
                    journey_pattern.route_ref = non_empty(text);
                }
            }
            "JourneyPatternSectionRefs" => {
                if let Some(journey_pattern) = &mut self.journey_pattern {
                    journey_pattern.section_refs.push(text);
                }
            }
            "JourneyPattern" => {
                if let (Some(service), Some(journey_pattern)) =
                    (&mut self.service, self.journey_pattern.take())
                {
                    service.journey_patterns.push(journey_pattern);
                }
            }
            "Service" => {
                if let Some(service) = self.service.take() {
                    self.document.services.push(service);
                }
            }

            "VehicleJourneyCode" => {
                if let Some(vehicle_journey) = &mut self.vehicle_journey {
                    vehicle_journey.code = text;
                }
            }
            "OperatorRef" => {
                if let Some(vehicle_journey) = &mut self.vehicle_journey {
                    vehicle_journey.operator_ref = non_empty(text);
                }
            }
            "ServiceRef" => {
                if let Some(vehicle_journey) = &mut self.vehicle_journey {
                    vehicle_journey.service_ref = text;
                }
            }
            "LineRef" => {
                if let Some(vehicle_journey) = &mut self.vehicle_journey {
                    vehicle_journey.line_ref = text;
                }
            }
            "JourneyPatternRef" => {
                if let Some(vehicle_journey) = &mut self.vehicle_journey {
                    vehicle_journey.journey_pattern_ref = non_empty(text);
                }
            }
            "DepartureTime" => {
                if let Some(vehicle_journey) = &mut self.vehicle_journey {
                    vehicle_journey.departure_seconds = parse_time_seconds(&text);
                }
            }
            "JourneyCode" => {
                if self.in_ticket_machine {
                    if let Some(vehicle_journey) = &mut self.vehicle_journey {
                        vehicle_journey.ticket_machine_journey_code = non_empty(text);
                    }
                }
            }
            "TicketMachine" => self.in_ticket_machine = false,
            "VehicleJourney" => {
                if let Some(vehicle_journey) = self.vehicle_journey.take() {
                    self.document.vehicle_journeys.push(vehicle_journey);
                }
            }
            _ => {}
        }
    }

    fn assign_stop_ref(&mut self, text: String) {
        if let Some(route_link) = &mut self.route_link {
            if self.in_from {
                route_link.from_stop = text;
            } else if self.in_to {
                route_link.to_stop = text;
            }
        } else if let Some(timing_link) = &mut self.timing_link {
            if self.in_from {
                timing_link.from_stop = text;
            } else if self.in_to {
                timing_link.to_stop = text;
            }
        } else if let Some(stop_point) = &mut self.stop_point {
            stop_point.atco_code = text;
        }
    }

    fn assign_private_code(&mut self, text: String) {
        if let Some(vehicle_journey) = &mut self.vehicle_journey {
            vehicle_journey.private_code = non_empty(text);
        } else if let Some(service) = &mut self.service {
            service.private_code = non_empty(text);
        } else if let Some(route) = &mut self.route {
            route.private_code = non_empty(text);
        }
    }

    fn assign_date(&mut self, name: &str, text: &str) {
        let Ok(date) = parse_date(text) else {
            return;
        };
        if let Some((start, end)) = &mut self.date_range {
            if name == "StartDate" {
                *start = Some(date);
            } else {
                *end = Some(date);
            }
        } else if self.in_operating_period {
            if let Some(service) = &mut self.service {
                if name == "StartDate" {
                    service.operating_period.start = Some(date);
                } else {
                    service.operating_period.end = Some(date);
                }
            }
        }
    }
}

fn local_name(element: &BytesStart<'_>) -> String {
    String::from_utf8_lossy(element.local_name().as_ref()).into_owned()
}

fn attribute(element: &BytesStart<'_>, name: &str) -> Option<String> {
    element
        .try_get_attribute(name)
        .ok()
        .flatten()
        .map(|attr| String::from_utf8_lossy(&attr.value).into_owned())
}

fn non_empty(text: String) -> Option<String> {
    if text.trim().is_empty() {
        None
    } else {
        Some(text)
    }
}

fn parse_date(text: &str) -> Result<NaiveDate, chrono::ParseError> {
    NaiveDate::parse_from_str(text.trim(), "%Y-%m-%d")
}

fn parse_time_seconds(text: &str) -> Option<i32> {
    let parts: Vec<&str> = text.trim().split(':').collect();
    if parts.len() != 2 && parts.len() != 3 {
        return None;
    }
    let hours: i32 = parts[0].parse().ok()?;
    let minutes: i32 = parts[1].parse().ok()?;
    let seconds: i32 = if parts.len() == 3 {
        parts[2].parse().ok()?
    } else {
        0
    };
    if hours < 0 || !(0..=59).contains(&minutes) || !(0..=59).contains(&seconds) {
        return None;
    }
    Some(hours * 3600 + minutes * 60 + seconds)
}

fn apply_day_of_week(profile: &mut OperatingProfile, name: &str) {
    match name {
        "Monday" => profile.weekdays[0] = true,
        "Tuesday" => profile.weekdays[1] = true,
        "Wednesday" => profile.weekdays[2] = true,
        "Thursday" => profile.weekdays[3] = true,
        "Friday" => profile.weekdays[4] = true,
        "Saturday" => profile.weekdays[5] = true,
        "Sunday" => profile.weekdays[6] = true,
        "MondayToFriday" => profile.weekdays[0..5].fill(true),
        "MondayToSaturday" => profile.weekdays[0..6].fill(true),
        "MondayToSunday" => profile.weekdays.fill(true),
        "Weekend" => profile.weekdays[5..7].fill(true),
        _ => {}
    }
}
