use chrono::NaiveDate;

use crate::error::TxcError;
use crate::notice::NoticeContainer;

/// One parsed TransXChange document. All cross-references are textual ids,
/// resolved by the converter. A document that failed to parse is empty with
/// the failure recorded in `notices`; callers on the soft path just see zero
/// counts.
#[derive(Debug, Default)]
pub struct TxcDocument {
    pub schema_version: String,
    pub file_name: Option<String>,
    pub operators: Vec<Operator>,
    pub stop_points: Vec<StopPoint>,
    pub routes: Vec<TxcRoute>,
    pub route_sections: Vec<RouteSection>,
    pub journey_pattern_sections: Vec<JourneyPatternSection>,
    pub services: Vec<Service>,
    pub vehicle_journeys: Vec<VehicleJourney>,
    pub notices: NoticeContainer,
}

impl TxcDocument {
    pub fn is_empty(&self) -> bool {
        self.operators.is_empty()
            && self.stop_points.is_empty()
            && self.services.is_empty()
            && self.vehicle_journeys.is_empty()
    }

    /// Turn the diagnostic bag into a hard error for callers that want the
    /// strict path.
    pub fn require_valid(&self) -> Result<(), TxcError> {
        if self.notices.has_errors() {
            Err(TxcError::Validation {
                schema_version: self.schema_version.clone(),
                errors: self.notices.errors().cloned().collect(),
            })
        } else {
            Ok(())
        }
    }
}

#[derive(Debug, Default, Clone)]
pub struct Operator {
    pub id: String,
    pub code: String,
    pub short_name: String,
    pub trading_name: Option<String>,
    pub licence_number: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Location {
    pub latitude: f64,
    pub longitude: f64,
}

#[derive(Debug, Default, Clone)]
pub struct StopPoint {
    pub atco_code: String,
    pub common_name: String,
    pub indicator: Option<String>,
    pub locality: Option<String>,
    pub location: Option<Location>,
}

#[derive(Debug, Default, Clone)]
pub struct TxcRoute {
    pub id: String,
    pub private_code: Option<String>,
    pub description: Option<String>,
    pub route_section_refs: Vec<String>,
}

#[derive(Debug, Default, Clone)]
pub struct RouteSection {
    pub id: String,
    pub links: Vec<RouteLink>,
}

#[derive(Debug, Default, Clone)]
pub struct RouteLink {
    pub id: String,
    pub from_stop: String,
    pub to_stop: String,
    pub distance_meters: Option<f64>,
    pub track: Vec<Location>,
}

#[derive(Debug, Default, Clone)]
pub struct JourneyPatternSection {
    pub id: String,
    pub timing_links: Vec<TimingLink>,
}

/// One JourneyPatternTimingLink: a from-stop, a to-stop, the run time
/// between them, optional boarding waits, and the NaPTAN timing status of
/// each endpoint ("PTP" marks a guaranteed timing point).
#[derive(Debug, Default, Clone)]
pub struct TimingLink {
    pub id: String,
    pub from_stop: String,
    pub from_wait_seconds: Option<i64>,
    pub from_timing_status: Option<String>,
    pub to_stop: String,
    pub to_wait_seconds: Option<i64>,
    pub to_timing_status: Option<String>,
    pub route_link_ref: Option<String>,
    pub run_time_seconds: Option<i64>,
}

#[derive(Debug, Default, Clone)]
pub struct Line {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct OperatingPeriod {
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
}

#[derive(Debug, Default, Clone)]
pub struct JourneyPattern {
    pub id: String,
    pub direction: Option<String>,
    pub destination_display: Option<String>,
    pub route_ref: Option<String>,
    pub section_refs: Vec<String>,
}

#[derive(Debug, Default, Clone)]
pub struct Service {
    pub service_code: String,
    pub private_code: Option<String>,
    pub lines: Vec<Line>,
    pub description: Option<String>,
    pub mode: Option<String>,
    pub operating_period: OperatingPeriod,
    pub operating_profile: Option<OperatingProfile>,
    pub registered_operator_ref: Option<String>,
    pub origin: Option<String>,
    pub destination: Option<String>,
    pub journey_patterns: Vec<JourneyPattern>,
}

impl Service {
    pub fn journey_pattern(&self, id: &str) -> Option<&JourneyPattern> {
        self.journey_patterns.iter().find(|jp| jp.id == id)
    }
}

#[derive(Debug, Default, Clone)]
pub struct VehicleJourney {
    pub code: String,
    pub private_code: Option<String>,
    pub operator_ref: Option<String>,
    pub service_ref: String,
    pub line_ref: String,
    pub journey_pattern_ref: Option<String>,
    /// Seconds since midnight.
    pub departure_seconds: Option<i32>,
    pub operating_profile: Option<OperatingProfile>,
    pub ticket_machine_journey_code: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

/// Which days a journey runs: regular weekdays, periodic weeks of the month,
/// bank-holiday operation by symbolic name, and explicit special dates.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct OperatingProfile {
    /// Monday..Sunday.
    pub weekdays: [bool; 7],
    pub holidays_only: bool,
    /// 1-based weeks of the month from PeriodicDayType; empty means every
    /// matching weekday.
    pub periodic_weeks: Vec<u8>,
    pub bank_holiday_operation: Vec<String>,
    pub bank_holiday_non_operation: Vec<String>,
    pub special_operation: Vec<DateRange>,
    pub special_non_operation: Vec<DateRange>,
}

impl OperatingProfile {
    pub fn is_default(&self) -> bool {
        self.weekdays == [false; 7]
            && !self.holidays_only
            && self.periodic_weeks.is_empty()
            && self.bank_holiday_operation.is_empty()
            && self.bank_holiday_non_operation.is_empty()
            && self.special_operation.is_empty()
            && self.special_non_operation.is_empty()
    }

    /// Canonical key for collapsing identical profiles to one service_id.
    /// List order in the source is not significant, so lists are sorted.
    pub fn shape_key(&self) -> String {
        let days: String = self
            .weekdays
            .iter()
            .map(|&flag| if flag { '1' } else { '0' })
            .collect();
        let mut bank_on = self.bank_holiday_operation.clone();
        bank_on.sort();
        let mut bank_off = self.bank_holiday_non_operation.clone();
        bank_off.sort();
        let mut special_on = self.special_operation.clone();
        special_on.sort();
        let mut special_off = self.special_non_operation.clone();
        special_off.sort();
        let mut weeks = self.periodic_weeks.clone();
        weeks.sort_unstable();

        format!(
            "d{days}|h{}|w{:?}|+{}|-{}|s+{:?}|s-{:?}",
            self.holidays_only as u8,
            weeks,
            bank_on.join(","),
            bank_off.join(","),
            special_on,
            special_off,
        )
    }
}
