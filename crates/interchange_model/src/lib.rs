use std::fmt;

use chrono::{Datelike, NaiveDate, Weekday};
use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

#[derive(Debug, thiserror::Error)]
pub enum GtfsParseError {
    #[error("invalid date format: {0}")]
    InvalidDateFormat(String),
    #[error("invalid date value: {0}")]
    InvalidDateValue(String),
    #[error("invalid time format: {0}")]
    InvalidTimeFormat(String),
    #[error("invalid time value: {0}")]
    InvalidTimeValue(String),
    #[error("invalid color format: {0}")]
    InvalidColorFormat(String),
}

/// A GTFS service date (YYYYMMDD).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct GtfsDate {
    year: i32,
    month: u8,
    day: u8,
}

impl GtfsDate {
    pub fn new(year: i32, month: u8, day: u8) -> Self {
        Self { year, month, day }
    }

    pub fn parse(value: &str) -> Result<Self, GtfsParseError> {
        let trimmed = value.trim();
        if trimmed.len() != 8 || !trimmed.chars().all(|ch| ch.is_ascii_digit()) {
            return Err(GtfsParseError::InvalidDateFormat(value.to_string()));
        }

        let year: i32 = trimmed[0..4]
            .parse()
            .map_err(|_| GtfsParseError::InvalidDateFormat(value.to_string()))?;
        let month: u8 = trimmed[4..6]
            .parse()
            .map_err(|_| GtfsParseError::InvalidDateFormat(value.to_string()))?;
        let day: u8 = trimmed[6..8]
            .parse()
            .map_err(|_| GtfsParseError::InvalidDateFormat(value.to_string()))?;

        if NaiveDate::from_ymd_opt(year, month as u32, day as u32).is_none() {
            return Err(GtfsParseError::InvalidDateValue(value.to_string()));
        }

        Ok(Self { year, month, day })
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    pub fn month(&self) -> u8 {
        self.month
    }

    pub fn day(&self) -> u8 {
        self.day
    }

    pub fn from_naive_date(date: NaiveDate) -> Self {
        Self {
            year: date.year(),
            month: date.month() as u8,
            day: date.day() as u8,
        }
    }

    pub fn to_naive_date(&self) -> Option<NaiveDate> {
        NaiveDate::from_ymd_opt(self.year, self.month as u32, self.day as u32)
    }
}

impl fmt::Display for GtfsDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}{:02}{:02}", self.year, self.month, self.day)
    }
}

impl Serialize for GtfsDate {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for GtfsDate {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct GtfsDateVisitor;

        impl<'de> Visitor<'de> for GtfsDateVisitor {
            type Value = GtfsDate;

            fn expecting(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
                formatter.write_str("a GTFS date in YYYYMMDD format")
            }

            fn visit_str<E: de::Error>(self, value: &str) -> Result<GtfsDate, E> {
                GtfsDate::parse(value).map_err(E::custom)
            }
        }

        deserializer.deserialize_str(GtfsDateVisitor)
    }
}

/// A GTFS time of day, stored as seconds since midnight. Hours may exceed 24
/// to denote service running past midnight ("25:30:00" is half past one the
/// next morning); the excess survives a parse/format round trip.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct GtfsTime {
    total_seconds: i32,
}

impl GtfsTime {
    pub fn from_seconds(total_seconds: i32) -> Self {
        Self { total_seconds }
    }

    pub fn parse(value: &str) -> Result<Self, GtfsParseError> {
        let trimmed = value.trim();
        let parts: Vec<&str> = trimmed.split(':').collect();
        if parts.len() != 3 {
            return Err(GtfsParseError::InvalidTimeFormat(value.to_string()));
        }

        let hours: i32 = parts[0]
            .parse()
            .map_err(|_| GtfsParseError::InvalidTimeFormat(value.to_string()))?;
        let minutes: i32 = parts[1]
            .parse()
            .map_err(|_| GtfsParseError::InvalidTimeFormat(value.to_string()))?;
        let seconds: i32 = parts[2]
            .parse()
            .map_err(|_| GtfsParseError::InvalidTimeFormat(value.to_string()))?;

        if hours < 0 || !(0..=59).contains(&minutes) || !(0..=59).contains(&seconds) {
            return Err(GtfsParseError::InvalidTimeValue(value.to_string()));
        }

        Ok(Self {
            total_seconds: hours * 3600 + minutes * 60 + seconds,
        })
    }

    pub fn total_seconds(&self) -> i32 {
        self.total_seconds
    }

    pub fn hours(&self) -> i32 {
        self.total_seconds / 3600
    }

    pub fn minutes(&self) -> i32 {
        (self.total_seconds % 3600) / 60
    }

    pub fn seconds(&self) -> i32 {
        self.total_seconds % 60
    }

    pub fn plus_seconds(self, delta: i32) -> Self {
        Self {
            total_seconds: self.total_seconds + delta,
        }
    }
}

impl fmt::Display for GtfsTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:02}:{:02}:{:02}",
            self.hours(),
            self.minutes(),
            self.seconds()
        )
    }
}

impl Serialize for GtfsTime {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for GtfsTime {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct GtfsTimeVisitor;

        impl<'de> Visitor<'de> for GtfsTimeVisitor {
            type Value = GtfsTime;

            fn expecting(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
                formatter.write_str("a GTFS time in HH:MM:SS format")
            }

            fn visit_str<E: de::Error>(self, value: &str) -> Result<GtfsTime, E> {
                GtfsTime::parse(value).map_err(E::custom)
            }
        }

        deserializer.deserialize_str(GtfsTimeVisitor)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct GtfsColor {
    rgb: u32,
}

impl GtfsColor {
    pub fn new(r: u8, g: u8, b: u8) -> Self {
        Self {
            rgb: (r as u32) << 16 | (g as u32) << 8 | (b as u32),
        }
    }

    pub fn parse(value: &str) -> Result<Self, GtfsParseError> {
        let trimmed = value.trim();
        if trimmed.len() != 6 || !trimmed.chars().all(|ch| ch.is_ascii_hexdigit()) {
            return Err(GtfsParseError::InvalidColorFormat(value.to_string()));
        }

        let rgb = u32::from_str_radix(trimmed, 16)
            .map_err(|_| GtfsParseError::InvalidColorFormat(value.to_string()))?;
        Ok(Self { rgb })
    }

    pub fn rgb(&self) -> u32 {
        self.rgb
    }
}

impl fmt::Display for GtfsColor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:06X}", self.rgb)
    }
}

impl Serialize for GtfsColor {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for GtfsColor {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct GtfsColorVisitor;

        impl<'de> Visitor<'de> for GtfsColorVisitor {
            type Value = GtfsColor;

            fn expecting(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
                formatter.write_str("a 6-digit GTFS color hex string")
            }

            fn visit_str<E: de::Error>(self, value: &str) -> Result<GtfsColor, E> {
                GtfsColor::parse(value).map_err(E::custom)
            }
        }

        deserializer.deserialize_str(GtfsColorVisitor)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LocationType {
    #[serde(rename = "0")]
    StopOrPlatform,
    #[serde(rename = "1")]
    Station,
    #[serde(rename = "2")]
    EntranceOrExit,
    #[serde(rename = "3")]
    GenericNode,
    #[serde(rename = "4")]
    BoardingArea,
    #[serde(other)]
    Other,
}

impl LocationType {
    pub fn gtfs_value(&self) -> &'static str {
        match self {
            LocationType::StopOrPlatform => "0",
            LocationType::Station => "1",
            LocationType::EntranceOrExit => "2",
            LocationType::GenericNode => "3",
            LocationType::BoardingArea => "4",
            LocationType::Other => "",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RouteType {
    Tram,
    Subway,
    Rail,
    Bus,
    Ferry,
    CableCar,
    Gondola,
    Funicular,
    Trolleybus,
    Monorail,
    Extended(u16),
    Unknown,
}

impl RouteType {
    pub fn from_i32(value: i32) -> Self {
        match value {
            0 => RouteType::Tram,
            1 => RouteType::Subway,
            2 => RouteType::Rail,
            3 => RouteType::Bus,
            4 => RouteType::Ferry,
            5 => RouteType::CableCar,
            6 => RouteType::Gondola,
            7 => RouteType::Funicular,
            11 => RouteType::Trolleybus,
            12 => RouteType::Monorail,
            100..=1702 => RouteType::Extended(value as u16),
            _ => RouteType::Unknown,
        }
    }

    pub fn to_code(&self) -> i32 {
        match self {
            RouteType::Tram => 0,
            RouteType::Subway => 1,
            RouteType::Rail => 2,
            RouteType::Bus => 3,
            RouteType::Ferry => 4,
            RouteType::CableCar => 5,
            RouteType::Gondola => 6,
            RouteType::Funicular => 7,
            RouteType::Trolleybus => 11,
            RouteType::Monorail => 12,
            RouteType::Extended(code) => *code as i32,
            RouteType::Unknown => -1,
        }
    }
}

impl Serialize for RouteType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_i32(self.to_code())
    }
}

impl<'de> Deserialize<'de> for RouteType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct RouteTypeVisitor;

        impl<'de> Visitor<'de> for RouteTypeVisitor {
            type Value = RouteType;

            fn expecting(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
                formatter.write_str("a GTFS route_type numeric value")
            }

            fn visit_str<E: de::Error>(self, value: &str) -> Result<RouteType, E> {
                let trimmed = value.trim();
                if trimmed.is_empty() {
                    return Err(E::custom("empty route_type"));
                }
                let parsed: i32 = trimmed.parse().map_err(E::custom)?;
                Ok(RouteType::from_i32(parsed))
            }

            fn visit_i64<E: de::Error>(self, value: i64) -> Result<RouteType, E> {
                Ok(RouteType::from_i32(value as i32))
            }

            fn visit_u64<E: de::Error>(self, value: u64) -> Result<RouteType, E> {
                Ok(RouteType::from_i32(value as i32))
            }
        }

        deserializer.deserialize_any(RouteTypeVisitor)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DirectionId {
    #[serde(rename = "0")]
    Outbound,
    #[serde(rename = "1")]
    Inbound,
    #[serde(other)]
    Other,
}

impl DirectionId {
    pub fn gtfs_value(&self) -> &'static str {
        match self {
            DirectionId::Outbound => "0",
            DirectionId::Inbound => "1",
            DirectionId::Other => "",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PickupDropOffType {
    #[serde(rename = "0")]
    Regular,
    #[serde(rename = "1")]
    NotAvailable,
    #[serde(rename = "2")]
    MustPhone,
    #[serde(rename = "3")]
    MustCoordinateWithDriver,
    #[serde(other)]
    Other,
}

impl PickupDropOffType {
    pub fn gtfs_value(&self) -> &'static str {
        match self {
            PickupDropOffType::Regular => "0",
            PickupDropOffType::NotAvailable => "1",
            PickupDropOffType::MustPhone => "2",
            PickupDropOffType::MustCoordinateWithDriver => "3",
            PickupDropOffType::Other => "",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Timepoint {
    #[serde(rename = "0")]
    Approximate,
    #[serde(rename = "1")]
    Exact,
    #[serde(other)]
    Other,
}

impl Timepoint {
    pub fn gtfs_value(&self) -> &'static str {
        match self {
            Timepoint::Approximate => "0",
            Timepoint::Exact => "1",
            Timepoint::Other => "",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum ServiceAvailability {
    #[default]
    #[serde(rename = "0")]
    Unavailable,
    #[serde(rename = "1")]
    Available,
    #[serde(other)]
    Other,
}

impl ServiceAvailability {
    pub fn is_available(&self) -> bool {
        matches!(self, ServiceAvailability::Available)
    }

    pub fn from_bool(available: bool) -> Self {
        if available {
            ServiceAvailability::Available
        } else {
            ServiceAvailability::Unavailable
        }
    }

    pub fn gtfs_value(&self) -> &'static str {
        match self {
            ServiceAvailability::Available => "1",
            _ => "0",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum ExceptionType {
    #[serde(rename = "1")]
    Added,
    #[serde(rename = "2")]
    Removed,
    #[default]
    #[serde(other)]
    Other,
}

impl ExceptionType {
    pub fn gtfs_value(&self) -> &'static str {
        match self {
            ExceptionType::Added => "1",
            ExceptionType::Removed => "2",
            ExceptionType::Other => "",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Agency {
    pub agency_id: Option<String>,
    pub agency_name: String,
    pub agency_url: String,
    pub agency_timezone: String,
    pub agency_lang: Option<String>,
    pub agency_phone: Option<String>,
    pub agency_fare_url: Option<String>,
    pub agency_email: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Stop {
    pub stop_id: String,
    pub stop_code: Option<String>,
    pub stop_name: Option<String>,
    pub stop_desc: Option<String>,
    pub stop_lat: Option<f64>,
    pub stop_lon: Option<f64>,
    pub zone_id: Option<String>,
    pub stop_url: Option<String>,
    pub location_type: Option<LocationType>,
    pub parent_station: Option<String>,
    pub stop_timezone: Option<String>,
    pub platform_code: Option<String>,
}

impl Stop {
    pub fn has_coordinates(&self) -> bool {
        self.stop_lat.is_some() && self.stop_lon.is_some()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Route {
    pub route_id: String,
    pub agency_id: Option<String>,
    pub route_short_name: Option<String>,
    pub route_long_name: Option<String>,
    pub route_desc: Option<String>,
    pub route_type: RouteType,
    pub route_url: Option<String>,
    pub route_color: Option<GtfsColor>,
    pub route_text_color: Option<GtfsColor>,
    pub route_sort_order: Option<u32>,
}

impl Default for Route {
    fn default() -> Self {
        Self {
            route_id: String::new(),
            agency_id: None,
            route_short_name: None,
            route_long_name: None,
            route_desc: None,
            route_type: RouteType::Bus,
            route_url: None,
            route_color: None,
            route_text_color: None,
            route_sort_order: None,
        }
    }
}

impl Route {
    pub fn has_name(&self) -> bool {
        self.route_short_name.as_deref().is_some_and(|n| !n.is_empty())
            || self.route_long_name.as_deref().is_some_and(|n| !n.is_empty())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Trip {
    pub route_id: String,
    pub service_id: String,
    pub trip_id: String,
    pub trip_headsign: Option<String>,
    pub trip_short_name: Option<String>,
    pub direction_id: Option<DirectionId>,
    pub block_id: Option<String>,
    pub shape_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct StopTime {
    pub trip_id: String,
    pub arrival_time: Option<GtfsTime>,
    pub departure_time: Option<GtfsTime>,
    pub stop_id: String,
    pub stop_sequence: u32,
    pub stop_headsign: Option<String>,
    pub pickup_type: Option<PickupDropOffType>,
    pub drop_off_type: Option<PickupDropOffType>,
    pub shape_dist_traveled: Option<f64>,
    pub timepoint: Option<Timepoint>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Calendar {
    pub service_id: String,
    pub monday: ServiceAvailability,
    pub tuesday: ServiceAvailability,
    pub wednesday: ServiceAvailability,
    pub thursday: ServiceAvailability,
    pub friday: ServiceAvailability,
    pub saturday: ServiceAvailability,
    pub sunday: ServiceAvailability,
    pub start_date: GtfsDate,
    pub end_date: GtfsDate,
}

impl Default for Calendar {
    fn default() -> Self {
        Self {
            service_id: String::new(),
            monday: ServiceAvailability::Unavailable,
            tuesday: ServiceAvailability::Unavailable,
            wednesday: ServiceAvailability::Unavailable,
            thursday: ServiceAvailability::Unavailable,
            friday: ServiceAvailability::Unavailable,
            saturday: ServiceAvailability::Unavailable,
            sunday: ServiceAvailability::Unavailable,
            start_date: GtfsDate::new(0, 1, 1),
            end_date: GtfsDate::new(0, 1, 1),
        }
    }
}

impl Calendar {
    pub fn runs_on_weekday(&self, weekday: Weekday) -> bool {
        let flag = match weekday {
            Weekday::Mon => self.monday,
            Weekday::Tue => self.tuesday,
            Weekday::Wed => self.wednesday,
            Weekday::Thu => self.thursday,
            Weekday::Fri => self.friday,
            Weekday::Sat => self.saturday,
            Weekday::Sun => self.sunday,
        };
        flag.is_available()
    }

    /// Base activity on a date, before calendar_dates exceptions.
    pub fn is_active_on(&self, date: NaiveDate) -> bool {
        let gtfs_date = GtfsDate::from_naive_date(date);
        self.start_date <= gtfs_date
            && gtfs_date <= self.end_date
            && self.runs_on_weekday(date.weekday())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CalendarDate {
    pub service_id: String,
    pub date: GtfsDate,
    pub exception_type: ExceptionType,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Shape {
    pub shape_id: String,
    pub shape_pt_lat: f64,
    pub shape_pt_lon: f64,
    pub shape_pt_sequence: u32,
    pub shape_dist_traveled: Option<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_gtfs_date() {
        let date = GtfsDate::parse("20240131").unwrap();
        assert_eq!(date.year(), 2024);
        assert_eq!(date.month(), 1);
        assert_eq!(date.day(), 31);
        assert_eq!(date.to_string(), "20240131");
    }

    #[test]
    fn rejects_invalid_date() {
        assert!(GtfsDate::parse("20240230").is_err());
        assert!(GtfsDate::parse("2024-01-01").is_err());
    }

    #[test]
    fn date_converts_to_naive_and_back() {
        let date = GtfsDate::parse("20250704").unwrap();
        let naive = date.to_naive_date().unwrap();
        assert_eq!(naive.weekday(), Weekday::Fri);
        assert_eq!(GtfsDate::from_naive_date(naive), date);
    }

    #[test]
    fn parses_gtfs_time() {
        let time = GtfsTime::parse("08:05:30").unwrap();
        assert_eq!(time.total_seconds(), 8 * 3600 + 5 * 60 + 30);
        assert_eq!(time.to_string(), "08:05:30");
    }

    #[test]
    fn time_past_midnight_round_trips() {
        let time = GtfsTime::parse("25:30:00").unwrap();
        assert_eq!(time.total_seconds(), 25 * 3600 + 30 * 60);
        assert_eq!(time.to_string(), "25:30:00");
    }

    #[test]
    fn rejects_invalid_time() {
        assert!(GtfsTime::parse("25:99:00").is_err());
        assert!(GtfsTime::parse("bad").is_err());
        assert!(GtfsTime::parse("-1:00:00").is_err());
    }

    #[test]
    fn time_addition_carries_past_24_hours() {
        let time = GtfsTime::parse("23:50:00").unwrap().plus_seconds(45 * 60);
        assert_eq!(time.to_string(), "24:35:00");
    }

    #[test]
    fn parses_gtfs_color() {
        let color = GtfsColor::parse("FF00AA").unwrap();
        assert_eq!(color.rgb(), 0xFF00AA);
        assert_eq!(color.to_string(), "FF00AA");
    }

    #[test]
    fn calendar_weekday_window() {
        let calendar = Calendar {
            service_id: "svc".into(),
            monday: ServiceAvailability::Available,
            friday: ServiceAvailability::Available,
            start_date: GtfsDate::parse("20250101").unwrap(),
            end_date: GtfsDate::parse("20251231").unwrap(),
            ..Default::default()
        };
        let friday = NaiveDate::from_ymd_opt(2025, 7, 4).unwrap();
        let saturday = NaiveDate::from_ymd_opt(2025, 7, 5).unwrap();
        let out_of_window = NaiveDate::from_ymd_opt(2026, 1, 2).unwrap();
        assert!(calendar.is_active_on(friday));
        assert!(!calendar.is_active_on(saturday));
        assert!(!calendar.is_active_on(out_of_window));
    }

    #[test]
    fn route_name_presence() {
        let mut route = Route::default();
        assert!(!route.has_name());
        route.route_short_name = Some("1".into());
        assert!(route.has_name());
    }
}
