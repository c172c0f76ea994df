mod duration;
mod model;
mod parser;

pub use duration::parse_duration_seconds;
pub use model::{
    DateRange, JourneyPattern, JourneyPatternSection, Line, Location, OperatingPeriod,
    OperatingProfile, Operator, RouteLink, RouteSection, Service, StopPoint, TimingLink,
    TxcDocument, TxcRoute, VehicleJourney,
};
