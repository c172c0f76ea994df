use std::path::PathBuf;

use crate::notice::Notice;

/// Errors raised by the GTFS store and codec.
#[derive(Debug, thiserror::Error)]
pub enum FeedError {
    #[error("path does not exist: {0}")]
    MissingPath(PathBuf),
    #[error("path is neither a directory nor a zip archive: {0}")]
    InvalidPath(PathBuf),
    #[error("required GTFS file(s) missing: {missing:?}")]
    FeedFileMissing { missing: Vec<String> },
    #[error("failed to parse {file} line {line}, column {column}: {reason}")]
    Parse {
        file: String,
        line: u64,
        column: String,
        reason: String,
    },
    #[error("feed failed validation with {} error(s)", errors.len())]
    Validation {
        errors: Vec<Notice>,
        warnings: Vec<Notice>,
    },
    #[error("i/o error on {file}")]
    Io {
        file: String,
        #[source]
        source: std::io::Error,
    },
    #[error("zip error on {file}")]
    Zip {
        file: String,
        #[source]
        source: zip::result::ZipError,
    },
    #[error("operation cancelled")]
    Cancelled,
}

/// Errors raised by the TransXChange loader.
#[derive(Debug, thiserror::Error)]
pub enum TxcError {
    #[error("TransXChange document not found: {path}")]
    NotFound { path: PathBuf },
    #[error("i/o error reading {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed XML near {element} at byte {position}: {reason}")]
    Parse {
        element: String,
        position: u64,
        reason: String,
    },
    #[error("TransXChange {schema_version} document failed validation with {} error(s)", errors.len())]
    Validation {
        schema_version: String,
        errors: Vec<Notice>,
    },
}

/// Errors raised by the TXC-to-GTFS converter.
#[derive(Debug, thiserror::Error)]
pub enum ConvertError {
    #[error("cannot map {source_type} to {target_type}: {field}: {reason}")]
    Mapping {
        source_type: &'static str,
        target_type: &'static str,
        field: &'static str,
        reason: String,
    },
    #[error("calendar expansion failed for service {service_id}: {reason}")]
    Calendar { service_id: String, reason: String },
    #[error("operation cancelled")]
    Cancelled,
}

/// A date string that matched no accepted format.
#[derive(Debug, thiserror::Error)]
#[error("invalid date {value:?}, expected {expected}")]
pub struct DateParseError {
    pub value: String,
    pub expected: &'static str,
}

/// Errors raised by the operational-schedule layer.
#[derive(Debug, thiserror::Error)]
pub enum ScheduleError {
    #[error("unknown export preset: {name}")]
    UnknownPreset { name: String },
    #[error("schedule is missing required column {column} (no synonym matched)")]
    MissingColumn { column: &'static str },
    #[error(transparent)]
    Feed(#[from] FeedError),
    #[error("i/o error on {file}")]
    Io {
        file: String,
        #[source]
        source: std::io::Error,
    },
}
