//! GTFS and TransXChange interchange core: a GTFS store with lazy loading
//! and deterministic writing, a query filter, a streaming TXC parser, a
//! TXC-to-GTFS converter, and an operational-schedule validator.

pub mod bank_holidays;
mod cancel;
pub mod convert;
mod csv_reader;
mod dates;
mod error;
pub mod feed;
mod filter;
mod geo;
mod input;
mod lazy;
mod notice;
mod progress;
pub mod schedule;
pub mod txc;
mod writer;

pub use cancel::CancelToken;
pub use convert::{
    convert, convert_batch, convert_batch_with_progress, ConversionOutcome, ConversionStats,
    ConvertOptions, Region,
};
pub use csv_reader::{count_rows, read_table, CsvTable, ReadOptions};
pub use dates::DateInput;
pub use error::{ConvertError, DateParseError, FeedError, ScheduleError, TxcError};
pub use feed::{GtfsFeed, LoadOptions};
pub use filter::FeedFilter;
pub use input::GtfsInput;
pub use lazy::LazyFeed;
pub use notice::{Notice, NoticeContainer, NoticeSeverity};
pub use progress::{NoOpProgressHandler, ProgressHandler};
pub use txc::TxcDocument;
pub use writer::{
    columnar_snapshot, write_to_directory, write_to_zip, write_to_zip_bytes, ColumnarTable,
};
