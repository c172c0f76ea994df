use std::collections::BTreeMap;
use std::io::Read;

use csv::{ByteRecord, ReaderBuilder, StringRecord};
use serde::de::DeserializeOwned;

use crate::error::FeedError;
use crate::notice::{
    Notice, NoticeContainer, NOTICE_CODE_CSV_FIELD_COUNT, NOTICE_CODE_CSV_ROW_MALFORMED,
};

/// One parsed CSV table. Headers are kept verbatim for round-tripping;
/// matching against the schema happens on a trimmed, lowercased copy.
#[derive(Debug, Clone, Default)]
pub struct CsvTable<T> {
    pub headers: Vec<String>,
    pub rows: Vec<T>,
    pub row_numbers: Vec<u64>,
    /// Unknown-column values per row; populated only in round-trip mode.
    pub extras: Vec<BTreeMap<String, String>>,
}

impl<T> CsvTable<T> {
    pub fn from_rows(rows: Vec<T>) -> Self {
        let row_numbers = (0..rows.len() as u64).map(|index| index + 2).collect();
        Self {
            headers: Vec::new(),
            rows,
            row_numbers,
            extras: Vec::new(),
        }
    }

    pub fn row_number(&self, index: usize) -> u64 {
        self.row_numbers
            .get(index)
            .copied()
            .unwrap_or(index as u64 + 2)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ReadOptions {
    /// Surface the first row-level failure instead of collecting notices.
    pub strict: bool,
    /// Retain unknown columns so a later write can reproduce them.
    pub round_trip: bool,
}

pub(crate) fn normalize_header(raw: &str) -> String {
    raw.trim().to_ascii_lowercase()
}

fn strip_bom(first_header: &mut String) {
    if let Some(stripped) = first_header.strip_prefix('\u{feff}') {
        *first_header = stripped.to_string();
    }
}

/// Parse one GTFS table. Rows that fail to parse are skipped with a notice in
/// lenient mode; strict mode surfaces the first failure as `FeedError::Parse`.
pub fn read_table<T, R>(
    file: &str,
    reader: R,
    known_columns: &[&str],
    options: ReadOptions,
    notices: &mut NoticeContainer,
) -> Result<CsvTable<T>, FeedError>
where
    T: DeserializeOwned,
    R: Read,
{
    let mut csv_reader = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(reader);

    let mut header_record = StringRecord::new();
    let has_headers = csv_reader
        .read_record(&mut header_record)
        .map_err(|source| parse_error(file, 1, "", &source.to_string()))?;
    if !has_headers {
        return Ok(CsvTable::from_rows(Vec::new()));
    }

    let mut headers: Vec<String> = header_record.iter().map(str::to_string).collect();
    if let Some(first) = headers.first_mut() {
        strip_bom(first);
    }

    let normalized: Vec<String> = headers.iter().map(|name| normalize_header(name)).collect();
    let normalized_record = StringRecord::from(
        normalized
            .iter()
            .map(String::as_str)
            .collect::<Vec<&str>>(),
    );
    let unknown_columns: Vec<usize> = normalized
        .iter()
        .enumerate()
        .filter(|(_, name)| !known_columns.contains(&name.as_str()))
        .map(|(index, _)| index)
        .collect();

    let mut table = CsvTable {
        headers,
        rows: Vec::new(),
        row_numbers: Vec::new(),
        extras: Vec::new(),
    };

    let mut record = StringRecord::new();
    let mut line: u64 = 1;
    loop {
        let more = csv_reader
            .read_record(&mut record)
            .map_err(|source| parse_error(file, line + 1, "", &source.to_string()))?;
        if !more {
            break;
        }
        line = record.position().map(|pos| pos.line()).unwrap_or(line + 1);

        if record.len() != normalized_record.len() {
            let reason = format!(
                "expected {} fields, found {}",
                normalized_record.len(),
                record.len()
            );
            if options.strict {
                return Err(parse_error(file, line, "", &reason));
            }
            notices.push(
                Notice::warning(NOTICE_CODE_CSV_FIELD_COUNT, reason)
                    .with_location(file, line)
                    .with_context_field("filename", file),
            );
            continue;
        }

        match record.deserialize::<T>(Some(&normalized_record)) {
            Ok(row) => {
                table.rows.push(row);
                table.row_numbers.push(line);
                if options.round_trip {
                    let mut extra = BTreeMap::new();
                    for &index in &unknown_columns {
                        extra.insert(
                            table.headers[index].clone(),
                            record.get(index).unwrap_or_default().to_string(),
                        );
                    }
                    table.extras.push(extra);
                }
            }
            Err(source) => {
                let column = deserialize_error_column(&source, &normalized);
                if options.strict {
                    return Err(parse_error(file, line, &column, &source.to_string()));
                }
                notices.push(
                    Notice::warning(NOTICE_CODE_CSV_ROW_MALFORMED, source.to_string())
                        .with_location(file, line)
                        .with_field(column.clone())
                        .with_context_field("filename", file)
                        .with_context_field("fieldName", column),
                );
            }
        }
    }

    Ok(table)
}

/// Count the data rows of a table without materializing any records. One
/// byte-record buffer is reused for the whole scan.
pub fn count_rows<R: Read>(reader: R) -> Result<u64, csv::Error> {
    let mut csv_reader = ReaderBuilder::new().flexible(true).from_reader(reader);
    let mut record = ByteRecord::new();
    let mut count = 0;
    while csv_reader.read_byte_record(&mut record)? {
        count += 1;
    }
    Ok(count)
}

fn deserialize_error_column(error: &csv::Error, normalized_headers: &[String]) -> String {
    if let csv::ErrorKind::Deserialize { err, .. } = error.kind() {
        if let Some(index) = err.field() {
            return normalized_headers
                .get(index as usize)
                .cloned()
                .unwrap_or_default();
        }
    }
    String::new()
}

fn parse_error(file: &str, line: u64, column: &str, reason: &str) -> FeedError {
    FeedError::Parse {
        file: file.to_string(),
        line,
        column: column.to_string(),
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use interchange_model::Stop;

    const STOP_COLUMNS: &[&str] = &["stop_id", "stop_name", "stop_lat", "stop_lon"];

    #[test]
    fn strips_bom_and_normalizes_headers() {
        let data = "\u{feff}Stop_Id , stop_name\ns1,Central\n";
        let mut notices = NoticeContainer::new();
        let table: CsvTable<Stop> = read_table(
            "stops.txt",
            data.as_bytes(),
            STOP_COLUMNS,
            ReadOptions::default(),
            &mut notices,
        )
        .unwrap();

        assert_eq!(table.headers[0], "Stop_Id ");
        assert_eq!(table.rows.len(), 1);
        assert_eq!(table.rows[0].stop_id, "s1");
        assert_eq!(table.rows[0].stop_name.as_deref(), Some("Central"));
        assert!(notices.is_empty());
    }

    #[test]
    fn skips_rows_with_wrong_field_count() {
        let data = "stop_id,stop_name\ns1,Central\ns2\ns3,North\n";
        let mut notices = NoticeContainer::new();
        let table: CsvTable<Stop> = read_table(
            "stops.txt",
            data.as_bytes(),
            STOP_COLUMNS,
            ReadOptions::default(),
            &mut notices,
        )
        .unwrap();

        assert_eq!(table.rows.len(), 2);
        assert_eq!(notices.len(), 1);
        let notice = notices.iter().next().unwrap();
        assert_eq!(notice.code, NOTICE_CODE_CSV_FIELD_COUNT);
        assert_eq!(notice.row, Some(3));
    }

    #[test]
    fn strict_mode_surfaces_first_failure() {
        let data = "stop_id,stop_lat\ns1,not-a-number\n";
        let mut notices = NoticeContainer::new();
        let result: Result<CsvTable<Stop>, _> = read_table(
            "stops.txt",
            data.as_bytes(),
            STOP_COLUMNS,
            ReadOptions {
                strict: true,
                round_trip: false,
            },
            &mut notices,
        );

        match result {
            Err(FeedError::Parse { file, line, .. }) => {
                assert_eq!(file, "stops.txt");
                assert_eq!(line, 2);
            }
            other => panic!("expected parse error, got {other:?}"),
        }
    }

    #[test]
    fn empty_optional_fields_become_none() {
        let data = "stop_id,stop_name,stop_lat\ns1,,51.5\n";
        let mut notices = NoticeContainer::new();
        let table: CsvTable<Stop> = read_table(
            "stops.txt",
            data.as_bytes(),
            STOP_COLUMNS,
            ReadOptions::default(),
            &mut notices,
        )
        .unwrap();

        assert!(table.rows[0].stop_name.is_none());
        assert_eq!(table.rows[0].stop_lat, Some(51.5));
    }

    #[test]
    fn round_trip_mode_retains_unknown_columns() {
        let data = "stop_id,operator_note\ns1,depot side\n";
        let mut notices = NoticeContainer::new();
        let table: CsvTable<Stop> = read_table(
            "stops.txt",
            data.as_bytes(),
            STOP_COLUMNS,
            ReadOptions {
                strict: false,
                round_trip: true,
            },
            &mut notices,
        )
        .unwrap();

        assert_eq!(table.extras.len(), 1);
        assert_eq!(
            table.extras[0].get("operator_note").map(String::as_str),
            Some("depot side")
        );
    }

    #[test]
    fn counts_rows_without_records() {
        let data = "stop_id,stop_name\ns1,a\ns2,b\ns3,c\n";
        assert_eq!(count_rows(data.as_bytes()).unwrap(), 3);
    }
}
