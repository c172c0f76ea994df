use chrono::NaiveDate;

use interchange_model::GtfsDate;

use crate::error::DateParseError;

const EXPECTED_FORMATS: &str = "YYYY-MM-DD, YYYYMMDD, or a native date";

/// Accepted date inputs at the query boundary, normalized before use.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DateInput {
    Iso8601(String),
    Compact(String),
    Native(NaiveDate),
}

impl DateInput {
    pub fn resolve(&self) -> Result<NaiveDate, DateParseError> {
        match self {
            DateInput::Native(date) => Ok(*date),
            DateInput::Iso8601(text) => NaiveDate::parse_from_str(text.trim(), "%Y-%m-%d")
                .map_err(|_| invalid(text)),
            DateInput::Compact(text) => GtfsDate::parse(text)
                .ok()
                .and_then(|date| date.to_naive_date())
                .ok_or_else(|| invalid(text)),
        }
    }
}

fn invalid(value: &str) -> DateParseError {
    DateParseError {
        value: value.to_string(),
        expected: EXPECTED_FORMATS,
    }
}

impl From<&str> for DateInput {
    fn from(value: &str) -> Self {
        if value.contains('-') {
            DateInput::Iso8601(value.to_string())
        } else {
            DateInput::Compact(value.to_string())
        }
    }
}

impl From<String> for DateInput {
    fn from(value: String) -> Self {
        DateInput::from(value.as_str())
    }
}

impl From<NaiveDate> for DateInput {
    fn from(value: NaiveDate) -> Self {
        DateInput::Native(value)
    }
}

impl From<GtfsDate> for DateInput {
    fn from(value: GtfsDate) -> Self {
        match value.to_naive_date() {
            Some(date) => DateInput::Native(date),
            None => DateInput::Compact(value.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_iso_and_compact_forms() {
        let expected = NaiveDate::from_ymd_opt(2025, 7, 4).unwrap();
        assert_eq!(DateInput::from("2025-07-04").resolve().unwrap(), expected);
        assert_eq!(DateInput::from("20250704").resolve().unwrap(), expected);
        assert_eq!(DateInput::from(expected).resolve().unwrap(), expected);
    }

    #[test]
    fn invalid_strings_carry_the_expected_format() {
        let error = DateInput::from("last tuesday").resolve().unwrap_err();
        assert_eq!(error.value, "last tuesday");
        assert!(error.expected.contains("YYYYMMDD"));
        assert!(DateInput::from("2025-13-99").resolve().is_err());
    }
}
