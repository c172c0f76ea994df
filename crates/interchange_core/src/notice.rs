use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const NOTICE_CODE_CSV_ROW_MALFORMED: &str = "csv_row_malformed";
pub const NOTICE_CODE_CSV_FIELD_COUNT: &str = "csv_row_field_count_mismatch";
pub const NOTICE_CODE_MISSING_FILE: &str = "missing_required_file";
pub const NOTICE_CODE_EMPTY_TABLE: &str = "empty_file";
pub const NOTICE_CODE_TXC_PARSE_FAILED: &str = "txc_parse_failed";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NoticeSeverity {
    Error,
    Warning,
    Info,
}

/// One diagnostic record. The same currency is used for lenient CSV loading,
/// the TXC diagnostic bag, and converter warnings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notice {
    pub code: String,
    pub severity: NoticeSeverity,
    pub message: String,
    pub file: Option<String>,
    pub row: Option<u64>,
    pub field: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub context: BTreeMap<String, Value>,
}

impl Notice {
    pub fn new(
        code: impl Into<String>,
        severity: NoticeSeverity,
        message: impl Into<String>,
    ) -> Self {
        Self {
            code: code.into(),
            severity,
            message: message.into(),
            file: None,
            row: None,
            field: None,
            context: BTreeMap::new(),
        }
    }

    pub fn error(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(code, NoticeSeverity::Error, message)
    }

    pub fn warning(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(code, NoticeSeverity::Warning, message)
    }

    pub fn missing_file(file: impl Into<String>) -> Self {
        let file = file.into();
        let mut notice = Notice::error(NOTICE_CODE_MISSING_FILE, "missing required GTFS file");
        notice.file = Some(file.clone());
        notice.insert_context_field("filename", file);
        notice
    }

    pub fn empty_table(file: impl Into<String>) -> Self {
        let file = file.into();
        let mut notice = Notice::warning(NOTICE_CODE_EMPTY_TABLE, "GTFS table has no rows");
        notice.file = Some(file.clone());
        notice.insert_context_field("filename", file);
        notice
    }

    pub fn insert_context_field<V: Serialize>(&mut self, name: impl Into<String>, value: V) {
        let serialized = serde_json::to_value(value).unwrap_or(Value::Null);
        self.context.insert(name.into(), serialized);
    }

    pub fn with_context_field<V: Serialize>(mut self, name: impl Into<String>, value: V) -> Self {
        self.insert_context_field(name, value);
        self
    }

    pub fn with_location(mut self, file: impl Into<String>, row: u64) -> Self {
        self.file = Some(file.into());
        self.row = Some(row);
        self
    }

    pub fn with_field(mut self, field: impl Into<String>) -> Self {
        self.field = Some(field.into());
        self
    }
}

#[derive(Debug, Clone, Default)]
pub struct NoticeContainer {
    notices: Vec<Notice>,
}

impl NoticeContainer {
    pub fn new() -> Self {
        Self {
            notices: Vec::new(),
        }
    }

    pub fn push(&mut self, notice: Notice) {
        self.notices.push(notice);
    }

    pub fn push_missing_file(&mut self, file: impl Into<String>) {
        self.notices.push(Notice::missing_file(file));
    }

    pub fn push_empty_table(&mut self, file: impl Into<String>) {
        self.notices.push(Notice::empty_table(file));
    }

    pub fn iter(&self) -> impl Iterator<Item = &Notice> {
        self.notices.iter()
    }

    pub fn errors(&self) -> impl Iterator<Item = &Notice> {
        self.notices
            .iter()
            .filter(|notice| notice.severity == NoticeSeverity::Error)
    }

    pub fn warnings(&self) -> impl Iterator<Item = &Notice> {
        self.notices
            .iter()
            .filter(|notice| notice.severity == NoticeSeverity::Warning)
    }

    pub fn has_errors(&self) -> bool {
        self.errors().next().is_some()
    }

    pub fn len(&self) -> usize {
        self.notices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.notices.is_empty()
    }

    pub fn merge(&mut self, other: NoticeContainer) {
        self.notices.extend(other.notices);
    }

    pub fn into_vec(self) -> Vec<Notice> {
        self.notices
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn container_partitions_by_severity() {
        let mut notices = NoticeContainer::new();
        notices.push(Notice::error("e", "an error"));
        notices.push(Notice::warning("w", "a warning"));

        assert_eq!(notices.errors().count(), 1);
        assert_eq!(notices.warnings().count(), 1);
        assert!(notices.has_errors());
    }

    #[test]
    fn context_fields_serialize_to_json() {
        let notice = Notice::error("code", "message")
            .with_context_field("count", 3)
            .with_location("stops.txt", 12);

        assert_eq!(notice.context.get("count").unwrap(), &Value::from(3));
        assert_eq!(notice.file.as_deref(), Some("stops.txt"));
        assert_eq!(notice.row, Some(12));
    }
}
