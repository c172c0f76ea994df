mod deadhead;
mod export;
mod model;
mod reader;
mod rules;
mod validate;

pub use deadhead::{infer_deadheads, InferenceOptions, InferenceReport};
pub use export::{
    export_csv_string, export_with_preset, write_schedule_csv, ExportPreset,
};
pub use model::{RowType, Schedule, ScheduleRow};
pub use reader::{load_schedule_csv, read_schedule};
pub use rules::default_rules;
pub use validate::{
    validate_schedule, ComplianceLevel, Issue, IssueCategory, IssueSeverity, RuleContext,
    ScheduleRule, ValidationConfig, ValidationReport,
};
