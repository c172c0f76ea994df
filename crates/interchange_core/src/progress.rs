/// Trait for observing long-running load and convert operations.
pub trait ProgressHandler: Send + Sync {
    /// Called when starting to load a table or document
    fn on_start_file(&self, file: &str);

    /// Called when finished loading a table or document
    fn on_finish_file(&self, file: &str);

    /// Set total number of files to process (optional usage)
    fn set_total_files(&self, count: usize) {
        let _ = count;
    }
}

/// A no-op progress handler
pub struct NoOpProgressHandler;

impl ProgressHandler for NoOpProgressHandler {
    fn on_start_file(&self, _file: &str) {}
    fn on_finish_file(&self, _file: &str) {}
}
