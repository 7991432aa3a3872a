//! Progress callbacks shared by the pipeline stages.

/// Progress callback for reporting stage status.
pub trait ProgressReporter: Send + Sync {
    /// Called when entering a new stage.
    fn phase(&self, name: &str);
    /// Called after each lead is processed.
    fn item(&self, current: usize, total: usize, detail: &str);
    /// Called when a stage finishes, with a one-line summary.
    fn finish(&self, summary: &str);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn phase(&self, _name: &str) {}
    fn item(&self, _current: usize, _total: usize, _detail: &str) {}
    fn finish(&self, _summary: &str) {}
}
