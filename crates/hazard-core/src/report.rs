/// Batch outcomes. Per-item failures are collected here instead of aborting
/// the batch; binaries turn a non-empty failure list into a failing exit code.
use std::fmt;
use std::time::Duration;

use crate::error::EngineError;

/// Classification result for one hazardset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatasetSummary {
    pub hazardset_id: String,
    /// Candidate divisions visited.
    pub divisions: usize,
    pub outputs: usize,
    pub elapsed: Duration,
    /// Computed but rolled back.
    pub dry_run: bool,
}

/// A work item that failed, with the error that stopped it.
#[derive(Debug)]
pub struct BatchFailure {
    pub hazardset_id: String,
    pub error: EngineError,
}

#[derive(Debug)]
pub struct BatchReport<S> {
    pub succeeded: Vec<S>,
    pub failures: Vec<BatchFailure>,
}

impl<S> Default for BatchReport<S> {
    fn default() -> Self {
        Self {
            succeeded: Vec::new(),
            failures: Vec::new(),
        }
    }
}

impl<S> BatchReport<S> {
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn is_empty(&self) -> bool {
        self.succeeded.is_empty() && self.failures.is_empty()
    }
}

impl fmt::Display for BatchReport<DatasetSummary> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let divisions: usize = self.succeeded.iter().map(|s| s.divisions).sum();
        let outputs: usize = self.succeeded.iter().map(|s| s.outputs).sum();
        write!(
            f,
            "{} hazardset(s) processed ({divisions} divisions, {outputs} outputs), {} failed",
            self.succeeded.len(),
            self.failures.len()
        )
    }
}
