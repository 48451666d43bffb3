use serde::Serialize;

use super::run::{PipelineRun, UploadResult};
use crate::partition::strip_label;

/// Aggregate view of a finished run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub total: usize,
    pub success_count: usize,
    /// Failed indices in ascending order, for a later retry.
    pub failure_indices: Vec<usize>,
    pub results: Vec<UploadResult>,
}

impl RunSummary {
    /// User-facing status line, e.g. `28/30 strips uploaded`.
    pub fn message(&self) -> String {
        format!("{}/{} strips uploaded", self.success_count, self.total)
    }

    pub fn is_complete(&self) -> bool {
        self.failure_indices.is_empty()
    }

    /// Labels of the failed strips, ascending.
    pub fn failure_labels(&self) -> Vec<String> {
        self.failure_indices
            .iter()
            .map(|&index| strip_label(index, self.total))
            .collect()
    }
}

/// Summarize a finished run. Pure; performs no I/O.
pub fn summarize(run: &PipelineRun) -> RunSummary {
    RunSummary {
        total: run.len(),
        success_count: run.success_count(),
        failure_indices: run.failure_indices(),
        results: run.results().to_vec(),
    }
}
