//! Per-strip outcomes and the run that collects them.

use std::fmt;
use std::sync::OnceLock;

use serde::{Deserialize, Serialize};

use crate::store::StoreError;

/// Why a strip was not uploaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Zero-width strip; nothing to crop or upload.
    EmptyStrip,
    Crop,
    Encode,
    /// Writing or reading the local scratch file failed.
    Scratch,
    PayloadTooLarge,
    Timeout,
    Network,
    Server,
    MissingLocation,
    /// The run was cancelled before this strip finished.
    Cancelled,
    /// Processing this strip panicked, or its worker thread died.
    WorkerLost,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::EmptyStrip => "empty_strip",
            ErrorKind::Crop => "crop",
            ErrorKind::Encode => "encode",
            ErrorKind::Scratch => "scratch",
            ErrorKind::PayloadTooLarge => "payload_too_large",
            ErrorKind::Timeout => "timeout",
            ErrorKind::Network => "network",
            ErrorKind::Server => "server",
            ErrorKind::MissingLocation => "missing_location",
            ErrorKind::Cancelled => "cancelled",
            ErrorKind::WorkerLost => "worker_lost",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&StoreError> for ErrorKind {
    fn from(err: &StoreError) -> Self {
        match err {
            StoreError::PayloadTooLarge { .. } => ErrorKind::PayloadTooLarge,
            StoreError::Timeout => ErrorKind::Timeout,
            StoreError::Network(_) | StoreError::Config(_) => ErrorKind::Network,
            StoreError::Server { .. } | StoreError::InvalidResponse(_) => ErrorKind::Server,
            StoreError::MissingLocation => ErrorKind::MissingLocation,
        }
    }
}

/// Outcome for one strip index.
///
/// A location is present exactly when the upload succeeded, and an error
/// kind exactly when it did not.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadResult {
    index: usize,
    success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    remote_location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    error_kind: Option<ErrorKind>,
}

impl UploadResult {
    pub fn uploaded(index: usize, location: impl Into<String>) -> Self {
        Self {
            index,
            success: true,
            remote_location: Some(location.into()),
            error_kind: None,
        }
    }

    pub fn failed(index: usize, kind: ErrorKind) -> Self {
        Self {
            index,
            success: false,
            remote_location: None,
            error_kind: Some(kind),
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn success(&self) -> bool {
        self.success
    }

    pub fn remote_location(&self) -> Option<&str> {
        self.remote_location.as_deref()
    }

    pub fn error_kind(&self) -> Option<ErrorKind> {
        self.error_kind
    }
}

/// The ordered outcome of one run: one result per strip index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineRun {
    results: Vec<UploadResult>,
}

impl PipelineRun {
    pub(crate) fn from_results(results: Vec<UploadResult>) -> Self {
        debug_assert!(results.iter().enumerate().all(|(i, r)| r.index == i));
        Self { results }
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    pub fn results(&self) -> &[UploadResult] {
        &self.results
    }

    pub fn get(&self, index: usize) -> Option<&UploadResult> {
        self.results.get(index)
    }

    pub fn success_count(&self) -> usize {
        self.results.iter().filter(|r| r.success).count()
    }

    /// Indices that failed, ascending.
    pub fn failure_indices(&self) -> Vec<usize> {
        self.results
            .iter()
            .filter(|r| !r.success)
            .map(|r| r.index)
            .collect()
    }

    /// `(index, location)` for every uploaded strip, ascending.
    pub fn successful_locations(&self) -> impl Iterator<Item = (usize, &str)> + '_ {
        self.results
            .iter()
            .filter_map(|r| r.remote_location().map(|loc| (r.index, loc)))
    }

    pub fn into_results(self) -> Vec<UploadResult> {
        self.results
    }
}

/// Write-once result slots shared by the workers of one run.
#[derive(Debug)]
pub(crate) struct RunSlots {
    slots: Vec<OnceLock<UploadResult>>,
}

impl RunSlots {
    pub(crate) fn new(len: usize) -> Self {
        Self {
            slots: (0..len).map(|_| OnceLock::new()).collect(),
        }
    }

    /// Store `result` in its slot. Returns `false` if the slot was already
    /// written or the index is out of range.
    pub(crate) fn fill(&self, result: UploadResult) -> bool {
        match self.slots.get(result.index) {
            Some(slot) => slot.set(result).is_ok(),
            None => false,
        }
    }

    /// Collect every slot into a run, filling any empty slot with
    /// `missing(index)`.
    pub(crate) fn collect(&self, missing: impl Fn(usize) -> UploadResult) -> PipelineRun {
        let results = self
            .slots
            .iter()
            .enumerate()
            .map(|(index, slot)| slot.get().cloned().unwrap_or_else(|| missing(index)))
            .collect();
        PipelineRun::from_results(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_run() -> PipelineRun {
        PipelineRun::from_results(vec![
            UploadResult::uploaded(0, "https://blob/strip_1.jpg"),
            UploadResult::failed(1, ErrorKind::Timeout),
            UploadResult::uploaded(2, "https://blob/strip_3.jpg"),
            UploadResult::failed(3, ErrorKind::EmptyStrip),
        ])
    }

    #[test]
    fn test_upload_result_location_iff_success() {
        let ok = UploadResult::uploaded(0, "loc");
        assert!(ok.success());
        assert_eq!(ok.remote_location(), Some("loc"));
        assert_eq!(ok.error_kind(), None);

        let bad = UploadResult::failed(1, ErrorKind::Server);
        assert!(!bad.success());
        assert_eq!(bad.remote_location(), None);
        assert_eq!(bad.error_kind(), Some(ErrorKind::Server));
    }

    #[test]
    fn test_run_counts() {
        let run = sample_run();
        assert_eq!(run.len(), 4);
        assert_eq!(run.success_count(), 2);
        assert_eq!(run.failure_indices(), vec![1, 3]);
        assert_eq!(
            run.successful_locations().collect::<Vec<_>>(),
            vec![(0, "https://blob/strip_1.jpg"), (2, "https://blob/strip_3.jpg")]
        );
    }

    #[test]
    fn test_store_error_mapping() {
        assert_eq!(
            ErrorKind::from(&StoreError::PayloadTooLarge { size: 1 }),
            ErrorKind::PayloadTooLarge
        );
        assert_eq!(ErrorKind::from(&StoreError::Timeout), ErrorKind::Timeout);
        assert_eq!(
            ErrorKind::from(&StoreError::Network("reset".into())),
            ErrorKind::Network
        );
        assert_eq!(
            ErrorKind::from(&StoreError::Server { status: 503 }),
            ErrorKind::Server
        );
        assert_eq!(
            ErrorKind::from(&StoreError::MissingLocation),
            ErrorKind::MissingLocation
        );
    }

    #[test]
    fn test_slots_are_write_once() {
        let slots = RunSlots::new(2);
        assert!(slots.fill(UploadResult::uploaded(0, "first")));
        assert!(!slots.fill(UploadResult::uploaded(0, "second")));
        assert!(!slots.fill(UploadResult::uploaded(5, "out of range")));

        let run = slots.collect(|i| UploadResult::failed(i, ErrorKind::Cancelled));
        assert_eq!(run.get(0).and_then(|r| r.remote_location()), Some("first"));
        assert_eq!(run.get(1).and_then(|r| r.error_kind()), Some(ErrorKind::Cancelled));
    }

    #[test]
    fn test_result_serialization() {
        let result = UploadResult::failed(3, ErrorKind::PayloadTooLarge);
        let json = serde_json::to_string(&result).unwrap();
        assert_eq!(
            json,
            r#"{"index":3,"success":false,"error_kind":"payload_too_large"}"#
        );
    }

    #[test]
    fn test_error_kind_display_matches_serde() {
        for kind in [ErrorKind::EmptyStrip, ErrorKind::WorkerLost, ErrorKind::MissingLocation] {
            let json = serde_json::to_string(&kind).unwrap();
            assert_eq!(json, format!("\"{kind}\""));
        }
    }
}
