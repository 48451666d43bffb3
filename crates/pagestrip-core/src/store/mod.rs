//! Remote object store interface.
//!
//! The pipeline only needs two things from the store: put a named byte blob
//! and get back where it landed, and (when a scan is retaken) delete a blob
//! it previously stored. Implementations are shared across upload workers
//! and must be callable concurrently.

mod http;

use thiserror::Error;

pub use http::HttpStore;

/// Failure modes of a store call.
///
/// The pipeline records every variant the same way (`success: false`, no
/// location); the distinction is kept for logging and reporting.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The store rejected the payload as too large.
    #[error("payload of {size} bytes rejected as too large")]
    PayloadTooLarge { size: usize },

    /// The request did not complete within the client timeout.
    #[error("request timed out")]
    Timeout,

    /// Connection-level failure.
    #[error("network error: {0}")]
    Network(String),

    /// The store answered with a non-success status.
    #[error("server responded with status {status}")]
    Server { status: u16 },

    /// The store accepted the upload but did not say where it is.
    #[error("upload response carried no location")]
    MissingLocation,

    /// The response body could not be understood.
    #[error("invalid response body: {0}")]
    InvalidResponse(String),

    /// The client could not be configured.
    #[error("invalid store configuration: {0}")]
    Config(String),
}

/// A remote object store for strip files.
pub trait RemoteStore: Send + Sync {
    /// Upload `bytes` under `name` and return the remote location.
    fn upload(&self, bytes: &[u8], name: &str) -> Result<String, StoreError>;

    /// Remove a previously uploaded object by its location.
    fn delete(&self, location: &str) -> Result<(), StoreError>;
}

/// Remote file name for strip `index` (zero-based): `strip_1.jpg`, `strip_2.jpg`, ...
pub fn strip_file_name(index: usize) -> String {
    format!("strip_{}.jpg", index + 1)
}
