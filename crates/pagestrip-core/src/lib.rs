//! PageStrip Core - scanned-page strip pipeline
//!
//! This crate turns one captured page image into `N` vertical strips and
//! uploads them to a remote store with bounded concurrency:
//!
//! - [`decode`]: page decoding and EXIF orientation lookup
//! - [`transform`]: orientation normalization and pixel-exact strip cropping
//! - [`partition`]: exact integer partitioning of the page width
//! - [`encode`]: JPEG encoding of strips
//! - [`scratch`]: transient local files for encoded strips
//! - [`store`]: remote store interface and its HTTP adapter
//! - [`pipeline`]: worker pool, uploader, cancellation and run reporting
//! - [`config`], [`logging`]: ambient setup for binaries

pub mod config;
pub mod decode;
pub mod encode;
pub mod logging;
pub mod partition;
pub mod pipeline;
pub mod scratch;
pub mod store;
pub mod transform;

pub use config::{ConfigError, PipelineConfig, StoreSettings};
pub use decode::{load_source, DecodeError, DecodedImage, Orientation, SourceImage};
pub use partition::{
    partition_strips, strip_label, PartitionError, StripSpec, MAX_STRIP_COUNT,
};
pub use pipeline::{
    summarize, CancelHandle, DiscardReport, ErrorKind, PipelineError, PipelineRun, RunSummary,
    StripPipeline, StripProgress, UploadResult,
};
pub use scratch::{DirScratch, ScratchStorage};
pub use store::{HttpStore, RemoteStore, StoreError};

/// Crate version, as reported by the CLI.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
