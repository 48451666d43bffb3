//! Strip upload pipeline.
//!
//! A run takes one captured page through:
//!
//! 1. Decoding and orientation lookup ([`crate::decode::load_source`])
//! 2. Orientation normalization ([`crate::transform::normalize_orientation`])
//! 3. Exact vertical partitioning ([`crate::partition::partition_strips`])
//! 4. Bounded-concurrency crop, encode, upload and cleanup per strip
//! 5. Aggregation into a [`PipelineRun`]
//!
//! Only steps 1 and 3 can fail the run as a whole. Everything after that is
//! recorded per strip in the run's results.

mod cancel;
mod pool;
mod report;
mod run;
mod uploader;

#[cfg(test)]
pub(crate) mod test_support;

use std::io;
use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};

pub use cancel::CancelHandle;
pub use pool::WorkerPool;
pub use report::{summarize, RunSummary};
pub use run::{ErrorKind, PipelineRun, UploadResult};

use uploader::{run_job, UploadContext, UploadJob};

use crate::config::{ConfigError, PipelineConfig};
use crate::decode::{load_source, DecodeError, DecodedImage, SourceImage};
use crate::partition::{partition_strips, PartitionError, StripSpec};
use crate::scratch::{DirScratch, ScratchStorage};
use crate::store::{HttpStore, RemoteStore, StoreError};
use crate::transform::normalize_orientation;

/// Errors that prevent a pipeline from being built or a run from starting.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("failed to decode page: {0}")]
    Decode(#[from] DecodeError),

    #[error("cannot partition page: {0}")]
    Partition(#[from] PartitionError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("failed to set up store: {0}")]
    Store(#[from] StoreError),

    #[error("failed to prepare scratch directory: {0}")]
    Scratch(#[source] io::Error),

    #[error("failed to start worker pool: {0}")]
    Pool(#[source] io::Error),
}

/// Progress notification sent after each strip's result is recorded.
#[derive(Debug, Clone, Serialize)]
pub struct StripProgress {
    /// Results recorded so far in this run, including this one.
    pub completed: usize,
    pub total: usize,
    pub result: UploadResult,
}

/// Called from worker threads; must be cheap and must not block.
pub type ProgressCallback = Arc<dyn Fn(&StripProgress) + Send + Sync>;

/// Outcome of removing a run's uploaded strips from the store.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DiscardReport {
    pub attempted: usize,
    pub deleted: usize,
    /// Indices whose remote copy could not be deleted.
    pub failed: Vec<usize>,
}

/// Splits captured pages into strips and uploads them.
///
/// The worker pool is created once and reused by every run.
pub struct StripPipeline {
    strip_count: usize,
    context: UploadContext,
    pool: WorkerPool,
}

impl StripPipeline {
    pub fn new(
        config: &PipelineConfig,
        store: Arc<dyn RemoteStore>,
        scratch: Arc<dyn ScratchStorage>,
    ) -> Result<Self, PipelineError> {
        config.validate()?;
        let pool = WorkerPool::new(config.concurrency).map_err(PipelineError::Pool)?;

        Ok(Self {
            strip_count: config.strip_count,
            context: UploadContext {
                store,
                scratch,
                jpeg_quality: config.jpeg_quality,
                progress: None,
            },
            pool,
        })
    }

    /// Build a pipeline backed by the HTTP store and a scratch directory,
    /// both taken from `config`.
    pub fn from_config(config: &PipelineConfig) -> Result<Self, PipelineError> {
        config.validate()?;
        let store = HttpStore::from_settings(&config.store)?;
        let scratch = DirScratch::new(config.scratch_dir()).map_err(PipelineError::Scratch)?;
        Self::new(config, Arc::new(store), Arc::new(scratch))
    }

    pub fn with_progress<F>(mut self, callback: F) -> Self
    where
        F: Fn(&StripProgress) + Send + Sync + 'static,
    {
        self.context.progress = Some(Arc::new(callback));
        self
    }

    pub fn strip_count(&self) -> usize {
        self.strip_count
    }

    pub fn concurrency(&self) -> usize {
        self.pool.size()
    }

    /// Decode `bytes` and run the whole pipeline on the page.
    ///
    /// # Errors
    ///
    /// Fails only if the page cannot be decoded or partitioned. Per-strip
    /// failures are reported in the returned run.
    pub fn run(&self, bytes: &[u8], cancel: &CancelHandle) -> Result<PipelineRun, PipelineError> {
        let source = load_source(bytes)?;
        self.run_source(source, cancel)
    }

    /// Run the pipeline on an already decoded page.
    pub fn run_source(
        &self,
        source: SourceImage,
        cancel: &CancelHandle,
    ) -> Result<PipelineRun, PipelineError> {
        let (source_width, source_height) = (source.width(), source.height());
        let upright = normalize_orientation(source);
        let specs = partition_strips(upright.width(), upright.height(), self.strip_count)?;

        info!(
            source = ?(source_width, source_height),
            upright = ?(upright.width(), upright.height()),
            rotated = upright.applied_degrees,
            strips = specs.len(),
            concurrency = self.pool.size(),
            "starting strip run"
        );

        let run = self.upload_strips(upright.image, specs, cancel);

        info!(
            uploaded = run.success_count(),
            total = run.len(),
            failed = ?run.failure_indices(),
            "strip run finished"
        );
        Ok(run)
    }

    /// Upload pre-computed strips of an upright page.
    ///
    /// Returns once every strip has a result. Result `i` belongs to
    /// `specs[i]`.
    pub fn upload_strips(
        &self,
        page: DecodedImage,
        specs: Vec<StripSpec>,
        cancel: &CancelHandle,
    ) -> PipelineRun {
        let job = UploadJob::new(page, specs, self.context.clone(), cancel.clone());
        run_job(&self.pool, Arc::new(job))
    }

    /// Delete every uploaded strip of `run` from the remote store.
    ///
    /// Used when a page is retaken. Failures are logged and counted.
    pub fn discard_remote(&self, run: &PipelineRun) -> DiscardReport {
        let mut report = DiscardReport::default();
        for (index, location) in run.successful_locations() {
            report.attempted += 1;
            match self.context.store.delete(location) {
                Ok(()) => report.deleted += 1,
                Err(err) => {
                    warn!(index, %location, error = %err, "failed to delete uploaded strip");
                    report.failed.push(index);
                }
            }
        }
        info!(
            deleted = report.deleted,
            attempted = report.attempted,
            "discarded remote strips"
        );
        report
    }
}

impl std::fmt::Debug for StripPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StripPipeline")
            .field("strip_count", &self.strip_count)
            .field("jpeg_quality", &self.context.jpeg_quality)
            .field("pool", &self.pool)
            .finish_non_exhaustive()
    }
}
