//! Bounded-concurrency strip uploader.
//!
//! One [`UploadJob`] exists per run. It is shared by `min(C, N)` pool
//! workers that claim strip indices from a single atomic cursor. Each claimed
//! strip is cropped, encoded, written to scratch, uploaded, and discarded by
//! the worker that claimed it, and its result goes into that index's
//! write-once slot. Workers share nothing else.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tracing::{debug, error, info, warn};

use super::cancel::CancelHandle;
use super::pool::{Completion, WorkerPool};
use super::run::{ErrorKind, PipelineRun, RunSlots, UploadResult};
use super::{ProgressCallback, StripProgress};
use crate::decode::DecodedImage;
use crate::encode::encode_jpeg;
use crate::partition::StripSpec;
use crate::scratch::{artifact_name, next_run_tag, ScratchStorage, StripArtifact};
use crate::store::{strip_file_name, RemoteStore};
use crate::transform::crop_strip;

/// Collaborators shared by every run of a pipeline.
#[derive(Clone)]
pub(crate) struct UploadContext {
    pub store: Arc<dyn RemoteStore>,
    pub scratch: Arc<dyn ScratchStorage>,
    pub jpeg_quality: u8,
    pub progress: Option<ProgressCallback>,
}

pub(crate) struct UploadJob {
    page: DecodedImage,
    specs: Vec<StripSpec>,
    cursor: AtomicUsize,
    completed: AtomicUsize,
    slots: RunSlots,
    cancel: CancelHandle,
    context: UploadContext,
    run_tag: String,
}

impl UploadJob {
    pub(crate) fn new(
        page: DecodedImage,
        specs: Vec<StripSpec>,
        context: UploadContext,
        cancel: CancelHandle,
    ) -> Self {
        let slots = RunSlots::new(specs.len());
        Self {
            page,
            specs,
            cursor: AtomicUsize::new(0),
            completed: AtomicUsize::new(0),
            slots,
            cancel,
            context,
            run_tag: next_run_tag(),
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.specs.len()
    }

    /// Worker loop: claim, process, record, until nothing is left.
    ///
    /// A panic while processing one strip fails that strip only; the worker
    /// goes on claiming.
    pub(crate) fn work(&self) {
        while let Some(index) = self.claim() {
            let result = panic::catch_unwind(AssertUnwindSafe(|| self.process(index)))
                .unwrap_or_else(|_| {
                    error!(index, "strip processing panicked");
                    UploadResult::failed(index, ErrorKind::WorkerLost)
                });
            self.record(result);
        }
    }

    fn claim(&self) -> Option<usize> {
        if self.cancel.is_cancelled() {
            return None;
        }
        let index = self.cursor.fetch_add(1, Ordering::SeqCst);
        (index < self.specs.len()).then_some(index)
    }

    /// Number of indices handed out so far.
    fn claimed(&self) -> usize {
        self.cursor.load(Ordering::SeqCst).min(self.specs.len())
    }

    fn process(&self, index: usize) -> UploadResult {
        let spec = &self.specs[index];
        if spec.is_empty() {
            debug!(index, "skipping zero-width strip");
            return UploadResult::failed(index, ErrorKind::EmptyStrip);
        }

        let strip = match crop_strip(&self.page, spec) {
            Ok(strip) => strip,
            Err(err) => {
                warn!(index, error = %err, "strip crop failed");
                return UploadResult::failed(index, ErrorKind::Crop);
            }
        };

        let encoded = match encode_jpeg(&strip, self.context.jpeg_quality) {
            Ok(bytes) => bytes,
            Err(err) => {
                warn!(index, error = %err, "strip encode failed");
                return UploadResult::failed(index, ErrorKind::Encode);
            }
        };
        drop(strip);

        let name = artifact_name(&self.run_tag, index);
        let artifact = match self.context.scratch.create(&name, &encoded) {
            Ok(path) => ScratchFile {
                scratch: &*self.context.scratch,
                artifact: StripArtifact {
                    spec: *spec,
                    path,
                    len: encoded.len(),
                },
            },
            Err(err) => {
                warn!(index, error = %err, "could not write strip to scratch");
                return UploadResult::failed(index, ErrorKind::Scratch);
            }
        };
        drop(encoded);

        self.upload_artifact(index, &artifact.artifact)
    }

    fn upload_artifact(&self, index: usize, artifact: &StripArtifact) -> UploadResult {
        if self.cancel.is_cancelled() {
            debug!(index, "run cancelled before upload");
            return UploadResult::failed(index, ErrorKind::Cancelled);
        }

        let payload = match self.context.scratch.read(&artifact.path) {
            Ok(bytes) => bytes,
            Err(err) => {
                warn!(index, error = %err, "could not read strip back from scratch");
                return UploadResult::failed(index, ErrorKind::Scratch);
            }
        };

        match self.context.store.upload(&payload, &strip_file_name(index)) {
            Ok(location) => {
                debug!(index, bytes = artifact.len, %location, "strip uploaded");
                UploadResult::uploaded(index, location)
            }
            Err(err) => {
                warn!(index, bytes = artifact.len, error = %err, "strip upload failed");
                UploadResult::failed(index, ErrorKind::from(&err))
            }
        }
    }

    fn record(&self, result: UploadResult) {
        let index = result.index();
        if !self.slots.fill(result.clone()) {
            warn!(index, "result slot already written");
            return;
        }

        let completed = self.completed.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some(progress) = &self.context.progress {
            let update = StripProgress {
                completed,
                total: self.specs.len(),
                result,
            };
            if panic::catch_unwind(AssertUnwindSafe(|| progress(&update))).is_err() {
                error!(index, "progress callback panicked");
            }
        }
    }

    /// Freeze the slots into a run. Call only after every worker is done.
    ///
    /// A slot still empty at this point was either never claimed because the
    /// run was cancelled, or abandoned by a worker thread that died outside
    /// strip processing.
    pub(crate) fn finish(&self) -> PipelineRun {
        let claimed = self.claimed();
        let cancelled = self.cancel.is_cancelled();
        self.slots.collect(|index| {
            let kind = if index >= claimed && cancelled {
                ErrorKind::Cancelled
            } else {
                ErrorKind::WorkerLost
            };
            UploadResult::failed(index, kind)
        })
    }
}

/// A strip artifact that is removed from scratch when dropped, so it is
/// discarded exactly once whether the upload succeeds, fails, or panics.
struct ScratchFile<'a> {
    scratch: &'a dyn ScratchStorage,
    artifact: StripArtifact,
}

impl Drop for ScratchFile<'_> {
    fn drop(&mut self) {
        if let Err(err) = self.scratch.remove(&self.artifact.path) {
            warn!(
                index = self.artifact.spec.index,
                path = %self.artifact.path.display(),
                error = %err,
                "failed to remove scratch file"
            );
        }
    }
}

/// Run `job` on `pool` and block until every slot is settled.
pub(crate) fn run_job(pool: &WorkerPool, job: Arc<UploadJob>) -> PipelineRun {
    let workers = pool.size().min(job.len());
    let (done_tx, done_rx) = crossbeam_channel::unbounded();

    let mut dispatched = 0;
    for _ in 0..workers {
        let job = Arc::clone(&job);
        let guard = Completion::new(done_tx.clone());
        if pool.execute(move || {
            let _guard = guard;
            job.work();
        }) {
            dispatched += 1;
        }
    }
    drop(done_tx);

    if dispatched == 0 && job.len() > 0 {
        warn!("worker pool refused the job; uploading on the calling thread");
        job.work();
    }

    // Barrier: the channel disconnects once every guard is dropped.
    let finished = done_rx.iter().count();
    info!(workers = dispatched, finished, strips = job.len(), "upload workers done");

    job.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::partition::partition_strips;
    use crate::pipeline::test_support::{MemoryScratch, RecordingStore};
    use std::sync::Mutex;
    use std::time::Duration;

    fn page(width: u32, height: u32) -> DecodedImage {
        let mut pixels = Vec::with_capacity((width * height * 3) as usize);
        for _y in 0..height {
            for x in 0..width {
                pixels.extend_from_slice(&[(x % 256) as u8, 90, 180]);
            }
        }
        DecodedImage::new(width, height, pixels)
    }

    fn context(store: Arc<RecordingStore>, scratch: Arc<MemoryScratch>) -> UploadContext {
        UploadContext {
            store,
            scratch,
            jpeg_quality: 80,
            progress: None,
        }
    }

    fn run(
        width: u32,
        count: usize,
        concurrency: usize,
        store: Arc<RecordingStore>,
        scratch: Arc<MemoryScratch>,
    ) -> PipelineRun {
        let pool = WorkerPool::new(concurrency).unwrap();
        let specs = partition_strips(width, 40, count).unwrap();
        let job = UploadJob::new(
            page(width, 40),
            specs,
            context(store, scratch),
            CancelHandle::new(),
        );
        run_job(&pool, Arc::new(job))
    }

    #[test]
    fn test_forced_failure_is_isolated() {
        let store = Arc::new(RecordingStore::failing(&["strip_5.jpg"]));
        let scratch = Arc::new(MemoryScratch::default());

        let run = run(100, 10, 3, Arc::clone(&store), Arc::clone(&scratch));

        assert_eq!(run.len(), 10);
        assert_eq!(run.success_count(), 9);
        assert_eq!(run.failure_indices(), vec![4]);
        assert_eq!(run.get(4).unwrap().error_kind(), Some(ErrorKind::Server));
        for (i, result) in run.results().iter().enumerate() {
            assert_eq!(result.index(), i);
        }
    }

    #[test]
    fn test_every_artifact_discarded_once() {
        let store = Arc::new(RecordingStore::failing(&["strip_2.jpg", "strip_7.jpg"]));
        let scratch = Arc::new(MemoryScratch::default());

        run(90, 9, 3, Arc::clone(&store), Arc::clone(&scratch));

        assert_eq!(scratch.created_count(), 9);
        assert_eq!(scratch.removed_count(), 9);
        assert_eq!(scratch.live_files(), 0);

        let mut removed = scratch.removed.lock().unwrap().clone();
        removed.sort();
        removed.dedup();
        assert_eq!(removed.len(), 9);
    }

    #[test]
    fn test_cleanup_failure_does_not_change_result() {
        let store = Arc::new(RecordingStore::default());
        let scratch = Arc::new(MemoryScratch {
            fail_remove: true,
            ..MemoryScratch::default()
        });

        let run = run(30, 3, 2, store, Arc::clone(&scratch));

        assert_eq!(run.success_count(), 3);
        assert_eq!(scratch.removed_count(), 3);
    }

    #[test]
    fn test_concurrency_does_not_change_results() {
        let outcome = |concurrency| {
            let store = Arc::new(RecordingStore::failing(&["strip_3.jpg"]));
            let scratch = Arc::new(MemoryScratch::default());
            run(77, 7, concurrency, store, scratch)
        };

        let serial = outcome(1);
        assert_eq!(outcome(3), serial);
        assert_eq!(outcome(16), serial);
    }

    #[test]
    fn test_in_flight_uploads_bounded_by_concurrency() {
        let store = Arc::new(RecordingStore {
            delay: Some(Duration::from_millis(20)),
            ..RecordingStore::default()
        });
        let scratch = Arc::new(MemoryScratch::default());

        run(120, 12, 3, Arc::clone(&store), scratch);

        let peak = store.max_in_flight.load(Ordering::SeqCst);
        assert!((1..=3).contains(&peak), "peak in-flight {peak}");
        assert_eq!(store.upload_count(), 12);
    }

    #[test]
    fn test_zero_width_strips_are_not_uploaded() {
        let store = Arc::new(RecordingStore::default());
        let scratch = Arc::new(MemoryScratch::default());

        let run = run(3, 5, 2, Arc::clone(&store), Arc::clone(&scratch));

        assert_eq!(run.len(), 5);
        assert_eq!(run.failure_indices(), vec![0, 1, 2, 3]);
        assert!(run.results()[..4]
            .iter()
            .all(|r| r.error_kind() == Some(ErrorKind::EmptyStrip)));
        assert!(run.get(4).unwrap().success());
        assert_eq!(store.upload_count(), 1);
        assert_eq!(scratch.created_count(), 1);
    }

    #[test]
    fn test_uploads_use_one_based_names() {
        let store = Arc::new(RecordingStore::default());
        let scratch = Arc::new(MemoryScratch::default());

        let run = run(40, 4, 2, Arc::clone(&store), scratch);

        let mut names: Vec<String> = store
            .uploads
            .lock()
            .unwrap()
            .iter()
            .map(|(n, _)| n.clone())
            .collect();
        names.sort();
        assert_eq!(names, ["strip_1.jpg", "strip_2.jpg", "strip_3.jpg", "strip_4.jpg"]);
        assert_eq!(
            run.get(0).unwrap().remote_location(),
            Some("https://blob.test/strips/strip_1.jpg")
        );
    }

    #[test]
    fn test_cancel_before_start_fills_every_slot() {
        let store = Arc::new(RecordingStore::default());
        let scratch = Arc::new(MemoryScratch::default());
        let pool = WorkerPool::new(3).unwrap();
        let cancel = CancelHandle::new();
        cancel.cancel();

        let job = UploadJob::new(
            page(50, 10),
            partition_strips(50, 10, 5).unwrap(),
            context(Arc::clone(&store), Arc::clone(&scratch)),
            cancel,
        );
        let run = run_job(&pool, Arc::new(job));

        assert_eq!(run.len(), 5);
        assert!(run
            .results()
            .iter()
            .all(|r| r.error_kind() == Some(ErrorKind::Cancelled)));
        assert_eq!(store.upload_count(), 0);
        assert_eq!(scratch.created_count(), 0);
    }

    #[test]
    fn test_cancel_mid_run_stops_remaining_claims() {
        let store = Arc::new(RecordingStore {
            delay: Some(Duration::from_millis(30)),
            ..RecordingStore::default()
        });
        let scratch = Arc::new(MemoryScratch::default());
        let pool = WorkerPool::new(2).unwrap();
        let cancel = CancelHandle::new();

        let trigger = cancel.clone();
        let progress: ProgressCallback = Arc::new(move |p: &StripProgress| {
            if p.completed == 1 {
                trigger.cancel();
            }
        });
        let mut ctx = context(Arc::clone(&store), Arc::clone(&scratch));
        ctx.progress = Some(progress);

        let specs = partition_strips(200, 10, 20).unwrap();
        let job = UploadJob::new(page(200, 10), specs, ctx, cancel);
        let run = run_job(&pool, Arc::new(job));

        assert_eq!(run.len(), 20);
        assert!(store.upload_count() < 20);
        assert!(run
            .results()
            .iter()
            .any(|r| r.error_kind() == Some(ErrorKind::Cancelled)));
        assert_eq!(scratch.live_files(), 0);
        assert_eq!(scratch.created_count(), scratch.removed_count());
    }

    #[test]
    fn test_progress_reports_each_slot_once() {
        let store = Arc::new(RecordingStore::default());
        let scratch = Arc::new(MemoryScratch::default());
        let pool = WorkerPool::new(3).unwrap();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let sink = Arc::clone(&seen);
        let mut ctx = context(store, scratch);
        ctx.progress = Some(Arc::new(move |p: &StripProgress| {
            sink.lock().unwrap().push((p.completed, p.total, p.result.index()));
        }));

        let specs = partition_strips(60, 10, 6).unwrap();
        let job = UploadJob::new(page(60, 10), specs, ctx, CancelHandle::new());
        run_job(&pool, Arc::new(job));

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 6);
        let mut completed: Vec<usize> = seen.iter().map(|(c, _, _)| *c).collect();
        completed.sort();
        assert_eq!(completed, vec![1, 2, 3, 4, 5, 6]);
        assert!(seen.iter().all(|(_, total, _)| *total == 6));
        let mut indices: Vec<usize> = seen.iter().map(|(_, _, i)| *i).collect();
        indices.sort();
        assert_eq!(indices, vec![0, 1, 2, 3, 4, 5]);
    }

    struct PanickingStore {
        on: &'static str,
    }

    impl RemoteStore for PanickingStore {
        fn upload(&self, _bytes: &[u8], name: &str) -> Result<String, crate::store::StoreError> {
            if name == self.on {
                panic!("store exploded on {name}");
            }
            Ok(format!("mem://{name}"))
        }

        fn delete(&self, _location: &str) -> Result<(), crate::store::StoreError> {
            Ok(())
        }
    }

    fn panicking_run(concurrency: usize, scratch: Arc<MemoryScratch>) -> PipelineRun {
        let pool = WorkerPool::new(concurrency).unwrap();
        let ctx = UploadContext {
            store: Arc::new(PanickingStore { on: "strip_2.jpg" }),
            scratch,
            jpeg_quality: 80,
            progress: None,
        };
        let specs = partition_strips(30, 10, 3).unwrap();
        let job = UploadJob::new(page(30, 10), specs, ctx, CancelHandle::new());
        run_job(&pool, Arc::new(job))
    }

    #[test]
    fn test_panic_fails_only_its_own_strip() {
        let scratch = Arc::new(MemoryScratch::default());

        // The only worker panics on strip 1 and still uploads strip 2.
        let run = panicking_run(1, Arc::clone(&scratch));

        assert_eq!(run.len(), 3);
        assert!(run.get(0).unwrap().success());
        assert_eq!(
            run.get(1).unwrap().error_kind(),
            Some(ErrorKind::WorkerLost)
        );
        assert!(run.get(2).unwrap().success());
        assert_eq!(scratch.live_files(), 0);
        assert_eq!(scratch.created_count(), scratch.removed_count());
    }

    #[test]
    fn test_panic_outcome_independent_of_concurrency() {
        let serial = panicking_run(1, Arc::new(MemoryScratch::default()));
        let parallel = panicking_run(3, Arc::new(MemoryScratch::default()));
        assert_eq!(serial, parallel);
        assert_eq!(serial.failure_indices(), vec![1]);
    }

    #[test]
    fn test_panicking_progress_callback_keeps_worker_alive() {
        let pool = WorkerPool::new(1).unwrap();
        let mut ctx = context(
            Arc::new(RecordingStore::default()),
            Arc::new(MemoryScratch::default()),
        );
        ctx.progress = Some(Arc::new(|p: &StripProgress| {
            if p.result.index() == 0 {
                panic!("progress sink exploded");
            }
        }));

        let specs = partition_strips(30, 10, 3).unwrap();
        let job = UploadJob::new(page(30, 10), specs, ctx, CancelHandle::new());
        assert_eq!(run_job(&pool, Arc::new(job)).success_count(), 3);
    }

    #[test]
    fn test_pool_survives_worker_panic() {
        let pool = WorkerPool::new(1).unwrap();
        let panicking = UploadContext {
            store: Arc::new(PanickingStore { on: "strip_1.jpg" }),
            scratch: Arc::new(MemoryScratch::default()),
            jpeg_quality: 80,
            progress: None,
        };
        let specs = partition_strips(20, 10, 2).unwrap();
        let job = UploadJob::new(page(20, 10), specs, panicking, CancelHandle::new());
        run_job(&pool, Arc::new(job));

        let ctx = context(
            Arc::new(RecordingStore::default()),
            Arc::new(MemoryScratch::default()),
        );
        let specs = partition_strips(20, 10, 2).unwrap();
        let job = UploadJob::new(page(20, 10), specs, ctx, CancelHandle::new());
        assert_eq!(run_job(&pool, Arc::new(job)).success_count(), 2);
    }

    #[test]
    fn test_empty_job_returns_empty_run() {
        let pool = WorkerPool::new(2).unwrap();
        let ctx = context(Arc::new(RecordingStore::default()), Arc::new(MemoryScratch::default()));
        let job = UploadJob::new(page(10, 10), Vec::new(), ctx, CancelHandle::new());
        assert!(run_job(&pool, Arc::new(job)).is_empty());
    }
}
