//! Local scratch storage for encoded strips.
//!
//! Each strip is written to a short-lived local file between encoding and
//! upload. The file belongs to the worker that created it and is removed
//! once the upload attempt is over, whatever its outcome.

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use tracing::warn;

use crate::partition::StripSpec;

/// Create, read back, and remove transient files.
pub trait ScratchStorage: Send + Sync {
    /// Store `bytes` under `name` and return where they went.
    fn create(&self, name: &str, bytes: &[u8]) -> io::Result<PathBuf>;

    fn read(&self, path: &Path) -> io::Result<Vec<u8>>;

    fn remove(&self, path: &Path) -> io::Result<()>;
}

/// Scratch files in a single flat directory.
#[derive(Debug, Clone)]
pub struct DirScratch {
    root: PathBuf,
}

impl DirScratch {
    /// Use `root` as the scratch directory, creating it if needed.
    pub fn new(root: impl Into<PathBuf>) -> io::Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl ScratchStorage for DirScratch {
    fn create(&self, name: &str, bytes: &[u8]) -> io::Result<PathBuf> {
        let path = self.root.join(name);
        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)?;
        write_or_discard(&path, &mut file, bytes, |file| file.sync_all())?;
        Ok(path)
    }

    fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
        fs::read(path)
    }

    fn remove(&self, path: &Path) -> io::Result<()> {
        fs::remove_file(path)
    }
}

/// Write `bytes` through `writer`, then `finish` it. On any failure the
/// half-written file at `path` is removed before the error is returned.
fn write_or_discard<W: Write>(
    path: &Path,
    writer: &mut W,
    bytes: &[u8],
    finish: impl FnOnce(&mut W) -> io::Result<()>,
) -> io::Result<()> {
    let written = writer.write_all(bytes).and_then(|()| finish(writer));
    if written.is_err() {
        if let Err(err) = fs::remove_file(path) {
            warn!(path = %path.display(), error = %err, "failed to remove partial scratch file");
        }
    }
    written
}

/// An encoded strip sitting in scratch storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StripArtifact {
    pub spec: StripSpec,
    pub path: PathBuf,
    pub len: usize,
}

static RUN_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Tag that keeps scratch names of concurrent runs (and processes) apart.
pub fn next_run_tag() -> String {
    let seq = RUN_COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("{}-{}", std::process::id(), seq)
}

/// Scratch file name for strip `index` of the run tagged `run_tag`.
pub fn artifact_name(run_tag: &str, index: usize) -> String {
    format!("{run_tag}_strip_{}.jpg", index + 1)
}
