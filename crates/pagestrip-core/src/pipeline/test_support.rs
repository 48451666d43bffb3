//! In-memory store and scratch doubles for pipeline tests.

use std::collections::{HashMap, HashSet};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use crate::scratch::ScratchStorage;
use crate::store::{RemoteStore, StoreError};

/// Records uploads by file name and fails the strips it is told to.
#[derive(Default)]
pub(crate) struct RecordingStore {
    pub fail_names: HashSet<String>,
    pub delay: Option<Duration>,
    pub uploads: Mutex<Vec<(String, usize)>>,
    pub deletes: Mutex<Vec<String>>,
    pub fail_deletes: bool,
    pub in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,
}

impl RecordingStore {
    pub fn failing(names: &[&str]) -> Self {
        Self {
            fail_names: names.iter().map(|n| n.to_string()).collect(),
            ..Self::default()
        }
    }

    pub fn upload_count(&self) -> usize {
        self.uploads.lock().unwrap().len()
    }
}

impl RemoteStore for RecordingStore {
    fn upload(&self, bytes: &[u8], name: &str) -> Result<String, StoreError> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            std::thread::sleep(delay);
        }
        self.uploads
            .lock()
            .unwrap()
            .push((name.to_string(), bytes.len()));
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if self.fail_names.contains(name) {
            return Err(StoreError::Server { status: 500 });
        }
        Ok(format!("https://blob.test/strips/{name}"))
    }

    fn delete(&self, location: &str) -> Result<(), StoreError> {
        self.deletes.lock().unwrap().push(location.to_string());
        if self.fail_deletes {
            return Err(StoreError::Timeout);
        }
        Ok(())
    }
}

/// Keeps artifacts in memory and counts create/remove calls per path.
#[derive(Default)]
pub(crate) struct MemoryScratch {
    pub files: Mutex<HashMap<PathBuf, Vec<u8>>>,
    pub created: Mutex<Vec<PathBuf>>,
    pub removed: Mutex<Vec<PathBuf>>,
    pub fail_remove: bool,
}

impl MemoryScratch {
    pub fn created_count(&self) -> usize {
        self.created.lock().unwrap().len()
    }

    pub fn removed_count(&self) -> usize {
        self.removed.lock().unwrap().len()
    }

    pub fn live_files(&self) -> usize {
        self.files.lock().unwrap().len()
    }
}

impl ScratchStorage for MemoryScratch {
    fn create(&self, name: &str, bytes: &[u8]) -> io::Result<PathBuf> {
        let path = PathBuf::from("/scratch").join(name);
        let mut files = self.files.lock().unwrap();
        if files.contains_key(&path) {
            return Err(io::Error::from(io::ErrorKind::AlreadyExists));
        }
        files.insert(path.clone(), bytes.to_vec());
        self.created.lock().unwrap().push(path.clone());
        Ok(path)
    }

    fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
        self.files
            .lock()
            .unwrap()
            .get(path)
            .cloned()
            .ok_or_else(|| io::Error::from(io::ErrorKind::NotFound))
    }

    fn remove(&self, path: &Path) -> io::Result<()> {
        self.removed.lock().unwrap().push(path.to_path_buf());
        if self.fail_remove {
            return Err(io::Error::new(io::ErrorKind::PermissionDenied, "locked"));
        }
        self.files
            .lock()
            .unwrap()
            .remove(path)
            .map(|_| ())
            .ok_or_else(|| io::Error::from(io::ErrorKind::NotFound))
    }
}
