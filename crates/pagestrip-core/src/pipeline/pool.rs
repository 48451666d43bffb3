//! Fixed-size pool of long-lived worker threads.
//!
//! Tasks are boxed closures pushed through a `crossbeam-channel`; every
//! worker pulls from the same receiver. A panicking task is caught so the
//! thread survives and keeps serving later runs.

use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::thread::{self, JoinHandle};

use crossbeam_channel::{Receiver, Sender};

type Task = Box<dyn FnOnce() + Send + 'static>;

pub struct WorkerPool {
    sender: Option<Sender<Task>>,
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Spawn `size` worker threads (at least one).
    pub fn new(size: usize) -> io::Result<Self> {
        let size = size.max(1);
        let (sender, receiver) = crossbeam_channel::unbounded::<Task>();

        let mut handles = Vec::with_capacity(size);
        for id in 0..size {
            let receiver = receiver.clone();
            let handle = thread::Builder::new()
                .name(format!("pagestrip-worker-{id}"))
                .spawn(move || worker_loop(receiver))?;
            handles.push(handle);
        }

        Ok(Self {
            sender: Some(sender),
            handles,
        })
    }

    pub fn size(&self) -> usize {
        self.handles.len()
    }

    /// Queue `task` for the next free worker. Returns `false` if the pool
    /// no longer accepts work; the task is dropped in that case.
    pub fn execute<F>(&self, task: F) -> bool
    where
        F: FnOnce() + Send + 'static,
    {
        match &self.sender {
            Some(sender) => sender.send(Box::new(task)).is_ok(),
            None => false,
        }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        // Closing the channel ends every worker loop once the queue drains.
        self.sender.take();
        for handle in self.handles.drain(..) {
            let _ = handle.join();
        }
    }
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("size", &self.handles.len())
            .finish()
    }
}

fn worker_loop(receiver: Receiver<Task>) {
    for task in receiver.iter() {
        if panic::catch_unwind(AssertUnwindSafe(task)).is_err() {
            tracing::error!(
                worker = thread::current().name().unwrap_or("unnamed"),
                "pool task panicked"
            );
        }
    }
}

/// Signals the dispatcher when dropped, including during a panic unwind.
///
/// Move one into each dispatched task; the dispatcher treats the channel
/// disconnecting as "every task has finished".
pub(crate) struct Completion {
    done: Sender<()>,
}

impl Completion {
    pub(crate) fn new(done: Sender<()>) -> Self {
        Self { done }
    }
}

impl Drop for Completion {
    fn drop(&mut self) {
        let _ = self.done.send(());
    }
}
