use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::thread::{self, JoinHandle};

use crossbeam_queue::SegQueue;

use super::{Scheduler, Task, TaskHandle, TaskOutcome, TaskShared};
use crate::error::{Error, Result};
use crate::sync::lock;

struct Job {
    task: Task,
    shared: Arc<TaskShared>,
}

struct Inner {
    /// Pending work, oldest first.
    queue: SegQueue<Job>,
    /// Idle workers park here until work is queued or on shutdown.
    parking: Mutex<()>,
    available: Condvar,
    shutdown: AtomicBool,
    /// Tasks currently executing, so shutdown can ask them to stop.
    running: Mutex<Vec<Arc<TaskShared>>>,
}

/// Runs tasks on a fixed pool of worker threads.
///
/// Tasks are taken in submission order. With a single worker (the default)
/// a task runs to completion before the next one starts. Dropping the
/// scheduler cancels queued tasks, asks running ones to stop and joins the
/// workers.
pub struct ThreadScheduler {
    inner: Arc<Inner>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl fmt::Debug for ThreadScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ThreadScheduler")
            .field("workers", &lock(&self.workers).len())
            .field("pending", &self.pending())
            .field("shutdown", &self.inner.shutdown.load(Ordering::Relaxed))
            .finish()
    }
}

impl ThreadScheduler {
    /// A scheduler with one worker thread.
    ///
    /// # Errors
    ///
    /// `Error::Io` if the worker thread cannot be spawned.
    pub fn new() -> Result<Self> {
        Self::with_workers(1)
    }

    /// A scheduler with `workers` threads (at least one).
    ///
    /// # Errors
    ///
    /// `Error::Io` if a worker thread cannot be spawned.
    pub fn with_workers(workers: usize) -> Result<Self> {
        let inner = Arc::new(Inner {
            queue: SegQueue::new(),
            parking: Mutex::new(()),
            available: Condvar::new(),
            shutdown: AtomicBool::new(false),
            running: Mutex::new(Vec::new()),
        });
        let scheduler = Self {
            inner,
            workers: Mutex::new(Vec::new()),
        };

        for n in 0..workers.max(1) {
            let inner = Arc::clone(&scheduler.inner);
            let handle = thread::Builder::new()
                .name(format!("wsline-worker-{n}"))
                .spawn(move || worker_loop(&inner))?;
            lock(&scheduler.workers).push(handle);
        }
        Ok(scheduler)
    }

    /// Number of tasks waiting for a worker.
    pub fn pending(&self) -> usize {
        self.inner.queue.len()
    }

    /// Stop accepting work, cancel queued tasks and ask running ones to
    /// stop. Does not wait; dropping the scheduler also joins the workers.
    pub fn shutdown(&self) {
        if self.inner.shutdown.swap(true, Ordering::AcqRel) {
            return;
        }
        log::debug!("thread scheduler shutting down");

        self.inner.cancel_queued();
        for shared in lock(&self.inner.running).iter() {
            shared.request_stop();
        }
        self.inner.wake(true);
    }
}

impl Scheduler for ThreadScheduler {
    fn submit(&self, task: Task) -> Result<TaskHandle> {
        if self.inner.shutdown.load(Ordering::Acquire) {
            return Err(Error::SchedulerClosed);
        }
        let (task, shared) = task.prepare();
        let handle = TaskHandle::new(Arc::clone(&shared));
        self.inner.queue.push(Job { task, shared });

        // Shutdown may have drained the queue between the check and the push.
        if self.inner.shutdown.load(Ordering::Acquire) {
            self.inner.cancel_queued();
            return Err(Error::SchedulerClosed);
        }
        self.inner.wake(false);
        log::trace!("task {} queued", handle.id());
        Ok(handle)
    }
}

impl Inner {
    fn cancel_queued(&self) {
        while let Some(job) = self.queue.pop() {
            job.shared.finish(TaskOutcome::Cancelled);
        }
    }

    /// Notify under the parking lock so a worker about to park cannot miss it.
    fn wake(&self, all: bool) {
        let _guard = lock(&self.parking);
        if all {
            self.available.notify_all();
        } else {
            self.available.notify_one();
        }
    }

    /// Next job, parking while the queue is empty. `None` once shut down.
    fn next_job(&self) -> Option<Job> {
        loop {
            if let Some(job) = self.queue.pop() {
                return Some(job);
            }
            let guard = lock(&self.parking);
            if self.shutdown.load(Ordering::Acquire) {
                return None;
            }
            if self.queue.is_empty() {
                drop(
                    self.available
                        .wait(guard)
                        .unwrap_or_else(PoisonError::into_inner),
                );
            }
        }
    }
}

impl Drop for ThreadScheduler {
    fn drop(&mut self) {
        self.shutdown();
        let current = thread::current().id();
        for worker in lock(&self.workers).drain(..) {
            // A task holding the last reference may drop us from a worker.
            if worker.thread().id() != current {
                let _ = worker.join();
            }
        }
    }
}

fn worker_loop(inner: &Inner) {
    while let Some(job) = inner.next_job() {
        if inner.shutdown.load(Ordering::Acquire) {
            job.shared.finish(TaskOutcome::Cancelled);
            continue;
        }

        lock(&inner.running).push(Arc::clone(&job.shared));
        if inner.shutdown.load(Ordering::Acquire) {
            job.shared.request_stop();
        }

        let shared = Arc::clone(&job.shared);
        job.task.execute(job.shared);

        lock(&inner.running).retain(|s| !Arc::ptr_eq(s, &shared));
    }
}
