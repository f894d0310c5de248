//! Cooperative task scheduling for background receive loops.
//!
//! A [`Task`] is a unit of blocking work that is expected to check
//! [`TaskContext::should_stop`] regularly. Nothing is preempted: stopping a
//! task, or letting it exceed its timeout, only raises a flag that the work
//! observes at its next check.
//!
//! Two schedulers are provided:
//!
//! - [`ThreadScheduler`]: a fixed set of worker threads pulling from a
//!   shared FIFO queue. With one worker, each task runs to completion before
//!   the next one starts.
//! - `TokioScheduler` (feature `async-tokio`): hands tasks to a Tokio
//!   runtime's blocking pool.

use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

use crate::error::{Error, Result};
use crate::sync::lock;

mod thread;
#[cfg(feature = "async-tokio")]
mod tokio_rt;

pub use thread::ThreadScheduler;
#[cfg(feature = "async-tokio")]
pub use tokio_rt::TokioScheduler;

/// Something that runs [`Task`]s in the background.
pub trait Scheduler: Send + Sync {
    /// Queue a task for execution.
    ///
    /// # Errors
    ///
    /// `Error::SchedulerClosed` if the scheduler no longer accepts work.
    fn submit(&self, task: Task) -> Result<TaskHandle>;
}

type Work = Box<dyn FnOnce(&TaskContext) -> Result<()> + Send + 'static>;

static NEXT_TASK_ID: AtomicU64 = AtomicU64::new(1);

/// A unit of blocking work.
pub struct Task {
    work: Work,
    timeout: Option<Duration>,
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl Task {
    pub fn new<F>(work: F) -> Self
    where
        F: FnOnce(&TaskContext) -> Result<()> + Send + 'static,
    {
        Self {
            work: Box::new(work),
            timeout: None,
        }
    }

    /// Limit how long the task may run. Once exceeded, `should_stop`
    /// returns `true` and the task ends with `Error::TaskTimeout`.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Pair the task with the state its handle observes.
    pub(crate) fn prepare(self) -> (Self, Arc<TaskShared>) {
        let id = NEXT_TASK_ID.fetch_add(1, Ordering::Relaxed);
        (self, Arc::new(TaskShared::new(id)))
    }

    /// Run the task on the current thread and publish its outcome.
    pub(crate) fn execute(self, shared: Arc<TaskShared>) {
        if shared.stop.load(Ordering::Acquire) {
            log::debug!("task {} cancelled before start", shared.id);
            shared.finish(TaskOutcome::Cancelled);
            return;
        }

        let ctx = TaskContext {
            shared: Arc::clone(&shared),
            started: Instant::now(),
            timeout: self.timeout,
        };
        log::debug!("task {} started", shared.id);

        let work = self.work;
        let outcome = match catch_unwind(AssertUnwindSafe(|| work(&ctx))) {
            Ok(Ok(())) => match ctx.timeout_error() {
                Some(err) => TaskOutcome::Failed(err),
                None => TaskOutcome::Completed,
            },
            Ok(Err(err)) => TaskOutcome::Failed(err),
            Err(_) => TaskOutcome::Panicked,
        };

        log::debug!(
            "task {} finished after {:?}: {:?}",
            shared.id,
            ctx.elapsed(),
            outcome
        );
        shared.finish(outcome);
    }
}

/// How a task ended.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum TaskOutcome {
    /// The work returned `Ok`.
    Completed,
    /// The work returned an error, or exceeded its timeout.
    Failed(Error),
    /// The work panicked.
    Panicked,
    /// Stopped before it started, or dropped by a scheduler shutdown.
    Cancelled,
}

pub(crate) struct TaskShared {
    id: u64,
    stop: AtomicBool,
    timed_out: AtomicBool,
    outcome: Mutex<Option<TaskOutcome>>,
    done: Condvar,
}

impl TaskShared {
    fn new(id: u64) -> Self {
        Self {
            id,
            stop: AtomicBool::new(false),
            timed_out: AtomicBool::new(false),
            outcome: Mutex::new(None),
            done: Condvar::new(),
        }
    }

    pub(crate) fn request_stop(&self) {
        self.stop.store(true, Ordering::Release);
    }

    pub(crate) fn finish(&self, outcome: TaskOutcome) {
        let mut slot = lock(&self.outcome);
        if slot.is_none() {
            *slot = Some(outcome);
        }
        self.done.notify_all();
    }
}

/// Handed to the running work: stop flag, deadline and identity.
pub struct TaskContext {
    shared: Arc<TaskShared>,
    started: Instant,
    timeout: Option<Duration>,
}

impl fmt::Debug for TaskContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskContext")
            .field("id", &self.shared.id)
            .field("elapsed", &self.elapsed())
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl TaskContext {
    /// Returns `true` once a stop was requested or the timeout has passed.
    pub fn should_stop(&self) -> bool {
        if self.shared.stop.load(Ordering::Acquire) {
            return true;
        }
        match self.timeout {
            Some(limit) if self.started.elapsed() >= limit => {
                self.shared.timed_out.store(true, Ordering::Release);
                self.shared.request_stop();
                true
            }
            _ => false,
        }
    }

    /// The `TaskTimeout` error if the deadline has been observed as passed.
    pub fn timeout_error(&self) -> Option<Error> {
        if !self.shared.timed_out.load(Ordering::Acquire) {
            return None;
        }
        self.timeout.map(Error::TaskTimeout)
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    pub fn id(&self) -> u64 {
        self.shared.id
    }
}

/// Observe and control a submitted task.
#[derive(Clone)]
pub struct TaskHandle {
    shared: Arc<TaskShared>,
}

impl fmt::Debug for TaskHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskHandle")
            .field("id", &self.shared.id)
            .field("finished", &self.is_finished())
            .finish()
    }
}

impl TaskHandle {
    pub(crate) fn new(shared: Arc<TaskShared>) -> Self {
        Self { shared }
    }

    pub fn id(&self) -> u64 {
        self.shared.id
    }

    /// Ask the task to stop at its next check. Has no effect once finished.
    pub fn request_stop(&self) {
        self.shared.request_stop();
    }

    pub fn is_finished(&self) -> bool {
        lock(&self.shared.outcome).is_some()
    }

    /// The outcome, once the task has finished.
    pub fn outcome(&self) -> Option<TaskOutcome> {
        lock(&self.shared.outcome).clone()
    }

    /// The error the task ended with, if any.
    pub fn error(&self) -> Option<Error> {
        match self.outcome() {
            Some(TaskOutcome::Failed(err)) => Some(err),
            _ => None,
        }
    }

    /// Block until the task finishes or `timeout` elapses. Returns `true`
    /// if the task finished.
    pub fn wait(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut outcome = lock(&self.shared.outcome);
        while outcome.is_none() {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return false;
            }
            outcome = self
                .shared
                .done
                .wait_timeout(outcome, remaining)
                .map(|(guard, _)| guard)
                .unwrap_or_else(|poisoned| poisoned.into_inner().0);
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(task: Task) -> TaskHandle {
        let (task, shared) = task.prepare();
        let handle = TaskHandle::new(Arc::clone(&shared));
        task.execute(shared);
        handle
    }

    #[test]
    fn test_completed() {
        let handle = run(Task::new(|_| Ok(())));
        assert!(handle.is_finished());
        assert_eq!(handle.outcome(), Some(TaskOutcome::Completed));
        assert_eq!(handle.error(), None);
    }

    #[test]
    fn test_failed() {
        let handle = run(Task::new(|_| Err(Error::NotConnected)));
        assert_eq!(handle.error(), Some(Error::NotConnected));
    }

    #[test]
    fn test_panic_is_caught() {
        let handle = run(Task::new(|_| panic!("boom")));
        assert_eq!(handle.outcome(), Some(TaskOutcome::Panicked));
    }

    #[test]
    fn test_stop_before_start() {
        let (task, shared) = Task::new(|_| Ok(())).prepare();
        let handle = TaskHandle::new(Arc::clone(&shared));
        handle.request_stop();
        task.execute(shared);
        assert_eq!(handle.outcome(), Some(TaskOutcome::Cancelled));
    }

    #[test]
    fn test_timeout_sets_stop_and_error() {
        let limit = Duration::from_millis(20);
        let handle = run(
            Task::new(|ctx| {
                while !ctx.should_stop() {
                    std::thread::sleep(Duration::from_millis(2));
                }
                assert!(ctx.elapsed() >= Duration::from_millis(20));
                Ok(())
            })
            .with_timeout(limit),
        );
        assert_eq!(handle.error(), Some(Error::TaskTimeout(limit)));
    }

    #[test]
    fn test_no_timeout_error_when_stopped_early() {
        let handle = run(
            Task::new(|ctx| {
                ctx.shared.request_stop();
                assert!(ctx.should_stop());
                assert_eq!(ctx.timeout_error(), None);
                Ok(())
            })
            .with_timeout(Duration::from_secs(60)),
        );
        assert_eq!(handle.outcome(), Some(TaskOutcome::Completed));
    }

    #[test]
    fn test_wait_times_out_while_running() {
        let (_task, shared) = Task::new(|_| Ok(())).prepare();
        let handle = TaskHandle::new(shared);
        assert!(!handle.wait(Duration::from_millis(10)));
    }

    #[test]
    fn test_first_outcome_wins() {
        let (_task, shared) = Task::new(|_| Ok(())).prepare();
        let handle = TaskHandle::new(Arc::clone(&shared));
        shared.finish(TaskOutcome::Completed);
        shared.finish(TaskOutcome::Panicked);
        assert!(handle.wait(Duration::ZERO));
        assert_eq!(handle.outcome(), Some(TaskOutcome::Completed));
    }

    #[test]
    fn test_ids_are_unique() {
        let (_a, a) = Task::new(|_| Ok(())).prepare();
        let (_b, b) = Task::new(|_| Ok(())).prepare();
        assert_ne!(a.id, b.id);
    }
}
