use std::sync::Arc;

use tokio::runtime::Handle;

use super::{Scheduler, Task, TaskHandle};
use crate::error::{Error, Result};

/// Runs tasks on a Tokio runtime's blocking thread pool.
///
/// Each task occupies one blocking thread for its whole lifetime, so the
/// runtime's async workers are never blocked by a receive loop.
#[derive(Debug, Clone)]
pub struct TokioScheduler {
    handle: Handle,
}

impl TokioScheduler {
    pub fn new(handle: Handle) -> Self {
        Self { handle }
    }

    /// Use the runtime the caller is running inside.
    ///
    /// # Errors
    ///
    /// `Error::SchedulerClosed` when called outside a Tokio runtime.
    pub fn current() -> Result<Self> {
        Handle::try_current()
            .map(Self::new)
            .map_err(|_| Error::SchedulerClosed)
    }
}

impl Scheduler for TokioScheduler {
    fn submit(&self, task: Task) -> Result<TaskHandle> {
        let (task, shared) = task.prepare();
        let handle = TaskHandle::new(Arc::clone(&shared));
        // The JoinHandle is not needed: the outcome is published through `shared`.
        drop(self.handle.spawn_blocking(move || task.execute(shared)));
        log::trace!("task {} handed to tokio", handle.id());
        Ok(handle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::TaskOutcome;
    use std::time::Duration;

    #[tokio::test(flavor = "multi_thread")]
    async fn test_runs_on_blocking_pool() {
        let scheduler = TokioScheduler::current().unwrap();
        let (started_tx, started_rx) = std::sync::mpsc::channel();
        let handle = scheduler
            .submit(Task::new(move |ctx| {
                started_tx.send(()).unwrap();
                while !ctx.should_stop() {
                    std::thread::sleep(Duration::from_millis(5));
                }
                Ok(())
            }))
            .unwrap();

        tokio::task::spawn_blocking(move || started_rx.recv_timeout(Duration::from_secs(5)))
            .await
            .unwrap()
            .unwrap();
        handle.request_stop();
        let waiter = handle.clone();
        let finished = tokio::task::spawn_blocking(move || waiter.wait(Duration::from_secs(5)))
            .await
            .unwrap();
        assert!(finished);
        assert_eq!(handle.outcome(), Some(TaskOutcome::Completed));
    }

    #[test]
    fn test_current_outside_runtime() {
        assert!(matches!(
            TokioScheduler::current(),
            Err(Error::SchedulerClosed)
        ));
    }
}
