//! Background client: the receive loop runs as a scheduler task and reports
//! through a single callback.
//!
//! ```rust,no_run
//! use wsline::{AsyncClient, Config, Event};
//!
//! let client = AsyncClient::new("ws://127.0.0.1:9001/chat", Config::default())?;
//! client.connect_async(|event| match event {
//!     Event::Open => println!("open"),
//!     Event::Message(msg) => println!("got {msg:?}"),
//!     Event::Closed(status) => println!("closed: {status:?}"),
//!     Event::Error(err) => eprintln!("error: {err}"),
//!     Event::Pong => {}
//! })?;
//! client.send("hello");
//! client.close();
//! # Ok::<(), wsline::Error>(())
//! ```

use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::config::Config;
use crate::connection::{Connection, connect};
use crate::error::{Error, Result};
use crate::message::{CloseCode, CloseFrame, Incoming, Message};
use crate::scheduler::{Scheduler, Task, TaskContext, TaskHandle, ThreadScheduler};
use crate::sync::lock;
use crate::uri::ConnectionTarget;

/// Delivered to the callback passed to [`AsyncClient::connect_async`].
///
/// `Closed` and `Error` are terminal: nothing follows them for that run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// Handshake completed.
    Open,
    Message(Message),
    /// A Pong arrived.
    Pong,
    /// The peer closed the connection, or it ended without a Close frame.
    Closed(Option<CloseFrame>),
    /// The run failed: connect, protocol, I/O or task timeout.
    Error(Error),
}

#[derive(Default)]
struct State {
    connection: Option<Arc<Connection>>,
    running: bool,
    last_error: Option<String>,
    task: Option<TaskHandle>,
    /// Bumped per run so a finishing task never touches a newer run.
    generation: u64,
}

impl State {
    fn is_current(&self, generation: u64) -> bool {
        self.running && self.generation == generation
    }
}

/// A WebSocket client whose receive loop runs in the background.
///
/// All methods take `&self` and may be called from any thread while the
/// loop runs. The internal lock is only held to read or swap state, never
/// across network I/O.
pub struct AsyncClient {
    uri: String,
    target: ConnectionTarget,
    config: Config,
    scheduler: Arc<dyn Scheduler>,
    task_timeout: Option<Duration>,
    state: Arc<Mutex<State>>,
}

impl fmt::Debug for AsyncClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AsyncClient")
            .field("target", &self.target)
            .field("running", &self.is_running())
            .finish_non_exhaustive()
    }
}

impl AsyncClient {
    /// Create a client backed by its own single-worker [`ThreadScheduler`].
    ///
    /// # Errors
    ///
    /// - `Error::InvalidUri` if `uri` does not parse; no I/O happens
    /// - `Error::Io` if the worker thread cannot be spawned
    pub fn new(uri: &str, config: Config) -> Result<Self> {
        let target = ConnectionTarget::parse(uri)?;
        let scheduler = Arc::new(ThreadScheduler::new()?);
        Ok(Self::build(uri, target, config, scheduler))
    }

    /// Create a client that runs its receive loop on `scheduler`.
    ///
    /// # Errors
    ///
    /// `Error::InvalidUri` if `uri` does not parse.
    pub fn with_scheduler(uri: &str, config: Config, scheduler: Arc<dyn Scheduler>) -> Result<Self> {
        let target = ConnectionTarget::parse(uri)?;
        Ok(Self::build(uri, target, config, scheduler))
    }

    fn build(uri: &str, target: ConnectionTarget, config: Config, scheduler: Arc<dyn Scheduler>) -> Self {
        Self {
            uri: uri.to_string(),
            target,
            config,
            scheduler,
            task_timeout: None,
            state: Arc::new(Mutex::new(State::default())),
        }
    }

    /// Bound each run. When exceeded the loop stops and the callback
    /// receives `Event::Error(Error::TaskTimeout(..))`.
    #[must_use]
    pub fn with_task_timeout(mut self, timeout: Duration) -> Self {
        self.task_timeout = Some(timeout);
        self
    }

    pub fn target(&self) -> &ConnectionTarget {
        &self.target
    }

    /// Connect and run the receive loop in the background.
    ///
    /// Returns once the task is queued. The callback then sees `Open`
    /// followed by messages, and finally one `Closed` or `Error`, unless the
    /// run is ended by [`close`](AsyncClient::close), which emits nothing.
    ///
    /// # Errors
    ///
    /// - `Error::AlreadyRunning` if a run is still live
    /// - `Error::SchedulerClosed` if the scheduler rejects the task
    pub fn connect_async<F>(&self, callback: F) -> Result<()>
    where
        F: FnMut(Event) + Send + 'static,
    {
        let generation = {
            let mut state = lock(&self.state);
            if state.running {
                return Err(Error::AlreadyRunning);
            }
            state.running = true;
            state.last_error = None;
            state.generation += 1;
            state.generation
        };

        let run = Run {
            uri: self.uri.clone(),
            config: self.config.clone(),
            state: Arc::clone(&self.state),
            generation,
        };
        let mut task = Task::new(move |ctx| run.execute(ctx, callback));
        if let Some(timeout) = self.task_timeout {
            task = task.with_timeout(timeout);
        }

        match self.scheduler.submit(task) {
            Ok(handle) => {
                log::debug!("{}: receive task {} submitted", self.target, handle.id());
                let mut state = lock(&self.state);
                if state.generation == generation {
                    state.task = Some(handle);
                }
                Ok(())
            }
            Err(e) => {
                let mut state = lock(&self.state);
                if state.generation == generation {
                    state.running = false;
                }
                Err(e)
            }
        }
    }

    /// Send a message. Returns `false` if not connected or the write failed.
    pub fn send(&self, message: impl Into<Message>) -> bool {
        let message = message.into();
        self.with_connection(|conn| conn.send(message))
    }

    pub fn ping(&self, payload: impl Into<Vec<u8>>) -> bool {
        let payload = payload.into();
        self.with_connection(|conn| conn.ping(payload))
    }

    pub fn pong(&self, payload: impl Into<Vec<u8>>) -> bool {
        let payload = payload.into();
        self.with_connection(|conn| conn.pong(payload))
    }

    /// Stop the background run and close the connection.
    ///
    /// The connection is torn down immediately, which wakes a blocked
    /// receive. No callback event is produced. Safe to call at any time.
    pub fn close(&self) {
        let (connection, task) = {
            let mut state = lock(&self.state);
            state.running = false;
            (state.connection.take(), state.task.take())
        };

        if let Some(task) = task {
            task.request_stop();
        }
        if let Some(conn) = connection {
            log::debug!("{}: closing on request", self.target);
            conn.close(CloseCode::Normal, "");
        }
    }

    /// Returns `true` from `connect_async` until the run ends or is closed.
    pub fn is_running(&self) -> bool {
        lock(&self.state).running
    }

    pub fn is_connected(&self) -> bool {
        let connection = lock(&self.state).connection.clone();
        connection.is_some_and(|conn| conn.is_connected())
    }

    /// Description of the most recent failure, if any.
    pub fn last_error(&self) -> Option<String> {
        lock(&self.state).last_error.clone()
    }

    fn with_connection<F>(&self, op: F) -> bool
    where
        F: FnOnce(&Connection) -> Result<()>,
    {
        let connection = {
            let state = lock(&self.state);
            if !state.running {
                return false;
            }
            match &state.connection {
                Some(conn) => Arc::clone(conn),
                None => return false,
            }
        };

        match op(&connection) {
            Ok(()) => true,
            Err(e) => {
                log::debug!("{}: send failed: {e}", self.target);
                lock(&self.state).last_error = Some(e.to_string());
                false
            }
        }
    }
}

impl Drop for AsyncClient {
    fn drop(&mut self) {
        self.close();
    }
}

/// Everything one background run needs.
struct Run {
    uri: String,
    config: Config,
    state: Arc<Mutex<State>>,
    generation: u64,
}

enum Exit {
    Stopped,
    Closed(Option<CloseFrame>),
    Failed(Error),
}

impl Run {
    fn execute<F: FnMut(Event)>(self, ctx: &TaskContext, mut callback: F) -> Result<()> {
        let cleanup = Cleanup {
            state: &self.state,
            generation: self.generation,
        };

        let exit = match connect(&self.uri, &self.config) {
            Ok(conn) => {
                let conn = Arc::new(conn);
                if cleanup.attach(&conn) {
                    callback(Event::Open);
                    receive(ctx, &conn, &cleanup, &mut callback)
                } else {
                    conn.close(CloseCode::Normal, "");
                    Exit::Stopped
                }
            }
            Err(e) => Exit::Failed(e),
        };

        let current = cleanup.finish(&exit);
        match exit {
            Exit::Closed(status) if current => callback(Event::Closed(status)),
            Exit::Failed(err) => {
                if current {
                    callback(Event::Error(err.clone()));
                }
                return Err(err);
            }
            _ => {}
        }
        Ok(())
    }
}

fn receive<F: FnMut(Event)>(
    ctx: &TaskContext,
    conn: &Connection,
    cleanup: &Cleanup<'_>,
    callback: &mut F,
) -> Exit {
    loop {
        if ctx.should_stop() {
            return ctx.timeout_error().map_or(Exit::Stopped, Exit::Failed);
        }
        if !cleanup.is_current() {
            return Exit::Stopped;
        }

        match conn.recv() {
            Ok(Incoming::NoData) => {}
            Ok(Incoming::Message(msg)) => callback(Event::Message(msg)),
            Ok(Incoming::Pong) => callback(Event::Pong),
            Ok(Incoming::Closed(status)) => return Exit::Closed(status),
            Err(e) => return Exit::Failed(e),
        }
    }
}

/// Clears this run's share of the client state, also on panic.
struct Cleanup<'a> {
    state: &'a Mutex<State>,
    generation: u64,
}

impl Cleanup<'_> {
    fn is_current(&self) -> bool {
        lock(self.state).is_current(self.generation)
    }

    /// Publish the connection unless the run was closed meanwhile.
    fn attach(&self, conn: &Arc<Connection>) -> bool {
        let mut state = lock(self.state);
        if !state.is_current(self.generation) {
            return false;
        }
        state.connection = Some(Arc::clone(conn));
        true
    }

    /// Tear down and clear the run. Returns whether the run was still
    /// current, meaning its terminal event should be delivered.
    fn finish(&self, exit: &Exit) -> bool {
        let (connection, current) = {
            let mut state = lock(self.state);
            let current = state.is_current(self.generation);
            if !current {
                return false;
            }
            if let Exit::Failed(err) = exit {
                state.last_error = Some(err.to_string());
            }
            state.running = false;
            state.task = None;
            (state.connection.take(), current)
        };
        if let Some(conn) = connection {
            conn.close(CloseCode::Normal, "");
        }
        current
    }
}

impl Drop for Cleanup<'_> {
    fn drop(&mut self) {
        let connection = {
            let mut state = lock(self.state);
            if !state.is_current(self.generation) {
                return;
            }
            state.running = false;
            state.task = None;
            state.connection.take()
        };
        if let Some(conn) = connection {
            conn.close(CloseCode::InternalError, "");
        }
    }
}
