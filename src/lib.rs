//! # wsline - Blocking WebSocket client with a background runner
//!
//! `wsline` is a small RFC 6455 WebSocket client for blocking I/O. It suits
//! devices and services that would rather not pull in an async runtime just
//! to keep a socket open.
//!
//! ## Features
//!
//! - **Blocking `Connection`** shareable across threads behind an `Arc`
//! - **Background `AsyncClient`** running its receive loop on a cooperative
//!   [`Scheduler`] and reporting through one callback
//! - **Strict framing**: masked client frames, control-frame limits,
//!   reserved-bit and opcode checks, frame size limits
//! - **TLS** for `wss://` with rustls (feature `tls-rustls`)
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use wsline::{CloseCode, Config, Incoming, Message};
//!
//! let conn = wsline::connect("ws://127.0.0.1:9001/chat", &Config::default())?;
//! conn.send(Message::text("hi"))?;
//! if let Incoming::Message(reply) = conn.recv()? {
//!     println!("{reply:?}");
//! }
//! conn.close(CloseCode::Normal, "bye");
//! # Ok::<(), wsline::Error>(())
//! ```

pub mod client;
pub mod config;
pub mod connection;
pub mod error;
pub mod message;
pub mod protocol;
pub mod scheduler;
pub mod uri;

mod sync;

#[cfg(feature = "tls-rustls")]
pub mod tls;

pub use client::{AsyncClient, Event};
pub use config::{Config, Limits, Timeouts};
pub use connection::{Connection, ConnectionState, MaybeTlsStream, Transport, connect};
pub use error::{Error, Result};
pub use message::{CloseCode, CloseFrame, Incoming, Message};
pub use protocol::{Frame, OpCode, WS_GUID, compute_accept_key};
#[cfg(feature = "async-tokio")]
pub use scheduler::TokioScheduler;
pub use scheduler::{Scheduler, Task, TaskContext, TaskHandle, TaskOutcome, ThreadScheduler};
pub use uri::{ConnectionTarget, Scheme};
