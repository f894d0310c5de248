//! Synchronous WebSocket client connection and its transports.
//!
//! `Connection` owns both halves of a split transport. Every method takes
//! `&self`, so one thread can block in [`Connection::recv`] while others
//! send, ping or close through a shared `Arc<Connection>`.
//!
//! ## Connection Lifecycle
//!
//! 1. **Connecting** - TCP/TLS connect and upgrade handshake
//! 2. **Open** - Frames flow both ways
//! 3. **Closing** - Our Close frame is being written
//! 4. **Closed** - Transport torn down
//!
//! ## Example
//!
//! ```rust,no_run
//! use wsline::{CloseCode, Config, Incoming, Message};
//!
//! let conn = wsline::connect("ws://127.0.0.1:9001/chat", &Config::default())?;
//! conn.send(Message::text("Hello"))?;
//! loop {
//!     match conn.recv()? {
//!         Incoming::Message(msg) => println!("Received: {:?}", msg),
//!         Incoming::NoData | Incoming::Pong => continue,
//!         Incoming::Closed(_) => break,
//!     }
//! }
//! conn.close(CloseCode::Normal, "done");
//! # Ok::<(), wsline::Error>(())
//! ```

mod state;
pub mod transport;

#[allow(clippy::module_inception)]
mod connection;

pub use connection::{Connection, connect};
pub use state::ConnectionState;
pub use transport::{MaybeTlsStream, Transport, WriteHalf};
