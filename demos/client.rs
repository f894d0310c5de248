//! Simple WebSocket client demo.
//!
//! Point it at any echo server:
//!   cargo run --example client -- ws://127.0.0.1:9001/
//!
//! The first half talks to the server from the current thread; the second
//! half runs the receive loop in the background and reacts through a callback.

use std::error::Error;
use std::sync::mpsc;
use std::time::Duration;

use wsline::{AsyncClient, CloseCode, Config, Event, Incoming, Message};

const DEFAULT_URI: &str = "ws://127.0.0.1:9001/";

fn main() -> Result<(), Box<dyn Error>> {
    let uri = std::env::args().nth(1).unwrap_or_else(|| DEFAULT_URI.to_string());
    let config = Config::default().with_read_timeout(Duration::from_millis(250));

    println!("Connecting to {uri}");
    let conn = wsline::connect(&uri, &config)?;
    println!("Handshake complete");

    conn.send(Message::text("Hello, WebSocket!"))?;
    conn.ping(b"demo".to_vec())?;

    for _ in 0..20 {
        match conn.recv()? {
            Incoming::Message(msg) => {
                println!("Received: {msg:?}");
                break;
            }
            Incoming::Pong => println!("Pong"),
            Incoming::NoData => continue,
            Incoming::Closed(status) => {
                println!("Server closed: {status:?}");
                return Ok(());
            }
        }
    }
    conn.close(CloseCode::Normal, "demo done");

    println!("Starting background client");
    let client = AsyncClient::new(&uri, config)?;
    let (tx, rx) = mpsc::channel();
    client.connect_async(move |event| {
        let _ = tx.send(event);
    })?;

    while let Ok(event) = rx.recv_timeout(Duration::from_secs(5)) {
        match event {
            Event::Open => {
                println!("Open");
                client.send("Hello from the foreground thread");
            }
            Event::Message(msg) => {
                println!("Received: {msg:?}");
                break;
            }
            Event::Pong => println!("Pong"),
            Event::Closed(status) => {
                println!("Closed: {status:?}");
                break;
            }
            Event::Error(err) => {
                println!("Error: {err}");
                break;
            }
        }
    }

    client.close();
    Ok(())
}
