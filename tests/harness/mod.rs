//! Test harness: a scripted WebSocket peer on a loopback socket.
//!
//! Each `TestServer` accepts one connection on a std thread, answers the
//! upgrade request and then runs a per-test script against the `Peer`.

#![allow(dead_code)]

mod server;

pub use server::{Peer, TestServer, accept_upgrade, read_request};
