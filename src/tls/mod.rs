//! TLS support for secure WebSocket (`wss://`) connections.
//!
//! Backed by rustls with the webpki root store by default. The TLS session
//! is split like a plain socket: each half owns a clone of the TCP socket
//! and both share the rustls session behind a lock that is never held
//! while waiting on the network.

mod rustls_impl;

pub use rustls_impl::{TlsReader, TlsStream, TlsWriter};

use std::sync::Arc;

use rustls::ClientConfig;

/// Client configuration trusting the Mozilla root store from `webpki-roots`.
#[must_use]
pub fn client_config_with_webpki_roots() -> Arc<ClientConfig> {
    let root_store =
        rustls::RootCertStore::from_iter(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());

    let config = ClientConfig::builder()
        .with_root_certificates(root_store)
        .with_no_client_auth();

    Arc::new(config)
}
