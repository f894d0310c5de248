use std::io::{self, Read, Write};
use std::net::{Shutdown, TcpStream};
use std::sync::{Arc, Mutex};

use rustls::pki_types::ServerName;
use rustls::{ClientConfig, ClientConnection};

use crate::connection::transport::{Transport, WriteHalf};
use crate::error::{Error, Result};
use crate::sync::lock;

const SCRATCH_SIZE: usize = 16 * 1024;

fn invalid_data(err: rustls::Error) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, err)
}

/// A TLS client session over a TCP socket, handshake completed.
pub struct TlsStream {
    conn: ClientConnection,
    sock: TcpStream,
}

impl TlsStream {
    /// Run the TLS handshake for `domain` over `sock`.
    ///
    /// The handshake is bounded by whatever read/write timeouts are set on
    /// the socket.
    ///
    /// # Errors
    ///
    /// - `Error::Tls` if the name is not a valid server name or the peer
    ///   fails certificate verification
    /// - `Error::Io` for transport failures
    pub fn connect(config: Arc<ClientConfig>, domain: &str, mut sock: TcpStream) -> Result<Self> {
        let server_name = ServerName::try_from(domain.to_string())
            .map_err(|_| Error::Tls(format!("invalid DNS name: {domain}")))?;
        let mut conn =
            ClientConnection::new(config, server_name).map_err(|e| Error::Tls(e.to_string()))?;

        while conn.is_handshaking() {
            conn.complete_io(&mut sock).map_err(|e| match e.kind() {
                io::ErrorKind::InvalidData => Error::Tls(e.to_string()),
                _ => Error::from(e),
            })?;
        }
        log::debug!(
            "TLS established with {domain}: {:?}",
            conn.negotiated_cipher_suite().map(|s| s.suite())
        );

        Ok(Self { conn, sock })
    }
}

impl Transport for TlsStream {
    type Reader = TlsReader;
    type Writer = TlsWriter;

    fn split(self) -> io::Result<(TlsReader, TlsWriter)> {
        let write_sock = self.sock.try_clone()?;
        let session = Arc::new(Mutex::new(self.conn));
        Ok((
            TlsReader {
                session: Arc::clone(&session),
                sock: self.sock,
                pending: Vec::new(),
                scratch: vec![0u8; SCRATCH_SIZE].into_boxed_slice(),
            },
            TlsWriter {
                session,
                sock: write_sock,
            },
        ))
    }
}

/// Read half of a split [`TlsStream`].
pub struct TlsReader {
    session: Arc<Mutex<ClientConnection>>,
    sock: TcpStream,
    /// Ciphertext received but not yet accepted by the session.
    pending: Vec<u8>,
    scratch: Box<[u8]>,
}

impl Read for TlsReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        loop {
            {
                let mut conn = lock(&self.session);

                if !self.pending.is_empty() {
                    let mut rd = &self.pending[..];
                    let used = conn.read_tls(&mut rd)?;
                    self.pending.drain(..used);
                    conn.process_new_packets().map_err(invalid_data)?;
                }

                match conn.reader().read(buf) {
                    Ok(n) => return Ok(n),
                    Err(e) if e.kind() == io::ErrorKind::WouldBlock => {}
                    Err(e) => return Err(e),
                }

                // Session may owe the peer records (alerts, key updates).
                while conn.wants_write() {
                    conn.write_tls(&mut self.sock)?;
                }

                if !self.pending.is_empty() {
                    continue;
                }
            }

            let n = self.sock.read(&mut self.scratch)?;
            if n == 0 {
                return Ok(0);
            }
            self.pending.extend_from_slice(&self.scratch[..n]);
        }
    }
}

/// Write half of a split [`TlsStream`].
pub struct TlsWriter {
    session: Arc<Mutex<ClientConnection>>,
    sock: TcpStream,
}

impl TlsWriter {
    fn flush_records(&mut self, conn: &mut ClientConnection) -> io::Result<()> {
        while conn.wants_write() {
            conn.write_tls(&mut self.sock)?;
        }
        Ok(())
    }
}

impl Write for TlsWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let session = Arc::clone(&self.session);
        let mut conn = lock(&session);
        let n = conn.writer().write(buf)?;
        self.flush_records(&mut conn)?;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        let session = Arc::clone(&self.session);
        let mut conn = lock(&session);
        conn.writer().flush()?;
        self.flush_records(&mut conn)?;
        self.sock.flush()
    }
}

impl WriteHalf for TlsWriter {
    fn teardown(&mut self) -> io::Result<()> {
        {
            let session = Arc::clone(&self.session);
            let mut conn = lock(&session);
            conn.send_close_notify();
            let _ = self.flush_records(&mut conn);
        }
        match self.sock.shutdown(Shutdown::Both) {
            Err(e) if e.kind() == io::ErrorKind::NotConnected => Ok(()),
            other => other,
        }
    }
}
