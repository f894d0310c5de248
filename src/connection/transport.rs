//! Byte-stream transports a connection can run over.
//!
//! A transport is split into a read half, used only by `recv`, and a write
//! half shared by every sender. Tearing down the write half must also
//! unblock a read pending on the read half.

use std::io::{self, Read, Write};
use std::net::{Shutdown, TcpStream};

/// Write half of a split transport.
pub trait WriteHalf: Write + Send + 'static {
    /// Shut the transport down in both directions.
    ///
    /// # Errors
    ///
    /// Returns the underlying error; callers treat teardown as best-effort.
    fn teardown(&mut self) -> io::Result<()>;
}

/// A connected byte stream that can be split into independent halves.
pub trait Transport: Send + 'static {
    type Reader: Read + Send + 'static;
    type Writer: WriteHalf;

    /// Split into a read half and a write half.
    ///
    /// # Errors
    ///
    /// Returns an error if the stream cannot be duplicated.
    fn split(self) -> io::Result<(Self::Reader, Self::Writer)>;
}

impl WriteHalf for TcpStream {
    fn teardown(&mut self) -> io::Result<()> {
        match TcpStream::shutdown(self, Shutdown::Both) {
            Err(e) if e.kind() == io::ErrorKind::NotConnected => Ok(()),
            other => other,
        }
    }
}

impl Transport for TcpStream {
    type Reader = TcpStream;
    type Writer = TcpStream;

    fn split(self) -> io::Result<(TcpStream, TcpStream)> {
        let writer = self.try_clone()?;
        Ok((self, writer))
    }
}

/// Plain TCP or, with the `tls-rustls` feature, TLS over TCP.
pub enum MaybeTlsStream {
    Plain(TcpStream),
    #[cfg(feature = "tls-rustls")]
    Tls(crate::tls::TlsStream),
}

/// Read half of a [`MaybeTlsStream`].
pub enum MaybeTlsReader {
    Plain(TcpStream),
    #[cfg(feature = "tls-rustls")]
    Tls(crate::tls::TlsReader),
}

/// Write half of a [`MaybeTlsStream`].
pub enum MaybeTlsWriter {
    Plain(TcpStream),
    #[cfg(feature = "tls-rustls")]
    Tls(crate::tls::TlsWriter),
}

impl Transport for MaybeTlsStream {
    type Reader = MaybeTlsReader;
    type Writer = MaybeTlsWriter;

    fn split(self) -> io::Result<(MaybeTlsReader, MaybeTlsWriter)> {
        match self {
            MaybeTlsStream::Plain(stream) => {
                let (r, w) = stream.split()?;
                Ok((MaybeTlsReader::Plain(r), MaybeTlsWriter::Plain(w)))
            }
            #[cfg(feature = "tls-rustls")]
            MaybeTlsStream::Tls(stream) => {
                let (r, w) = stream.split()?;
                Ok((MaybeTlsReader::Tls(r), MaybeTlsWriter::Tls(w)))
            }
        }
    }
}

impl Read for MaybeTlsReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            MaybeTlsReader::Plain(s) => s.read(buf),
            #[cfg(feature = "tls-rustls")]
            MaybeTlsReader::Tls(s) => s.read(buf),
        }
    }
}

impl Write for MaybeTlsWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            MaybeTlsWriter::Plain(s) => s.write(buf),
            #[cfg(feature = "tls-rustls")]
            MaybeTlsWriter::Tls(s) => s.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            MaybeTlsWriter::Plain(s) => s.flush(),
            #[cfg(feature = "tls-rustls")]
            MaybeTlsWriter::Tls(s) => s.flush(),
        }
    }
}

impl WriteHalf for MaybeTlsWriter {
    fn teardown(&mut self) -> io::Result<()> {
        match self {
            MaybeTlsWriter::Plain(s) => s.teardown(),
            #[cfg(feature = "tls-rustls")]
            MaybeTlsWriter::Tls(s) => s.teardown(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;

    #[test]
    fn test_tcp_teardown_unblocks_reader() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let client = TcpStream::connect(addr).unwrap();
        let (_server, _) = listener.accept().unwrap();

        let (mut reader, mut writer) = client.split().unwrap();
        let handle = std::thread::spawn(move || {
            let mut buf = [0u8; 8];
            reader.read(&mut buf)
        });

        std::thread::sleep(std::time::Duration::from_millis(50));
        writer.teardown().unwrap();
        assert_eq!(handle.join().unwrap().unwrap(), 0);
    }

    #[test]
    fn test_plain_split_round_trip() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let client = TcpStream::connect(addr).unwrap();
        let (mut server, _) = listener.accept().unwrap();

        let (mut reader, mut writer) = MaybeTlsStream::Plain(client).split().unwrap();
        writer.write_all(b"ping").unwrap();
        let mut buf = [0u8; 4];
        server.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"ping");

        server.write_all(b"pong").unwrap();
        reader.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"pong");
    }
}
