//! Scripted loopback peer.

use std::io::{ErrorKind, Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use wsline::compute_accept_key;
use wsline::protocol::{Decoded, Frame};

const PEER_TIMEOUT: Duration = Duration::from_secs(5);

/// A one-shot server thread bound to an ephemeral loopback port.
pub struct TestServer {
    addr: SocketAddr,
    handle: JoinHandle<()>,
}

impl TestServer {
    /// Accept one client, upgrade it, run `script`.
    pub fn spawn<F>(script: F) -> Self
    where
        F: FnOnce(Peer) + Send + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            script(upgrade(stream));
        });
        Self { addr, handle }
    }

    /// Accept `connections` clients in turn, upgrade each, run `script`.
    pub fn spawn_many<F>(connections: usize, script: F) -> Self
    where
        F: Fn(Peer) + Send + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = thread::spawn(move || {
            for _ in 0..connections {
                let (stream, _) = listener.accept().unwrap();
                script(upgrade(stream));
            }
        });
        Self { addr, handle }
    }

    /// Accept one client and hand over the raw socket without answering.
    pub fn spawn_raw<F>(script: F) -> Self
    where
        F: FnOnce(TcpStream) + Send + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            stream.set_read_timeout(Some(PEER_TIMEOUT)).unwrap();
            script(stream);
        });
        Self { addr, handle }
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn url(&self, path: &str) -> String {
        format!("ws://{}{}", self.addr, path)
    }

    /// Wait for the script; re-raises its assertion failures.
    pub fn join(self) {
        if let Err(panic) = self.handle.join() {
            std::panic::resume_unwind(panic);
        }
    }
}

/// Server side of an upgraded connection.
pub struct Peer<S = TcpStream> {
    pub stream: S,
    /// The client's upgrade request, headers included.
    pub request: String,
}

impl<S: Read + Write> Peer<S> {
    pub fn new(stream: S, request: String) -> Self {
        Self { stream, request }
    }

    /// Read the next frame from the client, unmasked.
    pub fn recv(&mut self) -> Frame {
        match Frame::read_from(&mut self.stream, usize::MAX, PEER_TIMEOUT).unwrap() {
            Decoded::Frame(frame) => frame,
            Decoded::NoData => panic!("client sent nothing within {PEER_TIMEOUT:?}"),
        }
    }

    pub fn send(&mut self, frame: Frame) {
        self.send_raw(&frame.encode(None));
    }

    pub fn send_raw(&mut self, bytes: &[u8]) {
        self.stream.write_all(bytes).unwrap();
        self.stream.flush().unwrap();
    }

    /// Read exactly `n` raw bytes.
    pub fn read_raw(&mut self, n: usize) -> Vec<u8> {
        let mut buf = vec![0u8; n];
        self.stream.read_exact(&mut buf).unwrap();
        buf
    }

    /// Discard everything until the client closes the socket.
    pub fn drain_until_eof(&mut self) {
        let mut buf = [0u8; 1024];
        loop {
            match self.stream.read(&mut buf) {
                Ok(0) => return,
                Ok(_) => {}
                Err(e) if e.kind() == ErrorKind::Interrupted => {}
                Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {
                    panic!("client kept the socket open past {PEER_TIMEOUT:?}")
                }
                Err(_) => return,
            }
        }
    }

    /// Value of a request header, matched case-insensitively.
    pub fn header(&self, name: &str) -> Option<String> {
        self.request.lines().skip(1).find_map(|line| {
            let (n, v) = line.split_once(':')?;
            n.trim().eq_ignore_ascii_case(name).then(|| v.trim().to_string())
        })
    }
}

fn upgrade(mut stream: TcpStream) -> Peer {
    stream.set_read_timeout(Some(PEER_TIMEOUT)).unwrap();
    let request = accept_upgrade(&mut stream);
    Peer::new(stream, request)
}

/// Read an HTTP request up to and including the blank line.
pub fn read_request<S: Read>(stream: &mut S) -> String {
    let mut request = Vec::new();
    let mut byte = [0u8; 1];
    while !request.ends_with(b"\r\n\r\n") {
        stream.read_exact(&mut byte).unwrap();
        request.push(byte[0]);
    }
    String::from_utf8(request).unwrap()
}

/// Read the upgrade request and answer `101` with a correct accept key.
pub fn accept_upgrade<S: Read + Write>(stream: &mut S) -> String {
    let request = read_request(stream);
    let key = request
        .lines()
        .find_map(|line| {
            let (name, value) = line.split_once(':')?;
            name.eq_ignore_ascii_case("sec-websocket-key")
                .then(|| value.trim().to_string())
        })
        .unwrap();

    let response = format!(
        "HTTP/1.1 101 Switching Protocols\r\n\
         Upgrade: websocket\r\n\
         Connection: Upgrade\r\n\
         Sec-WebSocket-Accept: {}\r\n\r\n",
        compute_accept_key(&key)
    );
    stream.write_all(response.as_bytes()).unwrap();
    stream.flush().unwrap();
    request
}
