// ────────────────────────────────
// src/proxy/relay.rs
// Byte relay between an accepted client and one backend. The payload is
// never inspected.
// ────────────────────────────────

use super::backend::BackendAddress;
use std::fmt;
use std::io;
use tokio::io::Interest;
use tokio::net::TcpStream;
use tracing::{debug, warn};

/// How a relay session ended.
#[derive(Debug)]
pub enum RelayOutcome {
    /// One side closed the connection. Also used when the client goes away
    /// abruptly, since that says nothing about the backend.
    Closed,
    /// Connecting to, reading from or writing to the backend failed.
    IoError(io::Error),
    /// The relay ended without producing an outcome (task panic or cancel).
    Aborted(String),
}

impl RelayOutcome {
    /// Whether this outcome should take the backend out of rotation.
    pub fn is_health_signal(&self) -> bool {
        !matches!(self, RelayOutcome::Closed)
    }

    pub fn label(&self) -> &'static str {
        match self {
            RelayOutcome::Closed => "closed",
            RelayOutcome::IoError(_) => "io_error",
            RelayOutcome::Aborted(_) => "aborted",
        }
    }
}

impl fmt::Display for RelayOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RelayOutcome::Closed => write!(f, "closed"),
            RelayOutcome::IoError(e) => write!(f, "I/O error: {}", e),
            RelayOutcome::Aborted(reason) => write!(f, "aborted: {}", reason),
        }
    }
}

/// Connect to `target` and shuttle bytes until either side closes.
pub async fn relay(client: TcpStream, target: &BackendAddress, buffer_size: usize) -> RelayOutcome {
    let backend = match TcpStream::connect((target.host(), target.port())).await {
        Ok(stream) => stream,
        Err(e) => {
            warn!(backend = %target, error = %e, "failed to connect to backend");
            return RelayOutcome::IoError(e);
        }
    };
    debug!(backend = %target, "connected to backend");

    let mut session = RelaySession::new(client, backend, buffer_size);
    let outcome = session.run().await;

    debug!(
        backend = %target,
        bytes_to_backend = session.bytes_to_backend(),
        bytes_to_client = session.bytes_to_client(),
        %outcome,
        "relay finished"
    );
    outcome
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Side {
    Client,
    Backend,
}

/// One direction of traffic and the buffer it owns.
struct Pipe {
    buf: Box<[u8]>,
    start: usize,
    end: usize,
    eof: bool,
    transferred: u64,
}

impl Pipe {
    fn new(buffer_size: usize) -> Self {
        Self {
            buf: vec![0u8; buffer_size].into_boxed_slice(),
            start: 0,
            end: 0,
            eof: false,
            transferred: 0,
        }
    }

    fn has_pending(&self) -> bool {
        self.start < self.end
    }

    // Source is only read once the destination has taken everything.
    fn wants_read(&self) -> bool {
        !self.eof && !self.has_pending()
    }

    fn read_from(&mut self, stream: &TcpStream) -> io::Result<()> {
        match stream.try_read(&mut self.buf) {
            Ok(0) => {
                self.eof = true;
                Ok(())
            }
            Ok(n) => {
                self.start = 0;
                self.end = n;
                self.transferred += n as u64;
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(()),
            Err(e) => Err(e),
        }
    }

    fn write_to(&mut self, stream: &TcpStream) -> io::Result<()> {
        match stream.try_write(&self.buf[self.start..self.end]) {
            Ok(n) => {
                self.start += n;
                if self.start == self.end {
                    self.start = 0;
                    self.end = 0;
                }
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(()),
            Err(e) => Err(e),
        }
    }
}

fn interest(read: bool, write: bool) -> Option<Interest> {
    match (read, write) {
        (true, true) => Some(Interest::READABLE | Interest::WRITABLE),
        (true, false) => Some(Interest::READABLE),
        (false, true) => Some(Interest::WRITABLE),
        (false, false) => None,
    }
}

/// Owns both sockets of one proxied connection for its whole lifetime.
///
/// A single loop waits on readiness of both sockets. Each direction has its
/// own buffer: bytes read from one side are held until the other side has
/// accepted all of them, and only then is the source read again. Because
/// the two directions only share the wait, a peer that is slow to read
/// never stalls traffic flowing the other way.
///
/// End of stream on either side ends the session. A pipe only reads again
/// once its buffer has been flushed, so nothing read from the closing side
/// is left behind. Both sockets close when the session is dropped.
pub struct RelaySession {
    client: TcpStream,
    backend: TcpStream,
    /// client -> backend
    upstream: Pipe,
    /// backend -> client
    downstream: Pipe,
}

impl RelaySession {
    pub fn new(client: TcpStream, backend: TcpStream, buffer_size: usize) -> Self {
        Self {
            client,
            backend,
            upstream: Pipe::new(buffer_size),
            downstream: Pipe::new(buffer_size),
        }
    }

    pub fn bytes_to_backend(&self) -> u64 {
        self.upstream.transferred
    }

    pub fn bytes_to_client(&self) -> u64 {
        self.downstream.transferred
    }

    pub async fn run(&mut self) -> RelayOutcome {
        match self.pump().await {
            Ok(()) => RelayOutcome::Closed,
            Err((Side::Backend, e)) if peer_closed(&e) => {
                debug!(error = %e, "backend closed the connection");
                RelayOutcome::Closed
            }
            Err((Side::Backend, e)) => RelayOutcome::IoError(e),
            Err((Side::Client, e)) => {
                debug!(error = %e, "client connection failed");
                RelayOutcome::Closed
            }
        }
    }

    async fn pump(&mut self) -> Result<(), (Side, io::Error)> {
        loop {
            if self.upstream.eof || self.downstream.eof {
                return Ok(());
            }

            let client_interest =
                interest(self.upstream.wants_read(), self.downstream.has_pending());
            let backend_interest =
                interest(self.downstream.wants_read(), self.upstream.has_pending());

            let Self { client, backend, .. } = &*self;
            let (side, ready) = tokio::select! {
                ready = client.ready(client_interest.unwrap_or(Interest::READABLE)),
                    if client_interest.is_some() => (Side::Client, ready),
                ready = backend.ready(backend_interest.unwrap_or(Interest::READABLE)),
                    if backend_interest.is_some() => (Side::Backend, ready),
                else => return Ok(()),
            };
            let ready = ready.map_err(|e| (side, e))?;

            let (stream, inbound, outbound) = match side {
                Side::Client => (&self.client, &mut self.upstream, &mut self.downstream),
                Side::Backend => (&self.backend, &mut self.downstream, &mut self.upstream),
            };

            // Read first so a close from this side is seen before anything
            // more is written to it.
            if ready.is_readable() && inbound.wants_read() {
                inbound.read_from(stream).map_err(|e| (side, e))?;
                if inbound.eof {
                    debug!(?side, "end of stream");
                    return Ok(());
                }
            }
            if ready.is_writable() && outbound.has_pending() {
                outbound.write_to(stream).map_err(|e| (side, e))?;
            }
        }
    }
}

/// Resets and broken pipes from the backend mean it dropped its end after
/// the connection was up; that is a close, not an unreachable backend.
fn peer_closed(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::ConnectionReset
            | io::ErrorKind::BrokenPipe
            | io::ErrorKind::ConnectionAborted
    )
}
