//! The per-connection protocol state machine.
//!
//! ```text
//!   Handshaking (TLS only)
//!        │
//!        ▼
//!   AwaitingRead ──► Processing ──► AwaitingWrite
//!        ▲                               │
//!        └──────── keep-alive ───────────┤
//!                                        ▼
//!                              Closing ──► Closed
//! ```
//!
//! Orthogonal to the phase, the protocol mode (`Http → WebSocket → Closing`,
//! or `Http → Closing`) decides how read bytes are interpreted.
//!
//! Every asynchronous step runs in its own task holding an `Arc` to the
//! connection, so the connection outlives its last pending callback. At most
//! one read and one write are outstanding at any time; the write queue,
//! in-flight flag, keep-alive flag and mode are only touched under the
//! connection's state mutex.

use std::net::{IpAddr, SocketAddr};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use bytes::{Buf, Bytes, BytesMut};
use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use crate::error::{ConnectionError, ConnectionResult};
use crate::http::handler::{DefaultHandler, RequestHandler};
use crate::http::parser::{HttpParser, ParseOutcome, RequestParser};
use crate::http::request::{Method, Request};
use crate::http::response::{Response, StatusCode};
use crate::server::idle_timer::IdleTimer;
use crate::server::manager::ManagerInner;
use crate::server::stats::{AtomicConnectionStats, ConnectionStats};
use crate::server::transport::{Stream, Transport, TransportReader, TransportWriter};
use crate::server::write_queue::WriteQueue;
use crate::websocket::codec::{CodecFactory, CodecOutcome, CodecResult, EchoCodec, WebSocketCodec};

/// Largest read requested from the transport at once.
pub const READ_CHUNK: usize = 4096;

/// Upper bound for the farewell write and half-close during teardown.
pub const CLOSE_GRACE: Duration = Duration::from_secs(1);

/// How read bytes are interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolMode {
    Http,
    WebSocket,
    Closing,
}

impl ProtocolMode {
    /// Modes only move forward.
    pub fn can_become(self, next: ProtocolMode) -> bool {
        matches!(
            (self, next),
            (ProtocolMode::Http, ProtocolMode::WebSocket)
                | (ProtocolMode::Http, ProtocolMode::Closing)
                | (ProtocolMode::WebSocket, ProtocolMode::Closing)
        )
    }
}

/// The most recent lifecycle step the connection took.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Created,
    Handshaking,
    AwaitingRead,
    Processing,
    AwaitingWrite,
    Closing,
    Closed,
}

/// The collaborators a connection consults while processing bytes.
#[derive(Clone)]
pub struct Services {
    pub parser: Arc<dyn RequestParser>,
    pub handler: Arc<dyn RequestHandler>,
    pub codec: CodecFactory,
}

impl Services {
    pub fn new(
        parser: Arc<dyn RequestParser>,
        handler: Arc<dyn RequestHandler>,
        codec: CodecFactory,
    ) -> Self {
        Self {
            parser,
            handler,
            codec,
        }
    }

    /// Default parser and codec with a custom handler.
    pub fn with_handler(handler: impl RequestHandler + 'static) -> Self {
        Self {
            handler: Arc::new(handler),
            ..Self::default()
        }
    }
}

impl Default for Services {
    fn default() -> Self {
        Self {
            parser: Arc::new(HttpParser),
            handler: Arc::new(DefaultHandler::default()),
            codec: EchoCodec::factory(),
        }
    }
}

struct State {
    mode: ProtocolMode,
    keep_alive: bool,
    queue: WriteQueue,
    /// The writer half is installed; until then writes are parked.
    ready: bool,
    reading: bool,
    last_activity: Instant,
}

impl State {
    fn become_mode(&mut self, next: ProtocolMode) -> bool {
        if self.mode.can_become(next) {
            self.mode = next;
            true
        } else {
            false
        }
    }
}

/// What to do once a write has completed.
enum AfterWrite {
    Write(Bytes),
    HalfClose,
    Read,
    Idle,
}

pub struct Connection {
    id: u64,
    peer: SocketAddr,
    secure: bool,
    timeout: Duration,
    services: Services,
    state: Mutex<State>,
    inbound: Mutex<BytesMut>,
    codec: Mutex<Box<dyn WebSocketCodec>>,
    transport: Mutex<Option<Transport>>,
    reader: tokio::sync::Mutex<Option<TransportReader>>,
    writer: tokio::sync::Mutex<Option<TransportWriter>>,
    timer: IdleTimer,
    cancel: CancellationToken,
    stopped: AtomicBool,
    phase: watch::Sender<Phase>,
    stats: AtomicConnectionStats,
    manager: Weak<ManagerInner>,
}

impl Connection {
    pub(crate) fn new(
        id: u64,
        transport: Transport,
        timeout: Duration,
        services: Services,
        manager: Weak<ManagerInner>,
    ) -> Self {
        let codec = (services.codec)();
        let (phase, _) = watch::channel(Phase::Created);

        Self {
            id,
            peer: transport.remote_address(),
            secure: transport.is_secure(),
            timeout,
            services,
            state: Mutex::new(State {
                mode: ProtocolMode::Http,
                keep_alive: false,
                queue: WriteQueue::new(),
                ready: false,
                reading: false,
                last_activity: Instant::now(),
            }),
            inbound: Mutex::new(BytesMut::with_capacity(READ_CHUNK)),
            codec: Mutex::new(codec),
            transport: Mutex::new(Some(transport)),
            reader: tokio::sync::Mutex::new(None),
            writer: tokio::sync::Mutex::new(None),
            timer: IdleTimer::new(),
            cancel: CancellationToken::new(),
            stopped: AtomicBool::new(false),
            phase,
            stats: AtomicConnectionStats::new(),
            manager,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    pub fn is_secure(&self) -> bool {
        self.secure
    }

    pub fn mode(&self) -> ProtocolMode {
        self.state.lock().mode
    }

    pub fn keep_alive(&self) -> bool {
        self.state.lock().keep_alive
    }

    pub fn last_activity(&self) -> Instant {
        self.state.lock().last_activity
    }

    pub fn phase(&self) -> Phase {
        *self.phase.borrow()
    }

    pub fn stats(&self) -> ConnectionStats {
        self.stats.snapshot()
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }

    /// True while a write is outstanding on the transport.
    pub fn write_in_flight(&self) -> bool {
        self.state.lock().queue.is_in_flight()
    }

    /// Resolves once the transport has been released.
    pub async fn closed(&self) {
        let mut phase = self.phase.subscribe();
        let _ = phase.wait_for(|p| *p == Phase::Closed).await;
    }

    /// Opens the transport and starts reading. Only the first call has any
    /// effect.
    pub(crate) fn start(self: &Arc<Self>) {
        let Some(transport) = self.transport.lock().take() else {
            return;
        };

        if transport.is_secure() {
            self.set_phase(Phase::Handshaking);
        }

        let conn = Arc::clone(self);
        tokio::spawn(async move {
            let opened = tokio::select! {
                _ = conn.cancel.cancelled() => Err(ConnectionError::Cancelled),
                res = transport.open() => res,
            };

            match opened {
                Ok(stream) => {
                    if conn.install(stream).await {
                        trace!(conn_id = conn.id, secure = conn.secure, "Transport ready");
                        let parked = {
                            let mut state = conn.state.lock();
                            state.ready = true;
                            state.queue.resume()
                        };
                        if let Some(buf) = parked {
                            conn.issue_write(buf);
                        }
                        conn.issue_read();
                    }
                }
                Err(e) if e.is_benign() => {
                    trace!(conn_id = conn.id, "Handshake abandoned by stop");
                }
                Err(e) => {
                    debug!(conn_id = conn.id, peer = %conn.peer, error = %e, "Transport setup failed");
                    conn.begin_close();
                }
            }
        });
    }

    async fn install(&self, stream: Stream) -> bool {
        let (reader, writer) = stream.into_split();
        let mut reader_slot = self.reader.lock().await;
        let mut writer_slot = self.writer.lock().await;

        // A stop that raced the handshake already ran its teardown.
        if self.is_stopped() {
            return false;
        }

        *reader_slot = Some(reader);
        *writer_slot = Some(writer);
        true
    }

    /// Queues `buf` for the peer. Buffers reach the wire in submission
    /// order and never more than one write is outstanding. Writes made
    /// before the transport is ready (during a TLS handshake) are held
    /// until it is.
    ///
    /// Returns `false` when the buffer was dropped because the connection is
    /// closing or stopped.
    pub fn write(self: &Arc<Self>, buf: impl Into<Bytes>) -> bool {
        if self.is_stopped() {
            return false;
        }

        let issue = {
            let mut state = self.state.lock();
            match state.mode {
                ProtocolMode::Closing => {
                    trace!(conn_id = self.id, "Dropping write while closing");
                    return false;
                }
                ProtocolMode::Http | ProtocolMode::WebSocket if !state.ready => {
                    state.queue.defer(buf.into());
                    None
                }
                ProtocolMode::Http | ProtocolMode::WebSocket => state.queue.submit(buf.into()),
            }
        };

        if let Some(buf) = issue {
            self.issue_write(buf);
        }
        true
    }

    fn issue_read(self: &Arc<Self>) {
        if self.is_stopped() {
            return;
        }

        {
            let mut state = self.state.lock();
            if state.reading {
                return;
            }
            state.reading = true;
        }

        self.set_phase(Phase::AwaitingRead);
        self.stats.record_read_issued();

        let conn = Arc::clone(self);
        self.timer.arm(self.timeout, move || conn.on_timeout());
        self.stats.record_timer_armed();

        let conn = Arc::clone(self);
        tokio::spawn(async move {
            let result = conn.read_chunk().await;
            conn.on_read(result);
        });
    }

    async fn read_chunk(&self) -> ConnectionResult<Vec<u8>> {
        let mut slot = self.reader.lock().await;
        let reader = slot.as_mut().ok_or(ConnectionError::Cancelled)?;
        let mut chunk = vec![0u8; READ_CHUNK];

        let n = tokio::select! {
            _ = self.cancel.cancelled() => return Err(ConnectionError::Cancelled),
            res = reader.read_some(&mut chunk) => res?,
        };

        if n == 0 {
            return Err(ConnectionError::Transport(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "peer closed the connection",
            )));
        }

        chunk.truncate(n);
        Ok(chunk)
    }

    fn on_read(self: &Arc<Self>, result: ConnectionResult<Vec<u8>>) {
        self.timer.cancel();
        self.state.lock().reading = false;

        let data = match result {
            Ok(data) => data,
            Err(e) if e.is_benign() || self.is_stopped() => {
                trace!(conn_id = self.id, "Read cancelled");
                return;
            }
            Err(e) => {
                debug!(conn_id = self.id, peer = %self.peer, error = %e, "Read failed");
                self.begin_close();
                return;
            }
        };

        if self.is_stopped() {
            return;
        }

        self.stats.record_bytes_read(data.len() as u64);
        self.set_phase(Phase::Processing);

        let mode = {
            let mut state = self.state.lock();
            state.last_activity = Instant::now();
            state.mode
        };
        self.inbound.lock().extend_from_slice(&data);

        match mode {
            ProtocolMode::Http => self.process_http(),
            ProtocolMode::WebSocket => self.process_websocket(),
            ProtocolMode::Closing => self.inbound.lock().clear(),
        }
    }

    fn process_http(self: &Arc<Self>) {
        let outcome = {
            let inbound = self.inbound.lock();
            self.services.parser.parse(&inbound)
        };

        match outcome {
            ParseOutcome::Incomplete => self.issue_read(),
            ParseOutcome::Invalid(e) => {
                debug!(conn_id = self.id, peer = %self.peer, error = ?e, "Malformed HTTP request");
                self.inbound.lock().clear();
                self.state.lock().keep_alive = false;
                let reply = Response::stock(StatusCode::BadRequest);
                self.write(reply.to_bytes(Method::GET));
            }
            ParseOutcome::Complete {
                mut request,
                consumed,
            } => {
                self.inbound.lock().advance(consumed);
                request.host = remote_host(self.peer);
                self.state.lock().keep_alive = request.keep_alive();

                let response = self.invoke_handler(&request);

                debug!(
                    conn_id = self.id,
                    method = request.method.as_str(),
                    path = %request.path,
                    status = response.status.as_u16(),
                    "Request handled"
                );

                // Switch before queueing so the write completion already
                // sees the persistent WebSocket mode.
                let upgraded = response.is_upgrade() && self.upgrade(&request, &response);

                self.write(response.to_bytes(request.method));

                if upgraded {
                    self.read_or_drain();
                }
            }
        }
    }

    /// Handles bytes already buffered behind the last request (a pipelined
    /// request, or frames sent along with an upgrade) before reading more.
    fn read_or_drain(self: &Arc<Self>) {
        if self.inbound.lock().is_empty() {
            self.issue_read();
            return;
        }

        self.set_phase(Phase::Processing);
        let mode = self.state.lock().mode;
        match mode {
            ProtocolMode::Http => self.process_http(),
            ProtocolMode::WebSocket => self.process_websocket(),
            ProtocolMode::Closing => self.inbound.lock().clear(),
        }
    }

    fn invoke_handler(&self, request: &Request) -> Response {
        let handler = &self.services.handler;
        match catch_unwind(AssertUnwindSafe(|| handler.handle(request))) {
            Ok(response) => response,
            Err(_) => {
                error!(conn_id = self.id, path = %request.path, "Request handler panicked");
                self.state.lock().keep_alive = false;
                Response::internal_error()
            }
        }
    }

    fn upgrade(&self, request: &Request, response: &Response) -> bool {
        {
            let mut state = self.state.lock();
            if !state.become_mode(ProtocolMode::WebSocket) {
                warn!(conn_id = self.id, mode = ?state.mode, "Ignoring upgrade outside HTTP mode");
                return false;
            }
            state.keep_alive = true;
        }

        self.codec.lock().on_upgrade(request, response);
        info!(conn_id = self.id, peer = %self.peer, path = %request.path, "Connection upgraded to WebSocket");
        true
    }

    fn process_websocket(self: &Arc<Self>) {
        let parsed = {
            let inbound = self.inbound.lock();
            self.codec.lock().parse(&inbound)
        };

        let CodecResult {
            outcome,
            consumed,
            outbound,
        } = match parsed {
            Ok(result) => result,
            Err(e) => {
                let e = ConnectionError::ProtocolParse(e.to_string());
                debug!(conn_id = self.id, peer = %self.peer, error = %e, "WebSocket protocol error");
                self.begin_close();
                return;
            }
        };

        self.inbound.lock().advance(consumed);
        for frame in outbound {
            self.write(frame);
        }

        match outcome {
            CodecOutcome::Incomplete | CodecOutcome::KeepOpen => self.issue_read(),
            CodecOutcome::Close => self.enter_closing(),
        }
    }

    fn enter_closing(self: &Arc<Self>) {
        let idle = {
            let mut state = self.state.lock();
            state.become_mode(ProtocolMode::Closing);
            state.keep_alive = false;
            !state.queue.is_in_flight()
        };

        debug!(conn_id = self.id, "Peer requested close");
        self.set_phase(Phase::Closing);

        // Otherwise the pending write's completion finishes the close.
        if idle {
            self.begin_close();
        }
    }

    fn issue_write(self: &Arc<Self>, buf: Bytes) {
        self.set_phase(Phase::AwaitingWrite);
        self.stats.record_write_issued();

        let conn = Arc::clone(self);
        tokio::spawn(async move {
            let result = conn.write_chunk(&buf).await;
            conn.on_write(result);
        });
    }

    async fn write_chunk(&self, buf: &[u8]) -> ConnectionResult<usize> {
        let mut slot = self.writer.lock().await;
        let writer = slot.as_mut().ok_or(ConnectionError::Cancelled)?;

        tokio::select! {
            _ = self.cancel.cancelled() => Err(ConnectionError::Cancelled),
            res = writer.write(buf) => res.map_err(ConnectionError::from),
        }
    }

    fn on_write(self: &Arc<Self>, result: ConnectionResult<usize>) {
        let written = match result {
            Ok(n) => n,
            Err(e) if e.is_benign() || self.is_stopped() => {
                trace!(conn_id = self.id, error = %e, "Write cancelled");
                return;
            }
            Err(e) => {
                debug!(conn_id = self.id, peer = %self.peer, error = %e, "Write failed");
                self.begin_close();
                return;
            }
        };

        self.stats.record_bytes_written(written as u64);

        let next = {
            let mut state = self.state.lock();
            state.last_activity = Instant::now();
            match state.queue.complete() {
                Some(buf) => AfterWrite::Write(buf),
                None if !state.keep_alive => AfterWrite::HalfClose,
                None if state.mode == ProtocolMode::Http => AfterWrite::Read,
                None => AfterWrite::Idle,
            }
        };

        match next {
            AfterWrite::Write(buf) => self.issue_write(buf),
            AfterWrite::HalfClose => self.half_close(),
            AfterWrite::Read => self.read_or_drain(),
            AfterWrite::Idle => {}
        }
    }

    fn half_close(self: &Arc<Self>) {
        let conn = Arc::clone(self);
        tokio::spawn(async move {
            if let Some(writer) = conn.writer.lock().await.as_mut() {
                if let Ok(Err(e)) = timeout(CLOSE_GRACE, writer.shutdown_write()).await {
                    trace!(conn_id = conn.id, error = %e, "Half-close failed");
                }
            }
            conn.begin_close();
        });
    }

    fn on_timeout(self: &Arc<Self>) {
        if self.is_stopped() {
            return;
        }

        let secs = self.timeout.as_secs();
        let mode = self.state.lock().mode;
        match mode {
            ProtocolMode::Http | ProtocolMode::Closing => {
                debug!(conn_id = self.id, error = %ConnectionError::Timeout(secs), "Closing idle connection");
                self.begin_close();
            }
            ProtocolMode::WebSocket => {
                trace!(conn_id = self.id, "Idle WebSocket, sending ping");
                self.stats.record_probe();
                let ping = self.codec.lock().ping();
                self.write(ping);
            }
        }
    }

    /// Asks the owning manager to stop and forget this connection.
    fn begin_close(self: &Arc<Self>) {
        match self.manager.upgrade() {
            Some(manager) => manager.stop(self),
            None => self.stop(),
        }
    }

    /// Cancels the idle timer and closes the transport. In WebSocket mode a
    /// close frame is sent first, without waiting for the peer's answer.
    /// Calling this more than once has no further effect.
    pub fn stop(self: &Arc<Self>) {
        if self.stopped.swap(true, Ordering::AcqRel) {
            return;
        }

        let farewell = {
            let mut state = self.state.lock();
            state.queue.clear();
            let farewell = match state.mode {
                ProtocolMode::WebSocket => Some(self.codec.lock().close("")),
                ProtocolMode::Http | ProtocolMode::Closing => None,
            };
            state.become_mode(ProtocolMode::Closing);
            farewell
        };

        self.set_phase(Phase::Closing);
        self.timer.cancel();
        self.cancel.cancel();
        self.transport.lock().take();

        let conn = Arc::clone(self);
        tokio::spawn(async move {
            conn.close_transport(farewell).await;
        });
    }

    async fn close_transport(&self, farewell: Option<Bytes>) {
        // Same lock order as `install`.
        let reader = self.reader.lock().await.take();
        let writer = self.writer.lock().await.take();

        if let Some(mut writer) = writer {
            if let Some(frame) = farewell {
                if let Ok(Err(e)) = timeout(CLOSE_GRACE, writer.write(&frame)).await {
                    trace!(conn_id = self.id, error = %e, "Close frame not delivered");
                }
            }
            let _ = timeout(CLOSE_GRACE, writer.shutdown_write()).await;
        }
        drop(reader);

        self.set_phase(Phase::Closed);
        debug!(conn_id = self.id, peer = %self.peer, "Connection closed");
    }

    fn set_phase(&self, next: Phase) {
        self.phase.send_if_modified(|current| {
            let allowed = match *current {
                Phase::Closed => false,
                Phase::Closing => next == Phase::Closed,
                _ => *current != next,
            };
            if allowed {
                *current = next;
            }
            allowed
        });
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("peer", &self.peer)
            .field("secure", &self.secure)
            .field("mode", &self.mode())
            .field("phase", &self.phase())
            .finish()
    }
}

/// The peer's address as handed to request handlers, with IPv4-mapped IPv6
/// addresses shown in their IPv4 form.
pub fn remote_host(peer: SocketAddr) -> String {
    match peer.ip() {
        IpAddr::V6(v6) => v6
            .to_ipv4_mapped()
            .map(|v4| v4.to_string())
            .unwrap_or_else(|| v6.to_string()),
        ip => ip.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn modes_only_move_forward() {
        use ProtocolMode::*;

        assert!(Http.can_become(WebSocket));
        assert!(Http.can_become(Closing));
        assert!(WebSocket.can_become(Closing));

        assert!(!WebSocket.can_become(Http));
        assert!(!Closing.can_become(Http));
        assert!(!Closing.can_become(WebSocket));
        assert!(!Http.can_become(Http));
    }

    #[test]
    fn mapped_ipv4_is_unwrapped() {
        let mapped: SocketAddr = "[::ffff:10.0.0.7]:443".parse().unwrap();
        let plain_v6: SocketAddr = "[2001:db8::1]:443".parse().unwrap();
        let v4: SocketAddr = "192.168.1.2:80".parse().unwrap();

        assert_eq!(remote_host(mapped), "10.0.0.7");
        assert_eq!(remote_host(plain_v6), "2001:db8::1");
        assert_eq!(remote_host(v4), "192.168.1.2");
    }
}
