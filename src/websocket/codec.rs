//! The per-connection WebSocket codec seam and its default echo codec.

use std::sync::Arc;

use bytes::Bytes;
use tracing::{debug, trace};

use crate::http::request::Request;
use crate::http::response::Response;
use crate::websocket::frame::{self, CloseCode, Frame, FrameError, OpCode};

/// What the connection should do after a codec pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodecOutcome {
    /// At least one frame was handled; keep reading.
    KeepOpen,
    /// The peer asked to close the connection.
    Close,
    /// No complete frame yet.
    Incomplete,
}

/// Result of one [`WebSocketCodec::parse`] call.
#[derive(Debug)]
pub struct CodecResult {
    pub outcome: CodecOutcome,
    /// Bytes at the front of the buffer that were fully handled.
    pub consumed: usize,
    /// Frames to write back to the peer, in order.
    pub outbound: Vec<Bytes>,
}

/// Decodes inbound WebSocket bytes for one connection.
///
/// Outbound frames are returned to the caller rather than written directly,
/// so the connection's write queue stays the only path to the socket.
pub trait WebSocketCodec: Send {
    /// Called exactly once, when the 101 response is produced.
    fn on_upgrade(&mut self, request: &Request, response: &Response);

    fn parse(&mut self, buf: &[u8]) -> Result<CodecResult, FrameError>;

    /// A liveness probe frame.
    fn ping(&mut self) -> Bytes;

    /// A close notification frame.
    fn close(&mut self, reason: &str) -> Bytes;
}

/// Builds a fresh codec for every connection.
pub type CodecFactory = Arc<dyn Fn() -> Box<dyn WebSocketCodec> + Send + Sync>;

/// Default codec: echoes text and binary messages, answers pings, and
/// mirrors close frames.
#[derive(Debug, Default)]
pub struct EchoCodec {
    path: Option<String>,
    fragment: Option<(OpCode, Vec<u8>)>,
}

impl EchoCodec {
    pub fn new() -> Self {
        Self::default()
    }

    /// Factory suitable for [`crate::server::Services`].
    pub fn factory() -> CodecFactory {
        Arc::new(|| Box::new(EchoCodec::new()) as Box<dyn WebSocketCodec>)
    }

    /// Path of the request that opened this session.
    pub fn path(&self) -> Option<&str> {
        self.path.as_deref()
    }

    fn handle_data(&mut self, frame: Frame) -> Result<Option<Bytes>, FrameError> {
        let (opcode, data) = match (frame.opcode, self.fragment.take()) {
            (OpCode::Continuation, None) => return Err(FrameError::UnexpectedContinuation),
            (OpCode::Continuation, Some((opcode, mut data))) => {
                data.extend_from_slice(&frame.payload);
                (opcode, data)
            }
            (_, Some(_)) => return Err(FrameError::InterleavedMessage),
            (opcode, None) => (opcode, frame.payload.to_vec()),
        };

        if data.len() as u64 > frame::MAX_FRAME_PAYLOAD {
            return Err(FrameError::TooLarge(data.len() as u64));
        }

        if !frame.fin {
            self.fragment = Some((opcode, data));
            return Ok(None);
        }

        if opcode == OpCode::Text && std::str::from_utf8(&data).is_err() {
            return Err(FrameError::InvalidUtf8);
        }

        trace!(opcode = ?opcode, len = data.len(), "Echoing WebSocket message");
        Ok(Some(frame::encode(opcode, &data)))
    }
}

impl WebSocketCodec for EchoCodec {
    fn on_upgrade(&mut self, request: &Request, _response: &Response) {
        debug!(path = %request.path, host = %request.host, "WebSocket session opened");
        self.path = Some(request.path.clone());
    }

    fn parse(&mut self, buf: &[u8]) -> Result<CodecResult, FrameError> {
        let mut consumed = 0;
        let mut outbound = Vec::new();
        let mut handled = false;

        while let Some((frame, used)) = Frame::decode(&buf[consumed..])? {
            consumed += used;
            handled = true;

            match frame.opcode {
                OpCode::Ping => outbound.push(frame::encode(OpCode::Pong, &frame.payload)),
                OpCode::Pong => {}
                OpCode::Close => {
                    let code = frame::close_code(&frame.payload).unwrap_or(CloseCode::Normal);
                    outbound.push(frame::close_frame(code, ""));
                    return Ok(CodecResult {
                        outcome: CodecOutcome::Close,
                        consumed,
                        outbound,
                    });
                }
                OpCode::Text | OpCode::Binary | OpCode::Continuation => {
                    if let Some(reply) = self.handle_data(frame)? {
                        outbound.push(reply);
                    }
                }
            }
        }

        let outcome = if handled {
            CodecOutcome::KeepOpen
        } else {
            CodecOutcome::Incomplete
        };
        Ok(CodecResult {
            outcome,
            consumed,
            outbound,
        })
    }

    fn ping(&mut self) -> Bytes {
        frame::encode(OpCode::Ping, b"")
    }

    fn close(&mut self, reason: &str) -> Bytes {
        frame::close_frame(CloseCode::GoingAway, reason)
    }
}
