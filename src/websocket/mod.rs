//! WebSocket support: the upgrade handshake, frame codec and the codec seam
//! the connection drives once it has switched protocols.

pub mod codec;
pub mod frame;
pub mod upgrade;

pub use codec::{CodecFactory, CodecOutcome, CodecResult, EchoCodec, WebSocketCodec};
pub use frame::FrameError;
