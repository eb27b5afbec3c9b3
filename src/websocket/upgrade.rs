//! HTTP → WebSocket upgrade handshake.

use base64::Engine;
use sha1::{Digest, Sha1};

use crate::http::request::Request;
use crate::http::response::{Response, ResponseBuilder, StatusCode};

/// GUID appended to the client key (RFC 6455 §1.3).
const WS_GUID: &str = "258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

/// Compute Sec-WebSocket-Accept value from client key.
pub fn compute_accept_key(key: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(key.trim().as_bytes());
    hasher.update(WS_GUID.as_bytes());
    let hash = hasher.finalize();
    base64::engine::general_purpose::STANDARD.encode(hash)
}

/// Builds the 101 response for an upgrade request, or `None` if the request
/// is not a well-formed upgrade.
pub fn upgrade_response(request: &Request) -> Option<Response> {
    if !request.is_websocket_upgrade() {
        return None;
    }
    if request.header("Sec-WebSocket-Version").map(str::trim) != Some("13") {
        return None;
    }
    let key = request.header("Sec-WebSocket-Key")?;

    Some(
        ResponseBuilder::new(StatusCode::SwitchingProtocols)
            .header("Upgrade", "websocket")
            .header("Connection", "Upgrade")
            .header("Sec-WebSocket-Accept", compute_accept_key(key))
            .build(),
    )
}
