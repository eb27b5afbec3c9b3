use crate::http::request::Request;
use crate::http::response::{Response, StatusCode};
use crate::websocket::upgrade::upgrade_response;

/// Application hook that turns a parsed request into a response.
///
/// Returning a response with [`StatusCode::SwitchingProtocols`] switches the
/// connection to WebSocket mode once that response has been queued.
pub trait RequestHandler: Send + Sync {
    fn handle(&self, request: &Request) -> Response;
}

impl<F> RequestHandler for F
where
    F: Fn(&Request) -> Response + Send + Sync,
{
    fn handle(&self, request: &Request) -> Response {
        self(request)
    }
}

/// Answers WebSocket upgrade requests and greets everything else.
#[derive(Debug, Clone)]
pub struct DefaultHandler {
    greeting: String,
}

impl Default for DefaultHandler {
    fn default() -> Self {
        Self {
            greeting: "Hello from Warden\n".to_string(),
        }
    }
}

impl DefaultHandler {
    pub fn new(greeting: impl Into<String>) -> Self {
        Self {
            greeting: greeting.into(),
        }
    }
}

impl RequestHandler for DefaultHandler {
    fn handle(&self, request: &Request) -> Response {
        if request.is_websocket_upgrade() {
            return upgrade_response(request).unwrap_or_else(|| Response::stock(StatusCode::BadRequest));
        }
        Response::ok(self.greeting.as_bytes())
    }
}
