use crate::http::request::{Method, Request};
use std::collections::HashMap;

/// Upper bound for a request head before it is rejected as malformed.
pub const MAX_HEAD_SIZE: usize = 64 * 1024;

/// Largest `Content-Length` accepted; anything above is rejected before the
/// body is buffered.
pub const MAX_BODY_SIZE: usize = 8 * 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    InvalidRequest,
    InvalidMethod,
    InvalidHeader,
    InvalidContentLength,
    HeadersTooLarge,
    BodyTooLarge,
    Incomplete,
}

/// Result of feeding the accumulated read buffer to a [`RequestParser`].
#[derive(Debug)]
pub enum ParseOutcome {
    /// A full request was decoded from the first `consumed` bytes.
    Complete { request: Request, consumed: usize },
    /// More bytes are needed.
    Incomplete,
    /// The buffer can never become a valid request.
    Invalid(ParseError),
}

/// Turns raw bytes into requests. Implementations must be stateless between
/// calls; the connection owns the buffer.
pub trait RequestParser: Send + Sync {
    fn parse(&self, buf: &[u8]) -> ParseOutcome;
}

/// HTTP/1.x parser for request heads with an optional `Content-Length` body.
#[derive(Debug, Default, Clone, Copy)]
pub struct HttpParser;

impl RequestParser for HttpParser {
    fn parse(&self, buf: &[u8]) -> ParseOutcome {
        match parse_http_request(buf) {
            Ok((request, consumed)) => ParseOutcome::Complete { request, consumed },
            Err(ParseError::Incomplete) => ParseOutcome::Incomplete,
            Err(e) => ParseOutcome::Invalid(e),
        }
    }
}

pub fn parse_http_request(buf: &[u8]) -> Result<(Request, usize), ParseError> {
    // Look for header/body separator
    let headers_end = match find_headers_end(buf) {
        Some(end) => end,
        None if buf.len() > MAX_HEAD_SIZE => return Err(ParseError::HeadersTooLarge),
        None => return Err(ParseError::Incomplete),
    };
    let header_bytes = &buf[..headers_end];
    let body_bytes = &buf[headers_end + 4..];

    let headers_str = std::str::from_utf8(header_bytes).map_err(|_| ParseError::InvalidRequest)?;

    let mut lines = headers_str.split("\r\n");

    // Request line
    let request_line = lines.next().ok_or(ParseError::InvalidRequest)?;
    let mut parts = request_line.split_whitespace();

    let method_str = parts.next().ok_or(ParseError::InvalidRequest)?;
    let path = parts.next().ok_or(ParseError::InvalidRequest)?;
    let version = parts.next().ok_or(ParseError::InvalidRequest)?;

    if parts.next().is_some() || !version.starts_with("HTTP/") {
        return Err(ParseError::InvalidRequest);
    }

    let method = Method::parse(method_str).ok_or(ParseError::InvalidMethod)?;

    // Headers
    let mut headers = HashMap::new();

    for line in lines {
        if line.is_empty() {
            continue;
        }

        let (key, value) = line.split_once(':').ok_or(ParseError::InvalidHeader)?;

        if key.trim().is_empty() {
            return Err(ParseError::InvalidHeader);
        }

        headers.insert(key.trim().to_string(), value.trim().to_string());
    }

    // Body
    let content_length = headers
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case("Content-Length"))
        .map(|(_, v)| {
            v.parse::<usize>()
                .map_err(|_| ParseError::InvalidContentLength)
        })
        .transpose()?
        .unwrap_or(0);

    if content_length > MAX_BODY_SIZE {
        return Err(ParseError::BodyTooLarge);
    }

    if body_bytes.len() < content_length {
        return Err(ParseError::Incomplete);
    }

    let body = body_bytes[..content_length].to_vec();

    let request = Request {
        method,
        path: path.to_string(),
        version: version.to_string(),
        headers,
        body,
        host: String::new(),
    };

    let total_consumed = headers_end + 4 + content_length;
    Ok((request, total_consumed))
}

fn find_headers_end(buf: &[u8]) -> Option<usize> {
    buf.windows(4).position(|w| w == b"\r\n\r\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_simple_get() {
        let req = b"GET / HTTP/1.1\r\nHost: example.com\r\n\r\n";

        let (parsed, consumed) = parse_http_request(req).unwrap();

        assert_eq!(parsed.path, "/");
        assert_eq!(parsed.headers.get("Host").unwrap(), "example.com");
        assert_eq!(consumed, req.len());
    }

    #[test]
    fn consumed_stops_at_first_request() {
        let req = b"GET /a HTTP/1.1\r\n\r\nGET /b HTTP/1.1\r\n\r\n";
        let (parsed, consumed) = parse_http_request(req).unwrap();

        assert_eq!(parsed.path, "/a");
        assert_eq!(&req[consumed..], b"GET /b HTTP/1.1\r\n\r\n");
    }

    #[test]
    fn oversized_head_is_rejected() {
        let mut req = b"GET / HTTP/1.1\r\nX-Fill: ".to_vec();
        req.resize(MAX_HEAD_SIZE + 1, b'a');

        assert_eq!(
            parse_http_request(&req).unwrap_err(),
            ParseError::HeadersTooLarge
        );
    }

    #[test]
    fn oversized_body_is_rejected_before_buffering() {
        let req = b"POST / HTTP/1.1\r\nContent-Length: 100000000000\r\n\r\nabc";

        assert_eq!(
            parse_http_request(req).unwrap_err(),
            ParseError::BodyTooLarge
        );
    }

    #[test]
    fn trait_maps_errors_to_outcomes() {
        let parser = HttpParser;
        assert!(matches!(
            parser.parse(b"GET / HTTP/1.1\r\n"),
            ParseOutcome::Incomplete
        ));
        assert!(matches!(
            parser.parse(b"BREW / HTTP/1.1\r\n\r\n"),
            ParseOutcome::Invalid(ParseError::InvalidMethod)
        ));
        assert!(matches!(
            parser.parse(b"GET / HTTP/1.1\r\n\r\n"),
            ParseOutcome::Complete { consumed: 18, .. }
        ));
    }
}
