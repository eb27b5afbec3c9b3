use warden::http::request::{Method, Request, RequestBuilder};
use std::collections::HashMap;

#[test]
fn test_request_header_retrieval() {
    let mut headers = HashMap::new();
    headers.insert("Host".to_string(), "example.com".to_string());
    headers.insert("Content-Type".to_string(), "application/json".to_string());

    let req = Request {
        method: Method::GET,
        path: "/".to_string(),
        version: "HTTP/1.1".to_string(),
        headers,
        body: vec![],
        host: String::new(),
    };

    assert_eq!(req.header("Host"), Some("example.com"));
    assert_eq!(req.header("Content-Type"), Some("application/json"));
    assert_eq!(req.header("Missing"), None);
}

#[test]
fn test_request_content_length_parsing() {
    let mut headers = HashMap::new();
    headers.insert("Content-Length".to_string(), "42".to_string());

    let req = Request {
        method: Method::POST,
        path: "/api".to_string(),
        version: "HTTP/1.1".to_string(),
        headers,
        body: vec![],
        host: String::new(),
    };

    assert_eq!(req.content_length(), 42);
}

#[test]
fn test_request_content_length_missing() {
    let req = Request {
        method: Method::GET,
        path: "/".to_string(),
        version: "HTTP/1.1".to_string(),
        headers: HashMap::new(),
        body: vec![],
        host: String::new(),
    };

    assert_eq!(req.content_length(), 0);
}

#[test]
fn test_request_content_length_invalid() {
    let mut headers = HashMap::new();
    headers.insert("Content-Length".to_string(), "not-a-number".to_string());

    let req = Request {
        method: Method::POST,
        path: "/api".to_string(),
        version: "HTTP/1.1".to_string(),
        headers,
        body: vec![],
        host: String::new(),
    };

    assert_eq!(req.content_length(), 0);
}

#[test]
fn test_request_keep_alive_requires_header() {
    // Without an explicit header the connection closes after one exchange
    let req = Request {
        method: Method::GET,
        path: "/".to_string(),
        version: "HTTP/1.1".to_string(),
        headers: HashMap::new(),
        body: vec![],
        host: String::new(),
    };

    assert!(!req.keep_alive());
}

#[test]
fn test_request_keep_alive_explicit_header() {
    let mut headers = HashMap::new();
    headers.insert("Connection".to_string(), "keep-alive".to_string());

    let req = Request {
        method: Method::GET,
        path: "/".to_string(),
        version: "HTTP/1.1".to_string(),
        headers,
        body: vec![],
        host: String::new(),
    };

    assert!(req.keep_alive());
}

#[test]
fn test_request_keep_alive_close() {
    let mut headers = HashMap::new();
    headers.insert("Connection".to_string(), "close".to_string());

    let req = Request {
        method: Method::GET,
        path: "/".to_string(),
        version: "HTTP/1.1".to_string(),
        headers,
        body: vec![],
        host: String::new(),
    };

    assert!(!req.keep_alive());
}

#[test]
fn test_request_keep_alive_case_insensitive() {
    let mut headers = HashMap::new();
    headers.insert("Connection".to_string(), "Keep-Alive".to_string());

    let req = Request {
        method: Method::GET,
        path: "/".to_string(),
        version: "HTTP/1.1".to_string(),
        headers,
        body: vec![],
        host: String::new(),
    };

    assert!(req.keep_alive());
}

#[test]
fn test_request_method_equality() {
    assert_eq!(Method::GET, Method::GET);
    assert_ne!(Method::GET, Method::POST);
}

#[test]
fn test_request_method_from_string() {
    assert_eq!(Method::parse("GET"), Some(Method::GET));
    assert_eq!(Method::parse("POST"), Some(Method::POST));
    assert_eq!(Method::parse("INVALID"), None);
    assert_eq!(Method::parse("get"), None); // Case-sensitive
}

#[test]
fn test_request_with_body() {
    let body_content = b"test body content".to_vec();
    let req = Request {
        method: Method::POST,
        path: "/api".to_string(),
        version: "HTTP/1.1".to_string(),
        headers: HashMap::new(),
        body: body_content.clone(),
        host: String::new(),
    };

    assert_eq!(req.body, body_content);
}

fn upgrade_request(connection: &str) -> Request {
    RequestBuilder::new()
        .method(Method::GET)
        .path("/chat")
        .header("Upgrade", "websocket")
        .header("Connection", connection)
        .header("Sec-WebSocket-Key", "dGhlIHNhbXBsZSBub25jZQ==")
        .header("Sec-WebSocket-Version", "13")
        .build()
        .unwrap()
}

#[test]
fn test_request_websocket_upgrade_detection() {
    assert!(upgrade_request("Upgrade").is_websocket_upgrade());
    assert!(upgrade_request("keep-alive, Upgrade").is_websocket_upgrade());
    assert!(!upgrade_request("keep-alive").is_websocket_upgrade());
}

#[test]
fn test_request_websocket_upgrade_requires_key() {
    let req = RequestBuilder::new()
        .method(Method::GET)
        .path("/chat")
        .header("Upgrade", "websocket")
        .header("Connection", "Upgrade")
        .build()
        .unwrap();

    assert!(!req.is_websocket_upgrade());
}

#[test]
fn test_request_header_lookup_ignores_case() {
    let req = RequestBuilder::new()
        .method(Method::GET)
        .path("/")
        .header("content-length", "7")
        .build()
        .unwrap();

    assert_eq!(req.header("Content-Length"), Some("7"));
    assert_eq!(req.content_length(), 7);
}

#[test]
fn test_request_method_name_round_trip() {
    for method in [Method::GET, Method::HEAD, Method::PATCH] {
        assert_eq!(Method::parse(method.as_str()), Some(method));
    }
}
