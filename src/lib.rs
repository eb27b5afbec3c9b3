//! Warden - embedded HTTP/WebSocket connection core
//!
//! Per-connection state machine, transports and connection registry for a
//! small HTTP server that can run over TLS and upgrade connections to
//! WebSocket.

pub mod config;
pub mod error;
pub mod http;
pub mod server;
pub mod websocket;
