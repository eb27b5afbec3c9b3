//! HTTP protocol pieces consumed by the connection core.
//!
//! # Architecture
//!
//! - **`parser`**: Parses incoming HTTP requests from byte buffers
//! - **`request`**: HTTP request representation and header helpers
//! - **`response`**: HTTP response representation with builder pattern
//! - **`writer`**: Serializes responses for the wire
//! - **`handler`**: The application hook producing responses
//!
//! The connection state machine itself lives in [`crate::server::connection`];
//! this module only knows how to turn bytes into requests and responses into
//! bytes.

pub mod handler;
pub mod parser;
pub mod request;
pub mod response;
pub mod writer;
