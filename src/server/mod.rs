//! Connection core: transports, the per-connection actor and the manager
//! that owns every live connection.

pub mod connection;
pub mod idle_timer;
pub mod listener;
pub mod manager;
pub mod stats;
pub mod tls;
pub mod transport;
pub mod write_queue;

pub use connection::{Connection, Phase, ProtocolMode, Services};
pub use manager::{ConnectionEvent, ConnectionManager};
pub use transport::Transport;
