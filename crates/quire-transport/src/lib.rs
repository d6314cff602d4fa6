//! Quire Transport Layer
//!
//! Serves the newline-delimited JSON protocol over TCP. Each connection
//! joins one document and is then pumped between the socket and its
//! session until the client leaves, disconnects or goes quiet for longer
//! than the session timeout.

pub mod error;
pub mod handler;
pub mod tcp;

pub use error::TransportError;
pub use handler::{ConnectionHandler, TransportConfig};
pub use tcp::TcpServer;
