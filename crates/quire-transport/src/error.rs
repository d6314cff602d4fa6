//! Transport error types

use quire_protocol::ProtocolError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("Core error: {0}")]
    Core(#[from] quire_core::Error),

    #[error("Client did not join within {0:?}")]
    HandshakeTimeout(std::time::Duration),
}
