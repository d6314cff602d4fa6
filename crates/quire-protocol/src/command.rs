//! Frames sent by clients

use quire_core::Operation;
use serde::{Deserialize, Serialize};

use crate::error::ProtocolResult;
use crate::response::encode_line;

/// A frame sent from client to server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientFrame {
    /// Attach to a document, creating it if permitted
    Join { author: String, path: String },
    /// Submit an edit against the session's document
    Submit { operation: Operation },
    Ping,
    /// Detach and close the connection
    Leave,
}

impl ClientFrame {
    pub fn join(author: impl Into<String>, path: impl Into<String>) -> Self {
        ClientFrame::Join {
            author: author.into(),
            path: path.into(),
        }
    }

    pub fn submit(operation: Operation) -> Self {
        ClientFrame::Submit { operation }
    }

    /// Frame name for logs
    pub fn name(&self) -> &'static str {
        match self {
            ClientFrame::Join { .. } => "join",
            ClientFrame::Submit { .. } => "submit",
            ClientFrame::Ping => "ping",
            ClientFrame::Leave => "leave",
        }
    }

    /// Serialize as one newline-terminated line
    pub fn encode(&self) -> ProtocolResult<bytes::BytesMut> {
        encode_line(self)
    }
}
