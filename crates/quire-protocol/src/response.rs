//! Frames sent by the server

use bytes::{BufMut, BytesMut};
use quire_core::{Error, Operation, Outbound, SessionId};
use serde::{Deserialize, Serialize};

use crate::error::ProtocolResult;

/// A frame sent from server to client
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerFrame {
    Joined {
        session_id: String,
        content: String,
        version: u64,
    },
    Ack {
        version: u64,
    },
    Broadcast {
        version: u64,
        operation: Operation,
    },
    Resync {
        content: String,
        version: u64,
    },
    Error {
        code: String,
        message: String,
    },
    Pong,
}

impl ServerFrame {
    pub fn error(code: impl Into<String>, message: impl Into<String>) -> Self {
        ServerFrame::Error {
            code: code.into(),
            message: message.into(),
        }
    }

    /// Translate a session event for the wire
    pub fn from_outbound(session: SessionId, event: Outbound) -> Self {
        match event {
            Outbound::Joined { content, version } => ServerFrame::Joined {
                session_id: session.to_string(),
                content,
                version,
            },
            Outbound::Ack { version } => ServerFrame::Ack { version },
            Outbound::Broadcast { version, operation } => ServerFrame::Broadcast { version, operation },
            Outbound::Resync { content, version } => ServerFrame::Resync { content, version },
            Outbound::Rejected { reason } => ServerFrame::error("REJECTED", reason),
        }
    }

    /// Serialize as one newline-terminated line
    pub fn encode(&self) -> ProtocolResult<BytesMut> {
        encode_line(self)
    }

    pub fn is_error(&self) -> bool {
        matches!(self, ServerFrame::Error { .. })
    }
}

impl From<&Error> for ServerFrame {
    fn from(e: &Error) -> Self {
        let code = match e {
            Error::AuthorizationDenied { .. } => "ACCESS_DENIED",
            Error::MalformedOperation(_) => "MALFORMED_OPERATION",
            Error::HistoryTooOld { .. } => "HISTORY_TOO_OLD",
            Error::StorePersistFailure { .. } | Error::Store(_) => "STORE",
            Error::InvalidPath(_) => "INVALID_PATH",
            Error::BinderClosed(_) => "BINDER_CLOSED",
        };
        ServerFrame::error(code, e.to_string())
    }
}

pub(crate) fn encode_line<T: Serialize>(frame: &T) -> ProtocolResult<BytesMut> {
    let json = serde_json::to_vec(frame)?;
    let mut buf = BytesMut::with_capacity(json.len() + 1);
    buf.put_slice(&json);
    buf.put_u8(b'\n');
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_is_one_line() {
        let frame = ServerFrame::Resync {
            content: "line one\nline two".into(),
            version: 4,
        };
        let buf = frame.encode().unwrap();
        assert_eq!(buf.iter().filter(|&&b| b == b'\n').count(), 1);
        assert_eq!(buf.last(), Some(&b'\n'));

        let value: serde_json::Value = serde_json::from_slice(&buf[..buf.len() - 1]).unwrap();
        assert_eq!(value["type"], "resync");
        assert_eq!(value["version"], 4);
    }

    #[test]
    fn test_rejected_becomes_error_frame() {
        let frame = ServerFrame::from_outbound(
            SessionId::new(),
            Outbound::Rejected {
                reason: "bad length".into(),
            },
        );
        assert_eq!(frame, ServerFrame::error("REJECTED", "bad length"));
    }

    #[test]
    fn test_core_error_codes() {
        let frame = ServerFrame::from(&Error::InvalidPath("../x".into()));
        match frame {
            ServerFrame::Error { code, .. } => assert_eq!(code, "INVALID_PATH"),
            other => panic!("unexpected frame {:?}", other),
        }
    }
}
