//! Frame parser

use bytes::BytesMut;
use serde::de::DeserializeOwned;
use tracing::trace;

use crate::command::ClientFrame;
use crate::error::{ProtocolError, ProtocolResult};

/// Maximum frame size (4MB)
pub const MAX_FRAME_SIZE: usize = 4 * 1024 * 1024;

/// Accumulates bytes and yields complete frames
pub struct Parser {
    buffer: BytesMut,
}

impl Parser {
    pub fn new() -> Self {
        Self {
            buffer: BytesMut::with_capacity(4096),
        }
    }

    /// Add data to the parser buffer
    pub fn feed(&mut self, data: &[u8]) -> ProtocolResult<()> {
        let size = self.buffer.len() + data.len();
        if size > MAX_FRAME_SIZE && !data.contains(&b'\n') && !self.buffer.contains(&b'\n') {
            return Err(ProtocolError::FrameTooLarge {
                size,
                max: MAX_FRAME_SIZE,
            });
        }
        self.buffer.extend_from_slice(data);
        Ok(())
    }

    /// Try to parse the next client frame
    pub fn parse(&mut self) -> ProtocolResult<Option<ClientFrame>> {
        self.next_frame()
    }

    /// Try to parse the next complete frame of any type.
    ///
    /// Blank lines are skipped. Returns `Ok(None)` until a full line is
    /// buffered.
    pub fn next_frame<T: DeserializeOwned>(&mut self) -> ProtocolResult<Option<T>> {
        loop {
            let line_end = match self.buffer.iter().position(|&b| b == b'\n') {
                Some(pos) => pos,
                None => return Ok(None),
            };

            if line_end > MAX_FRAME_SIZE {
                let _ = self.buffer.split_to(line_end + 1);
                return Err(ProtocolError::FrameTooLarge {
                    size: line_end,
                    max: MAX_FRAME_SIZE,
                });
            }

            let line = self.buffer.split_to(line_end + 1);
            let line = trim_line(&line[..line_end]);
            if line.is_empty() {
                continue;
            }

            trace!(bytes = line.len(), "Frame received");
            return serde_json::from_slice(line).map(Some).map_err(Into::into);
        }
    }

    /// Bytes buffered but not yet parsed
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }
}

impl Default for Parser {
    fn default() -> Self {
        Self::new()
    }
}

fn trim_line(line: &[u8]) -> &[u8] {
    let start = line
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .unwrap_or(line.len());
    let end = line
        .iter()
        .rposition(|b| !b.is_ascii_whitespace())
        .map_or(start, |pos| pos + 1);
    &line[start..end]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::response::ServerFrame;
    use quire_core::Operation;

    #[test]
    fn test_parse_join() {
        let mut parser = Parser::new();
        parser
            .feed(b"{\"type\":\"join\",\"author\":\"ann\",\"path\":\"notes.txt\"}\n")
            .unwrap();

        assert_eq!(
            parser.parse().unwrap(),
            Some(ClientFrame::join("ann", "notes.txt"))
        );
        assert!(parser.parse().unwrap().is_none());
    }

    #[test]
    fn test_parse_split_across_reads() {
        let mut parser = Parser::new();
        parser.feed(b"{\"type\":\"pi").unwrap();
        assert!(parser.parse().unwrap().is_none());

        parser.feed(b"ng\"}\r\n\n{\"type\":\"leave\"}\n").unwrap();
        assert_eq!(parser.parse().unwrap(), Some(ClientFrame::Ping));
        assert_eq!(parser.parse().unwrap(), Some(ClientFrame::Leave));
        assert_eq!(parser.buffered(), 0);
    }

    #[test]
    fn test_parse_submit() {
        let mut parser = Parser::new();
        parser
            .feed(
                br#"{"type":"submit","operation":{"id":2,"author":"bob","base_version":3,"actions":[{"retain":1},{"insert":"X"},{"retain":0},{"retain":2}]}}
"#,
            )
            .unwrap();

        let expected = Operation::builder("bob", 2, 3).insert_at(3, 1, "X");
        assert_eq!(parser.parse().unwrap(), Some(ClientFrame::submit(expected)));
    }

    #[test]
    fn test_invalid_json_consumes_line() {
        let mut parser = Parser::new();
        parser.feed(b"not json\n{\"type\":\"ping\"}\n").unwrap();

        assert!(matches!(parser.parse(), Err(ProtocolError::InvalidJson(_))));
        assert_eq!(parser.parse().unwrap(), Some(ClientFrame::Ping));
    }

    #[test]
    fn test_overflowing_submit_is_invalid() {
        let mut parser = Parser::new();
        let frame = format!(
            "{{\"type\":\"submit\",\"operation\":{{\"id\":1,\"author\":\"eve\",\"base_version\":0,\"actions\":[{{\"retain\":{}}},{{\"retain\":5}}]}}}}\n{{\"type\":\"ping\"}}\n",
            u64::MAX
        );
        parser.feed(frame.as_bytes()).unwrap();

        match parser.parse() {
            Err(ProtocolError::InvalidJson(msg)) => assert!(msg.contains("overflows"), "{}", msg),
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(parser.parse().unwrap(), Some(ClientFrame::Ping));
    }

    #[test]
    fn test_unterminated_frame_too_large() {
        let mut parser = Parser::new();
        let chunk = vec![b'x'; MAX_FRAME_SIZE];
        parser.feed(&chunk).unwrap();
        assert!(matches!(
            parser.feed(b"y"),
            Err(ProtocolError::FrameTooLarge { .. })
        ));
    }

    #[test]
    fn test_server_frames_round_trip_through_parser() {
        let mut parser = Parser::new();
        let frame = ServerFrame::Ack { version: 7 };
        parser.feed(&frame.encode().unwrap()).unwrap();
        assert_eq!(parser.next_frame::<ServerFrame>().unwrap(), Some(frame));
    }
}
