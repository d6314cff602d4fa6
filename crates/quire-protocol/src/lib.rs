//! Quire wire protocol
//!
//! Every frame is one JSON object terminated by `\n`, tagged by `type`.
//!
//! ## Client frames
//! ```text
//! {"type":"join","author":"ann","path":"notes.txt"}
//! {"type":"submit","operation":{"id":1,"author":"ann","base_version":0,"actions":[{"retain":1},{"insert":"X"},{"retain":2}]}}
//! {"type":"ping"}
//! {"type":"leave"}
//! ```
//!
//! ## Server frames
//! ```text
//! {"type":"joined","session_id":"...","content":"abc","version":0}
//! {"type":"ack","version":1}
//! {"type":"broadcast","version":2,"operation":{...}}
//! {"type":"resync","content":"YaXbc","version":2}
//! {"type":"error","code":"MALFORMED_OPERATION","message":"..."}
//! {"type":"pong"}
//! ```

pub mod command;
pub mod error;
pub mod parser;
pub mod response;

pub use command::ClientFrame;
pub use error::{ProtocolError, ProtocolResult};
pub use parser::{Parser, MAX_FRAME_SIZE};
pub use response::ServerFrame;
