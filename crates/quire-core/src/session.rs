//! Sessions: one client attached to one binder

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use uuid::Uuid;

use crate::binder::BinderHandle;
use crate::curator::Lease;
use crate::document::DocumentId;
use crate::error::Result;
use crate::operation::Operation;

/// Unique session identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Event delivered to a session's outbound queue
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    /// First event of every session
    Joined { content: String, version: u64 },
    /// The session's own operation was committed at `version`
    Ack { version: u64 },
    /// Another session's operation, already transformed, committed at `version`
    Broadcast { version: u64, operation: Operation },
    /// Replace local state; any pending local edits were discarded
    Resync { content: String, version: u64 },
    /// The session's operation was refused and the document left untouched
    Rejected { reason: String },
}

/// A client's attachment to a binder.
///
/// Submissions only enqueue; results arrive through [`Session::recv`].
/// Dropping a session detaches it, and a session handed out by the
/// curator gives back its registry reference at the same time.
#[derive(Debug)]
pub struct Session {
    id: SessionId,
    author: String,
    binder: BinderHandle,
    outbound: mpsc::Receiver<Outbound>,
    /// Dropped after `outbound` so the binder sees a closed queue first
    lease: Option<Lease>,
    left: bool,
}

impl Session {
    pub(crate) fn new(
        id: SessionId,
        author: String,
        binder: BinderHandle,
        outbound: mpsc::Receiver<Outbound>,
    ) -> Self {
        Self {
            id,
            author,
            binder,
            outbound,
            lease: None,
            left: false,
        }
    }

    pub(crate) fn attach(&mut self, lease: Lease) {
        self.lease = Some(lease);
    }

    /// The binder already processed this session's leave
    pub(crate) fn mark_left(&mut self) {
        self.left = true;
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn author(&self) -> &str {
        &self.author
    }

    pub fn path(&self) -> &DocumentId {
        self.binder.path()
    }

    pub fn binder(&self) -> &BinderHandle {
        &self.binder
    }

    /// Queue an operation on the binder
    pub async fn submit(&self, operation: Operation) -> Result<()> {
        self.binder.submit(self.id, operation).await
    }

    /// Next outbound event, `None` once the binder is gone
    pub async fn recv(&mut self) -> Option<Outbound> {
        self.outbound.recv().await
    }

    /// Outbound event if one is already queued
    pub fn try_recv(&mut self) -> Option<Outbound> {
        self.outbound.try_recv().ok()
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if !self.left {
            self.binder.try_leave(self.id);
        }
    }
}

/// Binder-side view of a session
#[derive(Debug)]
pub(crate) struct SessionSlot {
    pub(crate) author: String,
    /// Highest version the client is known to have seen
    pub(crate) acked_version: u64,
    /// An event was dropped on a full queue; next delivery must be a resync
    pub(crate) needs_resync: bool,
    tx: mpsc::Sender<Outbound>,
}

/// Result of pushing onto a session queue
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Delivery {
    Sent,
    Dropped,
    Closed,
}

impl SessionSlot {
    pub(crate) fn new(author: String, acked_version: u64, tx: mpsc::Sender<Outbound>) -> Self {
        Self {
            author,
            acked_version,
            needs_resync: false,
            tx,
        }
    }

    pub(crate) fn deliver(&mut self, event: Outbound) -> Delivery {
        match self.tx.try_send(event) {
            Ok(()) => Delivery::Sent,
            Err(TrySendError::Full(_)) => {
                self.needs_resync = true;
                Delivery::Dropped
            }
            Err(TrySendError::Closed(_)) => Delivery::Closed,
        }
    }

    /// The client dropped its end of the queue
    pub(crate) fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}
