//! Client-side replica of a document
//!
//! Keeps at most one operation in flight. Edits made while waiting for an
//! acknowledgement are composed into a buffer and sent after the ack.
//! After a rejection the local content no longer matches the server; edits
//! stay local until the following resync replaces them.

use crate::error::Result;
use crate::operation::Operation;
use crate::session::Outbound;
use crate::transform::{apply, compose, transform_pair};

#[derive(Debug, Clone, PartialEq, Eq)]
enum Pending {
    Synchronized,
    AwaitingAck(Operation),
    AwaitingWithBuffer(Operation, Operation),
}

/// Local copy of a document kept in step with a binder
#[derive(Debug, Clone)]
pub struct Replica {
    author: String,
    content: String,
    version: u64,
    pending: Pending,
    /// Local content diverged from the server and awaits a resync
    stale: bool,
    next_id: u64,
}

impl Replica {
    pub fn new(author: impl Into<String>, content: impl Into<String>, version: u64) -> Self {
        Self {
            author: author.into(),
            content: content.into(),
            version,
            pending: Pending::Synchronized,
            stale: false,
            next_id: 1,
        }
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    /// Last server version this replica has incorporated
    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn is_synchronized(&self) -> bool {
        !self.stale && self.pending == Pending::Synchronized
    }

    /// True between a rejection and the next resync
    pub fn is_stale(&self) -> bool {
        self.stale
    }

    /// Insert text locally. Returns the operation to submit, if any.
    pub fn insert(&mut self, pos: usize, text: &str) -> Result<Option<Operation>> {
        let len = self.content.chars().count();
        let op = Operation::builder(self.author.clone(), self.take_id(), self.version)
            .insert_at(len, pos, text);
        self.apply_local(op)
    }

    /// Delete text locally. Returns the operation to submit, if any.
    pub fn delete(&mut self, pos: usize, count: usize) -> Result<Option<Operation>> {
        let len = self.content.chars().count();
        let op = Operation::builder(self.author.clone(), self.take_id(), self.version)
            .delete_at(len, pos, count);
        self.apply_local(op)
    }

    /// Apply an operation computed against the local content.
    pub fn apply_local(&mut self, op: Operation) -> Result<Option<Operation>> {
        self.content = apply(&self.content, &op)?;
        if self.stale {
            return Ok(None);
        }

        let (pending, outgoing) = match std::mem::replace(&mut self.pending, Pending::Synchronized) {
            Pending::Synchronized => {
                let op = op.rebased(self.version);
                (Pending::AwaitingAck(op.clone()), Some(op))
            }
            Pending::AwaitingAck(inflight) => (Pending::AwaitingWithBuffer(inflight, op), None),
            Pending::AwaitingWithBuffer(inflight, buffer) => {
                (Pending::AwaitingWithBuffer(inflight, compose(&buffer, &op)?), None)
            }
        };
        self.pending = pending;
        Ok(outgoing)
    }

    /// Incorporate another author's operation committed at `version`.
    pub fn apply_remote(&mut self, version: u64, op: &Operation) -> Result<()> {
        if self.stale {
            // lengths no longer line up; the resync supersedes this
            self.version = version;
            return Ok(());
        }
        let (pending, op) = match &self.pending {
            Pending::Synchronized => (Pending::Synchronized, op.clone()),
            Pending::AwaitingAck(inflight) => {
                let (inflight, op) = transform_pair(inflight, op)?;
                (Pending::AwaitingAck(inflight), op)
            }
            Pending::AwaitingWithBuffer(inflight, buffer) => {
                let (inflight, op) = transform_pair(inflight, op)?;
                let (buffer, op) = transform_pair(buffer, &op)?;
                (Pending::AwaitingWithBuffer(inflight, buffer), op)
            }
        };

        self.content = apply(&self.content, &op)?;
        self.pending = pending;
        self.version = version;
        Ok(())
    }

    /// The in-flight operation was committed at `version`.
    ///
    /// Returns the buffered operation that should be submitted next.
    pub fn ack(&mut self, version: u64) -> Option<Operation> {
        self.version = version;
        match std::mem::replace(&mut self.pending, Pending::Synchronized) {
            Pending::AwaitingWithBuffer(_, buffer) => {
                let buffer = buffer.rebased(version);
                self.pending = Pending::AwaitingAck(buffer.clone());
                Some(buffer)
            }
            _ => None,
        }
    }

    /// Replace local state wholesale, dropping pending edits.
    pub fn resync(&mut self, content: impl Into<String>, version: u64) {
        self.content = content.into();
        self.version = version;
        self.pending = Pending::Synchronized;
        self.stale = false;
    }

    /// The in-flight operation was refused. Pending edits are dropped and
    /// nothing is sent until the next resync.
    pub fn reject(&mut self) {
        self.pending = Pending::Synchronized;
        self.stale = true;
    }

    /// Feed one outbound event. Returns an operation to submit, if any.
    pub fn handle(&mut self, event: &Outbound) -> Result<Option<Operation>> {
        match event {
            Outbound::Joined { content, version } | Outbound::Resync { content, version } => {
                self.resync(content.clone(), *version);
                Ok(None)
            }
            Outbound::Ack { version } => Ok(self.ack(*version)),
            Outbound::Broadcast { version, operation } => {
                self.apply_remote(*version, operation)?;
                Ok(None)
            }
            Outbound::Rejected { .. } => {
                self.reject();
                Ok(None)
            }
        }
    }

    fn take_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_local_edit_goes_out_once() {
        let mut replica = Replica::new("ann", "abc", 4);
        let op = replica.insert(3, "d").unwrap().unwrap();
        assert_eq!(op.base_version, 4);
        assert_eq!(replica.content(), "abcd");

        // second edit waits in the buffer
        assert!(replica.insert(4, "e").unwrap().is_none());
        assert!(replica.delete(0, 1).unwrap().is_none());
        assert_eq!(replica.content(), "bcde");

        let buffered = replica.ack(5).unwrap();
        assert_eq!(buffered.base_version, 5);
        assert_eq!(apply("abcd", &buffered).unwrap(), "bcde");

        assert!(replica.ack(6).is_none());
        assert!(replica.is_synchronized());
    }

    #[test]
    fn test_remote_edit_transforms_pending() {
        let mut ann = Replica::new("ann", "abc", 0);
        ann.insert(1, "X").unwrap();

        let bob_op = Operation::builder("bob", 1, 0).insert_at(3, 0, "Y");
        ann.apply_remote(1, &bob_op).unwrap();
        assert_eq!(ann.content(), "YaXbc");
        assert_eq!(ann.version(), 1);
    }

    #[test]
    fn test_remote_edit_transforms_buffer() {
        let mut ann = Replica::new("ann", "hello", 0);
        ann.insert(5, "!").unwrap();
        ann.delete(0, 1).unwrap();
        assert_eq!(ann.content(), "ello!");

        let bob_op = Operation::builder("bob", 1, 0).insert_at(5, 2, "--");
        ann.apply_remote(1, &bob_op).unwrap();
        assert_eq!(ann.content(), "e--llo!");
    }

    #[test]
    fn test_handle_resync_drops_pending() {
        let mut ann = Replica::new("ann", "abc", 0);
        ann.insert(0, "z").unwrap();
        let out = ann
            .handle(&Outbound::Resync {
                content: "fresh".into(),
                version: 9,
            })
            .unwrap();
        assert!(out.is_none());
        assert_eq!(ann.content(), "fresh");
        assert_eq!(ann.version(), 9);
        assert!(ann.is_synchronized());
    }

    #[test]
    fn test_rejection_holds_edits_until_resync() {
        let mut ann = Replica::new("ann", "abc", 0);
        assert!(ann.insert(0, "z").unwrap().is_some());

        let out = ann
            .handle(&Outbound::Rejected {
                reason: "bad lengths".into(),
            })
            .unwrap();
        assert!(out.is_none());
        assert!(ann.is_stale());
        assert!(!ann.is_synchronized());

        // nothing goes out against diverged content
        assert!(ann.insert(0, "q").unwrap().is_none());
        let bob_op = Operation::builder("bob", 1, 0).insert_at(3, 3, "!");
        ann.handle(&Outbound::Broadcast {
            version: 1,
            operation: bob_op,
        })
        .unwrap();

        ann.handle(&Outbound::Resync {
            content: "abc!".into(),
            version: 1,
        })
        .unwrap();
        assert!(ann.is_synchronized());

        let op = ann.insert(0, "q").unwrap().unwrap();
        assert_eq!(op.base_version, 1);
        assert_eq!(ann.content(), "qabc!");
    }
}
