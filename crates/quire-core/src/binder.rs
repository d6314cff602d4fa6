//! Binder - the single authority for one document
//!
//! Each binder is an actor task owning the canonical content, the version
//! counter, a bounded transform history and the attached sessions. Every
//! request goes through one mailbox and is handled to completion before the
//! next, so none of that state needs a lock.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::audit::{AuditRecord, Auditor};
use crate::document::{DocumentId, StoredDocument};
use crate::error::{Error, Result};
use crate::operation::Operation;
use crate::session::{Delivery, Outbound, Session, SessionId, SessionSlot};
use crate::store::Store;
use crate::transform::{apply, transform};

/// Delay between attempts to resync sessions whose queue overflowed
const RESYNC_RETRY: Duration = Duration::from_millis(50);

/// Binder tuning
#[derive(Debug, Clone)]
pub struct BinderConfig {
    /// Upper bound on retained history entries
    pub history_limit: usize,
    /// Capacity of each session's outbound queue
    pub outbound_capacity: usize,
    /// Capacity of the binder mailbox
    pub mailbox_capacity: usize,
    /// Persist changed content this often; `None` disables periodic flushes
    pub flush_interval: Option<Duration>,
}

impl Default for BinderConfig {
    fn default() -> Self {
        Self {
            history_limit: 500,
            outbound_capacity: 256,
            mailbox_capacity: 1024,
            flush_interval: Some(Duration::from_secs(30)),
        }
    }
}

/// Lifecycle of a binder
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinderState {
    /// No sessions attached
    Empty,
    /// At least one session attached
    Active,
    /// Final flush in progress
    Draining,
    /// Flushed and stopped; the mailbox is closed
    Evicted,
}

/// Point-in-time view of a binder
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BinderSnapshot {
    pub content: String,
    pub version: u64,
    pub sessions: usize,
    pub history_len: usize,
    pub state: BinderState,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum EvictOutcome {
    Evicted,
    StillActive,
}

enum Request {
    Join {
        author: String,
        reply: oneshot::Sender<(SessionId, mpsc::Receiver<Outbound>)>,
    },
    Submit {
        session: SessionId,
        operation: Operation,
    },
    Leave {
        session: SessionId,
    },
    Flush {
        reply: oneshot::Sender<Result<()>>,
    },
    Snapshot {
        reply: oneshot::Sender<BinderSnapshot>,
    },
    Evict {
        reply: oneshot::Sender<Result<EvictOutcome>>,
    },
}

/// Cloneable address of a running binder
#[derive(Debug, Clone)]
pub struct BinderHandle {
    path: DocumentId,
    tx: mpsc::Sender<Request>,
}

impl std::fmt::Debug for Request {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Request::Join { author, .. } => write!(f, "Join({})", author),
            Request::Submit { session, .. } => write!(f, "Submit({})", session),
            Request::Leave { session } => write!(f, "Leave({})", session),
            Request::Flush { .. } => write!(f, "Flush"),
            Request::Snapshot { .. } => write!(f, "Snapshot"),
            Request::Evict { .. } => write!(f, "Evict"),
        }
    }
}

impl BinderHandle {
    /// Spawn a binder task for `document` on the current runtime
    pub fn spawn(
        document: StoredDocument,
        store: Arc<dyn Store>,
        auditor: Option<Arc<dyn Auditor>>,
        config: BinderConfig,
    ) -> Self {
        let (tx, rx) = mpsc::channel(config.mailbox_capacity.max(1));
        let path = document.id.clone();

        info!(path = %path, version = document.version, "Binder opened");

        let binder = Binder {
            path: document.id,
            content: document.content,
            version: document.version,
            history: VecDeque::new(),
            sessions: HashMap::new(),
            state: BinderState::Empty,
            dirty: false,
            store,
            auditor,
            config,
            rx,
        };
        tokio::spawn(binder.run());

        Self { path, tx }
    }

    pub fn path(&self) -> &DocumentId {
        &self.path
    }

    /// Attach a new session at the current version
    pub async fn join(&self, author: impl Into<String>) -> Result<Session> {
        let author = author.into();
        let (reply, rx) = oneshot::channel();
        self.send(Request::Join {
            author: author.clone(),
            reply,
        })
        .await?;
        let (id, outbound) = rx.await.map_err(|_| self.closed())?;
        Ok(Session::new(id, author, self.clone(), outbound))
    }

    /// Queue an operation; the outcome arrives on the session's queue
    pub async fn submit(&self, session: SessionId, operation: Operation) -> Result<()> {
        self.send(Request::Submit { session, operation }).await
    }

    /// Detach a session
    pub async fn leave(&self, session: SessionId) -> Result<()> {
        self.send(Request::Leave { session }).await
    }

    /// Detach without waiting; a full mailbox leaves the slot to be reaped
    /// once its queue is seen closed
    pub(crate) fn try_leave(&self, session: SessionId) {
        if self.tx.try_send(Request::Leave { session }).is_err() {
            debug!(path = %self.path, session = %session, "Leave not queued");
        }
    }

    /// Persist the current content and version
    pub async fn flush(&self) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.send(Request::Flush { reply }).await?;
        rx.await.map_err(|_| self.closed())?
    }

    pub async fn snapshot(&self) -> Result<BinderSnapshot> {
        let (reply, rx) = oneshot::channel();
        self.send(Request::Snapshot { reply }).await?;
        rx.await.map_err(|_| self.closed())
    }

    pub(crate) async fn evict(&self) -> Result<EvictOutcome> {
        let (reply, rx) = oneshot::channel();
        self.send(Request::Evict { reply }).await?;
        rx.await.map_err(|_| self.closed())?
    }

    /// True once the binder has stopped accepting requests
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    /// True when both handles address the same binder
    pub fn same_binder(&self, other: &BinderHandle) -> bool {
        self.tx.same_channel(&other.tx)
    }

    async fn send(&self, request: Request) -> Result<()> {
        self.tx.send(request).await.map_err(|_| self.closed())
    }

    fn closed(&self) -> Error {
        Error::BinderClosed(self.path.to_string())
    }
}

struct Binder {
    path: DocumentId,
    content: String,
    version: u64,
    /// Committed operations; entry `op` produced version `op.base_version + 1`
    history: VecDeque<Operation>,
    sessions: HashMap<SessionId, SessionSlot>,
    state: BinderState,
    /// Content changed since the last successful save
    dirty: bool,
    store: Arc<dyn Store>,
    auditor: Option<Arc<dyn Auditor>>,
    config: BinderConfig,
    rx: mpsc::Receiver<Request>,
}

impl Binder {
    async fn run(mut self) {
        let mut ticker = self.config.flush_interval.map(|period| {
            let mut interval = tokio::time::interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            interval
        });

        loop {
            let retry = tokio::time::sleep(RESYNC_RETRY);
            tokio::select! {
                request = self.rx.recv() => {
                    match request {
                        Some(Request::Evict { reply }) => {
                            let outcome = self.evict().await;
                            let stop = matches!(outcome, Ok(EvictOutcome::Evicted));
                            if stop {
                                // refuse anything queued behind the eviction
                                self.rx.close();
                            }
                            let _ = reply.send(outcome);
                            if stop {
                                break;
                            }
                        }
                        Some(request) => self.handle(request).await,
                        None => break,
                    }
                }
                _ = tick(&mut ticker) => {
                    if self.dirty {
                        let _ = self.flush().await;
                    }
                }
                _ = retry, if self.resync_pending() => self.retry_resyncs(),
            }
        }

        info!(path = %self.path, version = self.version, state = ?self.state, "Binder stopped");
    }

    async fn handle(&mut self, request: Request) {
        match request {
            Request::Join { author, reply } => {
                let joined = self.join(author);
                if reply.send(joined).is_err() {
                    debug!(path = %self.path, "Join caller went away");
                }
            }
            Request::Submit { session, operation } => self.submit(session, operation),
            Request::Leave { session } => self.leave(session),
            Request::Flush { reply } => {
                let _ = reply.send(self.flush().await);
            }
            Request::Snapshot { reply } => {
                let _ = reply.send(self.snapshot());
            }
            Request::Evict { reply } => {
                // handled by the run loop
                let _ = reply.send(Ok(EvictOutcome::StillActive));
            }
        }
    }

    fn join(&mut self, author: String) -> (SessionId, mpsc::Receiver<Outbound>) {
        let (tx, rx) = mpsc::channel(self.config.outbound_capacity.max(1));
        let id = SessionId::new();
        let mut slot = SessionSlot::new(author, self.version, tx);
        slot.deliver(Outbound::Joined {
            content: self.content.clone(),
            version: self.version,
        });

        info!(
            path = %self.path,
            session = %id,
            author = %slot.author,
            version = self.version,
            "Session joined"
        );

        self.sessions.insert(id, slot);
        self.state = BinderState::Active;
        (id, rx)
    }

    fn submit(&mut self, id: SessionId, operation: Operation) {
        let Some(slot) = self.sessions.get_mut(&id) else {
            debug!(path = %self.path, session = %id, "Submit from unknown session dropped");
            return;
        };
        slot.acked_version = slot.acked_version.max(operation.base_version.min(self.version));

        if operation.base_version > self.version {
            warn!(
                path = %self.path,
                session = %id,
                base = operation.base_version,
                version = self.version,
                "Operation based on a future version, resyncing"
            );
            self.resync(id);
            return;
        }

        let committed = match self.rebase(operation).and_then(|op| {
            let content = apply(&self.content, &op)?;
            Ok((op, content))
        }) {
            Ok((op, content)) => {
                self.content = content;
                self.version += 1;
                self.dirty = true;
                op
            }
            Err(Error::HistoryTooOld { base, oldest }) => {
                debug!(path = %self.path, session = %id, base, oldest, "History too old, resyncing");
                self.resync(id);
                return;
            }
            Err(e) => {
                warn!(path = %self.path, session = %id, error = %e, "Operation rejected");
                self.deliver(id, Outbound::Rejected {
                    reason: e.to_string(),
                });
                // the client already applied the edit locally
                self.resync(id);
                return;
            }
        };

        let version = self.version;
        debug!(
            path = %self.path,
            session = %id,
            author = %committed.author,
            version,
            actions = %committed.summary(),
            "Operation committed"
        );

        if let Some(auditor) = &self.auditor {
            if let Err(e) = auditor.record(&AuditRecord::new(&self.path, &committed, version)) {
                warn!(path = %self.path, error = %e, "Audit record failed");
            }
        }

        if let Some(slot) = self.sessions.get_mut(&id) {
            slot.acked_version = version;
        }

        let mut closed = Vec::new();
        for (&sid, slot) in self.sessions.iter_mut() {
            let event = if slot.needs_resync {
                Outbound::Resync {
                    content: self.content.clone(),
                    version,
                }
            } else if sid == id {
                Outbound::Ack { version }
            } else {
                Outbound::Broadcast {
                    version,
                    operation: committed.clone(),
                }
            };
            let resync = matches!(event, Outbound::Resync { .. });

            match slot.deliver(event) {
                Delivery::Sent if resync => {
                    slot.needs_resync = false;
                    slot.acked_version = version;
                }
                Delivery::Sent => {}
                Delivery::Dropped => {
                    warn!(path = %self.path, session = %sid, "Outbound queue full, session will resync");
                }
                Delivery::Closed => closed.push(sid),
            }
        }

        self.history.push_back(committed);
        for sid in closed {
            self.leave(sid);
        }
        self.prune_history();
    }

    /// Transform `operation` forward over every entry committed after its base
    fn rebase(&self, operation: Operation) -> Result<Operation> {
        if operation.base_version == self.version {
            return Ok(operation);
        }

        let oldest = self
            .history
            .front()
            .map(|op| op.base_version)
            .unwrap_or(self.version);
        if operation.base_version < oldest {
            return Err(Error::HistoryTooOld {
                base: operation.base_version,
                oldest,
            });
        }

        let base = operation.base_version;
        self.history
            .iter()
            .skip_while(|entry| entry.base_version < base)
            .try_fold(operation, |op, entry| transform(&op, entry))
    }

    fn resync(&mut self, id: SessionId) {
        let event = Outbound::Resync {
            content: self.content.clone(),
            version: self.version,
        };
        let version = self.version;
        let delivery = match self.sessions.get_mut(&id) {
            Some(slot) => {
                let delivery = slot.deliver(event);
                if delivery == Delivery::Sent {
                    slot.needs_resync = false;
                    slot.acked_version = version;
                }
                delivery
            }
            None => return,
        };
        if delivery == Delivery::Closed {
            self.leave(id);
        }
    }

    fn resync_pending(&self) -> bool {
        self.sessions.values().any(|slot| slot.needs_resync)
    }

    /// Deliver overdue resyncs to sessions whose queue has drained
    fn retry_resyncs(&mut self) {
        let pending: Vec<SessionId> = self
            .sessions
            .iter()
            .filter(|(_, slot)| slot.needs_resync)
            .map(|(&id, _)| id)
            .collect();
        for id in pending {
            self.resync(id);
        }
        self.prune_history();
    }

    fn deliver(&mut self, id: SessionId, event: Outbound) {
        let closed = match self.sessions.get_mut(&id) {
            Some(slot) => slot.deliver(event) == Delivery::Closed,
            None => false,
        };
        if closed {
            self.leave(id);
        }
    }

    /// Drop entries no attached session can still be based on
    fn prune_history(&mut self) {
        let floor = self
            .sessions
            .values()
            .map(|slot| slot.acked_version)
            .min()
            .unwrap_or(self.version);

        while let Some(front) = self.history.front() {
            if front.base_version < floor || self.history.len() > self.config.history_limit {
                self.history.pop_front();
            } else {
                break;
            }
        }
    }

    fn leave(&mut self, id: SessionId) {
        let Some(slot) = self.sessions.remove(&id) else {
            return;
        };
        info!(path = %self.path, session = %id, author = %slot.author, "Session left");

        if self.sessions.is_empty() {
            self.state = BinderState::Empty;
            debug!(path = %self.path, "Binder idle");
        }
        self.prune_history();
    }

    async fn flush(&mut self) -> Result<()> {
        let doc = StoredDocument::with_content(self.path.clone(), self.content.clone(), self.version);
        match self.store.save(&doc).await {
            Ok(()) => {
                self.dirty = false;
                debug!(path = %self.path, version = self.version, "Binder flushed");
                Ok(())
            }
            Err(e) => {
                warn!(path = %self.path, error = %e, "Failed to persist document");
                Err(Error::StorePersistFailure {
                    path: self.path.to_string(),
                    reason: e.to_string(),
                })
            }
        }
    }

    async fn evict(&mut self) -> Result<EvictOutcome> {
        let gone: Vec<SessionId> = self
            .sessions
            .iter()
            .filter(|(_, slot)| slot.is_closed())
            .map(|(&id, _)| id)
            .collect();
        for id in gone {
            self.leave(id);
        }

        if !self.sessions.is_empty() {
            return Ok(EvictOutcome::StillActive);
        }

        self.state = BinderState::Draining;
        match self.flush().await {
            Ok(()) => {
                self.state = BinderState::Evicted;
                Ok(EvictOutcome::Evicted)
            }
            Err(e) => {
                self.state = BinderState::Empty;
                Err(e)
            }
        }
    }

    fn snapshot(&self) -> BinderSnapshot {
        BinderSnapshot {
            content: self.content.clone(),
            version: self.version,
            sessions: self.sessions.len(),
            history_len: self.history.len(),
            state: self.state,
        }
    }
}

async fn tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::replica::Replica;
    use crate::store::mock::RecordingStore;

    fn doc(content: &str) -> StoredDocument {
        StoredDocument::with_content(DocumentId::new("notes.txt").unwrap(), content, 0)
    }

    fn spawn(content: &str, config: BinderConfig) -> (BinderHandle, Arc<RecordingStore>) {
        let store = Arc::new(RecordingStore::default());
        let handle = BinderHandle::spawn(doc(content), store.clone(), None, config);
        (handle, store)
    }

    async fn next(session: &mut Session) -> Outbound {
        tokio::time::timeout(Duration::from_secs(1), session.recv())
            .await
            .expect("timed out waiting for outbound event")
            .expect("binder closed")
    }

    #[tokio::test]
    async fn test_concurrent_inserts_converge() {
        let (binder, _store) = spawn("abc", BinderConfig::default());
        let mut x = binder.join("x").await.unwrap();
        let mut y = binder.join("y").await.unwrap();

        let mut rx = Replica::new("x", "", 0);
        let mut ry = Replica::new("y", "", 0);
        rx.handle(&next(&mut x).await).unwrap();
        ry.handle(&next(&mut y).await).unwrap();

        let xop = rx.insert(1, "X").unwrap().unwrap();
        let yop = ry.insert(0, "Y").unwrap().unwrap();
        x.submit(xop).await.unwrap();
        y.submit(yop).await.unwrap();

        let snap = binder.snapshot().await.unwrap();
        assert_eq!(snap.content, "YaXbc");
        assert_eq!(snap.version, 2);

        let ack = next(&mut x).await;
        assert_eq!(ack, Outbound::Ack { version: 1 });
        rx.handle(&ack).unwrap();
        rx.handle(&next(&mut x).await).unwrap();
        let broadcast = next(&mut y).await;
        assert!(matches!(broadcast, Outbound::Broadcast { version: 1, .. }));
        ry.handle(&broadcast).unwrap();
        assert_eq!(next(&mut y).await, Outbound::Ack { version: 2 });
        ry.ack(2);

        assert_eq!(rx.content(), "YaXbc");
        assert_eq!(ry.content(), "YaXbc");
        assert_eq!(rx.version(), 2);
    }

    #[tokio::test]
    async fn test_versions_are_monotonic_and_rejects_do_not_count() {
        let (binder, _store) = spawn("", BinderConfig::default());
        let mut ann = binder.join("ann").await.unwrap();
        let mut bob = binder.join("bob").await.unwrap();
        next(&mut ann).await;
        next(&mut bob).await;

        for i in 0..5u64 {
            let op = Operation::builder("ann", i, i).insert_at(i as usize, i as usize, "a");
            ann.submit(op).await.unwrap();
            assert_eq!(next(&mut ann).await, Outbound::Ack { version: i + 1 });
        }

        // spans 10 characters of a 5 character document
        let bad = Operation::builder("bob", 1, 5).retain(10).insert("!").build();
        bob.submit(bad).await.unwrap();
        for _ in 0..5 {
            assert!(matches!(next(&mut bob).await, Outbound::Broadcast { .. }));
        }
        assert!(matches!(next(&mut bob).await, Outbound::Rejected { .. }));
        assert_eq!(
            next(&mut bob).await,
            Outbound::Resync {
                content: "aaaaa".into(),
                version: 5
            }
        );

        let snap = binder.snapshot().await.unwrap();
        assert_eq!(snap.version, 5);
        assert_eq!(snap.content, "aaaaa");
        assert!(ann.try_recv().is_none());
    }

    #[tokio::test]
    async fn test_stale_base_forces_resync() {
        let config = BinderConfig {
            history_limit: 1,
            ..BinderConfig::default()
        };
        let (binder, _store) = spawn("", config);
        let mut ann = binder.join("ann").await.unwrap();
        let mut bob = binder.join("bob").await.unwrap();
        next(&mut ann).await;
        next(&mut bob).await;

        for i in 0..3u64 {
            let op = Operation::builder("ann", i, i).insert_at(i as usize, 0, "z");
            ann.submit(op).await.unwrap();
        }

        let stale = Operation::builder("bob", 1, 0).insert_at(0, 0, "late");
        bob.submit(stale).await.unwrap();

        let snap = binder.snapshot().await.unwrap();
        assert_eq!(snap.version, 3);
        assert_eq!(snap.content, "zzz");
        assert_eq!(snap.history_len, 1);

        for _ in 0..3 {
            assert!(matches!(next(&mut bob).await, Outbound::Broadcast { .. }));
        }
        assert_eq!(
            next(&mut bob).await,
            Outbound::Resync {
                content: "zzz".into(),
                version: 3
            }
        );
    }

    #[tokio::test]
    async fn test_late_operation_within_history_is_transformed() {
        let (binder, _store) = spawn("hello", BinderConfig::default());
        let mut ann = binder.join("ann").await.unwrap();
        let mut bob = binder.join("bob").await.unwrap();
        next(&mut ann).await;
        next(&mut bob).await;

        ann.submit(Operation::builder("ann", 1, 0).insert_at(5, 5, " world"))
            .await
            .unwrap();
        ann.submit(Operation::builder("ann", 2, 1).insert_at(11, 0, ">"))
            .await
            .unwrap();
        bob.submit(Operation::builder("bob", 1, 0).delete_at(5, 0, 1))
            .await
            .unwrap();

        let snap = binder.snapshot().await.unwrap();
        assert_eq!(snap.content, ">ello world");
        assert_eq!(snap.version, 3);
    }

    #[tokio::test]
    async fn test_flush_is_idempotent() {
        let (binder, store) = spawn("abc", BinderConfig::default());
        binder.flush().await.unwrap();
        binder.flush().await.unwrap();

        let saves = store.saves();
        assert_eq!(saves.len(), 2);
        assert_eq!(saves[0].content, saves[1].content);
        assert_eq!(saves[0].version, saves[1].version);
    }

    #[tokio::test]
    async fn test_flush_failure_keeps_binder_usable() {
        let (binder, store) = spawn("abc", BinderConfig::default());
        let mut ann = binder.join("ann").await.unwrap();
        next(&mut ann).await;

        store.set_failing(true);
        assert!(matches!(
            binder.flush().await,
            Err(Error::StorePersistFailure { .. })
        ));

        ann.submit(Operation::builder("ann", 1, 0).insert_at(3, 3, "d"))
            .await
            .unwrap();
        assert_eq!(next(&mut ann).await, Outbound::Ack { version: 1 });

        store.set_failing(false);
        binder.flush().await.unwrap();
        assert_eq!(store.saves()[0].content, "abcd");
    }

    #[tokio::test(start_paused = true)]
    async fn test_full_outbound_queue_resyncs_without_further_edits() {
        let config = BinderConfig {
            outbound_capacity: 2,
            ..BinderConfig::default()
        };
        let (binder, _store) = spawn("", config);
        let mut ann = binder.join("ann").await.unwrap();
        let mut slow = binder.join("slow").await.unwrap();
        next(&mut ann).await;

        // slow holds Joined; one broadcast fits, the second is dropped
        for i in 0..2u64 {
            ann.submit(Operation::builder("ann", i, i).insert_at(i as usize, 0, "a"))
                .await
                .unwrap();
            next(&mut ann).await;
        }

        let mut replica = Replica::new("slow", "", 0);
        for _ in 0..2 {
            replica.handle(&next(&mut slow).await).unwrap();
        }
        assert_eq!(replica.content(), "a");
        assert!(slow.try_recv().is_none());

        // the document stays quiet; the binder catches the session up anyway
        let event = next(&mut slow).await;
        assert_eq!(
            event,
            Outbound::Resync {
                content: "aa".into(),
                version: 2
            }
        );
        replica.handle(&event).unwrap();
        assert_eq!(replica.content(), "aa");
        assert_eq!(replica.version(), 2);

        ann.submit(Operation::builder("ann", 2, 2).insert_at(2, 0, "a"))
            .await
            .unwrap();
        next(&mut ann).await;
        assert!(matches!(next(&mut slow).await, Outbound::Broadcast { version: 3, .. }));
    }

    #[tokio::test]
    async fn test_leave_and_evict() {
        let (binder, store) = spawn("abc", BinderConfig::default());
        let ann = binder.join("ann").await.unwrap();

        assert_eq!(binder.evict().await.unwrap(), EvictOutcome::StillActive);

        binder.leave(ann.id()).await.unwrap();
        assert_eq!(binder.snapshot().await.unwrap().state, BinderState::Empty);

        assert_eq!(binder.evict().await.unwrap(), EvictOutcome::Evicted);
        assert_eq!(store.saves().len(), 1);
        assert!(binder.is_closed());
        assert!(matches!(binder.join("bob").await, Err(Error::BinderClosed(_))));
    }

    #[tokio::test]
    async fn test_dropped_session_is_removed() {
        let (binder, _store) = spawn("", BinderConfig::default());
        let mut ann = binder.join("ann").await.unwrap();
        let bob = binder.join("bob").await.unwrap();
        next(&mut ann).await;
        drop(bob);

        ann.submit(Operation::builder("ann", 1, 0).insert("x").build())
            .await
            .unwrap();
        next(&mut ann).await;
        assert_eq!(binder.snapshot().await.unwrap().sessions, 1);
    }

    #[tokio::test]
    async fn test_dropped_session_does_not_block_eviction() {
        let (binder, store) = spawn("abc", BinderConfig::default());
        let ann = binder.join("ann").await.unwrap();
        drop(ann);

        assert_eq!(binder.evict().await.unwrap(), EvictOutcome::Evicted);
        assert_eq!(store.saves().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_periodic_flush_only_when_dirty() {
        let config = BinderConfig {
            flush_interval: Some(Duration::from_secs(5)),
            ..BinderConfig::default()
        };
        let (binder, store) = spawn("", config);
        let mut ann = binder.join("ann").await.unwrap();
        next(&mut ann).await;

        tokio::time::sleep(Duration::from_secs(6)).await;
        binder.snapshot().await.unwrap();
        assert!(store.saves().is_empty());

        ann.submit(Operation::builder("ann", 1, 0).insert("x").build())
            .await
            .unwrap();
        next(&mut ann).await;
        tokio::time::sleep(Duration::from_secs(5)).await;
        binder.snapshot().await.unwrap();
        assert_eq!(store.saves().len(), 1);
        assert_eq!(store.saves()[0].content, "x");
    }
}
