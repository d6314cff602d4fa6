//! Curator - registry of live binders keyed by path
//!
//! At most one binder is resident per path. The curator tracks how many
//! sessions each binder serves and evicts a binder once it has been idle
//! for the configured grace period.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, error, info, warn};

use crate::acl::{Access, Authorizer, Intent};
use crate::audit::Auditor;
use crate::binder::{BinderConfig, BinderHandle, EvictOutcome};
use crate::document::{DocumentId, StoredDocument};
use crate::error::{Error, Result};
use crate::session::Session;
use crate::store::Store;

/// Curator tuning
#[derive(Debug, Clone)]
pub struct CuratorConfig {
    /// How long an idle binder stays resident before eviction
    pub eviction_grace: Duration,
    /// Further eviction attempts after a failed final flush
    pub flush_retries: u32,
    pub retry_interval: Duration,
    pub binder: BinderConfig,
}

impl Default for CuratorConfig {
    fn default() -> Self {
        Self {
            eviction_grace: Duration::ZERO,
            flush_retries: 3,
            retry_interval: Duration::from_secs(1),
            binder: BinderConfig::default(),
        }
    }
}

/// Registry counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CuratorStats {
    pub binders: usize,
    pub sessions: usize,
}

struct Entry {
    binder: BinderHandle,
    sessions: usize,
    /// Distinguishes successive binders installed for the same path
    generation: u64,
}

/// One registry reference, held by a session for as long as it lives
#[derive(Debug)]
pub(crate) struct Lease {
    curator: Weak<Curator>,
    path: DocumentId,
    binder: BinderHandle,
    generation: u64,
}

impl Drop for Lease {
    fn drop(&mut self) {
        if let Some(curator) = self.curator.upgrade() {
            curator.drop_lease(&self.path, &self.binder, self.generation);
        }
    }
}

/// Shared registry of binders
pub struct Curator {
    registry: Mutex<HashMap<DocumentId, Entry>>,
    store: Arc<dyn Store>,
    acl: Arc<dyn Authorizer>,
    auditor: Option<Arc<dyn Auditor>>,
    config: CuratorConfig,
    generations: AtomicU64,
}

impl Curator {
    pub fn new(store: Arc<dyn Store>, acl: Arc<dyn Authorizer>, config: CuratorConfig) -> Self {
        Self {
            registry: Mutex::new(HashMap::new()),
            store,
            acl,
            auditor: None,
            config,
            generations: AtomicU64::new(0),
        }
    }

    /// Send a record of every accepted operation to `auditor`
    pub fn with_auditor(mut self, auditor: Arc<dyn Auditor>) -> Self {
        self.auditor = Some(auditor);
        self
    }

    pub fn config(&self) -> &CuratorConfig {
        &self.config
    }

    /// Attach `author` to the document at `path`, creating it if needed.
    ///
    /// A missing document is created only when the authorizer grants
    /// [`Intent::Create`]. A denied request leaves the registry untouched.
    pub async fn create_or_join(self: &Arc<Self>, path: &str, author: &str) -> Result<Session> {
        let id = DocumentId::new(path)?;

        loop {
            let resident = self
                .registry
                .lock()
                .get(&id)
                .map(|entry| (entry.binder.clone(), entry.generation));

            let (binder, generation) = match resident {
                Some(found) => {
                    self.authorize(&id, author, Intent::Join)?;
                    found
                }
                None => {
                    let stored = self.store.load(&id).await?;
                    let intent = if stored.is_some() {
                        Intent::Join
                    } else {
                        Intent::Create
                    };
                    self.authorize(&id, author, intent)?;
                    self.install(&id, stored)
                }
            };

            if !self.acquire(&id, generation) {
                continue;
            }

            match binder.join(author).await {
                Ok(mut session) => {
                    session.attach(Lease {
                        curator: Arc::downgrade(self),
                        path: id,
                        binder,
                        generation,
                    });
                    return Ok(session);
                }
                Err(Error::BinderClosed(_)) => {
                    // lost a race with eviction; the next pass reloads from the store
                    debug!(path = %id, "Binder closed during join, retrying");
                    self.forget(&id, generation);
                }
                Err(e) => {
                    self.drop_ref(&id, generation);
                    return Err(e);
                }
            }
        }
    }

    /// Detach a session and schedule eviction if its binder became idle.
    ///
    /// Dropping the session has the same effect without waiting for the
    /// binder to process the leave.
    pub async fn release(&self, mut session: Session) {
        match session.binder().leave(session.id()).await {
            Ok(()) => session.mark_left(),
            Err(e) => {
                debug!(path = %session.path(), session = %session.id(), error = %e, "Leave after binder stopped");
            }
        }
    }

    /// Flush every resident binder, returning the first failure
    pub async fn flush_all(&self) -> Result<()> {
        let binders: Vec<BinderHandle> = self
            .registry
            .lock()
            .values()
            .map(|entry| entry.binder.clone())
            .collect();

        let mut first_error = None;
        for binder in binders {
            match binder.flush().await {
                Ok(()) | Err(Error::BinderClosed(_)) => {}
                Err(e) => {
                    warn!(path = %binder.path(), error = %e, "Flush failed");
                    first_error.get_or_insert(e);
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    pub fn is_resident(&self, path: &DocumentId) -> bool {
        self.registry.lock().contains_key(path)
    }

    pub fn stats(&self) -> CuratorStats {
        let registry = self.registry.lock();
        CuratorStats {
            binders: registry.len(),
            sessions: registry.values().map(|entry| entry.sessions).sum(),
        }
    }

    fn authorize(&self, path: &DocumentId, identity: &str, intent: Intent) -> Result<()> {
        match self.acl.authorize(path, identity, intent) {
            Access::Allow => Ok(()),
            Access::Deny => {
                warn!(path = %path, identity, %intent, "Access denied");
                Err(Error::AuthorizationDenied {
                    path: path.to_string(),
                    identity: identity.to_string(),
                    intent,
                })
            }
        }
    }

    /// Spawn a binder for `path` unless another caller already did
    fn install(&self, path: &DocumentId, stored: Option<StoredDocument>) -> (BinderHandle, u64) {
        let mut registry = self.registry.lock();
        if let Some(entry) = registry.get(path) {
            return (entry.binder.clone(), entry.generation);
        }

        let doc = stored.unwrap_or_else(|| StoredDocument::new(path.clone()));
        let binder = BinderHandle::spawn(
            doc,
            Arc::clone(&self.store),
            self.auditor.clone(),
            self.config.binder.clone(),
        );
        let generation = self.generations.fetch_add(1, Ordering::Relaxed);
        registry.insert(
            path.clone(),
            Entry {
                binder: binder.clone(),
                sessions: 0,
                generation,
            },
        );
        (binder, generation)
    }

    fn acquire(&self, path: &DocumentId, generation: u64) -> bool {
        match self.registry.lock().get_mut(path) {
            Some(entry) if entry.generation == generation => {
                entry.sessions += 1;
                true
            }
            _ => false,
        }
    }

    fn drop_ref(&self, path: &DocumentId, generation: u64) {
        if let Some(entry) = self.registry.lock().get_mut(path) {
            if entry.generation == generation {
                entry.sessions = entry.sessions.saturating_sub(1);
            }
        }
    }

    fn drop_lease(self: &Arc<Self>, path: &DocumentId, binder: &BinderHandle, generation: u64) {
        let idle = {
            let mut registry = self.registry.lock();
            match registry.get_mut(path) {
                Some(entry) if entry.generation == generation => {
                    entry.sessions = entry.sessions.saturating_sub(1);
                    entry.sessions == 0
                }
                _ => false,
            }
        };
        if !idle {
            return;
        }

        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                let curator = Arc::clone(self);
                let (path, binder) = (path.clone(), binder.clone());
                runtime.spawn(async move {
                    curator.evict_when_idle(path, binder, generation).await;
                });
            }
            Err(_) => debug!(path = %path, "No runtime left to evict idle binder"),
        }
    }

    fn forget(&self, path: &DocumentId, generation: u64) {
        let mut registry = self.registry.lock();
        if registry.get(path).map(|entry| entry.generation) == Some(generation) {
            registry.remove(path);
        }
    }

    fn idle(&self, path: &DocumentId, generation: u64) -> bool {
        matches!(
            self.registry.lock().get(path),
            Some(entry) if entry.generation == generation && entry.sessions == 0
        )
    }

    async fn evict_when_idle(&self, path: DocumentId, binder: BinderHandle, generation: u64) {
        if !self.config.eviction_grace.is_zero() {
            tokio::time::sleep(self.config.eviction_grace).await;
        }

        let mut failures = 0;
        loop {
            if !self.idle(&path, generation) {
                return;
            }

            match binder.evict().await {
                Ok(EvictOutcome::Evicted) => {
                    self.forget(&path, generation);
                    info!(path = %path, "Binder evicted");
                    return;
                }
                Ok(EvictOutcome::StillActive) => return,
                Err(Error::BinderClosed(_)) => {
                    self.forget(&path, generation);
                    return;
                }
                Err(e) => {
                    failures += 1;
                    if failures > self.config.flush_retries {
                        error!(
                            path = %path,
                            error = %e,
                            "Giving up on eviction, binder stays resident"
                        );
                        return;
                    }
                    warn!(path = %path, error = %e, attempt = failures, "Eviction flush failed, retrying");
                    tokio::time::sleep(self.config.retry_interval).await;
                }
            }
        }
    }
}
