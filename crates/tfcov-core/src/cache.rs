//! Session-scoped cache of built registries
//!
//! The first caller for a session builds the registry; callers arriving while
//! that build runs block until it finishes and share its outcome. A failed or
//! panicked build is delivered to every waiter and then forgotten, so the next
//! call for the session starts a fresh build. Entries older than the TTL are
//! treated as absent.

use crate::config::Settings;
use crate::error::{BuildError, ConfigError};
use crate::registry::Registry;
use std::any::Any;
use std::collections::HashMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Opaque handle identifying one analysis session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(u64);

impl SessionId {
    pub fn new() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        SessionId(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "session#{}", self.0)
    }
}

/// Cache introspection for monitoring
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub total_entries: usize,
    pub oldest_entry_age: Option<Duration>,
    pub expired_entries: usize,
}

enum Flight {
    Building,
    Ready(Arc<Registry>),
    Failed(BuildError),
}

struct Entry {
    created_at: Instant,
    state: Mutex<Flight>,
    done: Condvar,
}

impl Entry {
    fn new() -> Self {
        Self {
            created_at: Instant::now(),
            state: Mutex::new(Flight::Building),
            done: Condvar::new(),
        }
    }

    fn state(&self) -> MutexGuard<'_, Flight> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn is_building(&self) -> bool {
        matches!(*self.state(), Flight::Building)
    }

    fn finish(&self, outcome: &Result<Arc<Registry>, BuildError>) {
        *self.state() = match outcome {
            Ok(registry) => Flight::Ready(Arc::clone(registry)),
            Err(e) => Flight::Failed(e.clone()),
        };
        self.done.notify_all();
    }

    fn wait(&self) -> Result<Arc<Registry>, BuildError> {
        let mut state = self.state();
        loop {
            match &*state {
                Flight::Building => {
                    state = self
                        .done
                        .wait(state)
                        .unwrap_or_else(PoisonError::into_inner);
                }
                Flight::Ready(registry) => return Ok(Arc::clone(registry)),
                Flight::Failed(e) => return Err(e.clone()),
            }
        }
    }
}

/// Single-flight, TTL-evicting map from session to built registry
pub struct RegistryCache {
    ttl: Option<Duration>,
    entries: Mutex<HashMap<SessionId, Arc<Entry>>>,
}

impl std::fmt::Debug for RegistryCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegistryCache")
            .field("ttl", &self.ttl)
            .field("stats", &self.stats())
            .finish()
    }
}

impl RegistryCache {
    /// `ttl: None` disables eviction
    pub fn new(ttl: Option<Duration>) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn from_settings(settings: &Settings) -> Result<Self, ConfigError> {
        Ok(Self::new(settings.cache_ttl()?))
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<SessionId, Arc<Entry>>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// An in-flight build never expires
    fn is_expired(&self, entry: &Entry, now: Instant) -> bool {
        self.ttl
            .is_some_and(|ttl| now.duration_since(entry.created_at) >= ttl)
            && !entry.is_building()
    }

    /// The session's registry, running `build` only if no live entry exists.
    ///
    /// Concurrent callers for the same session run at most one `build`
    /// between them and all receive its outcome.
    pub fn get_or_build<F>(&self, session: SessionId, build: F) -> Result<Arc<Registry>, BuildError>
    where
        F: FnOnce() -> eyre::Result<Registry>,
    {
        let (entry, leader) = {
            let mut entries = self.entries();
            let live = entries
                .get(&session)
                .filter(|entry| !self.is_expired(entry, Instant::now()))
                .cloned();
            match live {
                Some(entry) => (entry, false),
                None => {
                    if entries.contains_key(&session) {
                        debug!("{} expired, rebuilding", session);
                    }
                    let entry = Arc::new(Entry::new());
                    entries.insert(session, Arc::clone(&entry));
                    (entry, true)
                }
            }
        };
        if !leader {
            return entry.wait();
        }

        let outcome = match catch_unwind(AssertUnwindSafe(build)) {
            Ok(Ok(registry)) => Ok(Arc::new(registry)),
            Ok(Err(report)) => Err(BuildError::from(report)),
            Err(payload) => Err(BuildError::Panicked(panic_message(payload.as_ref()))),
        };
        if let Err(e) = &outcome {
            warn!("{} build failed: {}", session, e);
            let mut entries = self.entries();
            if entries
                .get(&session)
                .is_some_and(|current| Arc::ptr_eq(current, &entry))
            {
                entries.remove(&session);
            }
        }
        entry.finish(&outcome);
        outcome
    }

    /// When the session's current entry was created
    pub fn created_at(&self, session: SessionId) -> Option<Instant> {
        self.entries().get(&session).map(|e| e.created_at)
    }

    /// Drop a session's entry. Waiters of an in-flight build still receive its outcome.
    pub fn release(&self, session: SessionId) -> bool {
        self.entries().remove(&session).is_some()
    }

    pub fn clear_all(&self) {
        let mut entries = self.entries();
        debug!("clearing {} cached sessions", entries.len());
        entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries().is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        let now = Instant::now();
        let entries = self.entries();
        CacheStats {
            total_entries: entries.len(),
            oldest_entry_age: entries
                .values()
                .map(|e| now.duration_since(e.created_at))
                .max(),
            expired_entries: entries
                .values()
                .filter(|e| self.is_expired(e, now))
                .count(),
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
