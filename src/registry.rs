//! Registry of connected sessions
//!
//! The single source of truth for "who is connected". Keeps two views of the
//! username/session relation plus the activity log, all behind one mutex so
//! they can never disagree. The lock is only held for map updates, never
//! across network I/O.

use std::collections::{BTreeMap, HashMap};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::debug;

use crate::session::SessionHandle;
use crate::types::SessionId;

/// Last-activity entry for one open connection
#[derive(Debug)]
struct Activity {
    handle: SessionHandle,
    last_activity: Instant,
}

#[derive(Debug, Default)]
struct RegistryState {
    /// Authenticated sessions: username -> session
    by_name: BTreeMap<String, SessionHandle>,
    /// Reverse view: session -> username
    by_session: HashMap<SessionId, String>,
    /// Every open connection, authenticated or not
    activity: HashMap<SessionId, Activity>,
}

/// A session found idle by `Registry::idle_sessions`
#[derive(Debug, Clone)]
pub struct IdleSession {
    pub handle: SessionHandle,
    /// Bound username, if the session had logged in
    pub username: Option<String>,
}

/// Shared session directory
///
/// Invariant: a username is a key of `by_name` iff exactly one live
/// authenticated session holds it, and `by_session` is its exact inverse.
#[derive(Debug, Default)]
pub struct Registry {
    state: Mutex<RegistryState>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start tracking activity for a freshly accepted connection
    pub fn track(&self, handle: SessionHandle) {
        let mut state = self.state.lock();
        state.activity.insert(
            handle.id,
            Activity {
                handle,
                last_activity: Instant::now(),
            },
        );
    }

    /// Refresh a session's last-activity timestamp
    pub fn touch(&self, id: SessionId) {
        if let Some(entry) = self.state.lock().activity.get_mut(&id) {
            entry.last_activity = Instant::now();
        }
    }

    /// Atomically claim `username` for `handle`
    ///
    /// Returns false if the name is already bound or the session already
    /// holds a name. On success the session's activity is refreshed.
    pub fn try_bind(&self, username: &str, handle: &SessionHandle) -> bool {
        let mut state = self.state.lock();
        if state.by_name.contains_key(username) || state.by_session.contains_key(&handle.id) {
            return false;
        }

        state.by_name.insert(username.to_string(), handle.clone());
        state.by_session.insert(handle.id, username.to_string());

        let now = Instant::now();
        state
            .activity
            .entry(handle.id)
            .and_modify(|entry| entry.last_activity = now)
            .or_insert_with(|| Activity {
                handle: handle.clone(),
                last_activity: now,
            });

        debug!("Bound '{}' to session {}", username, handle.id);
        true
    }

    /// Forget a session entirely
    ///
    /// Removes both directional views and the activity entry. Returns the
    /// username it was bound to; `None` if it never logged in or was already
    /// removed, so a second call is a no-op.
    pub fn unbind(&self, id: SessionId) -> Option<String> {
        let mut state = self.state.lock();
        state.activity.remove(&id);
        let username = state.by_session.remove(&id)?;
        state.by_name.remove(&username);
        Some(username)
    }

    /// All authenticated sessions, ordered by username
    ///
    /// Taken under one lock acquisition, so joins and leaves racing with the
    /// caller are either fully in or fully out.
    pub fn snapshot_all(&self) -> Vec<(String, SessionHandle)> {
        self.state
            .lock()
            .by_name
            .iter()
            .map(|(name, handle)| (name.clone(), handle.clone()))
            .collect()
    }

    /// Resolve a username to its session
    pub fn lookup(&self, username: &str) -> Option<SessionHandle> {
        self.state.lock().by_name.get(username).cloned()
    }

    /// Sessions whose last activity is more than `threshold` before `now`
    pub fn idle_sessions(&self, now: Instant, threshold: Duration) -> Vec<IdleSession> {
        let state = self.state.lock();
        state
            .activity
            .iter()
            .filter(|(_, entry)| now.saturating_duration_since(entry.last_activity) > threshold)
            .map(|(id, entry)| IdleSession {
                handle: entry.handle.clone(),
                username: state.by_session.get(id).cloned(),
            })
            .collect()
    }

    /// Drop every session, returning the handles so they can be closed
    pub fn clear(&self) -> Vec<SessionHandle> {
        let mut state = self.state.lock();
        state.by_name.clear();
        state.by_session.clear();
        state.activity.drain().map(|(_, entry)| entry.handle).collect()
    }

    /// Number of authenticated sessions
    pub fn len(&self) -> usize {
        self.state.lock().by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of open connections, authenticated or not
    pub fn connection_count(&self) -> usize {
        self.state.lock().activity.len()
    }
}
