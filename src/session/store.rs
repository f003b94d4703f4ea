//! In-memory session store with per-session locking.

use super::Turn;
use crate::error::{BookMindError, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};
use tracing::{debug, info};

/// A single conversation.
#[derive(Debug, Clone, Serialize)]
pub struct Session {
    #[serde(rename = "session_id")]
    id: String,
    turns: Vec<Turn>,
    created_at: DateTime<Utc>,
    last_activity: DateTime<Utc>,
}

impl Session {
    /// Create an empty session.
    pub fn new(id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            turns: Vec::new(),
            created_at: now,
            last_activity: now,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Turns in append order.
    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn last_activity(&self) -> DateTime<Utc> {
        self.last_activity
    }

    pub(crate) fn push(&mut self, turn: Turn) {
        self.turns.push(turn);
        self.last_activity = Utc::now();
    }

    pub(crate) fn extend(&mut self, turns: Vec<Turn>) {
        self.turns.extend(turns);
        self.last_activity = Utc::now();
    }
}

/// Shared handle to a live session. Holding its lock makes the holder the
/// session's only writer.
pub type SessionHandle = Arc<Mutex<Session>>;

/// Owner of all live sessions.
///
/// The map lock is held only for lookups and inserts; each session has its own
/// lock, so exchanges on different sessions never wait on each other.
pub struct SessionStore {
    sessions: RwLock<HashMap<String, SessionHandle>>,
}

impl SessionStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// Return the session for `session_id`, creating it if absent.
    ///
    /// Concurrent callers with the same id all receive the same handle.
    pub async fn get_or_create(&self, session_id: &str) -> SessionHandle {
        if let Some(handle) = self.sessions.read().await.get(session_id) {
            return handle.clone();
        }

        let mut sessions = self.sessions.write().await;
        sessions
            .entry(session_id.to_string())
            .or_insert_with(|| {
                debug!("Creating session {}", session_id);
                Arc::new(Mutex::new(Session::new(session_id)))
            })
            .clone()
    }

    /// Return the session for `session_id` already locked, creating it if absent.
    ///
    /// A handle that was deleted or evicted while this call waited for its
    /// lock is dropped and the lookup starts over, so the returned guard always
    /// belongs to the live entry.
    pub async fn lock_or_create(
        &self,
        session_id: &str,
    ) -> (SessionHandle, OwnedMutexGuard<Session>) {
        loop {
            let handle = self.get_or_create(session_id).await;
            let guard = handle.clone().lock_owned().await;

            let live = matches!(
                self.sessions.read().await.get(session_id),
                Some(current) if Arc::ptr_eq(current, &handle)
            );
            if live {
                return (handle, guard);
            }
            debug!("Session {} was removed while waiting, recreating", session_id);
        }
    }

    /// Append a single turn to an existing session.
    pub async fn append(&self, session_id: &str, turn: Turn) -> Result<()> {
        let handle = self.handle(session_id).await?;
        handle.lock().await.push(turn);
        Ok(())
    }

    /// Append a whole exchange while the caller holds the session lock.
    ///
    /// Fails with `UnknownSession` if the session was deleted or evicted after
    /// `handle` was obtained; in that case nothing is appended.
    pub async fn commit(
        &self,
        handle: &SessionHandle,
        session: &mut Session,
        turns: Vec<Turn>,
    ) -> Result<()> {
        let sessions = self.sessions.read().await;
        match sessions.get(session.id()) {
            Some(current) if Arc::ptr_eq(current, handle) => {
                session.extend(turns);
                Ok(())
            }
            _ => Err(BookMindError::UnknownSession(session.id().to_string())),
        }
    }

    /// Snapshot of a session. Waits for any running exchange on it to finish.
    pub async fn get(&self, session_id: &str) -> Result<Session> {
        let handle = self.handle(session_id).await?;
        let session = handle.lock().await;
        Ok(session.clone())
    }

    /// Remove a session. Returns whether it existed.
    pub async fn delete(&self, session_id: &str) -> bool {
        let removed = self.sessions.write().await.remove(session_id).is_some();
        if removed {
            debug!("Deleted session {}", session_id);
        }
        removed
    }

    /// Remove sessions idle for longer than `max_idle`. Returns how many were removed.
    pub async fn evict_idle(&self, max_idle: Duration) -> usize {
        self.evict_idle_at(Utc::now(), max_idle).await
    }

    pub(crate) async fn evict_idle_at(&self, now: DateTime<Utc>, max_idle: Duration) -> usize {
        let max_idle = match chrono::Duration::from_std(max_idle) {
            Ok(d) => d,
            Err(_) => return 0,
        };

        let mut sessions = self.sessions.write().await;
        let before = sessions.len();

        // A locked session has an exchange in flight and is never idle.
        sessions.retain(|id, handle| match handle.try_lock() {
            Ok(session) => {
                let keep = now - session.last_activity <= max_idle;
                if !keep {
                    debug!("Evicting idle session {}", id);
                }
                keep
            }
            Err(_) => true,
        });

        let evicted = before - sessions.len();
        if evicted > 0 {
            info!("Evicted {} idle session(s)", evicted);
        }
        evicted
    }

    /// Number of live sessions.
    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }

    async fn handle(&self, session_id: &str) -> Result<SessionHandle> {
        self.sessions
            .read()
            .await
            .get(session_id)
            .cloned()
            .ok_or_else(|| BookMindError::UnknownSession(session_id.to_string()))
    }
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::Role;
    use tokio_test::{assert_err, assert_ok};

    #[tokio::test]
    async fn test_get_or_create_is_idempotent() {
        let store = SessionStore::new();
        let a = store.get_or_create("s1").await;
        let b = store.get_or_create("s1").await;
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_concurrent_get_or_create_single_session() {
        let store = Arc::new(SessionStore::new());
        let tasks: Vec<_> = (0..32)
            .map(|_| {
                let store = store.clone();
                tokio::spawn(async move { store.get_or_create("shared").await })
            })
            .collect();

        let handles: Vec<SessionHandle> = futures::future::join_all(tasks)
            .await
            .into_iter()
            .map(|h| h.unwrap())
            .collect();

        assert_eq!(store.len().await, 1);
        assert!(handles.windows(2).all(|w| Arc::ptr_eq(&w[0], &w[1])));
    }

    #[tokio::test]
    async fn test_append_unknown_session() {
        let store = SessionStore::new();
        let err = store.append("missing", Turn::user("hi")).await.unwrap_err();
        assert!(matches!(err, BookMindError::UnknownSession(id) if id == "missing"));
    }

    #[tokio::test]
    async fn test_append_preserves_order() {
        let store = SessionStore::new();
        store.get_or_create("s1").await;
        for i in 0..10 {
            assert_ok!(store.append("s1", Turn::user(format!("m{}", i))).await);
        }

        let session = store.get("s1").await.unwrap();
        let contents: Vec<_> = session.turns().iter().map(|t| t.content.clone()).collect();
        let expected: Vec<_> = (0..10).map(|i| format!("m{}", i)).collect();
        assert_eq!(contents, expected);
        assert!(session.turns().iter().all(|t| t.role == Role::User));
    }

    #[tokio::test]
    async fn test_delete() {
        let store = SessionStore::new();
        store.get_or_create("s1").await;
        assert!(store.delete("s1").await);
        assert!(!store.delete("s1").await);
        assert_err!(store.get("s1").await);
    }

    #[tokio::test]
    async fn test_commit_after_delete_fails() {
        let store = SessionStore::new();
        let handle = store.get_or_create("s1").await;
        let mut session = handle.lock().await;
        store.delete("s1").await;

        let err = store
            .commit(&handle, &mut session, vec![Turn::user("late")])
            .await
            .unwrap_err();
        assert!(matches!(err, BookMindError::UnknownSession(_)));
        assert!(session.turns().is_empty());
    }

    #[tokio::test]
    async fn test_commit_appends_all() {
        let store = SessionStore::new();
        let handle = store.get_or_create("s1").await;
        {
            let mut session = handle.lock().await;
            assert_ok!(
                store
                    .commit(&handle, &mut session, vec![Turn::user("a"), Turn::agent("b")])
                    .await
            );
        }
        assert_eq!(store.get("s1").await.unwrap().turns().len(), 2);
    }

    #[tokio::test]
    async fn test_lock_or_create_recreates_removed_session() {
        let store = Arc::new(SessionStore::new());
        let stale = store.get_or_create("s1").await;
        let held = stale.lock().await;

        let waiter = {
            let store = store.clone();
            tokio::spawn(async move {
                let (handle, mut session) = store.lock_or_create("s1").await;
                store
                    .commit(&handle, &mut session, vec![Turn::user("after")])
                    .await
            })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(store.delete("s1").await);
        drop(held);

        assert_ok!(waiter.await.unwrap());
        let session = store.get("s1").await.unwrap();
        assert_eq!(session.turns().len(), 1);
        assert_eq!(session.turns()[0].content, "after");
    }

    #[tokio::test]
    async fn test_lock_or_create_locks_live_entry() {
        let store = SessionStore::new();
        let (handle, session) = store.lock_or_create("s1").await;
        assert_eq!(session.id(), "s1");
        assert!(Arc::ptr_eq(&handle, &store.get_or_create("s1").await));
    }

    #[tokio::test]
    async fn test_evict_idle() {
        let store = SessionStore::new();
        store.get_or_create("old").await;
        store.get_or_create("busy").await;

        let later = Utc::now() + chrono::Duration::hours(2);
        let busy = store.get_or_create("busy").await;
        let _guard = busy.lock().await;

        let evicted = store
            .evict_idle_at(later, Duration::from_secs(60 * 60))
            .await;
        assert_eq!(evicted, 1);
        assert_err!(store.get("old").await);
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_evict_keeps_recent_sessions() {
        let store = SessionStore::new();
        store.get_or_create("fresh").await;
        assert_eq!(store.evict_idle(Duration::from_secs(60)).await, 0);
        assert_eq!(store.len().await, 1);
    }
}
