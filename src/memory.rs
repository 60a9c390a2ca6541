//! Per-entity conversational memory
//!
//! Each entity gets one log per debate session, addressed by a
//! [`MemoryHandle`] that stays the same for every turn and every round until
//! the session is reset. Backends:
//! - [`InMemoryStore`]: process-local, the default
//! - [`SledStore`](crate::storage::SledStore): persistent, survives restarts

use crate::chat::Role;
use crate::config::{MemoryBackend, MemoryConfig};
use crate::error::{Error, Result};
use crate::storage::SledStore;
use crate::types::{MemoryHandle, SessionId};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

/// A single message in an entity's memory log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryMessage {
    /// Role the message was sent with
    pub role: Role,
    /// Message content
    pub content: String,
    /// Debate round the message belongs to
    pub round: u32,
    /// Timestamp
    pub timestamp: DateTime<Utc>,
}

impl MemoryMessage {
    /// Create a new memory message stamped now
    pub fn new(role: Role, content: impl Into<String>, round: u32) -> Self {
        Self {
            role,
            content: content.into(),
            round,
            timestamp: Utc::now(),
        }
    }
}

/// Session-scoped conversation memory
#[async_trait]
pub trait ConversationMemory: Send + Sync {
    /// Return the handle for `key` in `session`, creating it on first use.
    ///
    /// Repeated calls return the same handle until [`reset`](Self::reset).
    async fn get_or_create(&self, session: SessionId, key: &str) -> Result<MemoryHandle>;

    /// Append messages in order; either all are stored or none
    async fn append(&self, handle: MemoryHandle, messages: Vec<MemoryMessage>) -> Result<()>;

    /// Ordered log for a handle
    async fn history(&self, handle: MemoryHandle) -> Result<Vec<MemoryMessage>>;

    /// Invalidate every handle of a session at once
    async fn reset(&self, session: SessionId) -> Result<()>;
}

/// Open the backend selected in configuration
pub fn open_memory(config: &MemoryConfig) -> Result<Arc<dyn ConversationMemory>> {
    match config.backend {
        MemoryBackend::InMemory => Ok(Arc::new(InMemoryStore::new())),
        MemoryBackend::Sled => Ok(Arc::new(SledStore::open(&config.path)?)),
    }
}

#[derive(Debug, Default)]
struct SessionMemory {
    handles: HashMap<String, MemoryHandle>,
    logs: HashMap<MemoryHandle, Vec<MemoryMessage>>,
}

/// Process-local memory store
#[derive(Debug, Default)]
pub struct InMemoryStore {
    sessions: DashMap<SessionId, SessionMemory>,
    owners: DashMap<MemoryHandle, SessionId>,
}

impl InMemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    fn invalidated(handle: MemoryHandle) -> Error {
        Error::storage(format!("Memory handle {} is not live", handle))
    }
}

#[async_trait]
impl ConversationMemory for InMemoryStore {
    async fn get_or_create(&self, session: SessionId, key: &str) -> Result<MemoryHandle> {
        let mut entry = self.sessions.entry(session).or_default();
        if let Some(handle) = entry.handles.get(key) {
            return Ok(*handle);
        }

        let handle = MemoryHandle::new();
        entry.handles.insert(key.to_string(), handle);
        entry.logs.insert(handle, Vec::new());
        self.owners.insert(handle, session);
        Ok(handle)
    }

    async fn append(&self, handle: MemoryHandle, messages: Vec<MemoryMessage>) -> Result<()> {
        let session = *self
            .owners
            .get(&handle)
            .ok_or_else(|| Self::invalidated(handle))?;
        let mut memory = self
            .sessions
            .get_mut(&session)
            .ok_or_else(|| Self::invalidated(handle))?;
        let log = memory
            .logs
            .get_mut(&handle)
            .ok_or_else(|| Self::invalidated(handle))?;
        log.extend(messages);
        Ok(())
    }

    async fn history(&self, handle: MemoryHandle) -> Result<Vec<MemoryMessage>> {
        let session = *self
            .owners
            .get(&handle)
            .ok_or_else(|| Self::invalidated(handle))?;
        let memory = self
            .sessions
            .get(&session)
            .ok_or_else(|| Self::invalidated(handle))?;
        memory
            .logs
            .get(&handle)
            .cloned()
            .ok_or_else(|| Self::invalidated(handle))
    }

    async fn reset(&self, session: SessionId) -> Result<()> {
        // Dropping the session entry invalidates all its handles in one step.
        if let Some((_, memory)) = self.sessions.remove(&session) {
            for handle in memory.logs.keys() {
                self.owners.remove(handle);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_handle_is_stable_per_key() {
        let store = InMemoryStore::new();
        let session = SessionId::new();

        let first = store.get_or_create(session, "contestant_a").await.unwrap();
        let again = store.get_or_create(session, "contestant_a").await.unwrap();
        let other = store.get_or_create(session, "moderator").await.unwrap();

        assert_eq!(first, again);
        assert_ne!(first, other);
    }

    #[tokio::test]
    async fn test_append_and_history_preserve_order() {
        let store = InMemoryStore::new();
        let handle = store.get_or_create(SessionId::new(), "moderator").await.unwrap();

        store
            .append(
                handle,
                vec![
                    MemoryMessage::new(Role::User, "Topic: tea", 1),
                    MemoryMessage::new(Role::Assistant, "Let us begin.", 1),
                ],
            )
            .await
            .unwrap();
        store
            .append(handle, vec![MemoryMessage::new(Role::User, "round two", 2)])
            .await
            .unwrap();

        let history = store.history(handle).await.unwrap();
        let contents: Vec<_> = history.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, ["Topic: tea", "Let us begin.", "round two"]);
        assert_eq!(history[2].round, 2);
    }

    #[tokio::test]
    async fn test_reset_invalidates_session_handles_only() {
        let store = InMemoryStore::new();
        let session = SessionId::new();
        let bystander = SessionId::new();

        let handle = store.get_or_create(session, "contestant_b").await.unwrap();
        let kept = store.get_or_create(bystander, "contestant_b").await.unwrap();
        store
            .append(kept, vec![MemoryMessage::new(Role::User, "still here", 1)])
            .await
            .unwrap();

        store.reset(session).await.unwrap();

        assert!(matches!(store.history(handle).await, Err(Error::Storage(_))));
        assert!(matches!(
            store.append(handle, vec![]).await,
            Err(Error::Storage(_))
        ));
        assert_eq!(store.history(kept).await.unwrap().len(), 1);

        let fresh = store.get_or_create(session, "contestant_b").await.unwrap();
        assert_ne!(fresh, handle);
        assert!(store.history(fresh).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_reset_is_idempotent() {
        let store = InMemoryStore::new();
        let session = SessionId::new();
        store.get_or_create(session, "moderator").await.unwrap();
        store.reset(session).await.unwrap();
        store.reset(session).await.unwrap();
    }
}
