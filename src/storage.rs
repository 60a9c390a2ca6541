//! Persistent conversation memory on sled
//!
//! One tree, three key families:
//! - `h/{session}/{key}` -> handle bytes
//! - `o/{handle}` -> owning session
//! - `l/{handle}/{seq:020}` -> JSON-encoded [`MemoryMessage`]
//!
//! Appends and resets are applied as single sled batches so they land whole
//! or not at all.

use crate::error::{Error, Result};
use crate::memory::{ConversationMemory, MemoryMessage};
use crate::types::{MemoryHandle, SessionId};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::path::Path;
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

/// sled-backed memory store
///
/// sled reads, batch writes and flushes are blocking calls, so every trait
/// method runs its body on tokio's blocking pool. Clones share the database
/// and the write lock.
#[derive(Clone)]
pub struct SledStore {
    db: sled::Db,
    /// Serializes read-modify-write sequences (sequence numbers, resets)
    write_lock: Arc<Mutex<()>>,
}

impl SledStore {
    /// Open or create a store at `path`
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let db = sled::open(path).map_err(|e| {
            Error::storage(format!("Failed to open memory store at {}: {}", path.display(), e))
        })?;
        Ok(Self::from_db(db))
    }

    /// Wrap an already opened database
    pub fn from_db(db: sled::Db) -> Self {
        Self {
            db,
            write_lock: Arc::new(Mutex::new(())),
        }
    }

    fn handle_key(session: SessionId, key: &str) -> String {
        format!("h/{}/{}", session, key)
    }

    fn owner_key(handle: MemoryHandle) -> String {
        format!("o/{}", handle)
    }

    fn log_prefix(handle: MemoryHandle) -> String {
        format!("l/{}/", handle)
    }

    /// Run `op` against a clone of the store on the blocking pool
    async fn blocking<T, F>(&self, op: F) -> Result<T>
    where
        F: FnOnce(&SledStore) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let store = self.clone();
        tokio::task::spawn_blocking(move || op(&store))
            .await
            .map_err(|e| Error::storage(format!("Memory store task failed: {}", e)))?
    }

    fn ensure_live(&self, handle: MemoryHandle) -> Result<()> {
        if self.db.contains_key(Self::owner_key(handle))? {
            Ok(())
        } else {
            Err(Error::storage(format!("Memory handle {} is not live", handle)))
        }
    }

    fn next_seq(&self, handle: MemoryHandle) -> Result<u64> {
        let prefix = Self::log_prefix(handle);
        match self.db.scan_prefix(&prefix).next_back() {
            None => Ok(0),
            Some(entry) => {
                let (key, _) = entry?;
                let seq = std::str::from_utf8(&key[prefix.len()..])
                    .ok()
                    .and_then(|s| s.parse::<u64>().ok())
                    .ok_or_else(|| Error::storage("Corrupt memory log key"))?;
                Ok(seq + 1)
            }
        }
    }

    fn get_or_create_blocking(&self, session: SessionId, key: &str) -> Result<MemoryHandle> {
        let _guard = self.write_lock.lock();
        let handle_key = Self::handle_key(session, key);

        if let Some(bytes) = self.db.get(&handle_key)? {
            let uuid = Uuid::from_slice(&bytes)
                .map_err(|e| Error::storage(format!("Corrupt memory handle: {}", e)))?;
            return Ok(MemoryHandle::from_uuid(uuid));
        }

        let handle = MemoryHandle::new();
        let mut batch = sled::Batch::default();
        batch.insert(handle_key.as_bytes(), handle.as_uuid().as_bytes().as_slice());
        batch.insert(
            Self::owner_key(handle).as_bytes(),
            session.to_string().as_bytes(),
        );
        self.db.apply_batch(batch)?;
        debug!(%session, key, %handle, "created memory handle");
        Ok(handle)
    }

    fn append_blocking(&self, handle: MemoryHandle, messages: &[MemoryMessage]) -> Result<()> {
        let _guard = self.write_lock.lock();
        self.ensure_live(handle)?;

        let prefix = Self::log_prefix(handle);
        let start = self.next_seq(handle)?;
        let mut batch = sled::Batch::default();
        for (offset, message) in messages.iter().enumerate() {
            let key = format!("{}{:020}", prefix, start + offset as u64);
            batch.insert(key.as_bytes(), serde_json::to_vec(message)?);
        }
        self.db.apply_batch(batch)?;
        self.db.flush()?;
        Ok(())
    }

    fn history_blocking(&self, handle: MemoryHandle) -> Result<Vec<MemoryMessage>> {
        self.ensure_live(handle)?;
        self.db
            .scan_prefix(Self::log_prefix(handle))
            .map(|entry| -> Result<MemoryMessage> {
                let (_, value) = entry?;
                Ok(serde_json::from_slice(&value)?)
            })
            .collect()
    }

    fn reset_blocking(&self, session: SessionId) -> Result<()> {
        let _guard = self.write_lock.lock();
        let mut batch = sled::Batch::default();
        let mut dropped = 0usize;

        for entry in self.db.scan_prefix(format!("h/{}/", session)) {
            let (key, value) = entry?;
            let uuid = Uuid::from_slice(&value)
                .map_err(|e| Error::storage(format!("Corrupt memory handle: {}", e)))?;
            let handle = MemoryHandle::from_uuid(uuid);

            batch.remove(key);
            batch.remove(Self::owner_key(handle).as_bytes());
            for log_entry in self.db.scan_prefix(Self::log_prefix(handle)) {
                let (log_key, _) = log_entry?;
                batch.remove(log_key);
            }
            dropped += 1;
        }

        self.db.apply_batch(batch)?;
        self.db.flush()?;
        debug!(%session, handles = dropped, "reset session memory");
        Ok(())
    }
}

#[async_trait]
impl ConversationMemory for SledStore {
    async fn get_or_create(&self, session: SessionId, key: &str) -> Result<MemoryHandle> {
        let key = key.to_string();
        self.blocking(move |store| store.get_or_create_blocking(session, &key))
            .await
    }

    async fn append(&self, handle: MemoryHandle, messages: Vec<MemoryMessage>) -> Result<()> {
        self.blocking(move |store| store.append_blocking(handle, &messages))
            .await
    }

    async fn history(&self, handle: MemoryHandle) -> Result<Vec<MemoryMessage>> {
        self.blocking(move |store| store.history_blocking(handle)).await
    }

    async fn reset(&self, session: SessionId) -> Result<()> {
        self.blocking(move |store| store.reset_blocking(session)).await
    }
}
