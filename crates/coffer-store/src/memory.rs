//! In-memory chunk store for tests.
//!
//! Records every `save` so dedup tests can assert that an unchanged
//! re-encryption run stores nothing.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use coffer_core::{CofferError, CofferResult};

use crate::ChunkStore;

#[derive(Default)]
pub struct MemoryStore {
    blobs: Mutex<HashMap<String, Vec<u8>>>,
    saves: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of `save` calls since construction or the last reset.
    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    pub fn reset_save_count(&self) {
        self.saves.store(0, Ordering::SeqCst);
    }

    pub fn contains(&self, key: &str) -> bool {
        self.blobs.lock().unwrap().contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.blobs.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl ChunkStore for MemoryStore {
    async fn read(&self, key: &str) -> CofferResult<Vec<u8>> {
        self.blobs
            .lock()
            .unwrap()
            .get(key)
            .cloned()
            .ok_or_else(|| CofferError::NotFound(format!("chunk {key}")))
    }

    async fn save(&self, key: &str, contents: Vec<u8>) -> CofferResult<()> {
        self.saves.fetch_add(1, Ordering::SeqCst);
        self.blobs.lock().unwrap().insert(key.to_string(), contents);
        Ok(())
    }
}
