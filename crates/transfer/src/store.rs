use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::debug;

use crate::UploadFile;
use crate::types::{Chunk, FileUploadState};

/// Shared map of upload state, keyed by file name.
///
/// Many chunk completions for the same file land concurrently, so every
/// mutation edits one entry (usually one chunk) in place under the write
/// lock instead of replacing the entry. Each entry carries a generation;
/// writers that captured an older generation are ignored, which is how
/// responses for removed files get discarded.
#[derive(Clone, Default)]
pub struct UploadStore {
    inner: Arc<RwLock<StoreInner>>,
}

#[derive(Default)]
struct StoreInner {
    files: HashMap<String, FileUploadState>,
    next_generation: u64,
}

impl UploadStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, StoreInner> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, StoreInner> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Adds a fresh entry. Returns its generation, or `None` if the name is taken.
    pub fn insert(&self, file: UploadFile) -> Option<u64> {
        let mut s = self.write();
        if s.files.contains_key(&file.name) {
            return None;
        }
        s.next_generation += 1;
        let generation = s.next_generation;
        s.files
            .insert(file.name.clone(), FileUploadState::new(file, generation));
        Some(generation)
    }

    /// Drops an entry. In-flight writers for it become no-ops.
    pub fn remove(&self, name: &str) -> bool {
        self.write().files.remove(name).is_some()
    }

    pub fn clear(&self) {
        self.write().files.clear();
    }

    pub fn get(&self, name: &str) -> Option<FileUploadState> {
        self.read().files.get(name).cloned()
    }

    /// `true` if `name` still refers to the entry of `generation`.
    #[cfg(test)]
    pub(crate) fn is_current(&self, name: &str, generation: u64) -> bool {
        self.read()
            .files
            .get(name)
            .is_some_and(|f| f.generation == generation)
    }

    /// All entries, ordered by name.
    pub fn snapshot(&self) -> Vec<FileUploadState> {
        let s = self.read();
        let mut files: Vec<FileUploadState> = s.files.values().cloned().collect();
        files.sort_by(|a, b| a.file.name.cmp(&b.file.name));
        files
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.read().files.len()
    }

    /// Applies `f` to the entry if it is still the given generation.
    pub fn update<R>(
        &self,
        name: &str,
        generation: u64,
        f: impl FnOnce(&mut FileUploadState) -> R,
    ) -> Option<R> {
        let mut s = self.write();
        match s.files.get_mut(name) {
            Some(state) if state.generation == generation => Some(f(state)),
            _ => {
                debug!(file = %name, generation, "ignoring update for stale upload entry");
                None
            }
        }
    }

    /// Applies `f` to a single chunk, then refreshes the file's completion.
    pub fn update_chunk<R>(
        &self,
        name: &str,
        generation: u64,
        index: usize,
        f: impl FnOnce(&mut Chunk) -> R,
    ) -> Option<R> {
        self.update(name, generation, |state| {
            let result = state.chunks.get_mut(index).map(f);
            state.refresh_completed();
            result
        })
        .flatten()
    }

    /// Selects up to `limit` chunks that are neither completed nor queued and
    /// marks them queued, atomically. The returned copies describe the wave.
    pub fn claim_chunks(&self, name: &str, generation: u64, limit: usize) -> Option<Vec<Chunk>> {
        self.update(name, generation, |state| {
            state
                .chunks
                .iter_mut()
                .filter(|c| c.is_pending())
                .take(limit)
                .map(|c| {
                    c.queued = true;
                    c.clone()
                })
                .collect()
        })
    }
}
