//! In-memory agent repository for testing.

use std::{
    collections::HashMap,
    path::Path,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use crate::{Result, error::Error, persistence::SavedAgent, ports::AgentRepository};

/// In-memory repository for testing.
///
/// Stores serialized snapshots in a shared HashMap keyed by path, so the
/// same bytes a file would hold go through the same codec without touching
/// the file system. All clones share the same underlying storage.
#[derive(Clone, Default)]
pub struct InMemoryRepository {
    storage: Arc<Mutex<HashMap<String, Vec<u8>>>>,
}

impl InMemoryRepository {
    /// Create a new empty in-memory repository.
    pub fn new() -> Self {
        Self::default()
    }

    fn storage(&self) -> MutexGuard<'_, HashMap<String, Vec<u8>>> {
        self.storage.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Get the number of snapshots currently stored.
    pub fn count(&self) -> usize {
        self.storage().len()
    }

    /// Check if a snapshot exists at the given path.
    pub fn contains(&self, path: &Path) -> bool {
        self.storage().contains_key(&key(path))
    }

    /// Store raw bytes at a path, e.g. to simulate a corrupt file.
    pub fn insert_raw(&self, path: &Path, bytes: Vec<u8>) {
        self.storage().insert(key(path), bytes);
    }
}

fn key(path: &Path) -> String {
    path.to_string_lossy().to_string()
}

impl AgentRepository for InMemoryRepository {
    fn save(&self, agent: &SavedAgent, path: &Path) -> Result<()> {
        let bytes = agent.to_bytes()?;
        self.storage().insert(key(path), bytes);
        Ok(())
    }

    fn load(&self, path: &Path) -> Result<SavedAgent> {
        let storage = self.storage();
        let bytes = storage.get(&key(path)).ok_or_else(|| Error::Io {
            operation: format!("load agent from in-memory storage at {path:?}"),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "key not found in memory"),
        })?;
        SavedAgent::from_bytes(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::{HeuristicConfig, SpatialMemoryConfig, TabularConfig},
        ports::Learner,
        q_learning::TabularAgent,
    };

    fn saved() -> SavedAgent {
        TabularAgent::new(
            TabularConfig::default(),
            SpatialMemoryConfig::default(),
            HeuristicConfig::default(),
        )
        .unwrap()
        .snapshot()
        .unwrap()
    }

    #[test]
    fn test_in_memory_save_and_load() {
        let repo = InMemoryRepository::new();
        let path = Path::new("state/tabular.msgpack");

        assert_eq!(repo.count(), 0);
        assert!(!repo.contains(path));

        let agent = saved();
        repo.save(&agent, path).unwrap();
        assert_eq!(repo.count(), 1);
        assert_eq!(repo.load(path).unwrap(), agent);
    }

    #[test]
    fn test_load_nonexistent_returns_error() {
        let repo = InMemoryRepository::new();
        assert!(repo.load(Path::new("nonexistent")).is_err());
    }

    #[test]
    fn test_clone_shares_storage() {
        let repo1 = InMemoryRepository::new();
        let repo2 = repo1.clone();
        let path = Path::new("shared");

        repo1.save(&saved(), path).unwrap();
        assert!(repo2.load(path).is_ok());
        assert_eq!(repo2.count(), 1);
    }

    #[test]
    fn test_raw_garbage_fails_to_decode() {
        let repo = InMemoryRepository::new();
        let path = Path::new("corrupt");
        repo.insert_raw(path, vec![0xc1, 0x00]);
        assert!(repo.load(path).is_err());
    }
}
