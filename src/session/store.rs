use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};

use crate::error::PersistenceError;

use super::AuthSession;

/// Key the session envelope is stored under.
pub const STATE_KEY: &str = "authState";
pub const SCHEMA_VERSION: u32 = 1;

/// Key-value storage scoped to one storage suite.
pub trait SessionStore: Send + Sync {
    fn load(&self, key: &str) -> Result<Option<Vec<u8>>, PersistenceError>;
    fn save(&self, key: &str, data: &[u8]) -> Result<(), PersistenceError>;
}

/// Versioned envelope around the persisted session. `session: None` is the
/// explicit "no session" marker written on logout.
#[derive(Debug, Serialize, Deserialize)]
pub struct PersistedState {
    pub version: u32,
    pub session: Option<AuthSession>,
}

impl PersistedState {
    pub fn encode(session: Option<&AuthSession>) -> Result<Vec<u8>, PersistenceError> {
        #[derive(Serialize)]
        struct Envelope<'a> {
            version: u32,
            session: Option<&'a AuthSession>,
        }

        serde_json::to_vec_pretty(&Envelope {
            version: SCHEMA_VERSION,
            session,
        })
        .map_err(|e| PersistenceError::Serialize(e.to_string()))
    }

    pub fn decode(data: &[u8]) -> Result<Option<AuthSession>, PersistenceError> {
        #[derive(Deserialize)]
        struct VersionOnly {
            version: u32,
        }

        let header: VersionOnly = serde_json::from_slice(data)
            .map_err(|e| PersistenceError::Deserialize(e.to_string()))?;
        if header.version != SCHEMA_VERSION {
            return Err(PersistenceError::UnsupportedVersion(header.version));
        }

        let state: PersistedState = serde_json::from_slice(data)
            .map_err(|e| PersistenceError::Deserialize(e.to_string()))?;
        Ok(state.session)
    }
}

/// One JSON file per key under `<base>/<suite>/`.
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub fn new(base: &Path, suite: &str) -> Self {
        Self {
            dir: base.join(suite),
        }
    }

    pub fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }
}

impl SessionStore for FileStore {
    fn load(&self, key: &str) -> Result<Option<Vec<u8>>, PersistenceError> {
        match std::fs::read(self.path_for(key)) {
            Ok(data) => Ok(Some(data)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn save(&self, key: &str, data: &[u8]) -> Result<(), PersistenceError> {
        std::fs::create_dir_all(&self.dir)?;
        // write-then-rename so a crash never leaves a half-written envelope
        let path = self.path_for(key);
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, data)?;
        std::fs::rename(&tmp, &path)?;
        Ok(())
    }
}

/// In-process store, mostly for tests and embedding.
#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, Vec<u8>>>,
    saves: Mutex<usize>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entry(key: &str, data: impl Into<Vec<u8>>) -> Self {
        let store = Self::default();
        store
            .entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(key.to_string(), data.into());
        store
    }

    /// Number of successful `save` calls so far.
    pub fn save_count(&self) -> usize {
        *self.saves.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn get(&self, key: &str) -> Option<Vec<u8>> {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(key)
            .cloned()
    }
}

impl SessionStore for MemoryStore {
    fn load(&self, key: &str) -> Result<Option<Vec<u8>>, PersistenceError> {
        Ok(self.get(key))
    }

    fn save(&self, key: &str, data: &[u8]) -> Result<(), PersistenceError> {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(key.to_string(), data.to_vec());
        *self.saves.lock().unwrap_or_else(|poisoned| poisoned.into_inner()) += 1;
        Ok(())
    }
}
