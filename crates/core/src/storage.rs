//! Client-local key/value persistence for the transcript and instruction profile.

use crate::error::{Result, StorageError};
use crate::instructions::InstructionProfile;
use crate::transcript::Message;

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// Serialized transcript (JSON array of messages)
pub const TRANSCRIPT_KEY: &str = "chat_transcript";

/// Serialized instruction profile (JSON array of slots)
pub const PROFILE_KEY: &str = "instruction_profile";

/// Raw single-field instructions written by older clients
pub const LEGACY_INSTRUCTIONS_KEY: &str = "chat_instructions";

/// Storage capability injected into the controller
pub trait KeyValueStore: Send + Sync {
    /// Read a value, `None` when the key was never written
    fn load(&self, key: &str) -> Result<Option<String>>;

    /// Write a value, replacing any previous one
    fn save(&self, key: &str, value: &str) -> Result<()>;

    /// Delete a value; deleting a missing key is not an error
    fn remove(&self, key: &str) -> Result<()>;
}

/// Directory-backed store with one file per key
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    /// Open a store rooted at `dir`, creating the directory if needed
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|_| StorageError::DirUnavailable(dir.clone()))?;
        if !dir.is_dir() {
            return Err(StorageError::DirUnavailable(dir).into());
        }
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> Result<PathBuf> {
        let valid = !key.is_empty() && key.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
        if !valid {
            return Err(StorageError::InvalidKey(key.to_string()).into());
        }
        Ok(self.dir.join(key))
    }
}

impl KeyValueStore for FileStore {
    fn load(&self, key: &str) -> Result<Option<String>> {
        let path = self.path_for(key)?;
        match fs::read_to_string(&path) {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn save(&self, key: &str, value: &str) -> Result<()> {
        let path = self.path_for(key)?;
        let tmp = path.with_extension("tmp");
        fs::write(&tmp, value)?;
        fs::rename(&tmp, &path)?;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        let path = self.path_for(key)?;
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// In-memory store for tests and ephemeral sessions
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    values: Arc<Mutex<HashMap<String, String>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn values(&self) -> std::sync::MutexGuard<'_, HashMap<String, String>> {
        self.values.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl KeyValueStore for MemoryStore {
    fn load(&self, key: &str) -> Result<Option<String>> {
        Ok(self.values().get(key).cloned())
    }

    fn save(&self, key: &str, value: &str) -> Result<()> {
        self.values().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.values().remove(key);
        Ok(())
    }
}

/// Typed access to the persisted session state
#[derive(Clone)]
pub struct SessionStorage {
    store: Arc<dyn KeyValueStore>,
}

impl SessionStorage {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    /// Load the persisted transcript, empty when nothing was saved
    pub fn load_transcript(&self) -> Result<Vec<Message>> {
        match self.store.load(TRANSCRIPT_KEY)? {
            Some(raw) => serde_json::from_str(&raw)
                .map_err(|e| StorageError::Corrupted { key: TRANSCRIPT_KEY.to_string(), reason: e.to_string() }.into()),
            None => Ok(Vec::new()),
        }
    }

    /// Persist resolved messages; pending entries are never written
    pub fn save_transcript(&self, messages: &[Message]) -> Result<()> {
        let resolved: Vec<&Message> = messages.iter().filter(|m| !m.pending).collect();
        let raw = serde_json::to_string(&resolved).map_err(|e| crate::Error::Parse(e.to_string()))?;
        self.store.save(TRANSCRIPT_KEY, &raw)
    }

    /// Load the persisted profile, if any
    pub fn load_profile(&self) -> Result<Option<InstructionProfile>> {
        match self.store.load(PROFILE_KEY)? {
            Some(raw) => serde_json::from_str(&raw)
                .map(Some)
                .map_err(|e| StorageError::Corrupted { key: PROFILE_KEY.to_string(), reason: e.to_string() }.into()),
            None => Ok(None),
        }
    }

    pub fn save_profile(&self, profile: &InstructionProfile) -> Result<()> {
        let raw = serde_json::to_string(profile).map_err(|e| crate::Error::Parse(e.to_string()))?;
        self.store.save(PROFILE_KEY, &raw)
    }

    /// Raw instructions text written by single-field clients
    pub fn load_legacy_instructions(&self) -> Result<Option<String>> {
        Ok(self.store.load(LEGACY_INSTRUCTIONS_KEY)?.filter(|text| !text.trim().is_empty()))
    }

    /// Resolve the profile to use at startup
    ///
    /// Stored bodies are merged into `layout`; a legacy free-text value is
    /// adopted into the first slot when no profile was stored.
    pub fn restore_profile(&self, mut layout: InstructionProfile) -> Result<InstructionProfile> {
        if let Some(stored) = self.load_profile()? {
            layout.merge_bodies(&stored);
        } else if let Some(legacy) = self.load_legacy_instructions()? {
            tracing::info!("Migrating legacy instructions into slot profile");
            layout.adopt_legacy_text(&legacy);
        }
        Ok(layout)
    }
}

impl std::fmt::Debug for SessionStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionStorage").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;
    use crate::instructions::{InstructionSlot, SlotSpec};
    use tempfile::TempDir;

    fn file_storage() -> (TempDir, SessionStorage) {
        let temp = TempDir::new().unwrap();
        let store = FileStore::open(temp.path().join("state")).unwrap();
        (temp, SessionStorage::new(Arc::new(store)))
    }

    #[test]
    fn test_file_store_round_trip() {
        let temp = TempDir::new().unwrap();
        let store = FileStore::open(temp.path()).unwrap();

        assert_eq!(store.load("missing").unwrap(), None);
        store.save("key", "value").unwrap();
        assert_eq!(store.load("key").unwrap(), Some("value".to_string()));

        store.save("key", "updated").unwrap();
        assert_eq!(store.load("key").unwrap(), Some("updated".to_string()));

        store.remove("key").unwrap();
        assert_eq!(store.load("key").unwrap(), None);
        store.remove("key").unwrap();
    }

    #[test]
    fn test_file_store_rejects_path_keys() {
        let temp = TempDir::new().unwrap();
        let store = FileStore::open(temp.path()).unwrap();

        let err = store.save("../escape", "x").unwrap_err();
        assert!(matches!(err, Error::Storage(StorageError::InvalidKey(_))));
        assert!(store.load("").is_err());
    }

    #[test]
    fn test_file_store_open_over_file_fails() {
        let temp = TempDir::new().unwrap();
        let file = temp.path().join("not-a-dir");
        fs::write(&file, "x").unwrap();
        assert!(FileStore::open(&file).is_err());
    }

    #[test]
    fn test_transcript_round_trip() {
        let temp = TempDir::new().unwrap();
        let messages = vec![Message::user("hi"), Message::assistant("yo"), Message::user("next")];

        let storage = SessionStorage::new(Arc::new(FileStore::open(temp.path()).unwrap()));
        storage.save_transcript(&messages).unwrap();

        let reopened = SessionStorage::new(Arc::new(FileStore::open(temp.path()).unwrap()));
        assert_eq!(reopened.load_transcript().unwrap(), messages);
    }

    #[test]
    fn test_save_transcript_skips_pending() {
        let storage = SessionStorage::new(Arc::new(MemoryStore::new()));
        storage.save_transcript(&[Message::user("q"), Message::placeholder()]).unwrap();
        assert_eq!(storage.load_transcript().unwrap(), vec![Message::user("q")]);
    }

    #[test]
    fn test_load_transcript_empty_by_default() {
        let storage = SessionStorage::new(Arc::new(MemoryStore::new()));
        assert!(storage.load_transcript().unwrap().is_empty());
    }

    #[test]
    fn test_corrupted_transcript() {
        let store = Arc::new(MemoryStore::new());
        store.save(TRANSCRIPT_KEY, "{not json").unwrap();
        let storage = SessionStorage::new(store);

        let err = storage.load_transcript().unwrap_err();
        assert!(matches!(err, Error::Storage(StorageError::Corrupted { .. })));
    }

    #[test]
    fn test_profile_round_trip() {
        let (_temp, storage) = file_storage();
        let profile = InstructionProfile::from_slots(vec![
            InstructionSlot::new("a", "A", "b"),
            InstructionSlot::new("c", "", ""),
        ])
        .unwrap();

        storage.save_profile(&profile).unwrap();
        assert_eq!(storage.load_profile().unwrap(), Some(profile));
    }

    #[test]
    fn test_restore_profile_prefers_stored_profile() {
        let store = Arc::new(MemoryStore::new());
        store.save(LEGACY_INSTRUCTIONS_KEY, "legacy text").unwrap();
        let storage = SessionStorage::new(store);

        let mut saved = InstructionProfile::default();
        saved.set_body("instructions", "stored text").unwrap();
        storage.save_profile(&saved).unwrap();

        let restored = storage.restore_profile(InstructionProfile::default()).unwrap();
        assert_eq!(restored.slot("instructions").unwrap().body, "stored text");
    }

    #[test]
    fn test_restore_profile_migrates_legacy_text() {
        let store = Arc::new(MemoryStore::new());
        store.save(LEGACY_INSTRUCTIONS_KEY, "Be brief").unwrap();
        let storage = SessionStorage::new(store);

        let layout = InstructionProfile::from_layout(&[SlotSpec::new("persona", "Persona")]).unwrap();
        let restored = storage.restore_profile(layout).unwrap();
        assert_eq!(restored.slot("persona").unwrap().body, "Be brief");
    }

    #[test]
    fn test_restore_profile_ignores_blank_legacy_text() {
        let store = Arc::new(MemoryStore::new());
        store.save(LEGACY_INSTRUCTIONS_KEY, "   ").unwrap();
        let storage = SessionStorage::new(store);

        let restored = storage.restore_profile(InstructionProfile::default()).unwrap();
        assert!(restored.is_blank());
    }
}
