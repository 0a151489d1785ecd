//! Per-browser visitor state: the anonymous id, the polls voted in and the
//! polls created without an account. Never synced anywhere; wiping the store
//! forgets everything, which is all the duplicate-vote guard relies on.

use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use thiserror::Error;
use tracing::warn;

use crate::voting::{AnonymousId, PollId};

pub const ANONYMOUS_ID_KEY: &str = "anonymous_user_id";
pub const VOTED_POLLS_KEY: &str = "voted_polls";
pub const ANONYMOUS_POLLS_KEY: &str = "anonymous_polls";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to write visitor state to {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to encode visitor state: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("visitor state write did not finish: {0}")]
    Interrupted(String),
}

/// String key/value storage scoped to one visitor.
pub trait LocalStore: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&self, key: &str, value: String) -> Result<(), StoreError>;
}

#[derive(Default)]
pub struct MemoryStore {
    values: Mutex<BTreeMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> MemoryStore {
        MemoryStore::default()
    }
}

impl LocalStore for MemoryStore {
    fn get(&self, key: &str) -> Option<String> {
        self.values.lock().unwrap_or_else(PoisonError::into_inner).get(key).cloned()
    }

    fn set(&self, key: &str, value: String) -> Result<(), StoreError> {
        self.values.lock().unwrap_or_else(PoisonError::into_inner).insert(key.to_string(), value);
        Ok(())
    }
}

/// Store persisted as a single JSON object file. Values are cached in memory,
/// so a failed write still takes effect for the rest of the process.
pub struct FileStore {
    path: PathBuf,
    values: Mutex<BTreeMap<String, String>>,
}

impl FileStore {
    /// Opens the store at `path`. A missing file starts empty; an unreadable
    /// or malformed one is logged and also starts empty.
    pub fn open(path: impl AsRef<Path>) -> FileStore {
        let path = path.as_ref().to_path_buf();
        let values = match fs::read_to_string(&path) {
            Ok(contents) => serde_json::from_str(&contents).unwrap_or_else(|err| {
                warn!("Ignoring malformed visitor state in {}: {err}", path.display());
                BTreeMap::new()
            }),
            Err(err) if err.kind() == ErrorKind::NotFound => BTreeMap::new(),
            Err(err) => {
                warn!("Failed to read visitor state from {}: {err}", path.display());
                BTreeMap::new()
            }
        };

        FileStore { path, values: Mutex::new(values) }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self, values: &BTreeMap<String, String>) -> Result<(), StoreError> {
        let io_error = |source| StoreError::Io { path: self.path.clone(), source };

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(io_error)?;
        }
        let contents = serde_json::to_string_pretty(values)?;
        let staging = self.path.with_extension("tmp");
        fs::write(&staging, contents).map_err(io_error)?;
        fs::rename(&staging, &self.path).map_err(io_error)
    }
}

impl LocalStore for FileStore {
    fn get(&self, key: &str) -> Option<String> {
        self.values.lock().unwrap_or_else(PoisonError::into_inner).get(key).cloned()
    }

    fn set(&self, key: &str, value: String) -> Result<(), StoreError> {
        let mut values = self.values.lock().unwrap_or_else(PoisonError::into_inner);
        values.insert(key.to_string(), value);
        self.persist(&values)
    }
}

/// Typed view over a [`LocalStore`].
pub struct VisitorState {
    store: Box<dyn LocalStore>,
    // serializes read-modify-write of the id lists
    lists: Mutex<()>,
    // serializes first-use generation of the anonymous id
    identity: Mutex<()>,
}

impl VisitorState {
    pub fn new(store: impl LocalStore + 'static) -> VisitorState {
        VisitorState {
            store: Box::new(store),
            lists: Mutex::new(()),
            identity: Mutex::new(()),
        }
    }

    pub fn in_memory() -> VisitorState {
        VisitorState::new(MemoryStore::new())
    }

    pub fn anonymous_id(&self) -> Option<AnonymousId> {
        self.store.get(ANONYMOUS_ID_KEY)
            .filter(|id| !id.is_empty())
            .map(AnonymousId)
    }

    pub fn set_anonymous_id(&self, id: &AnonymousId) -> Result<(), StoreError> {
        let _guard = self.identity.lock().unwrap_or_else(PoisonError::into_inner);
        self.store.set(ANONYMOUS_ID_KEY, id.0.clone())
    }

    /// The stored anonymous id, or a new one from `generate` that is stored
    /// before any other caller can look. A failed write is logged and the id
    /// is still returned.
    pub fn anonymous_id_or_insert_with(&self, generate: impl FnOnce() -> AnonymousId) -> AnonymousId {
        let _guard = self.identity.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(id) = self.anonymous_id() {
            return id;
        }

        let id = generate();
        if let Err(err) = self.store.set(ANONYMOUS_ID_KEY, id.0.clone()) {
            warn!("Failed to persist anonymous id: {err}");
        }
        id
    }

    pub fn voted_polls(&self) -> Vec<PollId> {
        self.read_list(VOTED_POLLS_KEY)
    }

    pub fn has_voted(&self, poll_id: &PollId) -> bool {
        self.voted_polls().contains(poll_id)
    }

    pub fn mark_voted(&self, poll_id: &PollId) -> Result<(), StoreError> {
        self.append(VOTED_POLLS_KEY, poll_id)
    }

    pub fn anonymous_polls(&self) -> Vec<PollId> {
        self.read_list(ANONYMOUS_POLLS_KEY)
    }

    pub fn add_anonymous_poll(&self, poll_id: &PollId) -> Result<(), StoreError> {
        self.append(ANONYMOUS_POLLS_KEY, poll_id)
    }

    /// Runs a write on the blocking pool; file stores touch the disk.
    pub async fn write<T, F>(self: &Arc<Self>, write: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&VisitorState) -> Result<T, StoreError> + Send + 'static,
    {
        let state = Arc::clone(self);
        tokio::task::spawn_blocking(move || write(&*state))
            .await
            .map_err(|err| StoreError::Interrupted(err.to_string()))?
    }

    fn read_list(&self, key: &str) -> Vec<PollId> {
        let Some(raw) = self.store.get(key) else {
            return vec![];
        };
        serde_json::from_str(&raw).unwrap_or_else(|err| {
            warn!("Treating malformed {key} list as empty: {err}");
            vec![]
        })
    }

    fn append(&self, key: &str, poll_id: &PollId) -> Result<(), StoreError> {
        let _guard = self.lists.lock().unwrap_or_else(PoisonError::into_inner);
        let mut ids = self.read_list(key);
        if ids.contains(poll_id) {
            return Ok(());
        }
        ids.push(*poll_id);
        self.store.set(key, serde_json::to_string(&ids)?)
    }
}

#[cfg(test)]
mod tests {
    use std::env;
    use std::sync::Barrier;
    use std::thread;

    use super::*;

    fn temp_path() -> PathBuf {
        env::temp_dir()
            .join(format!("pollshare-test-{}", uuid::Uuid::new_v4()))
            .join("visitor.json")
    }

    #[test]
    fn lists_start_empty_and_deduplicate() {
        let state = VisitorState::in_memory();
        let poll = PollId::new();
        assert!(!state.has_voted(&poll));

        state.mark_voted(&poll).unwrap();
        state.mark_voted(&poll).unwrap();
        assert_eq!(state.voted_polls(), vec![poll]);
        assert!(state.has_voted(&poll));
        assert!(state.anonymous_polls().is_empty());
    }

    #[test]
    fn malformed_list_reads_as_empty() {
        let store = MemoryStore::new();
        store.set(VOTED_POLLS_KEY, String::from("{not json")).unwrap();
        let state = VisitorState::new(store);

        assert!(state.voted_polls().is_empty());
        let poll = PollId::new();
        state.mark_voted(&poll).unwrap();
        assert_eq!(state.voted_polls(), vec![poll]);
    }

    #[test]
    fn file_store_survives_reopen() {
        let path = temp_path();
        let poll = PollId::new();
        {
            let state = VisitorState::new(FileStore::open(&path));
            state.set_anonymous_id(&AnonymousId(String::from("anon_abc"))).unwrap();
            state.add_anonymous_poll(&poll).unwrap();
        }

        let state = VisitorState::new(FileStore::open(&path));
        assert_eq!(state.anonymous_id(), Some(AnonymousId(String::from("anon_abc"))));
        assert_eq!(state.anonymous_polls(), vec![poll]);

        if let Some(dir) = path.parent() {
            let _ = fs::remove_dir_all(dir);
        }
    }

    #[test]
    fn file_store_ignores_garbage() {
        let path = temp_path();
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, "garbage").unwrap();

        let store = FileStore::open(&path);
        assert_eq!(store.get(ANONYMOUS_ID_KEY), None);
        store.set(ANONYMOUS_ID_KEY, String::from("anon_new")).unwrap();
        assert_eq!(FileStore::open(&path).get(ANONYMOUS_ID_KEY).as_deref(), Some("anon_new"));

        let _ = fs::remove_dir_all(path.parent().unwrap());
    }

    #[test]
    fn concurrent_first_use_agrees_on_one_id() {
        const THREADS: usize = 8;

        for round in 0..100 {
            let state = Arc::new(VisitorState::in_memory());
            let barrier = Arc::new(Barrier::new(THREADS));
            let handles: Vec<_> = (0..THREADS)
                .map(|n| {
                    let state = state.clone();
                    let barrier = barrier.clone();
                    thread::spawn(move || {
                        barrier.wait();
                        state.anonymous_id_or_insert_with(|| AnonymousId(format!("anon_{round}_{n}")))
                    })
                })
                .collect();

            let ids: Vec<AnonymousId> = handles.into_iter().map(|h| h.join().unwrap()).collect();
            let stored = state.anonymous_id().unwrap();
            assert!(ids.iter().all(|id| *id == stored), "round {round}: {ids:?}");
        }
    }

    #[test]
    fn stored_id_is_never_regenerated() {
        let state = VisitorState::in_memory();
        state.set_anonymous_id(&AnonymousId(String::from("anon_kept"))).unwrap();
        let id = state.anonymous_id_or_insert_with(|| panic!("id already stored"));
        assert_eq!(id.as_str(), "anon_kept");
    }

    #[tokio::test]
    async fn writes_reach_the_file_from_async_code() {
        let path = temp_path();
        let poll = PollId::new();
        let state = Arc::new(VisitorState::new(FileStore::open(&path)));

        state.write(move |state| state.mark_voted(&poll)).await.unwrap();
        assert!(state.has_voted(&poll));
        assert!(VisitorState::new(FileStore::open(&path)).has_voted(&poll));

        let _ = fs::remove_dir_all(path.parent().unwrap());
    }
}
