//! Persistent run state
//!
//! Three independent flat records live behind the [`StateStore`] trait: the
//! processed-id mapping, the user-id cache and the rotation cursor. Each is
//! read and written whole. [`FileStore`] keeps them as files in one
//! directory; `crate::mock::MemoryStore` keeps them in memory for tests.
//!
//! The typed accessors on [`StateStoreExt`] implement the degrade-to-default
//! policy: unreadable records are logged and treated as empty, never fatal.

use fs4::fs_std::FileExt;
use std::fs::{self, File, OpenOptions};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::error::StateError;
use crate::types::{ProcessedSet, UserIdCache};

pub type StateResult<T> = std::result::Result<T, StateError>;

/// Names of the persisted records
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StateKey {
    ProcessedPosts,
    UserIds,
    RotationCursor,
}

impl StateKey {
    pub fn file_name(&self) -> &'static str {
        match self {
            StateKey::ProcessedPosts => "processed_posts.json",
            StateKey::UserIds => "user_ids.json",
            StateKey::RotationCursor => "account_rotation.txt",
        }
    }
}

/// Raw key/value persistence
pub trait StateStore: Send + Sync {
    /// Read a record; `Ok(None)` when it has never been written
    fn load(&self, key: StateKey) -> StateResult<Option<String>>;

    /// Replace a record with `value`
    fn store(&self, key: StateKey, value: &str) -> StateResult<()>;
}

/// Typed access to the records on any [`StateStore`]
pub trait StateStoreExt: StateStore {
    /// Load the processed-id mapping, falling back to empty on any failure
    fn load_processed(&self) -> ProcessedSet {
        match self.load(StateKey::ProcessedPosts) {
            Ok(Some(raw)) => match serde_json::from_str(&raw) {
                Ok(set) => set,
                Err(e) => {
                    warn!("Error loading processed posts, starting empty: {}", e);
                    ProcessedSet::new()
                }
            },
            Ok(None) => ProcessedSet::new(),
            Err(e) => {
                warn!("Error loading processed posts, starting empty: {}", e);
                ProcessedSet::new()
            }
        }
    }

    /// Persist the full processed-id mapping
    fn save_processed(&self, processed: &ProcessedSet) -> StateResult<()> {
        let raw = serde_json::to_string(processed)?;
        self.store(StateKey::ProcessedPosts, &raw)
    }

    /// Load the user-id cache, falling back to empty on any failure
    fn load_user_ids(&self) -> UserIdCache {
        match self.load(StateKey::UserIds) {
            Ok(Some(raw)) => serde_json::from_str(&raw).unwrap_or_else(|e| {
                warn!("Error loading cached user IDs: {}", e);
                UserIdCache::new()
            }),
            Ok(None) => UserIdCache::new(),
            Err(e) => {
                warn!("Error loading cached user IDs: {}", e);
                UserIdCache::new()
            }
        }
    }

    /// Add one entry to the user-id cache (read-modify-write of the record)
    fn save_user_id(&self, handle: &str, user_id: &str) -> StateResult<()> {
        let mut cache = self.load_user_ids();
        cache.insert(handle.to_string(), user_id.to_string());
        let raw = serde_json::to_string(&cache)?;
        self.store(StateKey::UserIds, &raw)
    }

    /// Handle of the account polled last, if any
    ///
    /// Errors are returned rather than swallowed: the caller decides how to
    /// degrade when rotation state is unavailable.
    fn load_cursor(&self) -> StateResult<Option<String>> {
        Ok(self
            .load(StateKey::RotationCursor)?
            .map(|raw| raw.trim().to_string())
            .filter(|handle| !handle.is_empty()))
    }

    fn save_cursor(&self, handle: &str) -> StateResult<()> {
        self.store(StateKey::RotationCursor, handle)
    }
}

impl<T: StateStore + ?Sized> StateStoreExt for T {}

/// Flat files in a single directory
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, key: StateKey) -> PathBuf {
        self.dir.join(key.file_name())
    }
}

impl StateStore for FileStore {
    fn load(&self, key: StateKey) -> StateResult<Option<String>> {
        match fs::read_to_string(self.path_for(key)) {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Write through a sibling temp file and rename it into place, so a
    /// crash mid-write leaves the previous record intact
    fn store(&self, key: StateKey, value: &str) -> StateResult<()> {
        fs::create_dir_all(&self.dir)?;

        let path = self.path_for(key);
        let tmp = path.with_extension("tmp");
        fs::write(&tmp, value)?;
        fs::rename(&tmp, &path)?;

        debug!("Wrote {}", path.display());
        Ok(())
    }
}

/// Exclusive advisory lock held for the duration of a run
///
/// Single-flight: a run that finds the lock taken does not wait for it. The
/// lock is released when the guard is dropped.
#[derive(Debug)]
pub struct RunLock {
    _file: File,
    path: PathBuf,
}

impl RunLock {
    pub const FILE_NAME: &'static str = "relaycast.lock";

    /// Take the lock in `dir` without blocking
    ///
    /// Returns `Ok(None)` when another process (or another guard in this
    /// process) already holds it.
    pub fn try_acquire(dir: &Path) -> StateResult<Option<Self>> {
        fs::create_dir_all(dir)?;

        let path = dir.join(Self::FILE_NAME);
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&path)?;

        match file.try_lock_exclusive() {
            Ok(()) => {
                debug!("Acquired run lock {}", path.display());
                Ok(Some(Self { _file: file, path }))
            }
            Err(e) if e.kind() == fs4::lock_contended_error().kind() => {
                debug!("Run lock {} is held elsewhere", path.display());
                Ok(None)
            }
            Err(e) => Err(StateError::Lock(format!("{}: {}", path.display(), e))),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
