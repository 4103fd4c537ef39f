//! Persistent store for finished creations.
//!
//! A creation is written once, after every scene of a run has been generated,
//! and is never modified afterwards. Media payloads are stored as
//! content-addressed blobs next to a JSON index, so identical clips shared by
//! several creations are kept once.

use std::collections::HashSet;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::story::SceneAsset;

/// Identifier assigned by the store, increasing with every insert.
pub type CreationId = u64;

const INDEX_FILE: &str = "index.json";
const BLOB_DIR: &str = "blobs";
const LOCK_FILE: &str = ".lock";

/// A completed run ready to be persisted.
#[derive(Debug, Clone)]
pub struct NewCreation {
    pub script: String,
    pub assets: Vec<SceneAsset>,
    pub created_at: DateTime<Utc>,
}

/// A persisted run with all of its media.
#[derive(Debug, Clone)]
pub struct Creation {
    pub id: CreationId,
    pub script: String,
    pub assets: Vec<SceneAsset>,
    pub created_at: DateTime<Utc>,
}

/// Listing projection of a creation, without media payloads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreationSummary {
    pub id: CreationId,
    pub script: String,
    pub scene_count: usize,
    pub created_at: DateTime<Utc>,
}

impl Creation {
    pub fn summary(&self) -> CreationSummary {
        CreationSummary {
            id: self.id,
            script: self.script.clone(),
            scene_count: self.assets.len(),
            created_at: self.created_at,
        }
    }
}

/// Errors from the creation store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("store I/O error at '{}': {}", .path.display(), .source)]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("store index '{}' is corrupt: {}", .path.display(), .source)]
    Corrupt {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("failed to encode store index: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("store lock poisoned")]
    Poisoned,
}

/// Storage for finished creations.
pub trait CreationStore {
    /// Persist a creation and return its new id.
    fn add(&self, creation: NewCreation) -> Result<CreationId, StoreError>;

    /// All creations, newest first.
    fn list(&self) -> Result<Vec<CreationSummary>, StoreError>;

    /// Load one creation with its media.
    fn load(&self, id: CreationId) -> Result<Option<Creation>, StoreError>;

    /// Delete a creation, returning whether it existed.
    ///
    /// Deleting an unknown id is a no-op that returns `false`.
    fn delete(&self, id: CreationId) -> Result<bool, StoreError>;
}

fn newest_first(summaries: &mut [CreationSummary]) {
    summaries.sort_by(|a, b| {
        b.created_at
            .cmp(&a.created_at)
            .then_with(|| b.id.cmp(&a.id))
    });
}

#[derive(Debug, Serialize, Deserialize)]
struct StoreIndex {
    next_id: CreationId,
    #[serde(default)]
    creations: Vec<StoredCreation>,
}

impl Default for StoreIndex {
    fn default() -> Self {
        Self {
            next_id: 1,
            creations: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredCreation {
    id: CreationId,
    script: String,
    created_at: DateTime<Utc>,
    scenes: Vec<StoredScene>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredScene {
    caption: String,
    video: String,
    audio: String,
}

impl StoredCreation {
    fn summary(&self) -> CreationSummary {
        CreationSummary {
            id: self.id,
            script: self.script.clone(),
            scene_count: self.scenes.len(),
            created_at: self.created_at,
        }
    }

    fn blobs(&self) -> impl Iterator<Item = &str> {
        self.scenes
            .iter()
            .flat_map(|s| [s.video.as_str(), s.audio.as_str()])
    }
}

/// Advisory lock on `{root}/.lock`, held until dropped.
///
/// Every operation takes it and reads `index.json` fresh, so any number of
/// handles (in this process or others) can share one store directory.
struct StoreLock {
    _file: File,
}

impl StoreLock {
    fn acquire(path: &Path, exclusive: bool) -> Result<Self, StoreError> {
        let io_err = |source| StoreError::Io {
            path: path.to_path_buf(),
            source,
        };
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(path)
            .map_err(io_err)?;
        lock_file(&file, exclusive).map_err(io_err)?;
        Ok(Self { _file: file })
    }
}

/// Block until the lock is granted. Closing the file releases it.
#[cfg(unix)]
fn lock_file(file: &File, exclusive: bool) -> std::io::Result<()> {
    use std::os::unix::io::AsRawFd;

    let operation = if exclusive {
        libc::LOCK_EX
    } else {
        libc::LOCK_SH
    };
    loop {
        let rc = unsafe { libc::flock(file.as_raw_fd(), operation) };
        if rc == 0 {
            return Ok(());
        }
        let err = std::io::Error::last_os_error();
        if err.kind() != std::io::ErrorKind::Interrupted {
            return Err(err);
        }
    }
}

#[cfg(not(unix))]
fn lock_file(_file: &File, _exclusive: bool) -> std::io::Result<()> {
    Ok(())
}

/// On-disk store: `index.json` plus a `blobs/` directory.
pub struct DiskStore {
    root: PathBuf,
}

impl DiskStore {
    /// Open (creating if needed) the store rooted at `root`.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let root = root.into();
        let blob_dir = root.join(BLOB_DIR);
        std::fs::create_dir_all(&blob_dir).map_err(|source| StoreError::Io {
            path: blob_dir.clone(),
            source,
        })?;

        let store = Self { root };
        let index = {
            let _lock = store.lock(false)?;
            store.read_index()?
        };
        log::debug!(
            "Opened creation store at {} ({} creations)",
            store.root.display(),
            index.creations.len()
        );
        Ok(store)
    }

    /// Default location: `{data_dir}/storyreel/creations`.
    pub fn default_dir() -> PathBuf {
        dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from(".local/share"))
            .join("storyreel")
            .join("creations")
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn lock(&self, exclusive: bool) -> Result<StoreLock, StoreError> {
        StoreLock::acquire(&self.root.join(LOCK_FILE), exclusive)
    }

    /// Current on-disk index. Callers must hold the lock.
    fn read_index(&self) -> Result<StoreIndex, StoreError> {
        let path = self.root.join(INDEX_FILE);
        let content = match std::fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(StoreIndex::default())
            }
            Err(source) => return Err(StoreError::Io { path, source }),
        };
        serde_json::from_str(&content).map_err(|source| StoreError::Corrupt { path, source })
    }

    /// Deterministic blob name: first 16 bytes of the SHA-256, hex encoded.
    fn blob_name(bytes: &[u8], extension: &str) -> String {
        let digest = Sha256::digest(bytes);
        format!("{}.{}", hex::encode(&digest[..16]), extension)
    }

    fn blob_path(&self, name: &str) -> PathBuf {
        self.root.join(BLOB_DIR).join(name)
    }

    fn write_blob(&self, bytes: &[u8], extension: &str) -> Result<String, StoreError> {
        let name = Self::blob_name(bytes, extension);
        let path = self.blob_path(&name);
        if !path.exists() {
            write_atomic(&path, bytes)?;
        }
        Ok(name)
    }

    fn read_blob(&self, name: &str) -> Result<Vec<u8>, StoreError> {
        let path = self.blob_path(name);
        std::fs::read(&path).map_err(|source| StoreError::Io { path, source })
    }

    fn save_index(&self, index: &StoreIndex) -> Result<(), StoreError> {
        let json = serde_json::to_vec_pretty(index)?;
        write_atomic(&self.root.join(INDEX_FILE), &json)
    }

    /// Remove blobs no longer referenced by any creation.
    fn collect_garbage(&self, index: &StoreIndex, candidates: &[String]) {
        let live: HashSet<&str> = index.creations.iter().flat_map(|c| c.blobs()).collect();
        for name in candidates {
            if live.contains(name.as_str()) {
                continue;
            }
            let path = self.blob_path(name);
            if let Err(e) = std::fs::remove_file(&path) {
                log::warn!("Failed to remove blob {}: {}", path.display(), e);
            }
        }
    }
}

/// Write `bytes` to `path` through a temp file in the same directory.
fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), StoreError> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let io_err = |source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    };

    let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(io_err)?;
    tmp.write_all(bytes).map_err(io_err)?;
    tmp.flush().map_err(io_err)?;
    tmp.persist(path).map_err(|e| io_err(e.error))?;
    Ok(())
}

impl CreationStore for DiskStore {
    fn add(&self, creation: NewCreation) -> Result<CreationId, StoreError> {
        let _lock = self.lock(true)?;
        let mut index = self.read_index()?;

        // Blobs are written under the lock so a concurrent delete cannot
        // collect a shared blob before this creation references it.
        let mut scenes = Vec::with_capacity(creation.assets.len());
        for asset in &creation.assets {
            scenes.push(StoredScene {
                caption: asset.caption.clone(),
                video: self.write_blob(&asset.video, "mp4")?,
                audio: self.write_blob(&asset.audio, "wav")?,
            });
        }

        let id = index.next_id.max(1);
        index.next_id = id + 1;
        index.creations.push(StoredCreation {
            id,
            script: creation.script,
            created_at: creation.created_at,
            scenes,
        });
        self.save_index(&index)?;

        log::info!("Saved creation {} ({} scenes)", id, creation.assets.len());
        Ok(id)
    }

    fn list(&self) -> Result<Vec<CreationSummary>, StoreError> {
        let _lock = self.lock(false)?;
        let index = self.read_index()?;
        let mut summaries: Vec<_> = index.creations.iter().map(StoredCreation::summary).collect();
        newest_first(&mut summaries);
        Ok(summaries)
    }

    fn load(&self, id: CreationId) -> Result<Option<Creation>, StoreError> {
        let _lock = self.lock(false)?;
        let index = self.read_index()?;
        let Some(stored) = index.creations.into_iter().find(|c| c.id == id) else {
            return Ok(None);
        };

        let mut assets = Vec::with_capacity(stored.scenes.len());
        for scene in &stored.scenes {
            assets.push(SceneAsset {
                video: self.read_blob(&scene.video)?,
                audio: self.read_blob(&scene.audio)?,
                caption: scene.caption.clone(),
            });
        }

        Ok(Some(Creation {
            id: stored.id,
            script: stored.script,
            assets,
            created_at: stored.created_at,
        }))
    }

    fn delete(&self, id: CreationId) -> Result<bool, StoreError> {
        let _lock = self.lock(true)?;
        let mut index = self.read_index()?;
        let Some(position) = index.creations.iter().position(|c| c.id == id) else {
            log::debug!("Creation {} not found; nothing to delete", id);
            return Ok(false);
        };

        let removed = index.creations.remove(position);
        self.save_index(&index)?;

        let candidates: Vec<String> = removed.blobs().map(str::to_string).collect();
        self.collect_garbage(&index, &candidates);
        log::info!("Deleted creation {}", id);
        Ok(true)
    }
}

/// In-memory store, for embedding and tests.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<(CreationId, Vec<Creation>)>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CreationStore for MemoryStore {
    fn add(&self, creation: NewCreation) -> Result<CreationId, StoreError> {
        let mut inner = self.inner.lock().map_err(|_| StoreError::Poisoned)?;
        inner.0 += 1;
        let id = inner.0;
        inner.1.push(Creation {
            id,
            script: creation.script,
            assets: creation.assets,
            created_at: creation.created_at,
        });
        Ok(id)
    }

    fn list(&self) -> Result<Vec<CreationSummary>, StoreError> {
        let inner = self.inner.lock().map_err(|_| StoreError::Poisoned)?;
        let mut summaries: Vec<_> = inner.1.iter().map(Creation::summary).collect();
        newest_first(&mut summaries);
        Ok(summaries)
    }

    fn load(&self, id: CreationId) -> Result<Option<Creation>, StoreError> {
        let inner = self.inner.lock().map_err(|_| StoreError::Poisoned)?;
        Ok(inner.1.iter().find(|c| c.id == id).cloned())
    }

    fn delete(&self, id: CreationId) -> Result<bool, StoreError> {
        let mut inner = self.inner.lock().map_err(|_| StoreError::Poisoned)?;
        let before = inner.1.len();
        inner.1.retain(|c| c.id != id);
        Ok(inner.1.len() < before)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::TempDir;

    fn asset(tag: &str) -> SceneAsset {
        SceneAsset {
            video: format!("video-{}", tag).into_bytes(),
            audio: format!("audio-{}", tag).into_bytes(),
            caption: format!("caption {}", tag),
        }
    }

    fn creation(script: &str, minute: u32, tags: &[&str]) -> NewCreation {
        NewCreation {
            script: script.to_string(),
            assets: tags.iter().map(|t| asset(t)).collect(),
            created_at: Utc.with_ymd_and_hms(2026, 1, 1, 12, minute, 0).unwrap(),
        }
    }

    #[test]
    fn test_blob_name_is_deterministic() {
        let a = DiskStore::blob_name(b"same", "mp4");
        let b = DiskStore::blob_name(b"same", "mp4");
        let c = DiskStore::blob_name(b"other", "mp4");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.len(), 32 + 4);
    }

    #[test]
    fn test_add_and_load_round_trip() {
        let dir = TempDir::new().unwrap();
        let store = DiskStore::open(dir.path()).unwrap();

        let id = store.add(creation("a story", 0, &["1", "2"])).unwrap();
        let loaded = store.load(id).unwrap().unwrap();

        assert_eq!(loaded.id, id);
        assert_eq!(loaded.script, "a story");
        assert_eq!(loaded.assets, vec![asset("1"), asset("2")]);
    }

    #[test]
    fn test_ids_increase() {
        let dir = TempDir::new().unwrap();
        let store = DiskStore::open(dir.path()).unwrap();
        let first = store.add(creation("one", 0, &["1"])).unwrap();
        let second = store.add(creation("two", 1, &["2"])).unwrap();
        assert!(second > first);
    }

    #[test]
    fn test_list_newest_first() {
        let dir = TempDir::new().unwrap();
        let store = DiskStore::open(dir.path()).unwrap();
        store.add(creation("old", 0, &["1"])).unwrap();
        store.add(creation("new", 30, &["2"])).unwrap();
        store.add(creation("middle", 15, &["3"])).unwrap();

        let scripts: Vec<_> = store.list().unwrap().into_iter().map(|s| s.script).collect();
        assert_eq!(scripts, vec!["new", "middle", "old"]);
    }

    #[test]
    fn test_reopen_keeps_creations() {
        let dir = TempDir::new().unwrap();
        let id = {
            let store = DiskStore::open(dir.path()).unwrap();
            store.add(creation("persisted", 0, &["1"])).unwrap()
        };

        let store = DiskStore::open(dir.path()).unwrap();
        assert_eq!(store.list().unwrap().len(), 1);
        assert!(store.load(id).unwrap().is_some());
        let next = store.add(creation("next", 1, &["2"])).unwrap();
        assert_eq!(next, id + 1);
    }

    #[test]
    fn test_delete_missing_is_noop() {
        let dir = TempDir::new().unwrap();
        let store = DiskStore::open(dir.path()).unwrap();
        store.add(creation("keep", 0, &["1"])).unwrap();

        assert!(!store.delete(999).unwrap());
        assert_eq!(store.list().unwrap().len(), 1);
    }

    #[test]
    fn test_delete_removes_unshared_blobs_only() {
        let dir = TempDir::new().unwrap();
        let store = DiskStore::open(dir.path()).unwrap();
        let first = store.add(creation("first", 0, &["shared", "only-first"])).unwrap();
        let second = store.add(creation("second", 1, &["shared"])).unwrap();

        assert!(store.delete(first).unwrap());

        assert!(store.load(first).unwrap().is_none());
        let remaining = store.load(second).unwrap().unwrap();
        assert_eq!(remaining.assets, vec![asset("shared")]);

        let only_first = dir
            .path()
            .join(BLOB_DIR)
            .join(DiskStore::blob_name(b"video-only-first", "mp4"));
        assert!(!only_first.exists());
    }

    #[test]
    fn test_corrupt_index_is_reported() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join(INDEX_FILE), "not json").unwrap();
        assert!(matches!(
            DiskStore::open(dir.path()),
            Err(StoreError::Corrupt { .. })
        ));
    }

    #[test]
    fn test_memory_store_contract() {
        let store = MemoryStore::new();
        let a = store.add(creation("a", 0, &["1"])).unwrap();
        let b = store.add(creation("b", 5, &["2", "3"])).unwrap();

        let list = store.list().unwrap();
        assert_eq!(list[0].id, b);
        assert_eq!(list[0].scene_count, 2);

        assert!(store.delete(a).unwrap());
        assert!(!store.delete(a).unwrap());
        assert_eq!(store.list().unwrap().len(), 1);
        assert!(store.load(a).unwrap().is_none());
    }
}
