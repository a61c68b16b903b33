//! Local file cache of accepted snapshots.
//!
//! Layout:
//!
//! ```text
//! <cache_dir>/
//! ├─ {app_id}_configuration_{namespace}.txt   # one JSON line per file
//! └─ ...
//! ```
//!
//! The cache is a write-through mirror of the in-memory store. It is read
//! only when the network path fails, so a process that starts while the
//! config service is unreachable still comes up with its last known
//! configuration.

use crate::error::SyncResult;
use apollo_protocol::ApolloConfig;
use parking_lot::Mutex;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};

/// Per-namespace snapshot files for one application.
#[derive(Debug)]
pub struct DiskCache {
    dir: PathBuf,
    app_id: String,
    /// Guards file writes and the content hashes of the last write.
    state: Mutex<CacheState>,
}

#[derive(Debug, Default)]
struct CacheState {
    dir_ready: bool,
    hashes: HashMap<String, [u8; 32]>,
}

impl DiskCache {
    /// Creates a cache rooted at `dir`. The directory is created lazily.
    pub fn new(dir: impl Into<PathBuf>, app_id: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            app_id: app_id.into(),
            state: Mutex::new(CacheState::default()),
        }
    }

    /// Default cache root: `~/data/apollo/cache`.
    pub fn default_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(std::env::temp_dir)
            .join("data")
            .join("apollo")
            .join("cache")
    }

    /// Returns the cache root.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the file holding `namespace`.
    pub fn path_for(&self, namespace: &str) -> PathBuf {
        self.dir
            .join(format!("{}_configuration_{}.txt", self.app_id, namespace))
    }

    /// Persists `snapshot` unless it is byte-identical to the last write.
    ///
    /// Returns `true` if the file was written.
    pub fn write(&self, namespace: &str, snapshot: &ApolloConfig) -> SyncResult<bool> {
        let mut state = self.state.lock();
        self.write_locked(&mut state, namespace, snapshot)
    }

    /// Persists whatever `current` returns, reading it under the write lock.
    ///
    /// Concurrent callers passing a reader of the same source leave the file
    /// holding that source's latest value. Returns `false` if `current`
    /// yields nothing or the content is unchanged.
    pub fn write_with<F>(&self, namespace: &str, current: F) -> SyncResult<bool>
    where
        F: FnOnce() -> Option<Arc<ApolloConfig>>,
    {
        let mut state = self.state.lock();
        match current() {
            Some(snapshot) => self.write_locked(&mut state, namespace, &snapshot),
            None => Ok(false),
        }
    }

    fn write_locked(
        &self,
        state: &mut CacheState,
        namespace: &str,
        snapshot: &ApolloConfig,
    ) -> SyncResult<bool> {
        let line = snapshot.to_json()?;
        let digest: [u8; 32] = Sha256::digest(line.as_bytes()).into();

        if state.hashes.get(namespace) == Some(&digest) {
            debug!(namespace, "cache file up to date");
            return Ok(false);
        }

        if !state.dir_ready {
            fs::create_dir_all(&self.dir)?;
            state.dir_ready = true;
        }

        let path = self.path_for(namespace);
        atomic_write(&path, line.as_bytes())?;
        state.hashes.insert(namespace.to_string(), digest);

        debug!(namespace, path = %path.display(), "cache file written");
        Ok(true)
    }

    /// Reads the cached snapshot of `namespace`.
    ///
    /// A missing file, an empty file, or an unparsable line all yield `None`.
    pub fn read(&self, namespace: &str) -> Option<ApolloConfig> {
        let path = self.path_for(namespace);
        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!(namespace, "no cache file");
                return None;
            }
            Err(e) => {
                warn!(namespace, error = %e, "failed to read cache file");
                return None;
            }
        };

        let line = content.lines().next().map(str::trim).unwrap_or_default();
        if line.is_empty() {
            return None;
        }

        match ApolloConfig::from_json(line) {
            Ok(snapshot) => Some(snapshot),
            Err(e) => {
                warn!(namespace, error = %e, "ignoring corrupt cache file");
                None
            }
        }
    }
}

/// Atomic file write (write to temp, then rename).
fn atomic_write(path: &Path, data: &[u8]) -> io::Result<()> {
    let temp_path = path.with_extension("tmp");
    fs::write(&temp_path, data)?;
    fs::rename(&temp_path, path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::thread;
    use tempfile::tempdir;

    fn snapshot(release: &str) -> ApolloConfig {
        let mut configurations = BTreeMap::new();
        configurations.insert("timeout".to_string(), "100".to_string());
        ApolloConfig::new(release, configurations)
    }

    #[test]
    fn write_then_read() {
        let dir = tempdir().unwrap();
        let cache = DiskCache::new(dir.path(), "demo");

        assert!(cache.write("application", &snapshot("r1")).unwrap());
        assert_eq!(cache.read("application"), Some(snapshot("r1")));
        assert!(dir.path().join("demo_configuration_application.txt").is_file());
        assert!(!cache.path_for("application").with_extension("tmp").exists());
    }

    #[test]
    fn identical_write_is_skipped() {
        let dir = tempdir().unwrap();
        let cache = DiskCache::new(dir.path(), "demo");

        assert!(cache.write("application", &snapshot("r1")).unwrap());
        // Tamper with the file: a skipped write must leave it alone.
        fs::write(cache.path_for("application"), "sentinel").unwrap();
        assert!(!cache.write("application", &snapshot("r1")).unwrap());
        assert_eq!(
            fs::read_to_string(cache.path_for("application")).unwrap(),
            "sentinel"
        );

        assert!(cache.write("application", &snapshot("r2")).unwrap());
        assert_eq!(cache.read("application").unwrap().release_key, "r2");
    }

    #[test]
    fn write_with_reads_under_the_lock() {
        let dir = tempdir().unwrap();
        let cache = DiskCache::new(dir.path(), "demo");

        assert!(!cache.write_with("application", || None).unwrap());
        assert!(cache.read("application").is_none());

        let current = Arc::new(snapshot("r1"));
        assert!(cache
            .write_with("application", || Some(Arc::clone(&current)))
            .unwrap());
        assert!(!cache.write_with("application", || Some(current)).unwrap());
        assert_eq!(cache.read("application").unwrap().release_key, "r1");
    }

    #[test]
    fn racing_writers_leave_the_latest_value() {
        let dir = tempdir().unwrap();
        let cache = Arc::new(DiskCache::new(dir.path(), "demo"));
        let latest = Arc::new(Mutex::new(Arc::new(snapshot("r0"))));

        let handles: Vec<_> = (0..4)
            .map(|t| {
                let cache = Arc::clone(&cache);
                let latest = Arc::clone(&latest);
                thread::spawn(move || {
                    for i in 0..50 {
                        *latest.lock() = Arc::new(snapshot(&format!("r{}-{}", t, i)));
                        cache
                            .write_with("application", || Some(latest.lock().clone()))
                            .unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let expected = latest.lock().release_key.clone();
        assert_eq!(cache.read("application").unwrap().release_key, expected);
    }

    #[test]
    fn hashes_are_per_namespace() {
        let dir = tempdir().unwrap();
        let cache = DiskCache::new(dir.path(), "demo");

        assert!(cache.write("application", &snapshot("r1")).unwrap());
        assert!(cache.write("db.yml", &snapshot("r1")).unwrap());
    }

    #[test]
    fn directory_created_lazily() {
        let dir = tempdir().unwrap();
        let root = dir.path().join("nested").join("cache");
        let cache = DiskCache::new(&root, "demo");

        assert!(!root.exists());
        assert!(cache.read("application").is_none());
        assert!(!root.exists());

        cache.write("application", &snapshot("r1")).unwrap();
        assert!(root.is_dir());
    }

    #[test]
    fn read_fails_soft() {
        let dir = tempdir().unwrap();
        let cache = DiskCache::new(dir.path(), "demo");

        assert!(cache.read("missing").is_none());

        fs::write(cache.path_for("empty"), "").unwrap();
        assert!(cache.read("empty").is_none());

        fs::write(cache.path_for("corrupt"), "{not json").unwrap();
        assert!(cache.read("corrupt").is_none());
    }

    #[test]
    fn reads_first_line_only() {
        let dir = tempdir().unwrap();
        let cache = DiskCache::new(dir.path(), "demo");

        let line = snapshot("r9").to_json().unwrap();
        fs::write(cache.path_for("application"), format!("{}\ntrailing", line)).unwrap();
        assert_eq!(cache.read("application").unwrap().release_key, "r9");
    }

    #[test]
    fn write_into_unwritable_location_fails() {
        let dir = tempdir().unwrap();
        let blocker = dir.path().join("file");
        fs::write(&blocker, "x").unwrap();

        let cache = DiskCache::new(blocker.join("cache"), "demo");
        assert!(cache.write("application", &snapshot("r1")).is_err());
    }
}
