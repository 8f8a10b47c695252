//! Identity-keyed cache of probe results
//!
//! Entries are keyed by path and carry the size, mtime, device and inode the
//! file had when it was probed. An entry is only reused when all four still
//! match, so an edited or replaced file is always probed again.
//!
//! Persisted as JSON: written to `<file>.tmp` then renamed over the target.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use anyhow::{Context, Result};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::ffmpeg::ProbedStreams;

/// File state a cached probe is valid for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbeFingerprint {
    pub size: u64,
    pub modified: SystemTime,
    pub device: u64,
    pub inode: u64,
}

impl ProbeFingerprint {
    pub fn from_metadata(metadata: &fs::Metadata) -> Self {
        let identity = crate::media::FsIdentity::from_metadata(metadata);
        Self {
            size: metadata.len(),
            modified: metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH),
            device: identity.device,
            inode: identity.inode,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CacheEntry {
    fingerprint: ProbeFingerprint,
    streams: ProbedStreams,
}

#[derive(Default)]
struct CacheState {
    entries: HashMap<String, CacheEntry>,
    dirty: bool,
}

/// Every operation takes the single state lock
pub struct ProbeCache {
    path: Option<PathBuf>,
    state: Mutex<CacheState>,
}

impl ProbeCache {
    /// A cache that never touches disk
    pub fn in_memory() -> Self {
        Self {
            path: None,
            state: Mutex::new(CacheState::default()),
        }
    }

    /// Load from `path`. A missing or unreadable file starts empty.
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let entries = match fs::read(&path) {
            Ok(raw) => match serde_json::from_slice::<HashMap<String, CacheEntry>>(&raw) {
                Ok(entries) => {
                    info!(path = %path.display(), entries = entries.len(), "Loaded probe cache");
                    entries
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Probe cache is corrupt, starting empty");
                    HashMap::new()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Failed to read probe cache, starting empty");
                HashMap::new()
            }
        };

        Self {
            path: Some(path),
            state: Mutex::new(CacheState {
                entries,
                dirty: false,
            }),
        }
    }

    fn key(path: &Path) -> String {
        path.to_string_lossy().into_owned()
    }

    /// Cached streams for `path`, only if the file is unchanged
    pub fn get(&self, path: &Path, current: &ProbeFingerprint) -> Option<ProbedStreams> {
        let state = self.state.lock();
        state
            .entries
            .get(&Self::key(path))
            .filter(|entry| entry.fingerprint == *current)
            .map(|entry| entry.streams.clone())
    }

    pub fn set(&self, path: &Path, fingerprint: ProbeFingerprint, streams: ProbedStreams) {
        let mut state = self.state.lock();
        state.entries.insert(
            Self::key(path),
            CacheEntry {
                fingerprint,
                streams,
            },
        );
        state.dirty = true;
    }

    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Persist to disk if anything changed since the last flush
    pub fn flush(&self) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let mut state = self.state.lock();
        if !state.dirty {
            return Ok(());
        }

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create {}", parent.display()))?;
            }
        }

        let mut tmp = path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        let raw = serde_json::to_vec(&state.entries).context("Failed to serialize probe cache")?;
        fs::write(&tmp, raw).with_context(|| format!("Failed to write {}", tmp.display()))?;
        fs::rename(&tmp, path)
            .with_context(|| format!("Failed to move {} into place", tmp.display()))?;

        state.dirty = false;
        debug!(path = %path.display(), entries = state.entries.len(), "Flushed probe cache");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn fingerprint(size: u64) -> ProbeFingerprint {
        ProbeFingerprint {
            size,
            modified: SystemTime::UNIX_EPOCH + Duration::from_secs(1_700_000_000),
            device: 1,
            inode: 42,
        }
    }

    fn streams() -> ProbedStreams {
        ProbedStreams {
            video_height: Some(1080),
            ..Default::default()
        }
    }

    #[test]
    fn test_get_requires_matching_fingerprint() {
        let cache = ProbeCache::in_memory();
        let path = Path::new("/m/a.mkv");
        cache.set(path, fingerprint(100), streams());

        assert_eq!(cache.get(path, &fingerprint(100)), Some(streams()));
        assert_eq!(cache.get(path, &fingerprint(101)), None);

        let mut moved = fingerprint(100);
        moved.inode = 43;
        assert_eq!(cache.get(path, &moved), None);
    }

    #[test]
    fn test_flush_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("cache").join("ffprobe_cache.json");

        let cache = ProbeCache::load(&file);
        assert!(cache.is_empty());
        cache.set(Path::new("/m/a.mkv"), fingerprint(7), streams());
        cache.flush().unwrap();

        assert!(file.exists());
        assert!(!dir.path().join("cache").join("ffprobe_cache.json.tmp").exists());

        let reloaded = ProbeCache::load(&file);
        assert_eq!(reloaded.len(), 1);
        assert_eq!(
            reloaded.get(Path::new("/m/a.mkv"), &fingerprint(7)),
            Some(streams())
        );
    }

    #[test]
    fn test_corrupt_cache_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("ffprobe_cache.json");
        fs::write(&file, b"{ not json").unwrap();
        assert!(ProbeCache::load(&file).is_empty());
    }
}
