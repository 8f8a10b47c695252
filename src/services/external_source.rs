//! External state sources
//!
//! The correlator only sees these traits and the typed snapshots they return.
//! Raw API payloads are converted at the client boundary, so torrent states
//! arrive here already classified and every path is already mapped into the
//! scanner's view.

use std::fmt;
use std::path::PathBuf;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::retry::ClientError;
use crate::media::{ManagedEvidence, QueueEvidence, RegistryApp};

/// Closed classification of a share client's torrent state string
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TorrentActivity {
    Active,
    Inactive,
}

const ACTIVE_STATES: &[&str] = &[
    "seeding",
    "uploading",
    "stalledUP",
    "queuedUP",
    "forcedUP",
    "downloading",
    "stalledDL",
    "queuedDL",
    "forcedDL",
    "metaDL",
    "allocating",
    "checkingDL",
];

impl TorrentActivity {
    /// Unknown states are inactive
    pub fn from_state(state: &str) -> Self {
        if ACTIVE_STATES.contains(&state) {
            TorrentActivity::Active
        } else {
            TorrentActivity::Inactive
        }
    }

    pub fn is_active(self) -> bool {
        self == TorrentActivity::Active
    }
}

impl fmt::Display for TorrentActivity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TorrentActivity::Active => write!(f, "active"),
            TorrentActivity::Inactive => write!(f, "inactive"),
        }
    }
}

/// One video file inside a torrent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SharedFile {
    /// Path as the client reports it
    pub remote_path: String,
    /// Same path after the configured mapping
    pub local_path: PathBuf,
}

impl SharedFile {
    /// Lowercased file name, used for the filename fallback
    pub fn file_name(&self) -> Option<String> {
        self.local_path
            .file_name()
            .map(|n| n.to_string_lossy().to_lowercase())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SharedTorrent {
    pub hash: String,
    pub name: String,
    pub state: String,
    pub activity: TorrentActivity,
    pub ratio: f64,
    pub category: Option<String>,
    pub files: Vec<SharedFile>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TorrentSnapshot {
    pub version: Option<String>,
    pub torrents: Vec<SharedTorrent>,
}

impl TorrentSnapshot {
    pub fn active_count(&self) -> usize {
        self.torrents.iter().filter(|t| t.activity.is_active()).count()
    }
}

/// A file some registry instance owns
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManagedFile {
    pub path: PathBuf,
    pub size: u64,
    pub evidence: ManagedEvidence,
}

/// A path that is the target of an in-progress download
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueuedPath {
    pub path: PathBuf,
    pub evidence: QueueEvidence,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegistryInventory {
    pub instance: String,
    pub app: RegistryApp,
    pub version: Option<String>,
    pub managed: Vec<ManagedFile>,
    pub queue: Vec<QueuedPath>,
}

/// Download-share client (qBittorrent)
#[async_trait]
pub trait TorrentSource: Send + Sync {
    fn name(&self) -> &str;

    /// Every torrent with its video files, paths already mapped
    async fn snapshot(&self) -> Result<TorrentSnapshot, ClientError>;
}

/// Library-management registry (Sonarr, Radarr)
#[async_trait]
pub trait RegistrySource: Send + Sync {
    fn name(&self) -> &str;

    fn app(&self) -> RegistryApp;

    /// Managed files and queue entries, paths already mapped
    async fn inventory(&self) -> Result<RegistryInventory, ClientError>;
}

/// How one external source behaved during the run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SourceStatus {
    Disabled,
    Connected {
        name: String,
        version: Option<String>,
        items: usize,
    },
    Failed {
        name: String,
        error: String,
    },
}

impl SourceStatus {
    pub fn is_failed(&self) -> bool {
        matches!(self, SourceStatus::Failed { .. })
    }
}
