//! Protection evidence attached to scanned files by the correlator
//!
//! Any single piece of evidence is enough to keep a file out of the
//! deletion plan.

use std::fmt;

use serde::{Deserialize, Serialize};

/// How a torrent file was matched to an inventory record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchKind {
    Path,
    Inode,
    /// Copied from another path sharing the same inode
    Hardlink,
}

/// File is part of an active torrent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeedingEvidence {
    pub hash: String,
    pub torrent_name: String,
    /// File name as listed inside the torrent
    pub torrent_file: String,
    /// Raw client state, kept for reports only
    pub state: String,
    pub ratio: f64,
    pub category: Option<String>,
    pub matched_by: MatchKind,
}

/// Which kind of library manager owns a file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RegistryApp {
    Sonarr,
    Radarr,
}

impl RegistryApp {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "sonarr" => Some(RegistryApp::Sonarr),
            "radarr" => Some(RegistryApp::Radarr),
            _ => None,
        }
    }
}

impl fmt::Display for RegistryApp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegistryApp::Sonarr => write!(f, "sonarr"),
            RegistryApp::Radarr => write!(f, "radarr"),
        }
    }
}

/// File is owned by a library manager
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManagedEvidence {
    pub instance: String,
    pub app: RegistryApp,
    pub media_id: i64,
    pub file_id: i64,
    pub title: String,
    pub season: Option<u32>,
    pub quality: Option<String>,
    pub quality_id: Option<i64>,
    pub quality_profile: Option<String>,
    pub custom_formats: Vec<String>,
    pub custom_format_score: Option<i64>,
    pub upgrade_recommended: bool,
    pub upgrade_reason: Option<String>,
    pub webui_url: Option<String>,
}

/// File is the output of a download a library manager is still processing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueEvidence {
    pub instance: String,
    pub app: RegistryApp,
    pub title: Option<String>,
    pub status: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ProtectionEvidence {
    Seeding(SeedingEvidence),
    DownloadQueue(QueueEvidence),
    LibraryManaged(ManagedEvidence),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProtectionKind {
    Seeding,
    DownloadQueue,
    LibraryManaged,
}

impl fmt::Display for ProtectionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProtectionKind::Seeding => write!(f, "seeding"),
            ProtectionKind::DownloadQueue => write!(f, "in download queue"),
            ProtectionKind::LibraryManaged => write!(f, "library managed"),
        }
    }
}

/// Zero or one piece of evidence of each kind
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Protection {
    pub seeding: Option<SeedingEvidence>,
    pub managed: Option<ManagedEvidence>,
    pub queued: Option<QueueEvidence>,
}

impl Protection {
    pub fn is_seeding(&self) -> bool {
        self.seeding.is_some()
    }

    pub fn is_managed(&self) -> bool {
        self.managed.is_some()
    }

    pub fn in_queue(&self) -> bool {
        self.queued.is_some()
    }

    /// First reason, in seeding / managed / queued order, this file must be kept
    pub fn blocking_kind(&self) -> Option<ProtectionKind> {
        if self.is_seeding() {
            Some(ProtectionKind::Seeding)
        } else if self.is_managed() {
            Some(ProtectionKind::LibraryManaged)
        } else if self.in_queue() {
            Some(ProtectionKind::DownloadQueue)
        } else {
            None
        }
    }

    /// Every piece of evidence held, for reports
    pub fn evidence(&self) -> Vec<ProtectionEvidence> {
        let mut out = Vec::new();
        if let Some(s) = &self.seeding {
            out.push(ProtectionEvidence::Seeding(s.clone()));
        }
        if let Some(q) = &self.queued {
            out.push(ProtectionEvidence::DownloadQueue(q.clone()));
        }
        if let Some(m) = &self.managed {
            out.push(ProtectionEvidence::LibraryManaged(m.clone()));
        }
        out
    }
}
