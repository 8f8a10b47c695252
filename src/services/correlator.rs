//! External state correlator
//!
//! Gathers the share client and registry snapshots, then annotates every
//! inventory record with protection evidence. Torrent files are matched by
//! exact mapped path first and by `(device, inode)` second; seeding evidence
//! is then copied to every scanned path that shares the inode. Registry and
//! queue matching is by mapped path.
//!
//! Gathering never fails: a source that cannot be reached contributes no
//! evidence and reports a [`SourceStatus::Failed`].

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::external_source::{RegistryInventory, RegistrySource, SourceStatus, TorrentSnapshot, TorrentSource};
use super::scanner::hardlink_sets;
use crate::media::{
    FsIdentity, InodeKey, ManagedEvidence, MatchKind, MediaFile, QueueEvidence, SeedingEvidence,
};

#[derive(Debug, Clone)]
struct TorrentEntry {
    evidence: SeedingEvidence,
    local_path: PathBuf,
}

impl TorrentEntry {
    fn matched(&self, kind: MatchKind) -> SeedingEvidence {
        SeedingEvidence {
            matched_by: kind,
            ..self.evidence.clone()
        }
    }
}

/// Lookups over the active torrents' files
#[derive(Debug, Clone, Default)]
pub struct TorrentIndex {
    entries: Vec<TorrentEntry>,
    by_path: HashMap<PathBuf, usize>,
    by_identity: HashMap<InodeKey, usize>,
    by_name: HashMap<String, usize>,
    /// Mapped paths that could not be stat'ed
    pub stat_errors: usize,
}

impl TorrentIndex {
    /// Index the files of active torrents. Files are stat'ed through the
    /// mapped path; a mapping that points nowhere only loses inode matching.
    pub fn build(snapshot: &TorrentSnapshot) -> Self {
        let mut index = TorrentIndex::default();

        for torrent in snapshot.torrents.iter().filter(|t| t.activity.is_active()) {
            for file in &torrent.files {
                let entry = TorrentEntry {
                    evidence: SeedingEvidence {
                        hash: torrent.hash.clone(),
                        torrent_name: torrent.name.clone(),
                        torrent_file: file.remote_path.clone(),
                        state: torrent.state.clone(),
                        ratio: torrent.ratio,
                        category: torrent.category.clone(),
                        matched_by: MatchKind::Path,
                    },
                    local_path: file.local_path.clone(),
                };
                let idx = index.entries.len();
                index.entries.push(entry);

                index.by_path.entry(file.local_path.clone()).or_insert(idx);
                if let Some(name) = file.file_name() {
                    index.by_name.entry(name).or_insert(idx);
                }
                match std::fs::metadata(&file.local_path) {
                    Ok(metadata) => {
                        let key = FsIdentity::from_metadata(&metadata).key();
                        index.by_identity.entry(key).or_insert(idx);
                    }
                    Err(e) => {
                        index.stat_errors += 1;
                        if index.stat_errors <= 5 {
                            debug!(path = %file.local_path.display(), error = %e, "Cannot stat torrent file");
                        }
                    }
                }
            }
        }

        if index.stat_errors > 0 && index.by_identity.is_empty() {
            warn!(
                stat_errors = index.stat_errors,
                "No torrent file could be stat'ed, check the torrent path mapping"
            );
        }
        info!(
            files = index.entries.len(),
            with_identity = index.by_identity.len(),
            stat_errors = index.stat_errors,
            "Indexed active torrent files"
        );
        index
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn lookup(&self, file: &MediaFile) -> Option<SeedingEvidence> {
        if let Some(&idx) = self.by_path.get(&file.path) {
            return Some(self.entries[idx].matched(MatchKind::Path));
        }
        self.by_identity
            .get(&file.inode_key())
            .map(|&idx| self.entries[idx].matched(MatchKind::Inode))
    }

    fn lookup_name(&self, file: &MediaFile) -> Option<&TorrentEntry> {
        let name = file.file_name().to_lowercase();
        self.by_name.get(&name).map(|&idx| &self.entries[idx])
    }
}

/// Lookups over every registry instance's managed files and queue
#[derive(Debug, Clone, Default)]
pub struct RegistryIndex {
    managed: HashMap<PathBuf, ManagedEvidence>,
    queued: HashMap<PathBuf, QueueEvidence>,
}

impl RegistryIndex {
    /// Earlier instances win when two claim the same path
    pub fn build(inventories: &[RegistryInventory]) -> Self {
        let mut index = RegistryIndex::default();
        for inventory in inventories {
            for file in &inventory.managed {
                index
                    .managed
                    .entry(file.path.clone())
                    .or_insert_with(|| file.evidence.clone());
            }
            for queued in &inventory.queue {
                index
                    .queued
                    .entry(queued.path.clone())
                    .or_insert_with(|| queued.evidence.clone());
            }
        }
        index
    }

    /// A queue output path may be the file itself or the folder it lands in
    fn queued_for(&self, path: &Path) -> Option<&QueueEvidence> {
        path.ancestors().find_map(|p| self.queued.get(p))
    }
}

/// A file whose name matches a torrent file although neither its path nor
/// its inode does. Usually a sign of a missing path mapping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnmappedMatch {
    pub path: PathBuf,
    pub torrent_name: String,
    /// Where the torrent file was expected after mapping
    pub torrent_path: PathBuf,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CorrelationStats {
    pub path_matches: usize,
    pub inode_matches: usize,
    pub propagated: usize,
    pub registry_matches: usize,
    pub queue_matches: usize,
    pub unmapped_matches: Vec<UnmappedMatch>,
}

/// Everything learned from external sources for one run
#[derive(Debug, Clone)]
pub struct ExternalState {
    pub torrents: Option<TorrentIndex>,
    pub registry: RegistryIndex,
    pub share_status: SourceStatus,
    pub registry_status: Vec<SourceStatus>,
    /// Mapped torrent save locations, for path consistency checks
    pub torrent_paths: Vec<PathBuf>,
}

impl Default for ExternalState {
    fn default() -> Self {
        Self {
            torrents: None,
            registry: RegistryIndex::default(),
            share_status: SourceStatus::Disabled,
            registry_status: Vec::new(),
            torrent_paths: Vec::new(),
        }
    }
}

impl ExternalState {
    pub fn is_degraded(&self) -> bool {
        self.share_status.is_failed() || self.registry_status.iter().any(SourceStatus::is_failed)
    }
}

pub struct ExternalStateCorrelator {
    torrent_source: Option<Box<dyn TorrentSource>>,
    registries: Vec<Box<dyn RegistrySource>>,
}

impl ExternalStateCorrelator {
    pub fn new(torrent_source: Option<Box<dyn TorrentSource>>, registries: Vec<Box<dyn RegistrySource>>) -> Self {
        Self {
            torrent_source,
            registries,
        }
    }

    /// Query every source in turn. Never fails; see [`SourceStatus`].
    pub async fn gather(&self) -> ExternalState {
        let mut state = ExternalState::default();

        if let Some(source) = &self.torrent_source {
            match source.snapshot().await {
                Ok(snapshot) => {
                    state.share_status = SourceStatus::Connected {
                        name: source.name().to_string(),
                        version: snapshot.version.clone(),
                        items: snapshot.active_count(),
                    };
                    state.torrent_paths = torrent_dirs(&snapshot);
                    state.torrents = Some(TorrentIndex::build(&snapshot));
                }
                Err(e) => {
                    warn!(source = %source.name(), error = %e, "Share client unavailable, no seeding protection this run");
                    state.share_status = SourceStatus::Failed {
                        name: source.name().to_string(),
                        error: e.to_string(),
                    };
                }
            }
        }

        let mut inventories = Vec::new();
        for registry in &self.registries {
            match registry.inventory().await {
                Ok(inventory) => {
                    state.registry_status.push(SourceStatus::Connected {
                        name: registry.name().to_string(),
                        version: inventory.version.clone(),
                        items: inventory.managed.len(),
                    });
                    inventories.push(inventory);
                }
                Err(e) => {
                    warn!(
                        instance = %registry.name(),
                        app = %registry.app(),
                        error = %e,
                        "Library manager unavailable, no registry protection from it this run"
                    );
                    state.registry_status.push(SourceStatus::Failed {
                        name: registry.name().to_string(),
                        error: e.to_string(),
                    });
                }
            }
        }
        state.registry = RegistryIndex::build(&inventories);
        state
    }
}

/// Distinct parent directories of active torrent files
fn torrent_dirs(snapshot: &TorrentSnapshot) -> Vec<PathBuf> {
    let mut dirs: Vec<PathBuf> = snapshot
        .torrents
        .iter()
        .filter(|t| t.activity.is_active())
        .flat_map(|t| t.files.iter())
        .filter_map(|f| f.local_path.parent().map(Path::to_path_buf))
        .collect();
    dirs.sort();
    dirs.dedup();
    dirs
}

/// Attach evidence to every record.
///
/// Runs to completion for the whole inventory, inode propagation included,
/// before anything is planned.
pub fn annotate(files: &mut [MediaFile], state: &ExternalState) -> CorrelationStats {
    let mut stats = CorrelationStats::default();

    if let Some(torrents) = &state.torrents {
        let mut unmapped: Vec<(usize, UnmappedMatch)> = Vec::new();
        for (idx, file) in files.iter_mut().enumerate() {
            match torrents.lookup(file) {
                Some(evidence) => {
                    match evidence.matched_by {
                        MatchKind::Path => stats.path_matches += 1,
                        _ => stats.inode_matches += 1,
                    }
                    file.protection.seeding = Some(evidence);
                }
                None => {
                    if let Some(entry) = torrents.lookup_name(file) {
                        unmapped.push((
                            idx,
                            UnmappedMatch {
                                path: file.path.clone(),
                                torrent_name: entry.evidence.torrent_name.clone(),
                                torrent_path: entry.local_path.clone(),
                            },
                        ));
                    }
                }
            }
        }

        stats.propagated = propagate_seeding(files);
        stats.unmapped_matches = unmapped
            .into_iter()
            .filter(|(idx, _)| !files[*idx].protection.is_seeding())
            .map(|(_, m)| m)
            .collect();
        if !stats.unmapped_matches.is_empty() {
            warn!(
                count = stats.unmapped_matches.len(),
                "Files match torrents by name only, a path mapping may be missing"
            );
        }
    }

    for file in files.iter_mut() {
        if let Some(evidence) = state.registry.managed.get(&file.path) {
            file.protection.managed = Some(evidence.clone());
            stats.registry_matches += 1;
        }
        if let Some(evidence) = state.registry.queued_for(&file.path) {
            file.protection.queued = Some(evidence.clone());
            stats.queue_matches += 1;
        }
    }

    info!(
        path_matches = stats.path_matches,
        inode_matches = stats.inode_matches,
        propagated = stats.propagated,
        registry_matches = stats.registry_matches,
        queue_matches = stats.queue_matches,
        "Correlation complete"
    );
    stats
}

/// Copy seeding evidence to every record sharing an inode with a seeding
/// record. The source is the seeding member with the smallest path, so the
/// outcome does not depend on scan order. Returns how many records gained
/// evidence.
pub fn propagate_seeding(files: &mut [MediaFile]) -> usize {
    let mut propagated = 0;
    for members in hardlink_sets(files).values() {
        let source = members
            .iter()
            .filter_map(|&i| files[i].protection.seeding.as_ref().map(|s| (&files[i].path, s)))
            .min_by(|a, b| a.0.cmp(b.0))
            .map(|(_, s)| s.clone());
        let Some(source) = source else {
            continue;
        };
        for &i in members {
            if files[i].protection.seeding.is_none() {
                files[i].protection.seeding = Some(SeedingEvidence {
                    matched_by: MatchKind::Hardlink,
                    ..source.clone()
                });
                propagated += 1;
            }
        }
    }
    propagated
}
