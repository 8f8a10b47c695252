//! Library scanner service
//!
//! Walks the configured roots, builds one [`MediaFile`] per video file with
//! its `stat` identity and parsed hints, and gives each a filename-only
//! score. Unreadable entries are counted and skipped.

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use super::filename_parser::{self, is_sample_or_trailer, is_video_file};
use super::quality_evaluator::QualityEvaluator;
use crate::media::{ContentType, DuplicateKey, FsIdentity, InodeKey, MediaFile, Protection};

#[derive(Debug, Clone, Default)]
pub struct ScanOptions {
    pub roots: Vec<PathBuf>,
    /// Stop after this many files; 0 means no limit
    pub max_files: usize,
    pub content_override: Option<ContentType>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanStats {
    pub files: usize,
    pub skipped_samples: usize,
    pub errors: usize,
    /// `max_files` was reached before the walk finished
    pub truncated: bool,
}

/// Everything the scan found
#[derive(Debug, Clone, Default)]
pub struct Inventory {
    pub files: Vec<MediaFile>,
    pub stats: ScanStats,
}

impl Inventory {
    /// Duplicate sets with at least two members, in key order
    pub fn duplicate_sets(&self) -> BTreeMap<DuplicateKey, Vec<usize>> {
        let mut sets: BTreeMap<DuplicateKey, Vec<usize>> = BTreeMap::new();
        for (idx, file) in self.files.iter().enumerate() {
            if let Some(key) = file.duplicate_key() {
                sets.entry(key).or_default().push(idx);
            }
        }
        sets.retain(|_, members| members.len() > 1);
        sets
    }

    /// Indices of every file that belongs to some duplicate set
    pub fn duplicate_indices(&self) -> Vec<usize> {
        let mut indices: Vec<usize> = self.duplicate_sets().into_values().flatten().collect();
        indices.sort_unstable();
        indices
    }
}

/// Indices of records sharing an inode, for inodes reached through more than
/// one scanned path
pub fn hardlink_sets(files: &[MediaFile]) -> BTreeMap<InodeKey, Vec<usize>> {
    let mut sets: BTreeMap<InodeKey, Vec<usize>> = BTreeMap::new();
    for (idx, file) in files.iter().enumerate() {
        sets.entry(file.inode_key()).or_default().push(idx);
    }
    sets.retain(|_, members| members.len() > 1);
    sets
}

/// Scanner service for discovering media files
pub struct ScannerService {
    options: ScanOptions,
    evaluator: QualityEvaluator,
}

impl ScannerService {
    pub fn new(options: ScanOptions, evaluator: QualityEvaluator) -> Self {
        Self { options, evaluator }
    }

    /// Walk every root. Entries are visited in file-name order per directory.
    pub fn scan(&self) -> Inventory {
        let mut inventory = Inventory::default();
        let mut seen: HashSet<PathBuf> = HashSet::new();
        let limit = self.options.max_files;

        'roots: for root in &self.options.roots {
            info!(root = %root.display(), "Scanning root");
            let before = inventory.files.len();

            for entry in WalkDir::new(root).follow_links(false).sort_by_file_name() {
                let entry = match entry {
                    Ok(e) => e,
                    Err(e) => {
                        inventory.stats.errors += 1;
                        debug!(error = %e, "Skipping unreadable entry");
                        continue;
                    }
                };
                if !entry.file_type().is_file() || !is_video_file(entry.path()) {
                    continue;
                }
                if is_sample_or_trailer(entry.path()) {
                    inventory.stats.skipped_samples += 1;
                    continue;
                }
                if !seen.insert(entry.path().to_path_buf()) {
                    continue;
                }

                let metadata = match entry.metadata() {
                    Ok(m) => m,
                    Err(e) => {
                        inventory.stats.errors += 1;
                        debug!(path = %entry.path().display(), error = %e, "File vanished during scan");
                        continue;
                    }
                };

                let file = build_record(
                    entry.path(),
                    root,
                    &metadata,
                    self.options.content_override,
                    &self.evaluator,
                );
                inventory.files.push(file);

                if limit > 0 && inventory.files.len() >= limit {
                    inventory.stats.truncated = true;
                    warn!(max_files = limit, "File limit reached, scan truncated");
                    break 'roots;
                }
            }

            info!(
                root = %root.display(),
                files = inventory.files.len() - before,
                "Finished scanning root"
            );
        }

        inventory.stats.files = inventory.files.len();
        info!(
            files = inventory.stats.files,
            skipped_samples = inventory.stats.skipped_samples,
            errors = inventory.stats.errors,
            "Scan complete"
        );
        inventory
    }
}

/// One record from a path and its metadata, scored from the name alone
pub fn build_record(
    path: &Path,
    root: &Path,
    metadata: &std::fs::Metadata,
    content_override: Option<ContentType>,
    evaluator: &QualityEvaluator,
) -> MediaFile {
    let hints = filename_parser::parse_media_path(path, content_override);
    let mut file = MediaFile {
        path: path.to_path_buf(),
        root: root.to_path_buf(),
        identity: FsIdentity::from_metadata(metadata),
        size: metadata.len(),
        modified: metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH),
        show: hints.show_name.clone(),
        episode: hints.episode,
        movie_title: hints.movie_title.clone(),
        content_type: hints.content_type,
        hints,
        probed: None,
        probe_error: None,
        score: 0,
        score_reason: String::new(),
        protection: Protection::default(),
    };
    evaluator.apply(&mut file);
    file
}
