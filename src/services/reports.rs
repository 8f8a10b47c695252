//! Derived reports over an annotated inventory
//!
//! None of these feed back into planning.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Component, Path, PathBuf};

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use super::filename_parser::parse_season_dir;
use super::scanner::hardlink_sets;
use crate::media::{MediaFile, RegistryApp, normalize_title};

static DISK_SHARE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^/mnt/disk\d+(?:/|$)").expect("static pattern must compile"));

/// Library copy and torrent copy of the same content without a shared inode
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MissingHardlink {
    pub path: PathBuf,
    pub size: u64,
    /// The content exists twice, so the whole file is wasted
    pub wasted_bytes: u64,
    pub ratio: f64,
    pub torrent_name: String,
    pub instance: String,
    pub app: RegistryApp,
    pub title: String,
}

/// Seeding file no library manager owns
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrphanSeeding {
    pub path: PathBuf,
    pub size: u64,
    pub ratio: f64,
    pub torrent_name: String,
    pub hash: String,
    pub link_count: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HardlinkGroup {
    pub device: u64,
    pub inode: u64,
    pub link_count: u64,
    pub size: u64,
    pub paths: Vec<PathBuf>,
}

/// One show keeps a season in differently named folders
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeasonConflict {
    pub show: String,
    pub season: u32,
    pub folders: Vec<String>,
    pub recommended: String,
}

/// Managed and seeding, but with a single link
pub fn missing_hardlinks(files: &[MediaFile]) -> Vec<MissingHardlink> {
    files
        .iter()
        .filter(|f| f.identity.link_count == 1)
        .filter_map(|f| {
            let seeding = f.protection.seeding.as_ref()?;
            let managed = f.protection.managed.as_ref()?;
            Some(MissingHardlink {
                path: f.path.clone(),
                size: f.size,
                wasted_bytes: f.size,
                ratio: seeding.ratio,
                torrent_name: seeding.torrent_name.clone(),
                instance: managed.instance.clone(),
                app: managed.app,
                title: managed.title.clone(),
            })
        })
        .collect()
}

pub fn orphan_seeding(files: &[MediaFile]) -> Vec<OrphanSeeding> {
    files
        .iter()
        .filter(|f| !f.protection.is_managed())
        .filter_map(|f| {
            let seeding = f.protection.seeding.as_ref()?;
            Some(OrphanSeeding {
                path: f.path.clone(),
                size: f.size,
                ratio: seeding.ratio,
                torrent_name: seeding.torrent_name.clone(),
                hash: seeding.hash.clone(),
                link_count: f.identity.link_count,
            })
        })
        .collect()
}

/// Every inode reached through more than one scanned path
pub fn hardlink_groups(files: &[MediaFile]) -> Vec<HardlinkGroup> {
    hardlink_sets(files)
        .into_iter()
        .map(|(key, members)| {
            let first = &files[members[0]];
            let mut paths: Vec<PathBuf> = members.iter().map(|&i| files[i].path.clone()).collect();
            paths.sort();
            HardlinkGroup {
                device: key.device,
                inode: key.inode,
                link_count: first.identity.link_count,
                size: first.size,
                paths,
            }
        })
        .collect()
}

pub fn season_conflicts(files: &[MediaFile]) -> Vec<SeasonConflict> {
    let mut seasons: BTreeMap<(String, u32), BTreeSet<String>> = BTreeMap::new();
    for file in files {
        let Some(show) = file.show.as_deref() else {
            continue;
        };
        let Some(folder) = season_folder(&file.path) else {
            continue;
        };
        if let Some(season) = parse_season_dir(&folder) {
            seasons
                .entry((normalize_title(show), season))
                .or_default()
                .insert(folder);
        }
    }

    seasons
        .into_iter()
        .filter(|(_, folders)| folders.len() > 1)
        .map(|((show, season), folders)| SeasonConflict {
            show,
            season,
            folders: folders.into_iter().collect(),
            recommended: format!("Season {:02}", season),
        })
        .collect()
}

/// First `Season N` / `Staffel N` component of the path
fn season_folder(path: &Path) -> Option<String> {
    path.parent()?.components().find_map(|c| match c {
        Component::Normal(name) => {
            let name = name.to_string_lossy();
            let lower = name.to_lowercase();
            (lower.starts_with("season") || lower.starts_with("staffel")).then(|| name.into_owned())
        }
        _ => None,
    })
}

/// Unraid user shares and disk/cache shares must not be mixed, or hardlinks
/// between them silently become copies
pub fn path_consistency_warnings<'a>(paths: impl IntoIterator<Item = &'a Path>) -> Vec<String> {
    let (mut user, mut disk, mut cache) = (false, false, false);
    for path in paths {
        let text = path.to_string_lossy();
        if path.starts_with("/mnt/user") {
            user = true;
        } else if DISK_SHARE_RE.is_match(&text) {
            disk = true;
        } else if path.starts_with("/mnt/cache") {
            cache = true;
        }
    }

    let mut warnings = Vec::new();
    if user && disk {
        warnings.push("mixed /mnt/user and /mnt/diskN paths, hardlinks may break".to_string());
    }
    if user && cache {
        warnings.push("mixed /mnt/user and /mnt/cache paths, hardlinks may break".to_string());
    }
    warnings
}
