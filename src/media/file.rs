//! Scanned media file record and the keys derived from it

use std::fmt;
use std::fs::Metadata;
use std::path::PathBuf;
use std::time::SystemTime;

use serde::{Deserialize, Serialize};

use super::evidence::Protection;
use crate::services::ffmpeg::ProbedStreams;
use crate::services::filename_parser::ParsedMedia;

/// Physical content identity. Two paths with the same key are hardlinks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct InodeKey {
    pub device: u64,
    pub inode: u64,
}

/// Filesystem identity captured from `stat`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FsIdentity {
    pub device: u64,
    pub inode: u64,
    pub link_count: u64,
}

impl FsIdentity {
    #[cfg(unix)]
    pub fn from_metadata(metadata: &Metadata) -> Self {
        use std::os::unix::fs::MetadataExt;
        Self {
            device: metadata.dev(),
            inode: metadata.ino(),
            link_count: metadata.nlink(),
        }
    }

    #[cfg(not(unix))]
    pub fn from_metadata(_metadata: &Metadata) -> Self {
        Self {
            device: 0,
            inode: 0,
            link_count: 1,
        }
    }

    pub fn key(&self) -> InodeKey {
        InodeKey {
            device: self.device,
            inode: self.inode,
        }
    }
}

/// Coarse classification driving the language tier of the score
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentType {
    #[default]
    Series,
    Anime,
    Movie,
}

impl ContentType {
    /// Parse a `CONTENT_TYPE` value. `auto` yields `None` (detect per file).
    pub fn parse_override(value: &str) -> Option<Option<Self>> {
        match value.trim().to_lowercase().as_str() {
            "" | "auto" => Some(None),
            "anime" => Some(Some(ContentType::Anime)),
            "series" | "tv" => Some(Some(ContentType::Series)),
            "movie" | "movies" | "film" => Some(Some(ContentType::Movie)),
            _ => None,
        }
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContentType::Series => write!(f, "series"),
            ContentType::Anime => write!(f, "anime"),
            ContentType::Movie => write!(f, "movie"),
        }
    }
}

/// The single episode interpretation of a file name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EpisodeNumber {
    Seasonal { season: u32, episode: u32 },
    Absolute { number: u32 },
}

/// Key under which files are considered copies of the same logical item
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DuplicateKey {
    Episode { show: String, season: u32, episode: u32 },
    Absolute { show: String, number: u32 },
    Movie { title: String },
}

impl fmt::Display for DuplicateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DuplicateKey::Episode {
                show,
                season,
                episode,
            } => write!(f, "{} S{:02}E{:02}", show, season, episode),
            DuplicateKey::Absolute { show, number } => write!(f, "{} - {:03}", show, number),
            DuplicateKey::Movie { title } => write!(f, "{}", title),
        }
    }
}

/// Lowercased, whitespace-collapsed form used in duplicate keys
pub fn normalize_title(title: &str) -> String {
    title
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// One scanned media file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaFile {
    pub path: PathBuf,
    pub root: PathBuf,
    pub identity: FsIdentity,
    pub size: u64,
    pub modified: SystemTime,

    pub show: Option<String>,
    pub episode: Option<EpisodeNumber>,
    /// Title directory for movies, used as the movie duplicate key
    pub movie_title: Option<String>,
    pub content_type: ContentType,

    /// Hints derived from the path alone
    pub hints: ParsedMedia,
    /// Stream metadata, present once the file was probed successfully
    pub probed: Option<ProbedStreams>,
    pub probe_error: Option<String>,

    pub score: i32,
    pub score_reason: String,

    #[serde(default)]
    pub protection: Protection,
}

impl MediaFile {
    pub fn file_name(&self) -> &str {
        self.path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default()
    }

    pub fn inode_key(&self) -> InodeKey {
        self.identity.key()
    }

    /// Probed height when known, filename resolution otherwise
    pub fn resolution(&self) -> Option<u32> {
        self.probed
            .as_ref()
            .and_then(|p| p.video_height)
            .or(self.hints.resolution)
    }

    pub fn season(&self) -> Option<u32> {
        match self.episode {
            Some(EpisodeNumber::Seasonal { season, .. }) => Some(season),
            _ => self.hints.season_dir,
        }
    }

    pub fn duplicate_key(&self) -> Option<DuplicateKey> {
        match (self.episode, self.show.as_deref()) {
            (Some(EpisodeNumber::Seasonal { season, episode }), Some(show)) => {
                Some(DuplicateKey::Episode {
                    show: normalize_title(show),
                    season,
                    episode,
                })
            }
            (Some(EpisodeNumber::Absolute { number }), Some(show)) => Some(DuplicateKey::Absolute {
                show: normalize_title(show),
                number,
            }),
            (None, _) if self.content_type == ContentType::Movie => self
                .movie_title
                .as_deref()
                .map(|title| DuplicateKey::Movie {
                    title: normalize_title(title),
                }),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_title() {
        assert_eq!(normalize_title("  The   Office "), "the office");
    }

    #[test]
    fn test_content_type_override() {
        assert_eq!(ContentType::parse_override("auto"), Some(None));
        assert_eq!(
            ContentType::parse_override("Anime"),
            Some(Some(ContentType::Anime))
        );
        assert_eq!(ContentType::parse_override("cartoon"), None);
    }

    #[test]
    fn test_duplicate_key_display() {
        let key = DuplicateKey::Episode {
            show: "show".to_string(),
            season: 1,
            episode: 2,
        };
        assert_eq!(key.to_string(), "show S01E02");
    }
}
