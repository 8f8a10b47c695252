//! Filename parser for library paths
//!
//! Parses names like:
//! - "Show - S01E05 - Title [WEBDL-1080p][AAC 2.0][x264]-GROUP.mkv"
//! - "Show.S02E10.German.DL.1080p.BluRay.x264-GROUP.mkv"
//! - "[SubsPlease] Show - 1071 (1080p).mkv"
//!
//! Everything here is pure: no filesystem access, no failure mode other
//! than an absent field. Conflicting markers resolve by first match.

use std::collections::BTreeSet;
use std::fmt;
use std::path::{Component, Path};

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::language::normalize_language;
use crate::media::{ContentType, EpisodeNumber};

/// Video file extensions we recognize
pub const VIDEO_EXTENSIONS: &[&str] = &["mkv", "mp4", "m4v", "avi", "mov", "ts", "wmv"];

fn compile(pattern: &str) -> Regex {
    Regex::new(pattern).expect("static pattern must compile")
}

static EPISODE_RE: Lazy<Regex> = Lazy::new(|| compile(r"(?i)\bS(\d{1,2})E(\d{1,3})\b"));
static ABSOLUTE_RE: Lazy<Regex> = Lazy::new(|| compile(r"\s-\s(\d{3,4})\s-\s"));
static RESOLUTION_RE: Lazy<Regex> =
    Lazy::new(|| compile(r"(?i)\b(2160|1080|720|576|480|360)p\b|\b(4K|UHD)\b"));
static RELEASE_GROUP_RE: Lazy<Regex> = Lazy::new(|| compile(r"-([A-Za-z0-9][A-Za-z0-9._]+)$"));
static BRACKET_RE: Lazy<Regex> = Lazy::new(|| compile(r"\[([^\]]+)\]"));
static SEASON_DIR_RE: Lazy<Regex> = Lazy::new(|| compile(r"(?i)(?:season|staffel)\s*(\d+)"));
static SONARR_SHOW_RE: Lazy<Regex> = Lazy::new(|| compile(r"(?i)^(.+?)\s*-\s*S\d{2}E\d{2,3}\b"));
static BRACKET_AUDIO_RE: Lazy<Regex> =
    Lazy::new(|| compile(r"(?i)^([A-Za-z0-9-]+)\s+(\d)(?:\.(\d))?$"));

static BRACKET_LANG_COMBO_RE: Lazy<Regex> = Lazy::new(|| {
    compile(
        r"(?i)\[((?:DE|EN|JA|JP|GER|ENG|JPN|JAP)(?:\+(?:DE|EN|JA|JP|GER|ENG|JPN|JAP))+)\]",
    )
});
static BRACKET_SINGLE_LANG_RE: Lazy<Regex> =
    Lazy::new(|| compile(r"(?i)\[(DE|EN|JA|JP|GER|ENG|JPN|JAP)\]"));
static MULTI_GERMAN_RE: Lazy<Regex> = Lazy::new(|| compile(r"(?i)\bMulti[- ]?German\b"));
static GERMAN_JAP_RE: Lazy<Regex> = Lazy::new(|| compile(r"(?i)\bGerman[- ]?(?:JAP|JPN)\b"));
static GERMAN_DL_RE: Lazy<Regex> = Lazy::new(|| compile(r"(?i)\bGerman[. ]+DL\b"));
static DUAL_RE: Lazy<Regex> =
    Lazy::new(|| compile(r"(?i)\bDL\b|\bDual[- ]?(?:Audio|Language)?\b|\bMulti\b"));
static JA_MARKER_RE: Lazy<Regex> = Lazy::new(|| compile(r"(?i)\b(?:JA|JAP|JPN|Japanese)\b"));
static EN_MARKER_RE: Lazy<Regex> = Lazy::new(|| compile(r"(?i)\b(?:EN|ENG|English)\b"));
static GERMAN_WORD_RE: Lazy<Regex> = Lazy::new(|| compile(r"(?i)\bGERMAN\b"));
static ENGLISH_WORD_RE: Lazy<Regex> = Lazy::new(|| compile(r"(?i)\bENGLISH\b|\.ENG\."));
static JAPANESE_WORD_RE: Lazy<Regex> = Lazy::new(|| compile(r"(?i)\bJAPANESE\b|\.JPN\."));

static JAPANESE_GROUPS_RE: Lazy<Regex> = Lazy::new(|| {
    compile(
        r"(?i)-(?:Erai-raws|HorribleSubs|SubsPlease|Tsundere-Raws|Anime-Land|Anime-Raws|Ohys-Raws|LowPower-Raws|NC-Raws|Tsundere|Judas|BakedFish|DDY|SallySubs)(?:\.mkv)?$",
    )
});
static GERMAN_ANIME_GROUPS_RE: Lazy<Regex> = Lazy::new(|| {
    compile(
        r"(?i)-(?:ABJ|GERTv|German-Anime|GerAnime|ANiME-RG|TVS|FilmPalast|PL3X|TELEPOOL)(?:\.mkv)?$",
    )
});

static ANIME_PATH_RE: Lazy<Regex> = Lazy::new(|| compile(r"(?i)/animes?/|\banime\b"));
static ANIME_NAME_RE: Lazy<Regex> = Lazy::new(|| {
    compile(
        r"(?i)\[[^\]]*(?:fansub|horriblesubs|erai-raws|subsplease|abj|gertv)[^\]]*\]|-(?:Erai-raws|HorribleSubs|SubsPlease|ABJ|GERTv)",
    )
});

static SUB_DEU_RE: Lazy<Regex> = Lazy::new(|| compile(r"(?i)(?:german|ger|deu)[._-]?subs?"));
static SUB_ENG_RE: Lazy<Regex> = Lazy::new(|| compile(r"(?i)(?:english|eng)[._-]?subs?"));
static SUB_JPN_RE: Lazy<Regex> = Lazy::new(|| compile(r"(?i)(?:japanese|jpn|jap)[._-]?subs?"));

static SOURCE_HINTS: Lazy<Vec<(SourceTier, Regex)>> = Lazy::new(|| {
    vec![
        (
            SourceTier::BluRay,
            compile(r"(?i)\bblu[- ]?ray\b|\bbdrip\b|\bremux\b"),
        ),
        (SourceTier::WebDl, compile(r"(?i)\bweb[- ]?dl\b")),
        (SourceTier::WebRip, compile(r"(?i)\bweb[- ]?rip\b")),
        (SourceTier::Hdtv, compile(r"(?i)\bhdtv\b")),
    ]
});

static CODEC_HINTS: Lazy<Vec<(VideoCodec, Regex)>> = Lazy::new(|| {
    vec![
        (VideoCodec::Hevc, compile(r"(?i)\bhevc\b|\bx265\b|\bh\.?265\b")),
        (VideoCodec::Avc, compile(r"(?i)\bh\.?264\b|\bx264\b|\bavc\b")),
    ]
});

static AUDIO_HINTS: Lazy<Vec<(AudioFormat, Regex)>> = Lazy::new(|| {
    vec![
        (AudioFormat::TrueHd, compile(r"(?i)\btruehd\b")),
        (AudioFormat::Atmos, compile(r"(?i)\batmos\b")),
        (AudioFormat::DtsHd, compile(r"(?i)\bdts[- ]?hd\b|\bdtshd\b")),
        (AudioFormat::Dts, compile(r"(?i)\bdts\b")),
        (
            AudioFormat::Eac3,
            compile(r"(?i)\be-?ac3\b|\bddp(?:\d(?:[. ]\d)?)?\b|\bdd\+"),
        ),
        (AudioFormat::Ac3, compile(r"(?i)\bac3\b")),
        (AudioFormat::Aac, compile(r"(?i)\baac\b")),
        (AudioFormat::Flac, compile(r"(?i)\bflac\b")),
    ]
});

/// Source tier from the release name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceTier {
    BluRay,
    WebDl,
    WebRip,
    Hdtv,
}

impl fmt::Display for SourceTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceTier::BluRay => write!(f, "bluray"),
            SourceTier::WebDl => write!(f, "webdl"),
            SourceTier::WebRip => write!(f, "webrip"),
            SourceTier::Hdtv => write!(f, "hdtv"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VideoCodec {
    Hevc,
    Avc,
}

impl VideoCodec {
    /// Map an ffprobe `codec_name` or a release token
    pub fn from_codec_name(name: &str) -> Option<Self> {
        match name.trim().to_lowercase().as_str() {
            "hevc" | "h265" | "h.265" | "x265" => Some(VideoCodec::Hevc),
            "h264" | "h.264" | "x264" | "avc" => Some(VideoCodec::Avc),
            _ => None,
        }
    }
}

impl fmt::Display for VideoCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VideoCodec::Hevc => write!(f, "hevc"),
            VideoCodec::Avc => write!(f, "avc"),
        }
    }
}

/// Audio codec or format token. Several may apply to one file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AudioFormat {
    TrueHd,
    Atmos,
    DtsHd,
    Dts,
    Eac3,
    Ac3,
    Aac,
    Flac,
}

impl AudioFormat {
    /// Map an ffprobe `codec_name` or a bracket token
    pub fn from_codec_name(name: &str) -> Option<Self> {
        match name.trim().to_lowercase().as_str() {
            "truehd" => Some(AudioFormat::TrueHd),
            "atmos" => Some(AudioFormat::Atmos),
            "dtshd" | "dts-hd" | "dts_hd" => Some(AudioFormat::DtsHd),
            "dts" => Some(AudioFormat::Dts),
            "eac3" | "e-ac3" | "ddp" | "dd+" => Some(AudioFormat::Eac3),
            "ac3" | "dd" => Some(AudioFormat::Ac3),
            "aac" => Some(AudioFormat::Aac),
            "flac" => Some(AudioFormat::Flac),
            _ => None,
        }
    }
}

impl fmt::Display for AudioFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AudioFormat::TrueHd => "truehd",
            AudioFormat::Atmos => "atmos",
            AudioFormat::DtsHd => "dtshd",
            AudioFormat::Dts => "dts",
            AudioFormat::Eac3 => "eac3",
            AudioFormat::Ac3 => "ac3",
            AudioFormat::Aac => "aac",
            AudioFormat::Flac => "flac",
        };
        f.write_str(name)
    }
}

/// Hints parsed from a media path
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParsedMedia {
    pub show_name: Option<String>,
    pub episode: Option<EpisodeNumber>,
    /// Absolute number, even when a season/episode marker won
    pub absolute_episode: Option<u32>,
    /// Season number from a "Season N" directory
    pub season_dir: Option<u32>,
    pub movie_title: Option<String>,
    pub content_type: ContentType,
    pub resolution: Option<u32>,
    pub source: Option<SourceTier>,
    pub video_codec: Option<VideoCodec>,
    pub audio: BTreeSet<AudioFormat>,
    /// Channel count from an "AAC 2.0" style bracket token
    pub audio_channels: Option<u32>,
    pub languages: BTreeSet<String>,
    pub subtitle_languages: BTreeSet<String>,
    pub release_group: Option<String>,
}

/// Check the extension against [`VIDEO_EXTENSIONS`]
pub fn is_video_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| VIDEO_EXTENSIONS.contains(&e.to_lowercase().as_str()))
        .unwrap_or(false)
}

/// Samples and trailers never count as library copies
pub fn is_sample_or_trailer(path: &Path) -> bool {
    let full = path.to_string_lossy().to_lowercase();
    if ["/sample/", "/samples/", "/trailers/"]
        .iter()
        .any(|dir| full.contains(dir))
    {
        return true;
    }
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    name.starts_with("sample")
        || name.starts_with("trailer")
        || ["-sample.", ".sample.", "-trailer.", ".trailer."]
            .iter()
            .any(|marker| name.contains(marker))
}

/// Parse everything we can learn from a path.
///
/// `content_override` replaces per-file content type detection.
pub fn parse_media_path(path: &Path, content_override: Option<ContentType>) -> ParsedMedia {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let stem = path
        .file_stem()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    let seasonal = parse_season_episode(&name).or_else(|| parse_season_episode(&path.to_string_lossy()));
    let absolute_episode = parse_absolute_episode(&name);
    let episode = seasonal
        .map(|(season, episode)| EpisodeNumber::Seasonal { season, episode })
        .or(absolute_episode.map(|number| EpisodeNumber::Absolute { number }));

    let content_type =
        content_override.unwrap_or_else(|| detect_content_type(path, absolute_episode.is_some()));
    let is_anime = content_type == ContentType::Anime;

    let brackets = parse_bracket_tokens(&name);
    let mut audio = brackets.audio.clone();
    audio.extend(collect_audio_hints(&name));

    let parsed = ParsedMedia {
        show_name: guess_show_name(path),
        episode,
        absolute_episode,
        season_dir: path
            .parent()
            .and_then(|p| p.file_name())
            .and_then(|n| parse_season_dir(&n.to_string_lossy())),
        movie_title: guess_movie_title(path),
        content_type,
        resolution: brackets.resolution.or_else(|| parse_resolution(&name)),
        source: brackets.source.or_else(|| match_source(&name)),
        video_codec: brackets.video_codec.or_else(|| match_codec(&name)),
        audio,
        audio_channels: brackets.audio_channels,
        languages: extract_languages(&name, is_anime),
        subtitle_languages: extract_subtitle_languages(&name),
        release_group: RELEASE_GROUP_RE
            .captures(&stem)
            .map(|c| c[1].to_string()),
    };

    debug!(
        file = %name,
        show = ?parsed.show_name,
        episode = ?parsed.episode,
        content_type = %parsed.content_type,
        "Parsed media path"
    );

    parsed
}

/// `SxxEyy` marker as (season, episode)
pub fn parse_season_episode(text: &str) -> Option<(u32, u32)> {
    let caps = EPISODE_RE.captures(text)?;
    Some((caps[1].parse().ok()?, caps[2].parse().ok()?))
}

/// Season number from a `Season 1` / `Staffel 01` folder name
pub fn parse_season_dir(name: &str) -> Option<u32> {
    SEASON_DIR_RE.captures(name).and_then(|c| c[1].parse().ok())
}

/// Spaced absolute number, e.g. `Show - 1071 - Title`
pub fn parse_absolute_episode(text: &str) -> Option<u32> {
    ABSOLUTE_RE.captures(text).and_then(|c| c[1].parse().ok())
}

pub fn parse_resolution(text: &str) -> Option<u32> {
    let caps = RESOLUTION_RE.captures(text)?;
    match caps.get(1) {
        Some(m) => m.as_str().parse().ok(),
        None => Some(2160),
    }
}

fn match_source(text: &str) -> Option<SourceTier> {
    SOURCE_HINTS
        .iter()
        .find(|(_, re)| re.is_match(text))
        .map(|(tier, _)| *tier)
}

fn match_codec(text: &str) -> Option<VideoCodec> {
    CODEC_HINTS
        .iter()
        .find(|(_, re)| re.is_match(text))
        .map(|(codec, _)| *codec)
}

fn collect_audio_hints(text: &str) -> BTreeSet<AudioFormat> {
    AUDIO_HINTS
        .iter()
        .filter(|(_, re)| re.is_match(text))
        .map(|(format, _)| *format)
        .collect()
}

/// Detection order: anime path, anime release markers, absolute
/// numbering, movie directories, then series.
pub fn detect_content_type(path: &Path, has_absolute: bool) -> ContentType {
    let full = path.to_string_lossy().to_lowercase();
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    if ANIME_PATH_RE.is_match(&full) || ANIME_NAME_RE.is_match(&name) || has_absolute {
        ContentType::Anime
    } else if full.contains("/filme/") || full.contains("/movies/") {
        ContentType::Movie
    } else {
        ContentType::Series
    }
}

/// Directory names that hold one folder per show or movie
const LIBRARY_DIRS: &[&str] = &[
    "serien", "anime", "filme", "4k", "tv", "series", "shows", "movies", "sonarr", "radarr",
];

/// Show name from a `Show - S01E01` file name, then the folder after a
/// known library directory, then the immediate parent directory.
pub fn guess_show_name(path: &Path) -> Option<String> {
    let name = path.file_name()?.to_string_lossy();
    if let Some(caps) = SONARR_SHOW_RE.captures(&name) {
        let show = caps[1].trim();
        if !show.is_empty() {
            return Some(show.to_string());
        }
    }
    folder_after_library_dir(path).or_else(|| parent_name(path))
}

fn guess_movie_title(path: &Path) -> Option<String> {
    folder_after_library_dir(path).or_else(|| parent_name(path))
}

fn folder_after_library_dir(path: &Path) -> Option<String> {
    let dirs: Vec<String> = path
        .parent()?
        .components()
        .filter_map(|c| match c {
            Component::Normal(s) => Some(s.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect();
    let idx = dirs
        .iter()
        .position(|d| LIBRARY_DIRS.contains(&d.to_lowercase().as_str()))?;
    dirs.get(idx + 1).cloned()
}

fn parent_name(path: &Path) -> Option<String> {
    path.parent()
        .and_then(|p| p.file_name())
        .map(|n| n.to_string_lossy().into_owned())
        .filter(|n| !n.is_empty())
}

#[derive(Debug, Default)]
struct BracketTokens {
    source: Option<SourceTier>,
    resolution: Option<u32>,
    video_codec: Option<VideoCodec>,
    audio: BTreeSet<AudioFormat>,
    audio_channels: Option<u32>,
}

/// `[WEBDL-1080p][AAC 2.0][x264]` style tokens; first match per field wins
fn parse_bracket_tokens(name: &str) -> BracketTokens {
    let mut out = BracketTokens::default();
    for caps in BRACKET_RE.captures_iter(name) {
        let token = caps[1].trim();
        out.source = out.source.or_else(|| match_source(token));
        out.resolution = out.resolution.or_else(|| parse_resolution(token));
        out.video_codec = out.video_codec.or_else(|| match_codec(token));
        if let Some(audio) = BRACKET_AUDIO_RE.captures(token) {
            if let Some(format) = AudioFormat::from_codec_name(&audio[1]) {
                out.audio.insert(format);
            }
            if out.audio_channels.is_none() {
                let main: u32 = audio[2].parse().unwrap_or(0);
                let lfe: u32 = audio.get(3).and_then(|m| m.as_str().parse().ok()).unwrap_or(0);
                out.audio_channels = Some(main + lfe);
            }
        }
        out.audio.extend(collect_audio_hints(token));
    }
    out
}

/// Audio languages implied by the file name.
pub fn extract_languages(name: &str, is_anime: bool) -> BTreeSet<String> {
    let mut langs = BTreeSet::new();

    for caps in BRACKET_LANG_COMBO_RE.captures_iter(name) {
        for code in caps[1].split('+') {
            langs.insert(normalize_language(code));
        }
    }
    for caps in BRACKET_SINGLE_LANG_RE.captures_iter(name) {
        langs.insert(normalize_language(&caps[1]));
    }

    if MULTI_GERMAN_RE.is_match(name) {
        langs.insert("deu".to_string());
        if is_anime || name.to_lowercase().contains("anime") {
            if JA_MARKER_RE.is_match(name) {
                langs.insert("jpn".to_string());
            }
        } else if EN_MARKER_RE.is_match(name) {
            langs.insert("eng".to_string());
        }
    }

    if GERMAN_JAP_RE.is_match(name) {
        langs.insert("deu".to_string());
        langs.insert("jpn".to_string());
    }

    if GERMAN_DL_RE.is_match(name) {
        langs.insert("deu".to_string());
        if is_anime || JA_MARKER_RE.is_match(name) {
            langs.insert("jpn".to_string());
        } else {
            langs.insert("eng".to_string());
        }
    }

    if langs.is_empty() && JAPANESE_GROUPS_RE.is_match(name) {
        langs.insert("jpn".to_string());
    }

    if GERMAN_ANIME_GROUPS_RE.is_match(name) {
        langs.insert("deu".to_string());
        if is_anime && !langs.contains("jpn") && JA_MARKER_RE.is_match(name) {
            langs.insert("jpn".to_string());
        }
    }

    if langs.is_empty() {
        if GERMAN_WORD_RE.is_match(name) {
            langs.insert("deu".to_string());
        }
        if ENGLISH_WORD_RE.is_match(name) {
            langs.insert("eng".to_string());
        }
        if JAPANESE_WORD_RE.is_match(name) {
            langs.insert("jpn".to_string());
        }
    }

    if DUAL_RE.is_match(name) && langs.len() == 1 && langs.contains("deu") {
        langs.insert(if is_anime { "jpn" } else { "eng" }.to_string());
    }

    langs
}

pub fn extract_subtitle_languages(name: &str) -> BTreeSet<String> {
    [(&*SUB_DEU_RE, "deu"), (&*SUB_ENG_RE, "eng"), (&*SUB_JPN_RE, "jpn")]
        .into_iter()
        .filter(|(re, _)| re.is_match(name))
        .map(|(_, code)| code.to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn langs(values: &[&str]) -> BTreeSet<String> {
        values.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_parse_sonarr_style_name() {
        let path = PathBuf::from(
            "/media/tv/Chicago Fire/Season 14/Chicago Fire - S14E08 - Title [WEBDL-1080p][AAC 2.0][x264]-ETHEL.mkv",
        );
        let parsed = parse_media_path(&path, None);
        assert_eq!(parsed.show_name.as_deref(), Some("Chicago Fire"));
        assert_eq!(
            parsed.episode,
            Some(EpisodeNumber::Seasonal {
                season: 14,
                episode: 8
            })
        );
        assert_eq!(parsed.season_dir, Some(14));
        assert_eq!(parsed.resolution, Some(1080));
        assert_eq!(parsed.source, Some(SourceTier::WebDl));
        assert_eq!(parsed.video_codec, Some(VideoCodec::Avc));
        assert!(parsed.audio.contains(&AudioFormat::Aac));
        assert_eq!(parsed.audio_channels, Some(2));
        assert_eq!(parsed.release_group.as_deref(), Some("ETHEL"));
        assert_eq!(parsed.content_type, ContentType::Series);
    }

    #[test]
    fn test_parse_scene_name() {
        let path = PathBuf::from("/data/Serien/Dark/Dark.S02E03.German.DL.1080p.BluRay.x265-GRP.mkv");
        let parsed = parse_media_path(&path, None);
        assert_eq!(parsed.show_name.as_deref(), Some("Dark"));
        assert_eq!(parsed.source, Some(SourceTier::BluRay));
        assert_eq!(parsed.video_codec, Some(VideoCodec::Hevc));
        assert_eq!(parsed.languages, langs(&["deu", "eng"]));
    }

    #[test]
    fn test_season_episode_preferred_over_absolute() {
        let path = PathBuf::from("/media/anime/One Piece/One Piece - S21E01 - 1071 - Title.mkv");
        let parsed = parse_media_path(&path, None);
        assert_eq!(
            parsed.episode,
            Some(EpisodeNumber::Seasonal {
                season: 21,
                episode: 1
            })
        );
        assert_eq!(parsed.absolute_episode, Some(1071));
        assert_eq!(parsed.content_type, ContentType::Anime);
    }

    #[test]
    fn test_absolute_only_is_anime() {
        let path = PathBuf::from("/media/shows/Show/Show - 105 - Title.mkv");
        let parsed = parse_media_path(&path, None);
        assert_eq!(parsed.episode, Some(EpisodeNumber::Absolute { number: 105 }));
        assert_eq!(parsed.content_type, ContentType::Anime);
    }

    #[test]
    fn test_detect_content_type() {
        assert_eq!(
            detect_content_type(Path::new("/data/movies/Heat (1995)/Heat.mkv"), false),
            ContentType::Movie
        );
        assert_eq!(
            detect_content_type(Path::new("/data/tv/Show/[SubsPlease] Show - 01.mkv"), false),
            ContentType::Anime
        );
        assert_eq!(
            detect_content_type(Path::new("/data/tv/Show/Show.S01E01.mkv"), false),
            ContentType::Series
        );
    }

    #[test]
    fn test_content_override_wins() {
        let path = PathBuf::from("/data/anime/Show/Show - S01E01.mkv");
        let parsed = parse_media_path(&path, Some(ContentType::Series));
        assert_eq!(parsed.content_type, ContentType::Series);
    }

    #[test]
    fn test_bracket_language_combo() {
        assert_eq!(
            extract_languages("Show - S01E01 [DE+JA] [1080p].mkv", true),
            langs(&["deu", "jpn"])
        );
        assert_eq!(extract_languages("Show - S01E01 [GER].mkv", false), langs(&["deu"]));
    }

    #[test]
    fn test_dual_marker_infers_complement() {
        assert_eq!(
            extract_languages("Show.S01E01.German.Dual.Audio.mkv", false),
            langs(&["deu", "eng"])
        );
        assert_eq!(
            extract_languages("Show.S01E01.German.Dual.Audio.mkv", true),
            langs(&["deu", "jpn"])
        );
    }

    #[test]
    fn test_release_group_languages() {
        assert_eq!(
            extract_languages("Show - 01 (1080p)-SubsPlease.mkv", true),
            langs(&["jpn"])
        );
        assert_eq!(extract_languages("Show.S01E01.1080p-GERTv.mkv", true), langs(&["deu"]));
        assert!(extract_languages("Show.S01E01.1080p-GRP.mkv", false).is_empty());
    }

    #[test]
    fn test_subtitle_languages() {
        assert_eq!(
            extract_subtitle_languages("Show.S01E01.JAP.German.Subs.mkv"),
            langs(&["deu"])
        );
    }

    #[test]
    fn test_show_name_fallbacks() {
        assert_eq!(
            guess_show_name(Path::new("/data/Serien/Tatort/Season 1/tatort.s01e01.mkv")).as_deref(),
            Some("Tatort")
        );
        assert_eq!(
            guess_show_name(Path::new("/srv/stuff/Some Show/s01e01.mkv")).as_deref(),
            Some("Some Show")
        );
    }

    #[test]
    fn test_sample_and_trailer_detection() {
        assert!(is_sample_or_trailer(Path::new("/m/Show/Sample/show.mkv")));
        assert!(is_sample_or_trailer(Path::new("/m/Movie/movie-sample.mkv")));
        assert!(is_sample_or_trailer(Path::new("/m/Movie/movie.trailer.mp4")));
        assert!(!is_sample_or_trailer(Path::new("/m/Samples Of Life/episode.mkv")));
    }

    #[test]
    fn test_season_dir_and_absolute_helpers() {
        assert_eq!(parse_season_dir("Season 1"), Some(1));
        assert_eq!(parse_season_dir("Staffel 02"), Some(2));
        assert_eq!(parse_season_dir("Specials"), None);
        assert_eq!(parse_absolute_episode("One Piece - 1071 - Title"), Some(1071));
        assert_eq!(parse_absolute_episode("Season 1"), None);
    }

    #[test]
    fn test_is_video_file() {
        assert!(is_video_file(Path::new("/a/b.MKV")));
        assert!(!is_video_file(Path::new("/a/b.srt")));
    }

    #[test]
    fn test_audio_hints_are_additive() {
        let parsed = parse_media_path(
            Path::new("/m/Movie.2019.2160p.BluRay.TrueHD.Atmos.7.1.HEVC-GRP.mkv"),
            None,
        );
        assert!(parsed.audio.contains(&AudioFormat::TrueHd));
        assert!(parsed.audio.contains(&AudioFormat::Atmos));
        assert_eq!(parsed.resolution, Some(2160));
    }
}
