//! Quality evaluation service
//!
//! Maps filename hints and optional probed stream metadata to an additive
//! integer score plus a human-readable rationale. Used by:
//! - the scanner for the initial filename-only score
//! - the prober to rescore files after stream inspection
//! - the planner, which only ever compares scores
//!
//! The rationale string is for people; nothing parses it.

use std::collections::BTreeSet;
use std::fmt;

use super::ffmpeg::ProbedStreams;
use super::filename_parser::{AudioFormat, ParsedMedia, SourceTier, VideoCodec};
use crate::media::{ContentType, MediaFile};

pub const SCORE_RES_2160: i32 = 400;
pub const SCORE_RES_1080: i32 = 300;
pub const SCORE_RES_720: i32 = 200;
pub const SCORE_RES_480: i32 = 120;
pub const SCORE_RES_OTHER: i32 = 60;

pub const SCORE_LANG_DUAL_DEU_ENG: i32 = 200;
pub const SCORE_LANG_DEU_ONLY: i32 = 150;
pub const SCORE_LANG_ENG_ONLY: i32 = 100;
pub const SCORE_LANG_DUAL_DEU_JPN: i32 = 200;
pub const SCORE_LANG_ANIME_DEU_ENG: i32 = 180;
pub const SCORE_LANG_ANIME_DEU: i32 = 150;
pub const SCORE_LANG_JPN_DEU_SUBS: i32 = 120;
pub const SCORE_LANG_JPN_ONLY: i32 = 100;
pub const SCORE_LANG_ANIME_ENG: i32 = 50;

pub const SCORE_AVOID_PENALTY: i32 = -40;

fn source_points(source: SourceTier) -> i32 {
    match source {
        SourceTier::BluRay => 80,
        SourceTier::WebDl => 60,
        SourceTier::WebRip => 50,
        SourceTier::Hdtv => 40,
    }
}

fn codec_points(codec: VideoCodec) -> i32 {
    match codec {
        VideoCodec::Hevc => 20,
        VideoCodec::Avc => 10,
    }
}

fn audio_points(format: AudioFormat) -> i32 {
    match format {
        AudioFormat::TrueHd => 20,
        AudioFormat::Atmos => 20,
        AudioFormat::DtsHd => 15,
        AudioFormat::Dts => 10,
        AudioFormat::Eac3 => 10,
        AudioFormat::Ac3 => 8,
        AudioFormat::Aac => 5,
        AudioFormat::Flac => 0,
    }
}

fn resolution_points(height: u32) -> i32 {
    match height {
        h if h >= 2160 => SCORE_RES_2160,
        h if h >= 1080 => SCORE_RES_1080,
        h if h >= 720 => SCORE_RES_720,
        h if h >= 480 => SCORE_RES_480,
        _ => SCORE_RES_OTHER,
    }
}

fn channel_points(channels: u32) -> i32 {
    match channels {
        c if c >= 8 => 10,
        c if c >= 6 => 8,
        c if c >= 2 => 2,
        _ => 0,
    }
}

/// What to do when a file carries an avoided audio language
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AvoidMode {
    /// Always penalize
    Strict,
    /// Penalize only when no preferred language was detected
    #[default]
    IfNoPrefer,
    /// Never penalize, only mention it in the rationale
    ReportOnly,
}

impl AvoidMode {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().replace('_', "-").as_str() {
            "strict" => Some(AvoidMode::Strict),
            "if-no-prefer" => Some(AvoidMode::IfNoPrefer),
            "report-only" => Some(AvoidMode::ReportOnly),
            _ => None,
        }
    }
}

impl fmt::Display for AvoidMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AvoidMode::Strict => write!(f, "strict"),
            AvoidMode::IfNoPrefer => write!(f, "if-no-prefer"),
            AvoidMode::ReportOnly => write!(f, "report-only"),
        }
    }
}

/// Content-type-aware language tier, before any avoid penalty
pub fn language_tier(
    audio: &BTreeSet<String>,
    subtitles: &BTreeSet<String>,
    content_type: ContentType,
) -> (i32, &'static str) {
    let has_deu = audio.contains("deu");
    let has_eng = audio.contains("eng");
    let has_jpn = audio.contains("jpn");
    let has_deu_subs = subtitles.contains("deu");

    if content_type == ContentType::Anime {
        if has_deu && has_jpn {
            (SCORE_LANG_DUAL_DEU_JPN, "DEU+JPN dual-audio (best)")
        } else if has_deu && has_eng {
            (SCORE_LANG_ANIME_DEU_ENG, "DEU+ENG dual-audio")
        } else if has_deu {
            (SCORE_LANG_ANIME_DEU, "DEU audio")
        } else if has_jpn && has_deu_subs {
            (SCORE_LANG_JPN_DEU_SUBS, "JPN + DEU subs")
        } else if has_jpn {
            (SCORE_LANG_JPN_ONLY, "JPN audio")
        } else if has_eng {
            (SCORE_LANG_ANIME_ENG, "ENG audio (fallback)")
        } else {
            (0, "no preferred language")
        }
    } else if has_deu && has_eng {
        (SCORE_LANG_DUAL_DEU_ENG, "DEU+ENG dual-audio (best)")
    } else if has_deu {
        (SCORE_LANG_DEU_ONLY, "DEU audio")
    } else if has_eng {
        (SCORE_LANG_ENG_ONLY, "ENG audio")
    } else {
        (0, "no preferred language")
    }
}

/// Score a file from its hints and optional probe result.
///
/// Probed height and codec override the filename; audio formats and
/// languages from both sources are merged.
pub fn score(
    hints: &ParsedMedia,
    probed: Option<&ProbedStreams>,
    content_type: ContentType,
    avoid_mode: AvoidMode,
    avoid_languages: &BTreeSet<String>,
) -> (i32, String) {
    let mut total = 0;
    let mut parts: Vec<String> = Vec::new();

    let height = probed.and_then(|p| p.video_height).or(hints.resolution);
    if let Some(h) = height {
        let pts = resolution_points(h);
        total += pts;
        parts.push(format!("{}p +{}", h, pts));
    }

    if let Some(source) = hints.source {
        let pts = source_points(source);
        total += pts;
        parts.push(format!("{} +{}", source, pts));
    }

    let codec = match probed.and_then(|p| p.video_codec.as_deref()) {
        Some(name) => VideoCodec::from_codec_name(name),
        None => hints.video_codec,
    };
    if let Some(codec) = codec {
        let pts = codec_points(codec);
        total += pts;
        parts.push(format!("{} +{}", codec, pts));
    }

    let mut audio = hints.audio.clone();
    if let Some(p) = probed {
        audio.extend(
            p.audio_codecs
                .iter()
                .filter_map(|c| AudioFormat::from_codec_name(c)),
        );
    }
    for format in &audio {
        let pts = audio_points(*format);
        if pts > 0 {
            total += pts;
            parts.push(format!("{} +{}", format, pts));
        }
    }

    if let Some(ch) = probed.and_then(|p| p.max_channels) {
        let pts = channel_points(ch);
        if pts > 0 {
            total += pts;
            parts.push(format!("{}ch +{}", ch, pts));
        }
    }

    let mut languages = hints.languages.clone();
    let mut subtitles = hints.subtitle_languages.clone();
    if let Some(p) = probed {
        languages.extend(p.audio_languages.iter().cloned());
        subtitles.extend(p.subtitle_languages.iter().cloned());
    }

    let (mut lang_score, lang_reason) = language_tier(&languages, &subtitles, content_type);
    let mut lang_reason = lang_reason.to_string();

    let avoided: Vec<&str> = languages
        .intersection(avoid_languages)
        .map(String::as_str)
        .collect();
    if !avoided.is_empty() {
        let penalize = match avoid_mode {
            AvoidMode::Strict => true,
            AvoidMode::IfNoPrefer => lang_score <= 0,
            AvoidMode::ReportOnly => false,
        };
        if penalize {
            lang_score += SCORE_AVOID_PENALTY;
            lang_reason.push_str(" [PENALTY]");
        } else {
            lang_reason.push_str(&format!(" [AVOID {}]", avoided.join("+")));
        }
    }

    total += lang_score;
    parts.push(format!("{} {:+}", lang_reason, lang_score));

    (total, parts.join(", "))
}

/// Holds the avoid-language policy for a run
#[derive(Debug, Clone, Default)]
pub struct QualityEvaluator {
    pub avoid_mode: AvoidMode,
    pub avoid_languages: BTreeSet<String>,
}

impl QualityEvaluator {
    pub fn new(avoid_mode: AvoidMode, avoid_languages: BTreeSet<String>) -> Self {
        Self {
            avoid_mode,
            avoid_languages,
        }
    }

    pub fn evaluate(&self, file: &MediaFile) -> (i32, String) {
        score(
            &file.hints,
            file.probed.as_ref(),
            file.content_type,
            self.avoid_mode,
            &self.avoid_languages,
        )
    }

    /// Recompute and store the score on the record
    pub fn apply(&self, file: &mut MediaFile) {
        let (score, reason) = self.evaluate(file);
        file.score = score;
        file.score_reason = reason;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(values: &[&str]) -> BTreeSet<String> {
        values.iter().map(|s| s.to_string()).collect()
    }

    fn hints(resolution: u32, source: SourceTier, codec: Option<VideoCodec>) -> ParsedMedia {
        ParsedMedia {
            resolution: Some(resolution),
            source: Some(source),
            video_codec: codec,
            ..Default::default()
        }
    }

    // ========================================================================
    // Tier tests
    // ========================================================================

    #[test]
    fn test_resolution_buckets() {
        assert_eq!(resolution_points(2160), 400);
        assert_eq!(resolution_points(1080), 300);
        assert_eq!(resolution_points(800), 200);
        assert_eq!(resolution_points(576), 120);
        assert_eq!(resolution_points(360), 60);
    }

    #[test]
    fn test_channel_buckets() {
        assert_eq!(channel_points(8), 10);
        assert_eq!(channel_points(6), 8);
        assert_eq!(channel_points(2), 2);
        assert_eq!(channel_points(1), 0);
    }

    #[test]
    fn test_language_tier_series() {
        let none = BTreeSet::new();
        assert_eq!(
            language_tier(&set(&["deu", "eng"]), &none, ContentType::Series).0,
            200
        );
        assert_eq!(language_tier(&set(&["deu"]), &none, ContentType::Series).0, 150);
        assert_eq!(language_tier(&set(&["eng"]), &none, ContentType::Movie).0, 100);
        assert_eq!(language_tier(&set(&["jpn"]), &none, ContentType::Series).0, 0);
    }

    #[test]
    fn test_language_tier_anime() {
        let none = BTreeSet::new();
        assert_eq!(
            language_tier(&set(&["deu", "jpn"]), &none, ContentType::Anime).0,
            200
        );
        assert_eq!(
            language_tier(&set(&["deu", "eng"]), &none, ContentType::Anime).0,
            180
        );
        assert_eq!(
            language_tier(&set(&["jpn"]), &set(&["deu"]), ContentType::Anime).0,
            120
        );
        assert_eq!(language_tier(&set(&["jpn"]), &none, ContentType::Anime).0, 100);
        assert_eq!(language_tier(&set(&["eng"]), &none, ContentType::Anime).0, 50);
    }

    // ========================================================================
    // Full score tests
    // ========================================================================

    #[test]
    fn test_score_720p_webrip_aac() {
        let mut h = hints(720, SourceTier::WebRip, None);
        h.audio.insert(AudioFormat::Aac);
        h.languages = set(&["deu", "eng"]);
        let (total, reason) = score(&h, None, ContentType::Series, AvoidMode::default(), &BTreeSet::new());
        assert_eq!(total, 255 + 200);
        assert!(reason.contains("DEU+ENG dual-audio (best)"));
    }

    #[test]
    fn test_score_1080p_bluray_hevc_truehd() {
        let mut h = hints(1080, SourceTier::BluRay, Some(VideoCodec::Hevc));
        h.audio.insert(AudioFormat::TrueHd);
        h.languages = set(&["deu", "eng"]);
        let (total, _) = score(&h, None, ContentType::Series, AvoidMode::default(), &BTreeSet::new());
        assert_eq!(total, 420 + 200);
    }

    #[test]
    fn test_probed_height_overrides_filename() {
        let h = hints(720, SourceTier::WebDl, Some(VideoCodec::Avc));
        let probed = ProbedStreams {
            video_height: Some(1080),
            video_codec: Some("hevc".to_string()),
            max_channels: Some(6),
            audio_codecs: set(&["eac3"]),
            ..Default::default()
        };
        let (total, _) = score(
            &h,
            Some(&probed),
            ContentType::Series,
            AvoidMode::default(),
            &BTreeSet::new(),
        );
        assert_eq!(total, 300 + 60 + 20 + 10 + 8);
    }

    #[test]
    fn test_unknown_probed_codec_scores_zero() {
        let h = hints(1080, SourceTier::WebDl, Some(VideoCodec::Hevc));
        let probed = ProbedStreams {
            video_codec: Some("av1".to_string()),
            ..Default::default()
        };
        let (total, _) = score(
            &h,
            Some(&probed),
            ContentType::Series,
            AvoidMode::default(),
            &BTreeSet::new(),
        );
        assert_eq!(total, 300 + 60);
    }

    // ========================================================================
    // Avoid policy tests
    // ========================================================================

    #[test]
    fn test_avoid_strict_always_penalizes() {
        let mut h = ParsedMedia::default();
        h.languages = set(&["deu", "rus"]);
        let (total, reason) = score(&h, None, ContentType::Series, AvoidMode::Strict, &set(&["rus"]));
        assert_eq!(total, 150 - 40);
        assert!(reason.contains("[PENALTY]"));
    }

    #[test]
    fn test_avoid_if_no_prefer() {
        let mut h = ParsedMedia::default();
        h.languages = set(&["deu", "rus"]);
        let (total, _) = score(&h, None, ContentType::Series, AvoidMode::IfNoPrefer, &set(&["rus"]));
        assert_eq!(total, 150);

        h.languages = set(&["rus"]);
        let (total, reason) = score(&h, None, ContentType::Series, AvoidMode::IfNoPrefer, &set(&["rus"]));
        assert_eq!(total, -40);
        assert!(reason.contains("[PENALTY]"));
    }

    #[test]
    fn test_avoid_report_only() {
        let mut h = ParsedMedia::default();
        h.languages = set(&["rus"]);
        let (total, reason) = score(&h, None, ContentType::Series, AvoidMode::ReportOnly, &set(&["rus"]));
        assert_eq!(total, 0);
        assert!(reason.contains("[AVOID rus]"));
    }

    #[test]
    fn test_avoid_mode_parse_and_display() {
        assert_eq!(AvoidMode::parse("report_only"), Some(AvoidMode::ReportOnly));
        assert_eq!(AvoidMode::parse("STRICT"), Some(AvoidMode::Strict));
        assert_eq!(AvoidMode::parse("never"), None);
        assert_eq!(AvoidMode::IfNoPrefer.to_string(), "if-no-prefer");
    }
}
