//! Language tag normalisation to ISO 639-2 codes

use std::collections::BTreeSet;

/// Normalise a language tag from a stream or file name.
///
/// Unknown tags are returned lowercased so they still compare equal
/// across sources.
pub fn normalize_language(tag: &str) -> String {
    let tag = tag.trim().to_lowercase();
    let code = match tag.as_str() {
        "" => "und",
        "en" | "eng" | "english" => "eng",
        "de" | "deu" | "ger" | "german" | "deutsch" => "deu",
        "ja" | "jp" | "jpn" | "jap" | "japanese" => "jpn",
        "french" | "fra" | "fre" => "fra",
        "spanish" | "spa" => "spa",
        "italian" | "ita" => "ita",
        "portuguese" | "por" => "por",
        "russian" | "rus" => "rus",
        "chinese" | "zho" | "chi" => "zho",
        "korean" | "kor" => "kor",
        "ara" => "ara",
        "hin" => "hin",
        "und" => "und",
        "mul" => "mul",
        _ => return tag,
    };
    code.to_string()
}

/// Parse a comma separated list of language tags, dropping empty entries
pub fn parse_language_list(value: &str) -> BTreeSet<String> {
    value
        .split([',', ';', ' '])
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(normalize_language)
        .collect()
}
