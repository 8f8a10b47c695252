//! ffprobe-based stream inspection
//!
//! Runs `ffprobe -print_format json -show_format -show_streams` per file and
//! reduces the output to the handful of fields scoring needs. Every failure
//! mode (spawn error, timeout, non-zero exit, malformed JSON) comes back as
//! a [`ProbeError`] for the caller to record. None of them panic or abort.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::process::Command;
use tracing::debug;

use super::language::normalize_language;

/// Maximum stderr kept on a failed probe
const STDERR_LIMIT: usize = 500;

/// Stream facts extracted from one probe
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProbedStreams {
    /// Height of the first video stream
    pub video_height: Option<u32>,
    /// Codec of the first video stream, as ffprobe names it
    pub video_codec: Option<String>,
    pub audio_codecs: BTreeSet<String>,
    /// Normalised audio languages, `und` when untagged
    pub audio_languages: BTreeSet<String>,
    pub subtitle_languages: BTreeSet<String>,
    pub max_channels: Option<u32>,
}

#[derive(Debug, thiserror::Error)]
pub enum ProbeError {
    #[error("failed to start ffprobe: {0}")]
    Spawn(std::io::Error),
    #[error("timeout>{0}s")]
    Timeout(u64),
    #[error("ffprobe exited with {code:?}: {stderr}")]
    Failed { code: Option<i32>, stderr: String },
    #[error("invalid json")]
    InvalidJson,
    #[error("ffprobe i/o error: {0}")]
    Io(std::io::Error),
}

/// ffprobe JSON output structures
mod ffprobe {
    use std::collections::HashMap;

    use serde::Deserialize;

    #[derive(Debug, Deserialize)]
    pub struct FfprobeOutput {
        #[allow(dead_code)]
        pub format: Option<Format>,
        pub streams: Option<Vec<Stream>>,
    }

    #[derive(Debug, Deserialize)]
    pub struct Format {
        #[allow(dead_code)]
        pub format_name: Option<String>,
    }

    #[derive(Debug, Deserialize)]
    pub struct Stream {
        pub codec_type: Option<String>,
        pub codec_name: Option<String>,
        pub height: Option<u32>,
        pub channels: Option<u32>,
        pub tags: Option<HashMap<String, String>>,
    }

    impl Stream {
        pub fn language(&self) -> Option<&str> {
            let tags = self.tags.as_ref()?;
            tags.get("language")
                .or_else(|| tags.get("LANGUAGE"))
                .map(String::as_str)
        }
    }
}

/// Reduce raw ffprobe JSON to [`ProbedStreams`]
pub fn parse_probe_output(raw: &[u8]) -> Result<ProbedStreams, ProbeError> {
    let output: ffprobe::FfprobeOutput =
        serde_json::from_slice(raw).map_err(|_| ProbeError::InvalidJson)?;
    let streams = output.streams.unwrap_or_default();

    let mut probed = ProbedStreams::default();

    if let Some(video) = streams
        .iter()
        .find(|s| s.codec_type.as_deref() == Some("video"))
    {
        probed.video_height = video.height;
        probed.video_codec = video.codec_name.clone();
    }

    for stream in &streams {
        let language = normalize_language(stream.language().unwrap_or("und"));
        match stream.codec_type.as_deref() {
            Some("audio") => {
                if let Some(codec) = &stream.codec_name {
                    probed.audio_codecs.insert(codec.clone());
                }
                probed.audio_languages.insert(language);
                if let Some(ch) = stream.channels {
                    probed.max_channels = Some(probed.max_channels.map_or(ch, |m| m.max(ch)));
                }
            }
            Some("subtitle") => {
                probed.subtitle_languages.insert(language);
            }
            _ => {}
        }
    }

    Ok(probed)
}

fn truncate_stderr(stderr: &[u8]) -> String {
    String::from_utf8_lossy(stderr)
        .trim()
        .chars()
        .take(STDERR_LIMIT)
        .collect()
}

/// Thin wrapper around the ffprobe binary
#[derive(Debug, Clone)]
pub struct FfprobeService {
    ffprobe_path: PathBuf,
    timeout: Duration,
}

impl FfprobeService {
    pub fn new(ffprobe_path: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            ffprobe_path: ffprobe_path.into(),
            timeout,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Run `ffprobe -version` once. Returns the version line, or why the
    /// binary is unusable.
    pub async fn check_available(&self) -> Result<String, String> {
        let child = Command::new(&self.ffprobe_path)
            .arg("-version")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| format!("{}: {}", self.ffprobe_path.display(), e))?;

        match tokio::time::timeout(Duration::from_secs(10), child.wait_with_output()).await {
            Err(_) => Err("ffprobe -version timed out".to_string()),
            Ok(Err(e)) => Err(e.to_string()),
            Ok(Ok(output)) if output.status.success() => Ok(String::from_utf8_lossy(&output.stdout)
                .lines()
                .next()
                .unwrap_or_default()
                .to_string()),
            Ok(Ok(output)) => Err(format!(
                "ffprobe -version exited with {:?}: {}",
                output.status.code(),
                truncate_stderr(&output.stderr)
            )),
        }
    }

    pub async fn is_available(&self) -> bool {
        self.check_available().await.is_ok()
    }

    /// Probe one file. On timeout the child is dropped, which kills it.
    pub async fn probe(&self, path: &Path) -> Result<ProbedStreams, ProbeError> {
        debug!(path = %path.display(), "Running ffprobe");

        let child = Command::new(&self.ffprobe_path)
            .args([
                "-v",
                "error",
                "-print_format",
                "json",
                "-show_format",
                "-show_streams",
            ])
            .arg(path)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(ProbeError::Spawn)?;

        let output = match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Err(_) => return Err(ProbeError::Timeout(self.timeout.as_secs())),
            Ok(result) => result.map_err(ProbeError::Io)?,
        };

        if !output.status.success() {
            return Err(ProbeError::Failed {
                code: output.status.code(),
                stderr: truncate_stderr(&output.stderr),
            });
        }

        parse_probe_output(&output.stdout)
    }
}
