//! Bounded-concurrency stream probing
//!
//! Probes a chosen subset of the inventory with at most `workers` ffprobe
//! processes at once. Each task only reads its own path and the shared
//! [`ProbeCache`]; results are applied to the records afterwards by the
//! caller's control flow, which also rescores them.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use super::ffmpeg::{FfprobeService, ProbedStreams};
use super::probe_cache::{ProbeCache, ProbeFingerprint};
use super::quality_evaluator::QualityEvaluator;
use crate::media::MediaFile;

/// Which files get probed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProbeScope {
    None,
    #[default]
    Dupes,
    All,
}

impl ProbeScope {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "none" | "off" => Some(ProbeScope::None),
            "dupes" | "dupes-only" | "duplicates" => Some(ProbeScope::Dupes),
            "all" => Some(ProbeScope::All),
            _ => None,
        }
    }
}

impl fmt::Display for ProbeScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProbeScope::None => write!(f, "none"),
            ProbeScope::Dupes => write!(f, "dupes"),
            ProbeScope::All => write!(f, "all"),
        }
    }
}

/// How the probing phase went, for the run summary
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ProbeStatus {
    Disabled,
    /// The tool could not be run at all, so nothing was probed
    Unavailable { reason: String },
    Completed {
        probed: usize,
        cached: usize,
        errors: usize,
    },
}

impl ProbeStatus {
    pub fn is_degraded(&self) -> bool {
        matches!(self, ProbeStatus::Unavailable { .. })
    }
}

#[derive(Debug)]
enum ProbeOutcome {
    Probed(ProbedStreams),
    Cached(ProbedStreams),
    Failed(String),
}

pub struct StreamProber {
    service: FfprobeService,
    cache: Arc<ProbeCache>,
    workers: usize,
}

impl StreamProber {
    pub fn new(service: FfprobeService, cache: Arc<ProbeCache>, workers: usize) -> Self {
        Self {
            service,
            cache,
            workers: workers.max(1),
        }
    }

    /// Probe `indices` of `files` and rescore every file that got streams.
    ///
    /// Failures are recorded on the record and never abort the run. The
    /// cache is flushed once at the end.
    pub async fn probe_files(
        &self,
        files: &mut [MediaFile],
        indices: &[usize],
        evaluator: &QualityEvaluator,
    ) -> ProbeStatus {
        if indices.is_empty() {
            return ProbeStatus::Completed {
                probed: 0,
                cached: 0,
                errors: 0,
            };
        }

        if let Err(reason) = self.service.check_available().await {
            warn!(reason = %reason, "ffprobe unavailable, skipping stream probing");
            return ProbeStatus::Unavailable { reason };
        }

        info!(
            files = indices.len(),
            workers = self.workers,
            timeout_secs = self.service.timeout().as_secs(),
            "Probing streams"
        );

        let semaphore = Arc::new(Semaphore::new(self.workers));
        let mut tasks = JoinSet::new();

        for &idx in indices {
            let Some(file) = files.get(idx) else {
                continue;
            };
            let path = file.path.clone();
            let service = self.service.clone();
            let cache = Arc::clone(&self.cache);
            let semaphore = Arc::clone(&semaphore);

            tasks.spawn(async move {
                let Ok(_permit) = semaphore.acquire_owned().await else {
                    return (idx, ProbeOutcome::Failed("probe pool closed".to_string()));
                };
                (idx, probe_one(&service, &cache, path).await)
            });
        }

        let (mut probed, mut cached, mut errors) = (0, 0, 0);
        while let Some(joined) = tasks.join_next().await {
            let (idx, outcome) = match joined {
                Ok(result) => result,
                Err(e) => {
                    errors += 1;
                    warn!(error = %e, "Probe task failed");
                    continue;
                }
            };
            let Some(file) = files.get_mut(idx) else {
                continue;
            };
            let streams = match outcome {
                ProbeOutcome::Probed(streams) => {
                    probed += 1;
                    streams
                }
                ProbeOutcome::Cached(streams) => {
                    cached += 1;
                    streams
                }
                ProbeOutcome::Failed(error) => {
                    errors += 1;
                    debug!(path = %file.path.display(), error = %error, "Probe failed, keeping filename score");
                    file.probe_error = Some(error);
                    continue;
                }
            };
            file.probed = Some(streams);
            file.probe_error = None;
            evaluator.apply(file);
        }

        if let Err(e) = self.cache.flush() {
            warn!(error = %e, "Failed to persist probe cache");
        }

        info!(probed, cached, errors, "Stream probing complete");
        ProbeStatus::Completed {
            probed,
            cached,
            errors,
        }
    }
}

async fn probe_one(service: &FfprobeService, cache: &ProbeCache, path: PathBuf) -> ProbeOutcome {
    let metadata = match tokio::fs::metadata(&path).await {
        Ok(m) => m,
        Err(e) => return ProbeOutcome::Failed(format!("stat failed: {}", e)),
    };
    let fingerprint = ProbeFingerprint::from_metadata(&metadata);

    if let Some(streams) = cache.get(&path, &fingerprint) {
        return ProbeOutcome::Cached(streams);
    }

    match service.probe(&path).await {
        Ok(streams) => {
            cache.set(&path, fingerprint, streams.clone());
            ProbeOutcome::Probed(streams)
        }
        Err(e) => ProbeOutcome::Failed(e.to_string()),
    }
}
