//! Audit pipeline: scan, probe, correlate, plan
//!
//! One control flow drives the phases in order. Only probing fans out, and
//! correlation finishes for the whole inventory before planning starts.

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::Config;
use crate::error::{AuditError, AuditResult};
use crate::media::MediaFile;
use crate::services::correlator::{self, CorrelationStats, ExternalStateCorrelator};
use crate::services::external_source::{RegistrySource, SourceStatus, TorrentSource};
use crate::services::ffmpeg::FfprobeService;
use crate::services::path_safety::PathSafety;
use crate::services::planner::{DeletionCandidate, DeletionPlanner, DuplicateGroup, PlannerOptions};
use crate::services::probe_cache::ProbeCache;
use crate::services::prober::{ProbeScope, ProbeStatus, StreamProber};
use crate::services::qbittorrent::QbittorrentClient;
use crate::services::quality_evaluator::{AvoidMode, QualityEvaluator};
use crate::services::reports::{self, HardlinkGroup, MissingHardlink, OrphanSeeding, SeasonConflict};
use crate::services::scanner::{ScanOptions, ScannerService};
use crate::services::servarr::ServarrClient;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtectionSummary {
    /// Non-best members kept out of the plan, by first blocking reason
    pub skipped_seeding: usize,
    pub skipped_registry: usize,
    pub skipped_queue: usize,
    pub skipped_hardlinked: usize,
    pub skipped_unsafe_path: usize,
    /// Inventory records carrying each kind of evidence
    pub seeding_files: usize,
    pub managed_files: usize,
    pub queued_files: usize,
}

/// What happened during the run, including every degraded condition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub roots: Vec<PathBuf>,
    pub delete_root: PathBuf,
    pub probe_scope: ProbeScope,
    pub avoid_mode: AvoidMode,
    pub avoid_languages: BTreeSet<String>,

    pub scanned_files: usize,
    pub skipped_samples: usize,
    pub scan_errors: usize,
    pub scan_truncated: bool,

    pub duplicate_groups: usize,
    pub candidates: usize,
    pub reclaimable_bytes: u64,
    pub protection: ProtectionSummary,

    pub probe: ProbeStatus,
    pub share_client: SourceStatus,
    pub registries: Vec<SourceStatus>,
    pub correlation: CorrelationStats,

    pub missing_hardlinks: usize,
    pub missing_hardlink_bytes: u64,
    pub orphan_seeding: usize,

    pub path_warnings: Vec<String>,
    /// Some source failed or probing was unavailable
    pub degraded: bool,
}

/// Everything the audit produced
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditReport {
    pub files: Vec<MediaFile>,
    pub groups: Vec<DuplicateGroup>,
    pub candidates: Vec<DeletionCandidate>,
    pub missing_hardlinks: Vec<MissingHardlink>,
    pub orphan_seeding: Vec<OrphanSeeding>,
    pub hardlink_groups: Vec<HardlinkGroup>,
    pub season_conflicts: Vec<SeasonConflict>,
    pub summary: RunSummary,
}

pub struct Auditor {
    config: Config,
    safety: PathSafety,
    warnings: Vec<String>,
    evaluator: QualityEvaluator,
    correlator: ExternalStateCorrelator,
}

impl Auditor {
    /// Validate the configuration and build the external clients. Any
    /// configuration problem is fatal here, before a single file is read.
    pub fn new(mut config: Config) -> AuditResult<Self> {
        let (safety, warnings) = config.validate()?;

        let torrent_source: Option<Box<dyn TorrentSource>> = match config.qbittorrent_config() {
            Some(qbit) => {
                let client = QbittorrentClient::new(qbit).map_err(|e| AuditError::InvalidValue {
                    name: "QBIT_HOST",
                    value: e.to_string(),
                })?;
                Some(Box::new(client))
            }
            None => None,
        };

        let mut registries: Vec<Box<dyn RegistrySource>> = Vec::new();
        for instance in config.registry_instances() {
            let client = ServarrClient::new(instance.clone(), config.http_timeout, config.retry()).map_err(|e| {
                AuditError::InvalidInstances {
                    prefix: instance.app.to_string().to_uppercase(),
                    message: format!("{}: {}", instance.name, e),
                }
            })?;
            registries.push(Box::new(client));
        }

        Ok(Self::with_sources(config, safety, warnings, torrent_source, registries))
    }

    /// Use the given sources instead of the configured ones
    pub fn with_sources(
        config: Config,
        safety: PathSafety,
        warnings: Vec<String>,
        torrent_source: Option<Box<dyn TorrentSource>>,
        registries: Vec<Box<dyn RegistrySource>>,
    ) -> Self {
        let evaluator = QualityEvaluator::new(config.avoid_mode, config.avoid_languages.clone());
        Self {
            config,
            safety,
            warnings,
            evaluator,
            correlator: ExternalStateCorrelator::new(torrent_source, registries),
        }
    }

    fn prober(&self) -> StreamProber {
        let cache = match &self.config.probe_cache_path {
            Some(path) => ProbeCache::load(path.clone()),
            None => ProbeCache::in_memory(),
        };
        StreamProber::new(
            FfprobeService::new(self.config.ffprobe_path.clone(), self.config.probe_timeout),
            Arc::new(cache),
            self.config.probe_workers,
        )
    }

    pub async fn run(&self) -> AuditReport {
        let started_at = Utc::now();
        info!(
            roots = ?self.config.roots,
            delete_root = %self.safety.delete_root().display(),
            probe_scope = %self.config.probe_scope,
            "Starting audit"
        );
        for warning in &self.warnings {
            warn!(warning = %warning, "Path configuration warning");
        }

        // Scan
        let scanner = ScannerService::new(
            ScanOptions {
                roots: self.config.roots.clone(),
                max_files: self.config.max_files,
                content_override: self.config.content_type,
            },
            self.evaluator.clone(),
        );
        let mut inventory = scanner.scan();

        // Probe
        let probe = match self.config.probe_scope {
            ProbeScope::None => ProbeStatus::Disabled,
            scope => {
                let targets: Vec<usize> = match scope {
                    ProbeScope::All => (0..inventory.files.len()).collect(),
                    _ => inventory.duplicate_indices(),
                };
                self.prober()
                    .probe_files(&mut inventory.files, &targets, &self.evaluator)
                    .await
            }
        };

        // Correlate
        let external = self.correlator.gather().await;
        let correlation = correlator::annotate(&mut inventory.files, &external);

        let mut path_warnings = self.warnings.clone();
        for warning in reports::path_consistency_warnings(
            self.config
                .roots
                .iter()
                .chain(external.torrent_paths.iter())
                .map(PathBuf::as_path),
        ) {
            if !path_warnings.contains(&warning) {
                path_warnings.push(warning);
            }
        }

        // Plan
        let planner = DeletionPlanner::new(
            self.safety.clone(),
            PlannerOptions {
                include_hardlinked: self.config.include_hardlinked,
            },
        );
        let plan = planner.plan(&inventory.files, &inventory.duplicate_sets());

        let missing_hardlinks = reports::missing_hardlinks(&inventory.files);
        let orphan_seeding = reports::orphan_seeding(&inventory.files);
        let hardlink_groups = reports::hardlink_groups(&inventory.files);
        let season_conflicts = reports::season_conflicts(&inventory.files);

        let files = &inventory.files;
        let protection = ProtectionSummary {
            skipped_seeding: plan.skipped.seeding,
            skipped_registry: plan.skipped.managed,
            skipped_queue: plan.skipped.queued,
            skipped_hardlinked: plan.skipped.hardlinked,
            skipped_unsafe_path: plan.skipped.unsafe_path,
            seeding_files: files.iter().filter(|f| f.protection.is_seeding()).count(),
            managed_files: files.iter().filter(|f| f.protection.is_managed()).count(),
            queued_files: files.iter().filter(|f| f.protection.in_queue()).count(),
        };

        let degraded = probe.is_degraded() || external.is_degraded();
        if degraded {
            warn!("Audit ran degraded, protection or scoring may be incomplete");
        }

        let summary = RunSummary {
            started_at,
            finished_at: Utc::now(),
            roots: self.config.roots.clone(),
            delete_root: self.safety.delete_root().to_path_buf(),
            probe_scope: self.config.probe_scope,
            avoid_mode: self.config.avoid_mode,
            avoid_languages: self.config.avoid_languages.clone(),
            scanned_files: inventory.stats.files,
            skipped_samples: inventory.stats.skipped_samples,
            scan_errors: inventory.stats.errors,
            scan_truncated: inventory.stats.truncated,
            duplicate_groups: plan.groups.len(),
            candidates: plan.candidates.len(),
            reclaimable_bytes: plan.reclaimable_bytes,
            protection,
            probe,
            share_client: external.share_status.clone(),
            registries: external.registry_status.clone(),
            correlation,
            missing_hardlinks: missing_hardlinks.len(),
            missing_hardlink_bytes: missing_hardlinks.iter().map(|m| m.wasted_bytes).sum(),
            orphan_seeding: orphan_seeding.len(),
            path_warnings,
            degraded,
        };

        info!(
            files = summary.scanned_files,
            groups = summary.duplicate_groups,
            candidates = summary.candidates,
            reclaimable_bytes = summary.reclaimable_bytes,
            missing_hardlinks = summary.missing_hardlinks,
            degraded = summary.degraded,
            "Audit complete"
        );

        AuditReport {
            files: inventory.files,
            groups: plan.groups,
            candidates: plan.candidates,
            missing_hardlinks,
            orphan_seeding,
            hardlink_groups,
            season_conflicts,
            summary,
        }
    }
}

/// Validate `config`, then run every phase against the configured sources
pub async fn run_audit(config: Config) -> AuditResult<AuditReport> {
    let auditor = Auditor::new(config)?;
    Ok(auditor.run().await)
}
