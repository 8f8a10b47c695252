//! Audit components and their external integrations

pub mod correlator;
pub mod external_source;
pub mod ffmpeg;
pub mod filename_parser;
pub mod language;
pub mod logging;
pub mod path_mapping;
pub mod path_safety;
pub mod planner;
pub mod probe_cache;
pub mod prober;
pub mod qbittorrent;
pub mod quality_evaluator;
pub mod reports;
pub mod retry;
pub mod scanner;
pub mod servarr;

pub use correlator::{CorrelationStats, ExternalState, ExternalStateCorrelator, annotate};
pub use external_source::{RegistrySource, SourceStatus, TorrentActivity, TorrentSource};
pub use ffmpeg::{FfprobeService, ProbeError, ProbedStreams};
pub use path_mapping::PathMapper;
pub use path_safety::PathSafety;
pub use planner::{DeletionCandidate, DeletionPlan, DeletionPlanner, DuplicateGroup, PlannerOptions};
pub use probe_cache::ProbeCache;
pub use prober::{ProbeScope, ProbeStatus, StreamProber};
pub use qbittorrent::QbittorrentClient;
pub use quality_evaluator::{AvoidMode, QualityEvaluator};
pub use scanner::{Inventory, ScanOptions, ScannerService};
pub use servarr::{ServarrClient, ServarrInstance};
