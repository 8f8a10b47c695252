//! Audit configuration loaded from environment variables

use std::collections::BTreeSet;
use std::env;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};

use crate::error::{AuditError, AuditResult};
use crate::media::{ContentType, RegistryApp};
use crate::services::language::parse_language_list;
use crate::services::logging::LogFormat;
use crate::services::path_mapping::PathMapper;
use crate::services::path_safety::{PROTECTED_PATHS, PathSafety};
use crate::services::prober::ProbeScope;
use crate::services::qbittorrent::QbittorrentConfig;
use crate::services::quality_evaluator::AvoidMode;
use crate::services::reports::path_consistency_warnings;
use crate::services::retry::RetryConfig;
use crate::services::servarr::ServarrInstance;

const DEFAULT_ROOT: &str = "/mnt/user/data/media";
const DEFAULT_QBIT_PATH_MAP: &str = "/data/torrents:/mnt/user/data/torrents";

/// Share client connection settings
#[derive(Debug, Clone)]
pub struct QbittorrentSettings {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    pub path_map: PathMapper,
}

/// Audit configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Scan roots, in scan order
    pub roots: Vec<PathBuf>,

    /// Deletion boundary; the first root when unset
    pub delete_under: Option<PathBuf>,

    /// Scan cutoff, 0 for none
    pub max_files: usize,

    pub probe_scope: ProbeScope,
    pub probe_timeout: Duration,
    pub probe_workers: usize,
    pub ffprobe_path: PathBuf,

    /// Probe cache file; in-memory only when `None`
    pub probe_cache_path: Option<PathBuf>,

    /// Forced content type; detected per file when `None`
    pub content_type: Option<ContentType>,

    pub avoid_languages: BTreeSet<String>,
    pub avoid_mode: AvoidMode,

    pub include_hardlinked: bool,

    pub qbittorrent: Option<QbittorrentSettings>,
    pub sonarr: Vec<ServarrInstance>,
    pub radarr: Vec<ServarrInstance>,

    pub http_timeout: Duration,
    pub http_retries: u32,

    pub log_format: LogFormat,

    /// Paths no candidate may resolve into
    pub protected_paths: Vec<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            roots: vec![PathBuf::from(DEFAULT_ROOT)],
            delete_under: None,
            max_files: 0,
            probe_scope: ProbeScope::default(),
            probe_timeout: Duration::from_secs(30),
            probe_workers: 2,
            ffprobe_path: PathBuf::from("ffprobe"),
            probe_cache_path: default_cache_path(),
            content_type: None,
            avoid_languages: BTreeSet::new(),
            avoid_mode: AvoidMode::default(),
            include_hardlinked: false,
            qbittorrent: None,
            sonarr: Vec::new(),
            radarr: Vec::new(),
            http_timeout: Duration::from_secs(30),
            http_retries: 2,
            log_format: LogFormat::default(),
            protected_paths: PROTECTED_PATHS.iter().map(PathBuf::from).collect(),
        }
    }
}

fn default_cache_path() -> Option<PathBuf> {
    dirs::cache_dir().map(|dir| dir.join("librarian-audit").join("ffprobe_cache.json"))
}

/// Split a `,` or `;` separated list of paths
pub fn split_paths(value: &str) -> Vec<PathBuf> {
    value
        .split([',', ';'])
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(PathBuf::from)
        .collect()
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" | "" => Some(false),
        _ => None,
    }
}

fn invalid(name: &'static str, value: &str) -> AuditError {
    AuditError::InvalidValue {
        name,
        value: value.to_string(),
    }
}

fn parse_num<T: FromStr>(name: &'static str, value: &str) -> AuditResult<T> {
    value.trim().parse().map_err(|_| invalid(name, value))
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok()).context("Invalid configuration")
    }

    /// Build from any variable source; unset variables keep their defaults
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> AuditResult<Self> {
        let mut config = Config::default();
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(roots) = get("ROOTS") {
            config.roots = split_paths(&roots);
        }
        config.delete_under = get("DELETE_UNDER").map(PathBuf::from);
        if let Some(v) = get("MAX_FILES") {
            config.max_files = parse_num("MAX_FILES", &v)?;
        }
        if let Some(v) = get("FFPROBE_SCOPE") {
            config.probe_scope = ProbeScope::parse(&v).ok_or_else(|| invalid("FFPROBE_SCOPE", &v))?;
        }
        if let Some(v) = get("FFPROBE_TIMEOUT") {
            config.probe_timeout = Duration::from_secs(parse_num("FFPROBE_TIMEOUT", &v)?);
        }
        if let Some(v) = get("FFPROBE_WORKERS") {
            config.probe_workers = parse_num::<usize>("FFPROBE_WORKERS", &v)?.max(1);
        }
        if let Some(v) = get("FFPROBE_PATH") {
            config.ffprobe_path = PathBuf::from(v);
        }
        if let Some(v) = get("PROBE_CACHE_PATH") {
            config.probe_cache_path = Some(PathBuf::from(v));
        }
        if let Some(v) = get("CONTENT_TYPE") {
            config.content_type = ContentType::parse_override(&v).ok_or_else(|| invalid("CONTENT_TYPE", &v))?;
        }
        if let Some(v) = get("AVOID_AUDIO_LANG") {
            config.avoid_languages = parse_language_list(&v);
        }
        if let Some(v) = get("AVOID_MODE") {
            config.avoid_mode = AvoidMode::parse(&v).ok_or_else(|| invalid("AVOID_MODE", &v))?;
        }
        if let Some(v) = get("INCLUDE_HARDLINKED") {
            config.include_hardlinked = parse_bool(&v).ok_or_else(|| invalid("INCLUDE_HARDLINKED", &v))?;
        }

        if let Some(host) = get("QBIT_HOST") {
            let port = match get("QBIT_PORT") {
                Some(v) => parse_num("QBIT_PORT", &v)?,
                None => 8080,
            };
            let path_map = get("QBIT_PATH_MAP").unwrap_or_else(|| DEFAULT_QBIT_PATH_MAP.to_string());
            config.qbittorrent = Some(QbittorrentSettings {
                host,
                port,
                username: get("QBIT_USER"),
                password: get("QBIT_PASS"),
                path_map: PathMapper::parse(&path_map)?,
            });
        }

        config.sonarr = ServarrInstance::from_vars(RegistryApp::Sonarr, &lookup)?;
        config.radarr = ServarrInstance::from_vars(RegistryApp::Radarr, &lookup)?;

        if let Some(v) = get("HTTP_TIMEOUT") {
            config.http_timeout = Duration::from_secs(parse_num("HTTP_TIMEOUT", &v)?);
        }
        if let Some(v) = get("HTTP_RETRIES") {
            config.http_retries = parse_num("HTTP_RETRIES", &v)?;
        }
        if let Some(v) = get("LOG_FORMAT") {
            config.log_format = LogFormat::parse(&v).ok_or_else(|| invalid("LOG_FORMAT", &v))?;
        }

        Ok(config)
    }

    pub fn retry(&self) -> RetryConfig {
        RetryConfig {
            max_retries: self.http_retries,
            ..RetryConfig::default()
        }
    }

    pub fn qbittorrent_config(&self) -> Option<QbittorrentConfig> {
        self.qbittorrent.as_ref().map(|q| QbittorrentConfig {
            host: q.host.clone(),
            port: q.port,
            username: q.username.clone(),
            password: q.password.clone(),
            path_map: q.path_map.clone(),
            timeout: self.http_timeout,
            retry: self.retry(),
        })
    }

    pub fn registry_instances(&self) -> impl Iterator<Item = &ServarrInstance> {
        self.sonarr.iter().chain(self.radarr.iter())
    }

    /// Check roots and the deletion boundary. Roots are replaced by their
    /// canonical form. Returns the path safety check and non-fatal warnings.
    pub fn validate(&mut self) -> AuditResult<(PathSafety, Vec<String>)> {
        if self.roots.is_empty() {
            return Err(AuditError::NoRoots);
        }

        let mut canonical = Vec::with_capacity(self.roots.len());
        for root in &self.roots {
            let metadata = std::fs::metadata(root).map_err(|_| AuditError::MissingRoot(root.clone()))?;
            if !metadata.is_dir() {
                return Err(AuditError::RootNotDirectory(root.clone()));
            }
            let resolved = root.canonicalize().map_err(|_| AuditError::MissingRoot(root.clone()))?;
            if !canonical.contains(&resolved) {
                canonical.push(resolved);
            }
        }
        self.roots = canonical;

        let delete_root = self.delete_under.clone().unwrap_or_else(|| self.roots[0].clone());
        let safety = PathSafety::with_protected_paths(&delete_root, self.protected_paths.clone())?;

        let mut warnings = Vec::new();
        if safety.root_is_shadowed() {
            warnings.push(format!(
                "deletion root {} lies inside a protected system path, no file can be proposed for deletion",
                safety.delete_root().display()
            ));
        }
        let mut checked: Vec<&Path> = self.roots.iter().map(PathBuf::as_path).collect();
        checked.push(safety.delete_root());
        warnings.extend(path_consistency_warnings(checked));

        Ok((safety, warnings))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn from(vars: &[(&str, &str)]) -> AuditResult<Config> {
        let map: HashMap<String, String> = vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        Config::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = from(&[]).unwrap();
        assert_eq!(config.roots, vec![PathBuf::from(DEFAULT_ROOT)]);
        assert_eq!(config.probe_scope, ProbeScope::Dupes);
        assert_eq!(config.probe_workers, 2);
        assert_eq!(config.avoid_mode, AvoidMode::IfNoPrefer);
        assert!(config.qbittorrent.is_none());
        assert!(config.sonarr.is_empty());
    }

    #[test]
    fn test_overrides() {
        let config = from(&[
            ("ROOTS", "/a, /b;/c"),
            ("FFPROBE_SCOPE", "all"),
            ("FFPROBE_WORKERS", "0"),
            ("CONTENT_TYPE", "anime"),
            ("AVOID_AUDIO_LANG", "en, ja"),
            ("AVOID_MODE", "strict"),
            ("INCLUDE_HARDLINKED", "yes"),
            ("QBIT_HOST", "qbit"),
        ])
        .unwrap();
        assert_eq!(config.roots.len(), 3);
        assert_eq!(config.probe_scope, ProbeScope::All);
        assert_eq!(config.probe_workers, 1);
        assert_eq!(config.content_type, Some(ContentType::Anime));
        assert!(config.avoid_languages.contains("eng"));
        assert!(config.avoid_languages.contains("jpn"));
        assert!(config.include_hardlinked);
        let qbit = config.qbittorrent.unwrap();
        assert_eq!(qbit.port, 8080);
        assert_eq!(qbit.path_map.mappings().len(), 1);
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        assert!(matches!(
            from(&[("MAX_FILES", "lots")]),
            Err(AuditError::InvalidValue { name: "MAX_FILES", .. })
        ));
        assert!(from(&[("AVOID_MODE", "sometimes")]).is_err());
        assert!(from(&[("QBIT_HOST", "q"), ("QBIT_PATH_MAP", "nocolon")]).is_err());
    }

    #[test]
    fn test_validate_missing_root_is_fatal() {
        let mut config = Config {
            roots: vec![PathBuf::from("/no/such/root")],
            ..Config::default()
        };
        assert!(matches!(config.validate(), Err(AuditError::MissingRoot(_))));
    }

    #[test]
    fn test_validate_file_root_is_fatal() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let mut config = Config {
            roots: vec![file.path().to_path_buf()],
            ..Config::default()
        };
        assert!(matches!(config.validate(), Err(AuditError::RootNotDirectory(_))));
    }

    #[test]
    fn test_validate_system_delete_root_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config {
            roots: vec![dir.path().to_path_buf()],
            delete_under: Some(PathBuf::from("/usr")),
            ..Config::default()
        };
        assert!(matches!(config.validate(), Err(AuditError::UnsafeDeleteRoot(_))));
    }
}
