//! Sonarr / Radarr API v3 client
//!
//! Loads every file an instance manages plus its download queue. Payloads are
//! decoded into typed records here and converted into evidence with paths
//! already mapped, so nothing downstream sees raw JSON.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::{debug, info, warn};
use url::Url;

use super::external_source::{ManagedFile, QueuedPath, RegistryInventory, RegistrySource};
use super::path_mapping::{PathMapper, PathMapping};
use super::retry::{ClientError, RetryConfig, check_status, decode_json, normalize_base_url, retry_async};
use crate::error::{AuditError, AuditResult};
use crate::media::{ManagedEvidence, QueueEvidence, RegistryApp};

const QUEUE_PAGE_SIZE: usize = 100;
const QUEUE_MAX_PAGES: usize = 20;
const MAX_NUMBERED_INSTANCES: usize = 10;

// ============================================================================
// API records
// ============================================================================

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SystemStatus {
    #[serde(default)]
    pub version: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct QualityProfileRecord {
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeriesRecord {
    pub id: i64,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub path: String,
    pub quality_profile_id: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MovieRecord {
    pub id: i64,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub path: String,
    pub quality_profile_id: Option<i64>,
    #[serde(default)]
    pub has_file: bool,
    pub movie_file: Option<MediaFileRecord>,
}

/// An `episodefile` or `moviefile` entry
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaFileRecord {
    pub id: i64,
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub size: u64,
    pub season_number: Option<u32>,
    pub quality: Option<QualityEnvelope>,
    #[serde(default)]
    pub custom_formats: Vec<CustomFormatRecord>,
    pub custom_format_score: Option<i64>,
    #[serde(default)]
    pub quality_cutoff_not_met: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct QualityEnvelope {
    pub quality: QualityRecord,
}

#[derive(Debug, Clone, Deserialize)]
pub struct QualityRecord {
    #[serde(default)]
    pub id: i64,
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CustomFormatRecord {
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueuePage {
    #[serde(default)]
    pub total_records: usize,
    #[serde(default)]
    pub records: Vec<QueueRecord>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueRecord {
    pub title: Option<String>,
    pub status: Option<String>,
    pub output_path: Option<String>,
}

// ============================================================================
// Instance configuration
// ============================================================================

#[derive(Debug, Clone)]
pub struct ServarrInstance {
    pub name: String,
    pub app: RegistryApp,
    pub url: String,
    pub api_key: String,
    pub path_map: PathMapper,
    /// Only media under one of these remote folders are loaded; empty means all
    pub root_folders: Vec<String>,
    /// Base for links in reports, when it differs from `url`
    pub webui_url: Option<String>,
}

impl ServarrInstance {
    fn prefix(app: RegistryApp) -> &'static str {
        match app {
            RegistryApp::Sonarr => "SONARR",
            RegistryApp::Radarr => "RADARR",
        }
    }

    /// Read instances from variables via `lookup`.
    ///
    /// `{PREFIX}_INSTANCES_JSON` wins when set. Otherwise a single
    /// `{PREFIX}_URL` instance and numbered `{PREFIX}_{n}_URL` instances are
    /// combined.
    pub fn from_vars(app: RegistryApp, lookup: impl Fn(&str) -> Option<String>) -> AuditResult<Vec<Self>> {
        let prefix = Self::prefix(app);
        let get = |key: &str| lookup(&format!("{}_{}", prefix, key)).filter(|v| !v.trim().is_empty());

        if let Some(json) = get("INSTANCES_JSON") {
            return Self::from_json(app, &json);
        }

        let mut instances = Vec::new();
        if let (Some(url), Some(api_key)) = (get("URL"), get("APIKEY")) {
            instances.push(Self {
                name: get("NAME").unwrap_or_else(|| app.to_string()),
                app,
                url,
                api_key,
                path_map: PathMapper::parse(&get("PATH_MAP").unwrap_or_default())?,
                root_folders: split_list(&get("ROOT_FOLDERS").unwrap_or_default()),
                webui_url: get("WEBUI_URL"),
            });
        }

        for n in 1..=MAX_NUMBERED_INSTANCES {
            let numbered = |key: &str| get(&format!("{}_{}", n, key));
            if let (Some(url), Some(api_key)) = (numbered("URL"), numbered("APIKEY")) {
                instances.push(Self {
                    name: numbered("NAME").unwrap_or_else(|| format!("{}-{}", app, n)),
                    app,
                    url,
                    api_key,
                    path_map: PathMapper::parse(&numbered("PATH_MAP").unwrap_or_default())?,
                    root_folders: split_list(&numbered("ROOT_FOLDERS").unwrap_or_default()),
                    webui_url: numbered("WEBUI_URL"),
                });
            }
        }

        Ok(instances)
    }

    fn from_json(app: RegistryApp, json: &str) -> AuditResult<Vec<Self>> {
        #[derive(Deserialize)]
        struct InstanceEntry {
            name: Option<String>,
            url: String,
            #[serde(alias = "apikey", alias = "apiKey")]
            api_key: String,
            #[serde(default)]
            path_mappings: Vec<String>,
            #[serde(default)]
            root_folders: Vec<String>,
            webui_url: Option<String>,
            #[serde(default = "enabled")]
            enabled: bool,
        }

        fn enabled() -> bool {
            true
        }

        let invalid = |message: String| AuditError::InvalidInstances {
            prefix: Self::prefix(app).to_string(),
            message,
        };
        let entries: Vec<InstanceEntry> = serde_json::from_str(json).map_err(|e| invalid(e.to_string()))?;

        let mut instances = Vec::new();
        for (idx, entry) in entries.into_iter().enumerate() {
            if !entry.enabled {
                continue;
            }
            if entry.url.trim().is_empty() || entry.api_key.trim().is_empty() {
                return Err(invalid(format!("instance {} needs url and api_key", idx + 1)));
            }
            let mut mappings = Vec::new();
            for pair in &entry.path_mappings {
                let (remote, local) = pair
                    .split_once(':')
                    .ok_or_else(|| AuditError::InvalidPathMapping(pair.clone()))?;
                mappings.push(PathMapping::new(remote, local));
            }
            instances.push(Self {
                name: entry.name.unwrap_or_else(|| format!("{}-{}", app, idx + 1)),
                app,
                url: entry.url,
                api_key: entry.api_key,
                path_map: PathMapper::new(mappings),
                root_folders: entry.root_folders,
                webui_url: entry.webui_url,
            });
        }
        Ok(instances)
    }

    pub fn in_root_folders(&self, remote_path: &str) -> bool {
        if self.root_folders.is_empty() {
            return true;
        }
        self.root_folders.iter().any(|folder| {
            let folder = folder.trim_end_matches('/');
            remote_path == folder
                || remote_path
                    .strip_prefix(folder)
                    .is_some_and(|rest| rest.starts_with('/'))
        })
    }

    pub fn webui_link(&self, media_id: i64) -> String {
        let base = self.webui_url.as_deref().unwrap_or(&self.url).trim_end_matches('/');
        match self.app {
            RegistryApp::Sonarr => format!("{}/series/{}", base, media_id),
            RegistryApp::Radarr => format!("{}/movie/{}", base, media_id),
        }
    }

    /// Evidence for one file record, or `None` when it carries no path
    pub fn managed_file(
        &self,
        record: MediaFileRecord,
        media_id: i64,
        title: &str,
        profile: Option<String>,
    ) -> Option<ManagedFile> {
        if record.path.is_empty() {
            return None;
        }
        let (quality, quality_id) = match record.quality {
            Some(q) if !q.quality.name.is_empty() => (Some(q.quality.name), Some(q.quality.id)),
            _ => (None, None),
        };
        let upgrade_recommended = record.quality_cutoff_not_met;
        Some(ManagedFile {
            path: self.path_map.map(&record.path),
            size: record.size,
            evidence: ManagedEvidence {
                instance: self.name.clone(),
                app: self.app,
                media_id,
                file_id: record.id,
                title: title.to_string(),
                season: record.season_number,
                quality,
                quality_id,
                quality_profile: profile,
                custom_formats: record
                    .custom_formats
                    .into_iter()
                    .map(|cf| cf.name)
                    .filter(|name| !name.is_empty())
                    .collect(),
                custom_format_score: record.custom_format_score,
                upgrade_recommended,
                upgrade_reason: upgrade_recommended.then(|| "Quality cutoff not met".to_string()),
                webui_url: Some(self.webui_link(media_id)),
            },
        })
    }
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split([',', ';'])
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

// ============================================================================
// Client
// ============================================================================

pub struct ServarrClient {
    client: Client,
    base_url: Url,
    instance: ServarrInstance,
    retry: RetryConfig,
}

impl ServarrClient {
    pub fn new(instance: ServarrInstance, timeout: Duration, retry: RetryConfig) -> Result<Self, ClientError> {
        let base_url = normalize_base_url(&instance.url)?;
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url,
            instance,
            retry,
        })
    }

    /// GET `api/v3/{path}`; `Ok(None)` on 404
    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<Option<T>, ClientError> {
        let url = &self
            .base_url
            .join(&format!("api/v3/{}", path))
            .map_err(|_| ClientError::InvalidUrl(path.to_string()))?;
        let operation = format!("{} {}", self.instance.name, path);

        retry_async(
            move || async move {
                let response = self
                    .client
                    .get(url.clone())
                    .query(query)
                    .header("X-Api-Key", &self.instance.api_key)
                    .send()
                    .await?;
                match check_status(response)? {
                    Some(response) => decode_json(response).await.map(Some),
                    None => Ok(None),
                }
            },
            &self.retry,
            &operation,
        )
        .await
    }

    pub async fn system_status(&self) -> Result<SystemStatus, ClientError> {
        self.get_json("system/status", &[])
            .await?
            .ok_or_else(|| ClientError::Status {
                status: StatusCode::NOT_FOUND,
                url: format!("{}api/v3/system/status", self.base_url),
            })
    }

    pub async fn quality_profiles(&self) -> Result<HashMap<i64, String>, ClientError> {
        let profiles: Vec<QualityProfileRecord> = self.get_json("qualityprofile", &[]).await?.unwrap_or_default();
        Ok(profiles.into_iter().map(|p| (p.id, p.name)).collect())
    }

    pub async fn series(&self) -> Result<Vec<SeriesRecord>, ClientError> {
        Ok(self.get_json("series", &[]).await?.unwrap_or_default())
    }

    pub async fn episode_files(&self, series_id: i64) -> Result<Vec<MediaFileRecord>, ClientError> {
        Ok(self
            .get_json("episodefile", &[("seriesId", series_id.to_string())])
            .await?
            .unwrap_or_default())
    }

    pub async fn movies(&self) -> Result<Vec<MovieRecord>, ClientError> {
        Ok(self.get_json("movie", &[]).await?.unwrap_or_default())
    }

    pub async fn movie_file(&self, movie_id: i64) -> Result<Option<MediaFileRecord>, ClientError> {
        let files: Vec<MediaFileRecord> = self
            .get_json("moviefile", &[("movieId", movie_id.to_string())])
            .await?
            .unwrap_or_default();
        Ok(files.into_iter().next())
    }

    /// Every queue page until `totalRecords` is reached or the page limit hits
    pub async fn queue(&self) -> Result<Vec<QueueRecord>, ClientError> {
        let mut records = Vec::new();
        for page in 1..=QUEUE_MAX_PAGES {
            let query = [
                ("page", page.to_string()),
                ("pageSize", QUEUE_PAGE_SIZE.to_string()),
            ];
            let Some(batch) = self.get_json::<QueuePage>("queue", &query).await? else {
                break;
            };
            let empty = batch.records.is_empty();
            records.extend(batch.records);
            if empty || records.len() >= batch.total_records {
                break;
            }
        }
        Ok(records)
    }

    async fn sonarr_files(&self, profiles: &HashMap<i64, String>) -> Result<Vec<ManagedFile>, ClientError> {
        let mut files = Vec::new();
        let mut skipped = 0usize;
        for series in self.series().await? {
            if !self.instance.in_root_folders(&series.path) {
                skipped += 1;
                continue;
            }
            let profile = series.quality_profile_id.and_then(|id| profiles.get(&id).cloned());
            for record in self.episode_files(series.id).await? {
                if let Some(file) = self.instance.managed_file(record, series.id, &series.title, profile.clone()) {
                    files.push(file);
                }
            }
        }
        if skipped > 0 {
            debug!(instance = %self.instance.name, skipped, "Series outside root folders skipped");
        }
        Ok(files)
    }

    async fn radarr_files(&self, profiles: &HashMap<i64, String>) -> Result<Vec<ManagedFile>, ClientError> {
        let mut files = Vec::new();
        for movie in self.movies().await? {
            if !movie.has_file || !self.instance.in_root_folders(&movie.path) {
                continue;
            }
            let record = match movie.movie_file {
                Some(record) => Some(record),
                None => self.movie_file(movie.id).await?,
            };
            let Some(record) = record else {
                continue;
            };
            let profile = movie.quality_profile_id.and_then(|id| profiles.get(&id).cloned());
            if let Some(file) = self.instance.managed_file(record, movie.id, &movie.title, profile) {
                files.push(file);
            }
        }
        Ok(files)
    }
}

#[async_trait]
impl RegistrySource for ServarrClient {
    fn name(&self) -> &str {
        &self.instance.name
    }

    fn app(&self) -> RegistryApp {
        self.instance.app
    }

    async fn inventory(&self) -> Result<RegistryInventory, ClientError> {
        let status = self.system_status().await?;
        info!(
            instance = %self.instance.name,
            app = %self.instance.app,
            version = %status.version,
            "Connected to library manager"
        );

        let profiles = match self.quality_profiles().await {
            Ok(p) => p,
            Err(e) => {
                warn!(instance = %self.instance.name, error = %e, "Could not load quality profiles");
                HashMap::new()
            }
        };

        let managed = match self.instance.app {
            RegistryApp::Sonarr => self.sonarr_files(&profiles).await?,
            RegistryApp::Radarr => self.radarr_files(&profiles).await?,
        };

        let queue = self
            .queue()
            .await?
            .into_iter()
            .filter_map(|record| {
                let output = record.output_path.filter(|p| !p.is_empty())?;
                Some(QueuedPath {
                    path: self.instance.path_map.map(&output),
                    evidence: QueueEvidence {
                        instance: self.instance.name.clone(),
                        app: self.instance.app,
                        title: record.title,
                        status: record.status,
                    },
                })
            })
            .collect::<Vec<_>>();

        info!(
            instance = %self.instance.name,
            managed = managed.len(),
            queued = queue.len(),
            "Loaded library manager state"
        );

        Ok(RegistryInventory {
            instance: self.instance.name.clone(),
            app: self.instance.app,
            version: Some(status.version).filter(|v| !v.is_empty()),
            managed,
            queue,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |key: &str| map.get(key).cloned()
    }

    fn sonarr() -> ServarrInstance {
        ServarrInstance {
            name: "sonarr".to_string(),
            app: RegistryApp::Sonarr,
            url: "http://sonarr:8989/".to_string(),
            api_key: "key".to_string(),
            path_map: PathMapper::parse("/tv:/mnt/user/media/tv").unwrap(),
            root_folders: vec!["/tv/anime".to_string()],
            webui_url: None,
        }
    }

    #[test]
    fn test_single_and_numbered_instances() {
        let instances = ServarrInstance::from_vars(
            RegistryApp::Sonarr,
            lookup(&[
                ("SONARR_URL", "http://sonarr:8989"),
                ("SONARR_APIKEY", "abc"),
                ("SONARR_PATH_MAP", "/tv:/mnt/user/media/tv"),
                ("SONARR_2_URL", "http://sonarr4k:8989"),
                ("SONARR_2_APIKEY", "def"),
                ("SONARR_3_URL", "http://missing-key"),
            ]),
        )
        .unwrap();
        assert_eq!(instances.len(), 2);
        assert_eq!(instances[0].name, "sonarr");
        assert_eq!(instances[0].path_map.mappings().len(), 1);
        assert_eq!(instances[1].name, "sonarr-2");
    }

    #[test]
    fn test_json_instances_take_precedence() {
        let instances = ServarrInstance::from_vars(
            RegistryApp::Radarr,
            lookup(&[
                (
                    "RADARR_INSTANCES_JSON",
                    r#"[{"name":"4k","url":"http://r4k","apikey":"x","path_mappings":["/movies:/mnt/m"]},
                        {"url":"http://off","api_key":"y","enabled":false}]"#,
                ),
                ("RADARR_URL", "http://ignored"),
                ("RADARR_APIKEY", "z"),
            ]),
        )
        .unwrap();
        assert_eq!(instances.len(), 1);
        assert_eq!(instances[0].name, "4k");
        assert_eq!(instances[0].path_map.map("/movies/A/a.mkv"), PathBuf::from("/mnt/m/A/a.mkv"));
    }

    #[test]
    fn test_malformed_json_is_config_error() {
        let result = ServarrInstance::from_vars(RegistryApp::Sonarr, lookup(&[("SONARR_INSTANCES_JSON", "{not json")]));
        assert!(matches!(result, Err(AuditError::InvalidInstances { .. })));
    }

    #[test]
    fn test_root_folder_filter() {
        let instance = sonarr();
        assert!(instance.in_root_folders("/tv/anime/Show"));
        assert!(!instance.in_root_folders("/tv/anime-old/Show"));
        assert!(!instance.in_root_folders("/tv/series/Show"));
    }

    #[test]
    fn test_managed_file_from_episode_record() {
        let json = r#"{
            "id": 77,
            "seriesId": 5,
            "seasonNumber": 1,
            "path": "/tv/anime/Show/Season 1/Show - S01E01.mkv",
            "size": 1234,
            "quality": {"quality": {"id": 7, "name": "Bluray-1080p"}},
            "customFormats": [{"name": "German DL"}, {"name": ""}],
            "customFormatScore": 150,
            "qualityCutoffNotMet": true
        }"#;
        let record: MediaFileRecord = serde_json::from_str(json).unwrap();
        let file = sonarr()
            .managed_file(record, 5, "Show", Some("HD".to_string()))
            .unwrap();
        assert_eq!(
            file.path,
            PathBuf::from("/mnt/user/media/tv/anime/Show/Season 1/Show - S01E01.mkv")
        );
        assert_eq!(file.evidence.quality.as_deref(), Some("Bluray-1080p"));
        assert_eq!(file.evidence.custom_formats, vec!["German DL".to_string()]);
        assert!(file.evidence.upgrade_recommended);
        assert_eq!(file.evidence.upgrade_reason.as_deref(), Some("Quality cutoff not met"));
        assert_eq!(file.evidence.webui_url.as_deref(), Some("http://sonarr:8989/series/5"));
    }

    #[test]
    fn test_queue_page_decoding() {
        let json = r#"{"page":1,"totalRecords":1,"records":[{"title":"Show.S01E02","status":"downloading","outputPath":"/tv/dl/Show.S01E02"}]}"#;
        let page: QueuePage = serde_json::from_str(json).unwrap();
        assert_eq!(page.total_records, 1);
        assert_eq!(page.records[0].output_path.as_deref(), Some("/tv/dl/Show.S01E02"));
    }
}
