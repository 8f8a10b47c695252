//! qBittorrent Web API v2 client
//!
//! Reads every torrent and its file list, classifies the state string once,
//! resolves each video file to an absolute path in the client's view and then
//! maps it into the scanner's view.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use reqwest::header::{ORIGIN, REFERER};
use serde::Deserialize;
use tracing::{debug, info, warn};
use url::Url;

use super::external_source::{SharedFile, SharedTorrent, TorrentActivity, TorrentSnapshot, TorrentSource};
use super::filename_parser::{is_sample_or_trailer, is_video_file};
use super::path_mapping::PathMapper;
use super::retry::{ClientError, RetryConfig, check_status, decode_json, normalize_base_url, retry_async};

/// Torrent as returned by `torrents/info`
#[derive(Debug, Clone, Deserialize)]
pub struct TorrentRecord {
    pub hash: String,
    pub name: String,
    pub state: String,
    #[serde(default)]
    pub save_path: String,
    #[serde(default)]
    pub content_path: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub ratio: f64,
}

/// File entry as returned by `torrents/files`, relative to the save path
#[derive(Debug, Clone, Deserialize)]
pub struct TorrentFileRecord {
    pub name: String,
    #[serde(default)]
    pub size: u64,
}

#[derive(Debug, Clone)]
pub struct QbittorrentConfig {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    pub path_map: PathMapper,
    pub timeout: Duration,
    pub retry: RetryConfig,
}

impl QbittorrentConfig {
    /// `host` may carry its own scheme or port; `port` fills in a missing one
    pub fn base_url(&self) -> Result<Url, ClientError> {
        let mut url = normalize_base_url(&self.host)?;
        if url.port().is_none() && !self.host.contains("://") {
            url.set_port(Some(self.port))
                .map_err(|_| ClientError::InvalidUrl(self.host.clone()))?;
        }
        Ok(url)
    }
}

pub struct QbittorrentClient {
    client: Client,
    base_url: Url,
    origin: String,
    config: QbittorrentConfig,
}

impl QbittorrentClient {
    pub fn new(config: QbittorrentConfig) -> Result<Self, ClientError> {
        let base_url = config.base_url()?;
        let origin = base_url.as_str().trim_end_matches('/').to_string();
        let client = Client::builder()
            .cookie_store(true)
            .timeout(config.timeout)
            .build()?;
        Ok(Self {
            client,
            base_url,
            origin,
            config,
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url, ClientError> {
        self.base_url
            .join(&format!("api/v2/{}", path))
            .map_err(|_| ClientError::InvalidUrl(path.to_string()))
    }

    /// Open a session. Without credentials this is a no-op and the client
    /// relies on the WebUI's local-auth bypass.
    pub async fn login(&self) -> Result<(), ClientError> {
        let (Some(username), Some(password)) = (&self.config.username, &self.config.password) else {
            debug!("No qBittorrent credentials configured, skipping login");
            return Ok(());
        };
        let url = self.endpoint("auth/login")?;
        let form = [("username", username.as_str()), ("password", password.as_str())];
        let (url, form) = (&url, &form);

        let body = retry_async(
            move || async move {
                let response = self
                    .client
                    .post(url.clone())
                    .header(REFERER, &self.origin)
                    .header(ORIGIN, &self.origin)
                    .form(form)
                    .send()
                    .await?;
                match check_status(response)? {
                    Some(response) => Ok(response.text().await?),
                    None => Err(ClientError::Status {
                        status: reqwest::StatusCode::NOT_FOUND,
                        url: url.to_string(),
                    }),
                }
            },
            &self.config.retry,
            "qbittorrent login",
        )
        .await?;

        if body.trim() == "Ok." {
            info!("qBittorrent login successful");
            Ok(())
        } else {
            Err(ClientError::LoginRejected(body.trim().to_string()))
        }
    }

    async fn get_text(&self, path: &str) -> Result<String, ClientError> {
        let url = &self.endpoint(path)?;
        retry_async(
            move || async move {
                let response = self
                    .client
                    .get(url.clone())
                    .header(REFERER, &self.origin)
                    .send()
                    .await?;
                match check_status(response)? {
                    Some(response) => Ok(response.text().await?),
                    None => Ok(String::new()),
                }
            },
            &self.config.retry,
            path,
        )
        .await
    }

    async fn get_json<T: serde::de::DeserializeOwned + Default>(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<T, ClientError> {
        let url = &self.endpoint(path)?;
        retry_async(
            move || async move {
                let response = self
                    .client
                    .get(url.clone())
                    .query(query)
                    .header(REFERER, &self.origin)
                    .send()
                    .await?;
                match check_status(response)? {
                    Some(response) => decode_json(response).await,
                    None => Ok(T::default()),
                }
            },
            &self.config.retry,
            path,
        )
        .await
    }

    pub async fn version(&self) -> Result<String, ClientError> {
        Ok(self.get_text("app/version").await?.trim().to_string())
    }

    pub async fn torrents(&self) -> Result<Vec<TorrentRecord>, ClientError> {
        self.get_json("torrents/info", &[]).await
    }

    pub async fn torrent_files(&self, hash: &str) -> Result<Vec<TorrentFileRecord>, ClientError> {
        self.get_json("torrents/files", &[("hash", hash)]).await
    }
}

#[async_trait]
impl TorrentSource for QbittorrentClient {
    fn name(&self) -> &str {
        "qbittorrent"
    }

    async fn snapshot(&self) -> Result<TorrentSnapshot, ClientError> {
        self.login().await?;
        let version = match self.version().await {
            Ok(v) if !v.is_empty() => Some(v),
            Ok(_) => None,
            Err(e) => {
                warn!(error = %e, "Could not read qBittorrent version");
                None
            }
        };

        let records = self.torrents().await?;
        info!(torrents = records.len(), version = ?version, "Fetched torrent list");

        let mut torrents = Vec::with_capacity(records.len());
        for record in records {
            // Inactive torrents are listed without their files
            if !TorrentActivity::from_state(&record.state).is_active() {
                torrents.push(resolve_torrent(record, &[], &self.config.path_map));
                continue;
            }
            let files = match self.torrent_files(&record.hash).await {
                Ok(files) => files,
                Err(e) => {
                    warn!(hash = %record.hash, error = %e, "Could not list torrent files");
                    continue;
                }
            };
            torrents.push(resolve_torrent(record, &files, &self.config.path_map));
        }

        Ok(TorrentSnapshot { version, torrents })
    }
}

/// Turn one torrent and its file list into mapped video paths.
///
/// A single-file torrent (one entry, no directory in its name) lives at
/// `content_path`; otherwise each file sits under `save_path`.
pub fn resolve_torrent(record: TorrentRecord, files: &[TorrentFileRecord], mapper: &PathMapper) -> SharedTorrent {
    let save_path = record.save_path.trim_end_matches('/');
    let content_path = record.content_path.trim_end_matches('/');
    let single_file = files.len() == 1 && !files[0].name.contains('/');

    let shared_files = files
        .iter()
        .filter(|f| !f.name.is_empty())
        .filter(|f| {
            let name = std::path::Path::new(&f.name);
            is_video_file(name) && !is_sample_or_trailer(name)
        })
        .map(|f| {
            let remote_path = if single_file && !content_path.is_empty() {
                content_path.to_string()
            } else {
                format!("{}/{}", save_path, f.name)
            };
            let local_path = mapper.map(&remote_path);
            SharedFile {
                remote_path,
                local_path,
            }
        })
        .collect();

    SharedTorrent {
        activity: TorrentActivity::from_state(&record.state),
        category: Some(record.category).filter(|c| !c.is_empty()),
        hash: record.hash,
        name: record.name,
        state: record.state,
        ratio: record.ratio,
        files: shared_files,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn record(state: &str) -> TorrentRecord {
        TorrentRecord {
            hash: "abc".to_string(),
            name: "Show.S01E01.1080p".to_string(),
            state: state.to_string(),
            save_path: "/data/torrents/tv/".to_string(),
            content_path: "/data/torrents/tv/Show.S01E01.1080p.mkv".to_string(),
            category: "tv".to_string(),
            ratio: 1.5,
        }
    }

    fn file(name: &str) -> TorrentFileRecord {
        TorrentFileRecord {
            name: name.to_string(),
            size: 1,
        }
    }

    #[test]
    fn test_single_file_uses_content_path() {
        let mapper = PathMapper::parse("/data/torrents:/mnt/user/data/torrents").unwrap();
        let torrent = resolve_torrent(record("uploading"), &[file("Show.S01E01.1080p.mkv")], &mapper);
        assert_eq!(torrent.activity, TorrentActivity::Active);
        assert_eq!(torrent.files.len(), 1);
        assert_eq!(
            torrent.files[0].local_path,
            PathBuf::from("/mnt/user/data/torrents/tv/Show.S01E01.1080p.mkv")
        );
    }

    #[test]
    fn test_multi_file_uses_save_path_and_skips_extras() {
        let mapper = PathMapper::default();
        let files = [
            file("Show.S01/Show.S01E01.mkv"),
            file("Show.S01/Show.S01E02.mkv"),
            file("Show.S01/Sample/show-sample.mkv"),
            file("Show.S01/Show.S01.nfo"),
        ];
        let torrent = resolve_torrent(record("pausedUP"), &files, &mapper);
        assert_eq!(torrent.activity, TorrentActivity::Inactive);
        let paths: Vec<_> = torrent.files.iter().map(|f| f.remote_path.as_str()).collect();
        assert_eq!(
            paths,
            vec![
                "/data/torrents/tv/Show.S01/Show.S01E01.mkv",
                "/data/torrents/tv/Show.S01/Show.S01E02.mkv"
            ]
        );
    }

    #[test]
    fn test_base_url_adds_port() {
        let config = QbittorrentConfig {
            host: "qbit.local".to_string(),
            port: 8080,
            username: None,
            password: None,
            path_map: PathMapper::default(),
            timeout: Duration::from_secs(5),
            retry: RetryConfig::default(),
        };
        assert_eq!(config.base_url().unwrap().as_str(), "http://qbit.local:8080/");
    }

    #[test]
    fn test_torrent_record_tolerates_missing_fields() {
        let json = r#"[{"hash":"h","name":"n","state":"stalledUP"}]"#;
        let records: Vec<TorrentRecord> = serde_json::from_str(json).unwrap();
        assert_eq!(records[0].ratio, 0.0);
        assert!(records[0].content_path.is_empty());
    }

    /// Answers the few Web API routes a snapshot needs and records every
    /// request target
    async fn serve_webui(requests: std::sync::Arc<parking_lot::Mutex<Vec<String>>>) -> u16 {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            loop {
                let Ok((mut stream, _)) = listener.accept().await else {
                    return;
                };
                let mut raw = Vec::new();
                let mut buf = [0u8; 1024];
                while !raw.windows(4).any(|w| w == b"\r\n\r\n") {
                    match stream.read(&mut buf).await {
                        Ok(0) | Err(_) => break,
                        Ok(n) => raw.extend_from_slice(&buf[..n]),
                    }
                }
                let head = String::from_utf8_lossy(&raw).into_owned();
                let target = head.split_whitespace().nth(1).unwrap_or_default().to_string();
                requests.lock().push(target.clone());

                let body = if target.starts_with("/api/v2/app/version") {
                    "v4.6.2".to_string()
                } else if target.starts_with("/api/v2/torrents/info") {
                    r#"[{"hash":"aaa","name":"Active","state":"uploading","save_path":"/data/torrents/tv","content_path":"/data/torrents/tv/Show.S01E01.mkv"},
                        {"hash":"bbb","name":"Paused","state":"pausedUP","save_path":"/data/torrents/tv","content_path":"/data/torrents/tv/Show.S01E02.mkv"}]"#
                        .to_string()
                } else if target.starts_with("/api/v2/torrents/files") {
                    r#"[{"name":"Show.S01E01.mkv","size":1}]"#.to_string()
                } else {
                    String::new()
                };
                let response = format!(
                    "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    body.len(),
                    body
                );
                let _ = stream.write_all(response.as_bytes()).await;
                let _ = stream.shutdown().await;
            }
        });
        port
    }

    #[tokio::test]
    async fn test_snapshot_skips_file_lists_of_inactive_torrents() {
        let requests = std::sync::Arc::new(parking_lot::Mutex::new(Vec::new()));
        let port = serve_webui(requests.clone()).await;

        let client = QbittorrentClient::new(QbittorrentConfig {
            host: "127.0.0.1".to_string(),
            port,
            username: None,
            password: None,
            path_map: PathMapper::parse("/data/torrents:/mnt/user/data/torrents").unwrap(),
            timeout: Duration::from_secs(5),
            retry: RetryConfig {
                max_retries: 0,
                interval: Duration::from_millis(10),
            },
        })
        .unwrap();
        let snapshot = client.snapshot().await.unwrap();

        assert_eq!(snapshot.version.as_deref(), Some("v4.6.2"));
        assert_eq!(snapshot.torrents.len(), 2);
        assert_eq!(snapshot.active_count(), 1);
        let paused = snapshot.torrents.iter().find(|t| t.hash == "bbb").unwrap();
        assert!(paused.files.is_empty());
        let active = snapshot.torrents.iter().find(|t| t.hash == "aaa").unwrap();
        assert_eq!(
            active.files[0].local_path,
            PathBuf::from("/mnt/user/data/torrents/tv/Show.S01E01.mkv")
        );

        let requests = requests.lock();
        assert!(requests.iter().any(|r| r.contains("torrents/files") && r.contains("hash=aaa")));
        assert!(!requests.iter().any(|r| r.contains("hash=bbb")));
    }
}
