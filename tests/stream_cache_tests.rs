//! Stream inspection through a stand-in ffprobe binary
//!
//! The script records each call it serves, so the second run can show
//! that unchanged files come from the persisted cache.

#![cfg(unix)]

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use assert_matches::assert_matches;

use librarian_audit::services::prober::{ProbeScope, ProbeStatus};
use librarian_audit::{AuditReport, Auditor, Config};

const STREAMS_OUTPUT: &str = r#"{"streams":[
{"index":0,"codec_type":"video","codec_name":"hevc","height":2160},
{"index":1,"codec_type":"audio","codec_name":"truehd","channels":8,"tags":{"language":"ger"}},
{"index":2,"codec_type":"audio","codec_name":"ac3","channels":6,"tags":{"language":"eng"}}
],"format":{}}"#;

fn fake_ffprobe(dir: &Path, counter: &Path) -> PathBuf {
    let script = dir.join("ffprobe");
    let body = format!(
        "#!/bin/sh\n\
         if [ \"$1\" = \"-version\" ]; then echo 'ffprobe version 6.1-fake'; exit 0; fi\n\
         echo call >> '{}'\n\
         cat <<'EOF'\n{}\nEOF\n",
        counter.display(),
        STREAMS_OUTPUT
    );
    fs::write(&script, body).unwrap();
    fs::set_permissions(&script, fs::Permissions::from_mode(0o755)).unwrap();
    script
}

fn invocations(counter: &Path) -> usize {
    fs::read_to_string(counter)
        .map(|s| s.lines().count())
        .unwrap_or(0)
}

async fn run(config: &Config) -> AuditReport {
    let mut config = config.clone();
    let (safety, warnings) = config.validate().unwrap();
    Auditor::with_sources(config, safety, warnings, None, Vec::new())
        .run()
        .await
}

#[tokio::test]
async fn test_stream_results_are_cached_between_runs() {
    let tools = tempfile::tempdir().unwrap();
    let counter = tools.path().join("calls.log");
    let ffprobe = fake_ffprobe(tools.path(), &counter);

    let library = tempfile::tempdir().unwrap();
    let root = library.path().canonicalize().unwrap();
    let season = root.join("Show").join("Season 1");
    fs::create_dir_all(&season).unwrap();
    fs::write(season.join("Show - S01E01 - Pilot [HDTV-720p].mkv"), vec![0u8; 100]).unwrap();
    fs::write(season.join("Show - S01E01 - Pilot [Bluray-1080p].mkv"), vec![0u8; 300]).unwrap();
    fs::write(season.join("Show - S01E02 - Second [HDTV-720p].mkv"), vec![0u8; 100]).unwrap();

    let config = Config {
        roots: vec![root],
        probe_scope: ProbeScope::Dupes,
        ffprobe_path: ffprobe,
        probe_cache_path: Some(tools.path().join("cache").join("ffprobe_cache.json")),
        protected_paths: vec![PathBuf::from("/usr")],
        ..Config::default()
    };

    let first = run(&config).await;
    assert_matches!(
        first.summary.probe,
        ProbeStatus::Completed {
            probed: 2,
            cached: 0,
            errors: 0
        }
    );
    assert_eq!(invocations(&counter), 2);

    // Only the duplicate pair was inspected and rescored
    let inspected: Vec<_> = first.files.iter().filter(|f| f.probed.is_some()).collect();
    assert_eq!(inspected.len(), 2);
    assert!(inspected.iter().all(|f| f.resolution() == Some(2160)));
    assert!(!first.summary.degraded);

    let second = run(&config).await;
    assert_matches!(
        second.summary.probe,
        ProbeStatus::Completed {
            probed: 0,
            cached: 2,
            errors: 0
        }
    );
    assert_eq!(invocations(&counter), 2);
    assert_eq!(first.candidates.len(), second.candidates.len());

    // A rewritten file no longer matches its cached fingerprint
    fs::write(season.join("Show - S01E01 - Pilot [HDTV-720p].mkv"), vec![0u8; 150]).unwrap();
    let third = run(&config).await;
    assert_matches!(
        third.summary.probe,
        ProbeStatus::Completed {
            probed: 1,
            cached: 1,
            errors: 0
        }
    );
    assert_eq!(invocations(&counter), 3);
}
