//! Minimal CLI parsing for configuration overrides

use std::env;
use std::path::PathBuf;

use anyhow::{Context, Result, bail};

use crate::config::{Config, split_paths};
use crate::services::prober::ProbeScope;

pub const USAGE: &str = "\
usage: librarian-audit [options]

  --roots <a,b,...>        scan roots (overrides ROOTS)
  --delete-under <path>    deletion boundary (overrides DELETE_UNDER)
  --probe-scope <scope>    none | dupes | all (overrides FFPROBE_SCOPE)
  --max-files <n>          stop scanning after n files
  --include-hardlinked     allow candidates that have other hardlinks
  --output <file>          write the full report as JSON
  -h, --help               show this help
";

#[derive(Debug, Default, PartialEq)]
pub struct CliOptions {
    pub roots: Option<Vec<PathBuf>>,
    pub delete_under: Option<PathBuf>,
    pub probe_scope: Option<ProbeScope>,
    pub max_files: Option<usize>,
    pub include_hardlinked: bool,
    pub output: Option<PathBuf>,
    pub help: bool,
}

impl CliOptions {
    pub fn from_args() -> Result<Self> {
        Self::parse(env::args().skip(1))
    }

    /// Accepts both `--flag value` and `--flag=value`
    pub fn parse(args: impl IntoIterator<Item = String>) -> Result<Self> {
        let mut options = CliOptions::default();
        let mut args = args.into_iter();

        while let Some(arg) = args.next() {
            let (flag, inline) = match arg.split_once('=') {
                Some((flag, value)) if flag.starts_with("--") => (flag.to_string(), Some(value.to_string())),
                _ => (arg.clone(), None),
            };
            let mut value = |name: &str| -> Result<String> {
                match inline.clone().or_else(|| args.next()) {
                    Some(v) => Ok(v),
                    None => bail!("{} needs a value", name),
                }
            };

            match flag.as_str() {
                "--roots" => options.roots = Some(split_paths(&value("--roots")?)),
                "--delete-under" => options.delete_under = Some(PathBuf::from(value("--delete-under")?)),
                "--probe-scope" => {
                    let raw = value("--probe-scope")?;
                    options.probe_scope =
                        Some(ProbeScope::parse(&raw).with_context(|| format!("invalid probe scope {:?}", raw))?);
                }
                "--max-files" => {
                    let raw = value("--max-files")?;
                    options.max_files = Some(raw.parse().with_context(|| format!("invalid file limit {:?}", raw))?);
                }
                "--include-hardlinked" => options.include_hardlinked = true,
                "--output" => options.output = Some(PathBuf::from(value("--output")?)),
                "-h" | "--help" => options.help = true,
                other => bail!("unknown argument {:?}\n\n{}", other, USAGE),
            }
        }
        Ok(options)
    }

    pub fn apply(&self, config: &mut Config) {
        if let Some(roots) = &self.roots {
            config.roots = roots.clone();
        }
        if let Some(delete_under) = &self.delete_under {
            config.delete_under = Some(delete_under.clone());
        }
        if let Some(scope) = self.probe_scope {
            config.probe_scope = scope;
        }
        if let Some(max_files) = self.max_files {
            config.max_files = max_files;
        }
        if self.include_hardlinked {
            config.include_hardlinked = true;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Result<CliOptions> {
        CliOptions::parse(args.iter().map(|s| s.to_string()))
    }

    #[test]
    fn test_parse_overrides() {
        let options = parse(&[
            "--roots",
            "/a,/b",
            "--probe-scope=all",
            "--max-files",
            "10",
            "--include-hardlinked",
            "--output",
            "report.json",
        ])
        .unwrap();
        assert_eq!(options.roots, Some(vec![PathBuf::from("/a"), PathBuf::from("/b")]));
        assert_eq!(options.probe_scope, Some(ProbeScope::All));
        assert_eq!(options.max_files, Some(10));
        assert!(options.include_hardlinked);
        assert_eq!(options.output, Some(PathBuf::from("report.json")));
    }

    #[test]
    fn test_rejects_unknown_and_incomplete() {
        assert!(parse(&["--bogus"]).is_err());
        assert!(parse(&["--roots"]).is_err());
        assert!(parse(&["--probe-scope", "some"]).is_err());
    }

    #[test]
    fn test_apply() {
        let mut config = Config::default();
        parse(&["--delete-under", "/mnt/user/media", "--max-files=5"])
            .unwrap()
            .apply(&mut config);
        assert_eq!(config.delete_under, Some(PathBuf::from("/mnt/user/media")));
        assert_eq!(config.max_files, 5);
    }
}
