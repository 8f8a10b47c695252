//! Prefix substitution from a collaborator's view of paths to ours
//!
//! A torrent client in a container may see `/data/torrents/x.mkv` where the
//! scanner sees `/mnt/user/data/torrents/x.mkv`. Mappings are tried in the
//! configured order and the first matching prefix wins.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{AuditError, AuditResult};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathMapping {
    /// Prefix as the collaborator reports it
    pub remote: String,
    /// Same location on the scanning host
    pub local: String,
}

impl PathMapping {
    pub fn new(remote: &str, local: &str) -> Self {
        Self {
            remote: trim_slash(remote),
            local: trim_slash(local),
        }
    }

    fn apply(&self, path: &str) -> Option<String> {
        let rest = path.strip_prefix(&self.remote)?;
        if rest.is_empty() || rest.starts_with('/') || self.remote.is_empty() {
            Some(format!("{}{}", self.local, rest))
        } else {
            None
        }
    }
}

fn trim_slash(value: &str) -> String {
    let trimmed = value.trim();
    let stripped = trimmed.trim_end_matches('/');
    if stripped.is_empty() && trimmed.starts_with('/') {
        String::new()
    } else {
        stripped.to_string()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathMapper {
    mappings: Vec<PathMapping>,
}

impl PathMapper {
    pub fn new(mappings: Vec<PathMapping>) -> Self {
        Self { mappings }
    }

    /// Parse `remote:local` pairs separated by `;` or `,`
    pub fn parse(value: &str) -> AuditResult<Self> {
        let mut mappings = Vec::new();
        for pair in value.split([';', ',']).map(str::trim).filter(|p| !p.is_empty()) {
            let (remote, local) = pair
                .split_once(':')
                .ok_or_else(|| AuditError::InvalidPathMapping(pair.to_string()))?;
            if remote.trim().is_empty() || local.trim().is_empty() {
                return Err(AuditError::InvalidPathMapping(pair.to_string()));
            }
            mappings.push(PathMapping::new(remote, local));
        }
        Ok(Self { mappings })
    }

    pub fn mappings(&self) -> &[PathMapping] {
        &self.mappings
    }

    pub fn is_empty(&self) -> bool {
        self.mappings.is_empty()
    }

    /// Translate a remote path; unmapped paths pass through unchanged
    pub fn map(&self, path: &str) -> PathBuf {
        self.mappings
            .iter()
            .find_map(|m| m.apply(path))
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(path))
    }
}
