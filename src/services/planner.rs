//! Deletion planner
//!
//! Picks one keeper per duplicate group and decides, for every other member,
//! whether it may be proposed for deletion. Nothing is ever deleted here.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::path_safety::PathSafety;
use crate::media::{DuplicateKey, MediaFile, ProtectionEvidence, ProtectionKind};

#[derive(Debug, Clone, Copy, Default)]
pub struct PlannerOptions {
    /// Allow members whose inode has other links
    pub include_hardlinked: bool,
}

/// Why a member ended up where it did
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "verdict", content = "detail", rename_all = "snake_case")]
pub enum MemberVerdict {
    Keep,
    Candidate,
    Protected(ProtectionKind),
    Hardlinked,
    UnsafePath,
}

impl fmt::Display for MemberVerdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MemberVerdict::Keep => write!(f, "keep"),
            MemberVerdict::Candidate => write!(f, "delete candidate"),
            MemberVerdict::Protected(kind) => write!(f, "protected ({})", kind),
            MemberVerdict::Hardlinked => write!(f, "hardlinked"),
            MemberVerdict::UnsafePath => write!(f, "outside deletion root"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupMember {
    /// Index into the inventory
    pub index: usize,
    pub path: PathBuf,
    pub score: i32,
    pub keep: bool,
    pub verdict: MemberVerdict,
    /// Why the member is protected, including on the keeper
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub evidence: Vec<ProtectionEvidence>,
}

/// Members are ordered best first
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DuplicateGroup {
    pub key: DuplicateKey,
    pub best: usize,
    pub best_path: PathBuf,
    pub members: Vec<GroupMember>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeletionCandidate {
    pub path: PathBuf,
    pub best_path: PathBuf,
    pub score: i32,
    pub best_score: i32,
    pub score_delta: i32,
    pub size: u64,
    pub link_count: u64,
    pub rationale: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkipCounters {
    pub seeding: usize,
    pub managed: usize,
    pub queued: usize,
    pub hardlinked: usize,
    pub unsafe_path: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeletionPlan {
    pub groups: Vec<DuplicateGroup>,
    pub candidates: Vec<DeletionCandidate>,
    pub skipped: SkipCounters,
    pub reclaimable_bytes: u64,
}

/// Total order, best first: score, resolution, mtime, size, then the
/// smallest path
pub fn compare_members(a: &MediaFile, b: &MediaFile) -> Ordering {
    b.score
        .cmp(&a.score)
        .then_with(|| b.resolution().unwrap_or(0).cmp(&a.resolution().unwrap_or(0)))
        .then_with(|| b.modified.cmp(&a.modified))
        .then_with(|| b.size.cmp(&a.size))
        .then_with(|| a.path.cmp(&b.path))
}

pub struct DeletionPlanner {
    safety: PathSafety,
    options: PlannerOptions,
}

impl DeletionPlanner {
    pub fn new(safety: PathSafety, options: PlannerOptions) -> Self {
        Self { safety, options }
    }

    /// Plan every set. Sets with fewer than two members are ignored.
    pub fn plan(&self, files: &[MediaFile], sets: &BTreeMap<DuplicateKey, Vec<usize>>) -> DeletionPlan {
        let mut plan = DeletionPlan::default();

        for (key, members) in sets {
            let mut ordered: Vec<usize> = members.iter().copied().filter(|&i| i < files.len()).collect();
            if ordered.len() < 2 {
                continue;
            }
            ordered.sort_by(|&a, &b| compare_members(&files[a], &files[b]));
            ordered.dedup();

            let best_idx = ordered[0];
            let best = &files[best_idx];
            let mut group = DuplicateGroup {
                key: key.clone(),
                best: best_idx,
                best_path: best.path.clone(),
                members: Vec::with_capacity(ordered.len()),
            };

            for &idx in &ordered {
                let file = &files[idx];
                let verdict = if idx == best_idx {
                    MemberVerdict::Keep
                } else {
                    self.judge(file, &mut plan.skipped)
                };

                if verdict == MemberVerdict::Candidate {
                    plan.reclaimable_bytes += file.size;
                    plan.candidates.push(DeletionCandidate {
                        path: file.path.clone(),
                        best_path: best.path.clone(),
                        score: file.score,
                        best_score: best.score,
                        score_delta: best.score - file.score,
                        size: file.size,
                        link_count: file.identity.link_count,
                        rationale: format!(
                            "duplicate of {} ({}); score {} vs {}: {}",
                            best.file_name(),
                            key,
                            file.score,
                            best.score,
                            file.score_reason
                        ),
                    });
                } else if verdict != MemberVerdict::Keep {
                    debug!(path = %file.path.display(), verdict = %verdict, "Member kept out of plan");
                }

                group.members.push(GroupMember {
                    index: idx,
                    path: file.path.clone(),
                    score: file.score,
                    keep: idx == best_idx,
                    verdict,
                    evidence: file.protection.evidence(),
                });
            }
            plan.groups.push(group);
        }

        info!(
            groups = plan.groups.len(),
            candidates = plan.candidates.len(),
            reclaimable_bytes = plan.reclaimable_bytes,
            skipped_seeding = plan.skipped.seeding,
            skipped_managed = plan.skipped.managed,
            skipped_queued = plan.skipped.queued,
            skipped_hardlinked = plan.skipped.hardlinked,
            skipped_unsafe = plan.skipped.unsafe_path,
            "Deletion plan ready"
        );
        plan
    }

    fn judge(&self, file: &MediaFile, skipped: &mut SkipCounters) -> MemberVerdict {
        if let Some(kind) = file.protection.blocking_kind() {
            match kind {
                ProtectionKind::Seeding => skipped.seeding += 1,
                ProtectionKind::LibraryManaged => skipped.managed += 1,
                ProtectionKind::DownloadQueue => skipped.queued += 1,
            }
            return MemberVerdict::Protected(kind);
        }
        if file.identity.link_count > 1 && !self.options.include_hardlinked {
            skipped.hardlinked += 1;
            return MemberVerdict::Hardlinked;
        }
        if !self.safety.is_safe(&file.path) {
            skipped.unsafe_path += 1;
            return MemberVerdict::UnsafePath;
        }
        MemberVerdict::Candidate
    }
}
