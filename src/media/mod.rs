//! Records shared by every audit phase

pub mod evidence;
pub mod file;

pub use evidence::{
    ManagedEvidence, MatchKind, Protection, ProtectionEvidence, ProtectionKind, QueueEvidence,
    RegistryApp, SeedingEvidence,
};
pub use file::{
    ContentType, DuplicateKey, EpisodeNumber, FsIdentity, InodeKey, MediaFile, normalize_title,
};
