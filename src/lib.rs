//! Librarian audit: finds duplicate media files, scores every copy and
//! proposes a deletion plan that never touches files still needed by a
//! torrent client or a library manager.

pub mod audit;
pub mod cli;
pub mod config;
pub mod error;
pub mod media;
pub mod services;

pub use audit::{AuditReport, Auditor, RunSummary, run_audit};
pub use config::Config;
pub use error::{AuditError, AuditResult};
