//! Fatal errors that stop an audit before any scanning happens

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AuditError {
    #[error("scan root does not exist: {0}")]
    MissingRoot(PathBuf),

    #[error("scan root is not a directory: {0}")]
    RootNotDirectory(PathBuf),

    #[error("no scan roots configured")]
    NoRoots,

    #[error("deletion root {0} is a protected system path")]
    UnsafeDeleteRoot(PathBuf),

    #[error("deletion root {path} cannot be resolved: {source}")]
    DeleteRootUnresolvable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid value for {name}: {value:?}")]
    InvalidValue { name: &'static str, value: String },

    #[error("invalid path mapping {0:?}, expected `remote:local`")]
    InvalidPathMapping(String),

    #[error("invalid {prefix} instance configuration: {message}")]
    InvalidInstances { prefix: String, message: String },
}

pub type AuditResult<T> = std::result::Result<T, AuditError>;
