use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, SipError>;

/// Errors produced while packaging a single job. Each variant is scoped
/// to the job that raised it; sibling jobs keep going.
#[derive(Debug, Error)]
pub enum SipError {
    #[error("verification failed: {0}")]
    Verification(String),

    #[error("invalid job identifier: {0}")]
    InvalidJobId(String),

    #[error("checksum failed for {path}: {source}")]
    Checksum {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("mets build failed: {0}")]
    MetsBuild(String),

    #[error("archive tool error: {0}")]
    ArchiveTool(String),

    #[error("bag inconsistent: {0}")]
    BagConsistency(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("xml serialization error: {0}")]
    Xml(#[from] quick_xml::se::SeError),
}
