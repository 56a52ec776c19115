use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::checksum::{ChecksumAlgorithm, compute_file_checksum};
use crate::error::{Result, SipError};

/// Identifies one crawl run: a stream name (e.g. `daily`, `weekly`,
/// `domain`) plus a launch timestamp of 8 to 14 digits, matching the
/// crawler's output directory conventions.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobId {
    pub stream: String,
    pub launch: String,
}

fn job_id_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^([a-z][a-z0-9-]*)/([0-9]{8,14})$").expect("job id regex"))
}

impl JobId {
    pub fn parse(raw: &str) -> Result<Self> {
        let captures = job_id_pattern()
            .captures(raw)
            .ok_or_else(|| SipError::InvalidJobId(raw.to_string()))?;
        Ok(Self {
            stream: captures[1].to_string(),
            launch: captures[2].to_string(),
        })
    }

    /// Directory holding this job's crawler output under the artifact root.
    pub fn job_dir(&self, artifact_root: &Path) -> PathBuf {
        artifact_root.join(&self.stream).join(&self.launch)
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.stream, self.launch)
    }
}

/// A single file produced by a job. Owned by its job; the checksum is
/// computed on first use and cached for the rest of the run.
#[derive(Debug, Clone)]
pub struct Artifact {
    /// Path relative to the job directory (e.g. `warcs/xyz.warc.gz`).
    pub relative_path: PathBuf,
    /// Category name from the verifier config (`warc`, `log`, ...).
    pub category: String,
    /// Group directory the category lives under (`warcs`, `logs`, ...).
    pub group: String,
    pub mimetype: String,
    pub size: u64,
    checksum: OnceLock<String>,
}

impl Artifact {
    pub fn new(
        relative_path: PathBuf,
        category: impl Into<String>,
        group: impl Into<String>,
        mimetype: impl Into<String>,
        size: u64,
    ) -> Self {
        Self {
            relative_path,
            category: category.into(),
            group: group.into(),
            mimetype: mimetype.into(),
            size,
            checksum: OnceLock::new(),
        }
    }

    /// Hex checksum of the artifact contents, computed lazily against
    /// `job_dir` and cached once computed.
    pub fn checksum(&self, job_dir: &Path, algorithm: ChecksumAlgorithm) -> Result<String> {
        if let Some(cached) = self.checksum.get() {
            return Ok(cached.clone());
        }
        let value = compute_file_checksum(&job_dir.join(&self.relative_path), algorithm)?;
        Ok(self.checksum.get_or_init(|| value).clone())
    }
}

/// A job that passed verification, together with the artifact set found
/// on disk. Immutable once the pipeline proceeds past verification.
#[derive(Debug, Clone)]
pub struct VerifiedJob {
    pub id: JobId,
    pub job_dir: PathBuf,
    /// Stable-sorted by relative path so downstream output is
    /// independent of filesystem iteration order.
    pub artifacts: Vec<Artifact>,
}
