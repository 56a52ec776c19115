use std::path::{Path, PathBuf};

use anyhow::Context as _;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::checksum::ChecksumAlgorithm;
use crate::error::{Result, SipError};

/// Explicit packager configuration, passed into the pipeline at
/// construction instead of looked up from ambient settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SipConfig {
    /// Root under which crawler output lives (`<root>/<stream>/<launch>/...`).
    pub artifact_root: PathBuf,
    /// Root under which finished packages are written.
    pub output_root: PathBuf,
    pub checksum: ChecksumAlgorithm,
    pub categories: Vec<CategorySpec>,
    pub archive: ArchiveConfig,
}

/// One artifact category the verifier looks for inside a job directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CategorySpec {
    /// Category name used in failure reasons (`missing artifact: report`).
    pub name: String,
    /// Subdirectory of the job directory holding the files.
    pub subdir: String,
    /// Regex a file name must match to count for this category.
    pub pattern: String,
    pub required: bool,
    pub mimetype: String,
}

impl CategorySpec {
    pub fn compiled_pattern(&self) -> Result<Regex> {
        Regex::new(&self.pattern).map_err(|err| {
            SipError::Config(format!(
                "bad pattern for category {}: {err}",
                self.name
            ))
        })
    }
}

/// External zip/unzip invocation. Command templates are argv vectors
/// with `{archive}` and `{dir}` placeholders. The large-file variants
/// exist because domain-crawl zips exceed what stock zip/unzip handle.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ArchiveConfig {
    pub zip_command: Vec<String>,
    pub unzip_command: Vec<String>,
    pub large_zip_command: Option<Vec<String>>,
    pub large_unzip_command: Option<Vec<String>>,
    /// Select the large-file-capable templates when set.
    pub use_large_tools: bool,
    pub timeout_secs: u64,
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            zip_command: vec_of(&["zip", "-q", "-r", "{archive}", "{dir}"]),
            unzip_command: vec_of(&["unzip", "-q", "{archive}", "-d", "{dir}"]),
            large_zip_command: Some(vec_of(&["7z", "a", "-tzip", "{archive}", "{dir}"])),
            large_unzip_command: Some(vec_of(&["7z", "x", "{archive}", "-o{dir}"])),
            use_large_tools: false,
            timeout_secs: 3600,
        }
    }
}

impl Default for SipConfig {
    fn default() -> Self {
        Self {
            artifact_root: PathBuf::from("/heritrix/output"),
            output_root: PathBuf::from("/heritrix/sips"),
            checksum: ChecksumAlgorithm::Sha512,
            categories: vec![
                CategorySpec {
                    name: "warc".to_string(),
                    subdir: "warcs".to_string(),
                    pattern: r"\.warc\.gz$".to_string(),
                    required: true,
                    mimetype: "application/warc".to_string(),
                },
                CategorySpec {
                    name: "viral".to_string(),
                    subdir: "viral".to_string(),
                    pattern: r"\.warc\.gz$".to_string(),
                    required: false,
                    mimetype: "application/warc".to_string(),
                },
                CategorySpec {
                    name: "log".to_string(),
                    subdir: "logs".to_string(),
                    pattern: r"^crawl\.log".to_string(),
                    required: true,
                    mimetype: "text/plain".to_string(),
                },
                CategorySpec {
                    name: "report".to_string(),
                    subdir: "reports".to_string(),
                    pattern: r"report".to_string(),
                    required: true,
                    mimetype: "text/plain".to_string(),
                },
            ],
            archive: ArchiveConfig::default(),
        }
    }
}

impl SipConfig {
    /// Read a YAML config file; missing keys fall back to defaults.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("read config: {}", path.display()))?;
        let config: SipConfig = serde_yaml::from_str(&contents)
            .with_context(|| format!("parse config: {}", path.display()))?;
        config
            .validate()
            .with_context(|| format!("validate config: {}", path.display()))?;
        Ok(config)
    }

    /// Compile every category pattern so bad regexes fail up front.
    pub fn validate(&self) -> Result<()> {
        if self.categories.is_empty() {
            return Err(SipError::Config("no artifact categories configured".into()));
        }
        for category in &self.categories {
            category.compiled_pattern()?;
        }
        if self.archive.timeout_secs == 0 {
            return Err(SipError::Config("archive timeout must be non-zero".into()));
        }
        Ok(())
    }
}

fn vec_of(parts: &[&str]) -> Vec<String> {
    parts.iter().map(|s| s.to_string()).collect()
}
