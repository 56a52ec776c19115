use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;

use crate::config::ArchiveConfig;
use crate::error::{Result, SipError};

/// Seam over the external zip/unzip binaries. The pipeline only needs
/// these two operations; tests substitute their own implementation.
#[async_trait]
pub trait ArchiveTool: Send + Sync {
    /// Compress `dir` into `archive`. Must never leave a partial
    /// archive at the destination on failure.
    async fn compress(&self, dir: &Path, archive: &Path) -> Result<()>;

    /// Extract `archive` into `dir`. Must never leave a partial
    /// extraction at the destination on failure.
    async fn extract(&self, archive: &Path, dir: &Path) -> Result<()>;
}

/// Drives configured command templates via the OS, with an enforced
/// timeout. `use_large_tools` selects the large-file-capable templates,
/// needed because domain-crawl zips exceed stock zip/unzip limits.
pub struct ExternalArchiveTool {
    zip_command: Vec<String>,
    unzip_command: Vec<String>,
    timeout: Duration,
}

impl ExternalArchiveTool {
    pub fn from_config(config: &ArchiveConfig) -> Self {
        let (zip_command, unzip_command) = if config.use_large_tools {
            (
                config
                    .large_zip_command
                    .clone()
                    .unwrap_or_else(|| config.zip_command.clone()),
                config
                    .large_unzip_command
                    .clone()
                    .unwrap_or_else(|| config.unzip_command.clone()),
            )
        } else {
            (config.zip_command.clone(), config.unzip_command.clone())
        };
        Self {
            zip_command,
            unzip_command,
            timeout: Duration::from_secs(config.timeout_secs),
        }
    }

    async fn run(&self, template: &[String], archive: &Path, dir: &Path) -> Result<()> {
        let argv = render_template(template, archive, dir);
        let [program, args @ ..] = argv.as_slice() else {
            return Err(SipError::ArchiveTool("empty command template".into()));
        };
        tracing::debug!(program, ?args, "invoking archive tool");

        let mut command = tokio::process::Command::new(program);
        command
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let child = command
            .spawn()
            .map_err(|err| SipError::ArchiveTool(format!("spawn {program}: {err}")))?;

        let output = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| {
                SipError::ArchiveTool(format!(
                    "{program} timed out after {}s",
                    self.timeout.as_secs()
                ))
            })?
            .map_err(|err| SipError::ArchiveTool(format!("wait for {program}: {err}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(SipError::ArchiveTool(format!(
                "{program} failed ({}): {}",
                output.status,
                stderr.trim()
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl ArchiveTool for ExternalArchiveTool {
    async fn compress(&self, dir: &Path, archive: &Path) -> Result<()> {
        // Write next to the destination, rename only on success.
        let tmp = sibling_tmp_path(archive)?;
        let result = self.run(&self.zip_command, &tmp, dir).await;
        match result {
            Ok(()) => {
                if !tmp.exists() {
                    return Err(SipError::ArchiveTool(format!(
                        "archive tool reported success but produced no archive: {}",
                        tmp.display()
                    )));
                }
                std::fs::rename(&tmp, archive)?;
                Ok(())
            }
            Err(err) => {
                if tmp.exists() {
                    let _ = std::fs::remove_file(&tmp);
                }
                Err(err)
            }
        }
    }

    async fn extract(&self, archive: &Path, dir: &Path) -> Result<()> {
        if dir.exists() {
            return Err(SipError::ArchiveTool(format!(
                "extraction destination already exists: {}",
                dir.display()
            )));
        }
        let tmp = sibling_tmp_path(dir)?;
        let result = self.run(&self.unzip_command, archive, &tmp).await;
        match result {
            Ok(()) => {
                std::fs::rename(&tmp, dir)?;
                Ok(())
            }
            Err(err) => {
                if tmp.exists() {
                    let _ = std::fs::remove_dir_all(&tmp);
                }
                Err(err)
            }
        }
    }
}

fn render_template(template: &[String], archive: &Path, dir: &Path) -> Vec<String> {
    let archive = archive.to_string_lossy();
    let dir = dir.to_string_lossy();
    template
        .iter()
        .map(|part| part.replace("{archive}", &archive).replace("{dir}", &dir))
        .collect()
}

fn sibling_tmp_path(path: &Path) -> Result<PathBuf> {
    let parent = path.parent().ok_or_else(|| {
        SipError::ArchiveTool(format!("destination has no parent: {}", path.display()))
    })?;
    let name = path
        .file_name()
        .ok_or_else(|| {
            SipError::ArchiveTool(format!("destination has no file name: {}", path.display()))
        })?
        .to_string_lossy();
    Ok(parent.join(format!(
        ".{}.tmp-{}",
        name,
        uuid::Uuid::new_v4().simple()
    )))
}
