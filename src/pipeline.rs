use std::path::Path;
use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;

use crate::archive::{ArchiveTool, ExternalArchiveTool};
use crate::bagit;
use crate::config::SipConfig;
use crate::error::{Result, SipError};
use crate::job::{JobId, VerifiedJob};
use crate::mets::{self, FinalizedMets, MetsBuilder};
use crate::verify::{VerificationResult, verify_job};

/// Per-job pipeline states. Transitions are one-directional; a failed
/// job stops at its failure state and is reported, never retried here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Pending,
    Verifying,
    Verified,
    VerifyFailed,
    BuildingMets,
    MetsBuilt,
    BuildFailed,
    Bagging,
    Complete,
    BagFailed,
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            JobState::Pending => "pending",
            JobState::Verifying => "verifying",
            JobState::Verified => "verified",
            JobState::VerifyFailed => "verify_failed",
            JobState::BuildingMets => "building_mets",
            JobState::MetsBuilt => "mets_built",
            JobState::BuildFailed => "build_failed",
            JobState::Bagging => "bagging",
            JobState::Complete => "complete",
            JobState::BagFailed => "bag_failed",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct JobOutcome {
    pub job: String,
    pub state: JobState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl JobOutcome {
    fn failed(job: &str, state: JobState, reason: impl Into<String>) -> Self {
        Self {
            job: job.to_string(),
            state,
            reason: Some(reason.into()),
        }
    }

    fn ok(job: &str, state: JobState) -> Self {
        Self {
            job: job.to_string(),
            state,
            reason: None,
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(
            self.state,
            JobState::VerifyFailed | JobState::BuildFailed | JobState::BagFailed
        )
    }
}

#[derive(Debug, Serialize)]
pub struct BatchResult {
    pub label: String,
    pub outcomes: Vec<JobOutcome>,
}

impl BatchResult {
    pub fn failed_count(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_failure()).count()
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RunOptions {
    /// Verify only; perform no writes under the output root.
    pub dry_run: bool,
    /// Compress each finished bag into a zip beside it.
    pub zip: bool,
}

/// Drives each job through verify → build-METS → write-METS → bag.
///
/// Jobs are processed sequentially and independently: one job's failure
/// never blocks its siblings, and each job writes only inside its own
/// staging directory until the final rename, so a failed job leaves
/// nothing at the destination.
pub struct SipPipeline {
    config: SipConfig,
    archive: Arc<dyn ArchiveTool>,
}

impl SipPipeline {
    pub fn new(config: SipConfig) -> Result<Self> {
        config.validate()?;
        let archive = Arc::new(ExternalArchiveTool::from_config(&config.archive));
        Ok(Self { config, archive })
    }

    /// Test seam: supply a different archive tool implementation.
    pub fn with_archive_tool(config: SipConfig, archive: Arc<dyn ArchiveTool>) -> Result<Self> {
        config.validate()?;
        Ok(Self { config, archive })
    }

    pub fn config(&self) -> &SipConfig {
        &self.config
    }

    pub async fn run(&self, label: &str, jobs: &[String], options: RunOptions) -> BatchResult {
        let mut outcomes = Vec::with_capacity(jobs.len());
        for raw_id in jobs {
            let outcome = self.package_job(label, raw_id, options).await;
            match &outcome.reason {
                Some(reason) => {
                    tracing::warn!(job = %outcome.job, state = %outcome.state, reason = %reason, "job did not complete")
                }
                None => tracing::info!(job = %outcome.job, state = %outcome.state, "job finished"),
            }
            outcomes.push(outcome);
        }
        BatchResult {
            label: label.to_string(),
            outcomes,
        }
    }

    async fn package_job(&self, label: &str, raw_id: &str, options: RunOptions) -> JobOutcome {
        tracing::info!(job = raw_id, "verifying");
        let id = match JobId::parse(raw_id) {
            Ok(id) => id,
            Err(err) => return JobOutcome::failed(raw_id, JobState::VerifyFailed, err.to_string()),
        };

        let job = match verify_job(&self.config, &id) {
            VerificationResult::Verified(job) => job,
            VerificationResult::Failed { reason } => {
                return JobOutcome::failed(raw_id, JobState::VerifyFailed, reason);
            }
        };

        if options.dry_run {
            return JobOutcome::ok(raw_id, JobState::Verified);
        }

        let batch_dir = self.config.output_root.join(label);
        let final_dir = batch_dir.join(&id.launch);
        if final_dir.exists() {
            return JobOutcome::failed(
                raw_id,
                JobState::BagFailed,
                format!("bag already exists: {}", final_dir.display()),
            );
        }

        tracing::info!(job = raw_id, "building mets");
        let staging = batch_dir.join(format!(
            ".stage-{}-{}",
            id.launch,
            uuid::Uuid::new_v4().simple()
        ));
        let mets_file_name = format!("{}.xml", id.launch);
        let mets = match self.stage_sip(&job, &staging, &mets_file_name) {
            Ok(mets) => mets,
            Err(err) => {
                cleanup_staging(&staging);
                return JobOutcome::failed(raw_id, JobState::BuildFailed, err.to_string());
            }
        };

        tracing::info!(job = raw_id, "bagging");
        if let Err(err) = self.bag_and_commit(&staging, &final_dir, &mets, &mets_file_name) {
            cleanup_staging(&staging);
            return JobOutcome::failed(raw_id, JobState::BagFailed, err.to_string());
        }

        if options.zip {
            let archive_path = batch_dir.join(format!("{}.zip", id.launch));
            tracing::info!(job = raw_id, archive = %archive_path.display(), "zipping bag");
            if let Err(err) = self.archive.compress(&final_dir, &archive_path).await {
                return JobOutcome::failed(raw_id, JobState::BagFailed, err.to_string());
            }
        }

        JobOutcome::ok(raw_id, JobState::Complete)
    }

    /// Build the METS record, copy the artifact set into the staging
    /// directory and write the record beside it.
    fn stage_sip(
        &self,
        job: &VerifiedJob,
        staging: &Path,
        mets_file_name: &str,
    ) -> Result<FinalizedMets> {
        let builder = MetsBuilder::new(&self.config, Utc::now());
        let mets = builder.build(job)?.finalize()?;

        std::fs::create_dir_all(staging)?;
        for artifact in &job.artifacts {
            let src = job.job_dir.join(&artifact.relative_path);
            let dst = staging.join(&artifact.relative_path);
            if let Some(parent) = dst.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::copy(&src, &dst)?;
        }

        mets::write_document(&mets, &staging.join(mets_file_name))?;
        Ok(mets)
    }

    /// Bag the staged directory, then rename it into its final place.
    /// The rename is the commit point: until it happens the destination
    /// does not exist.
    fn bag_and_commit(
        &self,
        staging: &Path,
        final_dir: &Path,
        mets: &FinalizedMets,
        mets_file_name: &str,
    ) -> Result<()> {
        let summary = bagit::create_bag(staging, mets, mets_file_name, Utc::now().date_naive())?;
        tracing::debug!(
            files = summary.payload_files,
            bytes = summary.payload_bytes,
            "bag manifest written"
        );

        if final_dir.exists() {
            return Err(SipError::BagConsistency(format!(
                "bag already exists: {}",
                final_dir.display()
            )));
        }
        std::fs::rename(staging, final_dir)?;
        Ok(())
    }
}

fn cleanup_staging(staging: &Path) {
    if staging.exists()
        && let Err(err) = std::fs::remove_dir_all(staging)
    {
        tracing::warn!(staging = %staging.display(), ?err, "failed to remove staging dir");
    }
}

/// Staging directories live under the batch dir; expose the prefix so
/// operators can recognize leftovers from crashed runs.
pub fn is_staging_dir(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.starts_with(".stage-"))
}
