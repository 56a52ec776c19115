use std::path::{Path, PathBuf};

use crate::config::{CategorySpec, SipConfig};
use crate::job::{Artifact, JobId, VerifiedJob};

/// Per-job verification outcome, consumed immediately by the pipeline.
#[derive(Debug)]
pub enum VerificationResult {
    Verified(VerifiedJob),
    Failed { reason: String },
}

/// Confirm a job has the artifacts required for packaging.
///
/// Read-only filesystem probing; fails closed. Any missing or malformed
/// required artifact marks the whole job failed so partial packaging of
/// an incomplete job is never attempted. I/O failures while probing are
/// verification failures, not panics.
pub fn verify_job(config: &SipConfig, id: &JobId) -> VerificationResult {
    let job_dir = id.job_dir(&config.artifact_root);
    if !job_dir.is_dir() {
        return VerificationResult::Failed {
            reason: format!("job directory not found: {}", job_dir.display()),
        };
    }

    let mut artifacts = Vec::new();
    for category in &config.categories {
        match collect_category(&job_dir, category) {
            Ok(mut found) => {
                if found.is_empty() && category.required {
                    return VerificationResult::Failed {
                        reason: format!("missing artifact: {}", category.name),
                    };
                }
                artifacts.append(&mut found);
            }
            Err(reason) => return VerificationResult::Failed { reason },
        }
    }

    artifacts.sort_by(|a, b| a.relative_path.cmp(&b.relative_path));
    VerificationResult::Verified(VerifiedJob {
        id: id.clone(),
        job_dir,
        artifacts,
    })
}

/// List files in the category subdirectory matching its pattern.
/// Returns a human-readable reason on any structural problem.
fn collect_category(
    job_dir: &Path,
    category: &CategorySpec,
) -> std::result::Result<Vec<Artifact>, String> {
    let pattern = category
        .compiled_pattern()
        .map_err(|err| err.to_string())?;

    let category_dir = job_dir.join(&category.subdir);
    if !category_dir.is_dir() {
        // Absent directory is fine for optional categories; required
        // ones report the category as missing.
        if category.required {
            return Err(format!("missing artifact: {}", category.name));
        }
        return Ok(Vec::new());
    }

    let entries = std::fs::read_dir(&category_dir)
        .map_err(|err| format!("inaccessible path {}: {err}", category_dir.display()))?;

    let mut found = Vec::new();
    for entry in entries {
        let entry =
            entry.map_err(|err| format!("inaccessible path {}: {err}", category_dir.display()))?;
        let name = entry.file_name();
        let Some(name) = name.to_str() else {
            return Err(format!(
                "malformed artifact name in {}",
                category_dir.display()
            ));
        };
        if !pattern.is_match(name) {
            continue;
        }

        let metadata = entry
            .metadata()
            .map_err(|err| format!("inaccessible path {}: {err}", entry.path().display()))?;
        if !metadata.is_file() {
            continue;
        }
        if metadata.len() == 0 {
            return Err(format!(
                "empty artifact: {}",
                PathBuf::from(&category.subdir).join(name).display()
            ));
        }

        found.push(Artifact::new(
            PathBuf::from(&category.subdir).join(name),
            &category.name,
            &category.subdir,
            &category.mimetype,
            metadata.len(),
        ));
    }

    Ok(found)
}
