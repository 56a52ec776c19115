use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;

use crate::checksum::{ChecksumAlgorithm, compute_file_checksum};
use crate::error::{Result, SipError};
use crate::mets::FinalizedMets;

const BAGIT_DECLARATION: &str = "BagIt-Version: 0.97\nTag-File-Character-Encoding: UTF-8\n";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BagSummary {
    pub payload_files: u64,
    pub payload_bytes: u64,
}

/// Apply BagIt conventions over a staged SIP directory.
///
/// On entry `bag_dir` holds the METS record (`mets_file_name`) plus the
/// artifact group directories. Those directories are moved under
/// `data/`, every payload file is re-hashed and compared against the
/// METS-recorded checksum, and the manifest/tag files are written.
/// The METS record stays at bag root as a tag file, so the payload
/// manifest lists exactly the job artifacts.
///
/// Re-running on an already-bagged directory fails explicitly; it never
/// rewrites an existing manifest.
pub fn create_bag(
    bag_dir: &Path,
    mets: &FinalizedMets,
    mets_file_name: &str,
    bagging_date: NaiveDate,
) -> Result<BagSummary> {
    if bag_dir.join("bagit.txt").exists() {
        return Err(SipError::BagConsistency(format!(
            "bag already exists: {}",
            bag_dir.display()
        )));
    }
    let data_dir = bag_dir.join("data");
    if data_dir.exists() {
        return Err(SipError::BagConsistency(format!(
            "data directory already present: {}",
            data_dir.display()
        )));
    }

    let algorithm = mets.algorithm();

    // Move the payload under data/. The METS record is the only
    // top-level entry left behind.
    std::fs::create_dir(&data_dir)?;
    for entry in std::fs::read_dir(bag_dir)? {
        let entry = entry?;
        let name = entry.file_name();
        if name == "data" || name.to_str() == Some(mets_file_name) {
            continue;
        }
        std::fs::rename(entry.path(), data_dir.join(&name))?;
    }

    // Re-hash every payload file and cross-check against the METS
    // inventory; a mismatch is a packaging error, never ignored.
    let mut payload = collect_files(&data_dir, &data_dir)?;
    payload.sort();

    let recorded = mets.recorded_files();
    let mut manifest = String::new();
    let mut payload_bytes = 0u64;
    for relative in &payload {
        let bag_path = format!("data/{}", to_slash(relative));
        let Some(record) = recorded.get(&bag_path) else {
            return Err(SipError::BagConsistency(format!(
                "payload file not recorded in METS: {bag_path}"
            )));
        };
        let actual = compute_file_checksum(&data_dir.join(relative), algorithm)?;
        if actual != record.checksum {
            return Err(SipError::BagConsistency(format!(
                "checksum mismatch for {bag_path}: mets {} vs payload {actual}",
                record.checksum
            )));
        }
        payload_bytes += record.size;
        let _ = writeln!(manifest, "{actual}  {bag_path}");
    }
    for bag_path in recorded.keys() {
        let on_disk = payload
            .iter()
            .any(|relative| format!("data/{}", to_slash(relative)) == *bag_path);
        if !on_disk {
            return Err(SipError::BagConsistency(format!(
                "mets-recorded file missing from payload: {bag_path}"
            )));
        }
    }

    let manifest_name = format!("manifest-{}.txt", algorithm.manifest_name());
    std::fs::write(bag_dir.join(&manifest_name), manifest.as_bytes())?;
    std::fs::write(bag_dir.join("bagit.txt"), BAGIT_DECLARATION.as_bytes())?;

    let bag_info = format!(
        "Bag-Software-Agent: {} {}\n\
         Bagging-Date: {}\n\
         External-Identifier: {}\n\
         Payload-Oxum: {payload_bytes}.{}\n",
        env!("CARGO_PKG_NAME"),
        env!("CARGO_PKG_VERSION"),
        bagging_date.format("%Y-%m-%d"),
        mets.object_id(),
        payload.len()
    );
    std::fs::write(bag_dir.join("bag-info.txt"), bag_info.as_bytes())?;

    let mut tagmanifest = String::new();
    let mut tag_files = vec![
        "bag-info.txt".to_string(),
        "bagit.txt".to_string(),
        manifest_name.clone(),
        mets_file_name.to_string(),
    ];
    tag_files.sort();
    for tag_file in &tag_files {
        let digest = compute_file_checksum(&bag_dir.join(tag_file), algorithm)?;
        let _ = writeln!(tagmanifest, "{digest}  {tag_file}");
    }
    std::fs::write(
        bag_dir.join(format!("tagmanifest-{}.txt", algorithm.manifest_name())),
        tagmanifest.as_bytes(),
    )?;

    Ok(BagSummary {
        payload_files: payload.len() as u64,
        payload_bytes,
    })
}

/// Re-read the payload manifest and recompute every checksum. Used by
/// tests and by callers that want to re-check a bag after transfer.
pub fn validate_bag(bag_dir: &Path, algorithm: ChecksumAlgorithm) -> Result<BagSummary> {
    if !bag_dir.join("bagit.txt").exists() {
        return Err(SipError::BagConsistency(format!(
            "not a bag (no bagit.txt): {}",
            bag_dir.display()
        )));
    }
    let manifest_path = bag_dir.join(format!("manifest-{}.txt", algorithm.manifest_name()));
    let manifest = std::fs::read_to_string(&manifest_path).map_err(|err| {
        SipError::BagConsistency(format!(
            "unreadable manifest {}: {err}",
            manifest_path.display()
        ))
    })?;

    let mut payload_files = 0u64;
    let mut payload_bytes = 0u64;
    for line in manifest.lines() {
        let Some((expected, bag_path)) = line.split_once("  ") else {
            return Err(SipError::BagConsistency(format!(
                "malformed manifest line: {line}"
            )));
        };
        let file_path = bag_dir.join(bag_path);
        let metadata = std::fs::metadata(&file_path).map_err(|err| {
            SipError::BagConsistency(format!("missing payload file {bag_path}: {err}"))
        })?;
        let actual = compute_file_checksum(&file_path, algorithm)?;
        if actual != expected {
            return Err(SipError::BagConsistency(format!(
                "checksum mismatch for {bag_path}: manifest {expected} vs payload {actual}"
            )));
        }
        payload_files += 1;
        payload_bytes += metadata.len();
    }

    Ok(BagSummary {
        payload_files,
        payload_bytes,
    })
}

fn collect_files(dir: &Path, base: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if entry.file_type()?.is_dir() {
            files.extend(collect_files(&path, base)?);
        } else {
            let relative = path
                .strip_prefix(base)
                .map_err(|_| {
                    SipError::BagConsistency(format!("path escapes bag: {}", path.display()))
                })?
                .to_path_buf();
            files.push(relative);
        }
    }
    Ok(files)
}

fn to_slash(path: &Path) -> String {
    path.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone as _;
    use chrono::Utc;

    use super::*;
    use crate::config::SipConfig;
    use crate::job::JobId;
    use crate::mets::MetsBuilder;
    use crate::verify::{VerificationResult, verify_job};

    /// Builds a verified fixture job, stages it like the pipeline does
    /// (copy artifacts + METS into a fresh dir) and returns the staged
    /// dir plus the finalized METS.
    fn staged_sip(root: &Path) -> (PathBuf, FinalizedMets) {
        let mut config = SipConfig::default();
        config.artifact_root = root.join("crawls");
        let id = JobId::parse("daily/20150708110924").unwrap();
        let job_dir = id.job_dir(&config.artifact_root);
        for (rel, contents) in [
            ("warcs/TEST-00000.warc.gz", b"warc bytes".as_slice()),
            ("logs/crawl.log.cp00001", b"log bytes".as_slice()),
            ("reports/crawl-report.txt", b"report bytes".as_slice()),
        ] {
            let path = job_dir.join(rel);
            std::fs::create_dir_all(path.parent().unwrap()).unwrap();
            std::fs::write(&path, contents).unwrap();
        }

        let VerificationResult::Verified(job) = verify_job(&config, &id) else {
            panic!("fixture job should verify");
        };
        let created = Utc.with_ymd_and_hms(2015, 7, 8, 12, 0, 0).unwrap();
        let mets = MetsBuilder::new(&config, created)
            .build(&job)
            .unwrap()
            .finalize()
            .unwrap();

        let staged = root.join("stage");
        for artifact in &job.artifacts {
            let src = job_dir.join(&artifact.relative_path);
            let dst = staged.join(&artifact.relative_path);
            std::fs::create_dir_all(dst.parent().unwrap()).unwrap();
            std::fs::copy(&src, &dst).unwrap();
        }
        crate::mets::write_document(&mets, &staged.join("20150708110924.xml")).unwrap();
        (staged, mets)
    }

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2015, 7, 8).unwrap()
    }

    #[test]
    fn bags_payload_and_writes_manifests() {
        let root = tempfile::tempdir().unwrap();
        let (staged, mets) = staged_sip(root.path());

        let summary = create_bag(&staged, &mets, "20150708110924.xml", date()).unwrap();
        assert_eq!(summary.payload_files, 3);

        let manifest =
            std::fs::read_to_string(staged.join("manifest-sha512.txt")).unwrap();
        assert_eq!(manifest.lines().count(), 3);
        assert!(manifest.contains("data/warcs/TEST-00000.warc.gz"));

        // METS stays at bag root; payload moved under data/.
        assert!(staged.join("20150708110924.xml").is_file());
        assert!(staged.join("data/warcs/TEST-00000.warc.gz").is_file());
        assert!(!staged.join("warcs").exists());

        let bag_info = std::fs::read_to_string(staged.join("bag-info.txt")).unwrap();
        assert!(bag_info.contains("External-Identifier: daily/20150708110924"));
        assert!(bag_info.contains(&format!("Payload-Oxum: {}.3", summary.payload_bytes)));

        let tagmanifest =
            std::fs::read_to_string(staged.join("tagmanifest-sha512.txt")).unwrap();
        assert!(tagmanifest.contains("20150708110924.xml"));

        assert_eq!(
            validate_bag(&staged, mets.algorithm()).unwrap(),
            summary
        );
    }

    #[test]
    fn second_bagging_fails_explicitly_and_keeps_manifest() {
        let root = tempfile::tempdir().unwrap();
        let (staged, mets) = staged_sip(root.path());
        create_bag(&staged, &mets, "20150708110924.xml", date()).unwrap();
        let before = std::fs::read_to_string(staged.join("manifest-sha512.txt")).unwrap();

        let err = create_bag(&staged, &mets, "20150708110924.xml", date()).unwrap_err();
        assert!(err.to_string().contains("bag already exists"), "{err}");

        let after = std::fs::read_to_string(staged.join("manifest-sha512.txt")).unwrap();
        assert_eq!(before, after);
    }

    #[test]
    fn payload_diverging_from_mets_is_a_bag_error() {
        let root = tempfile::tempdir().unwrap();
        let (staged, mets) = staged_sip(root.path());
        std::fs::write(staged.join("logs/crawl.log.cp00001"), b"tampered").unwrap();

        let err = create_bag(&staged, &mets, "20150708110924.xml", date()).unwrap_err();
        assert!(matches!(err, SipError::BagConsistency(_)));
    }

    #[test]
    fn stray_payload_file_is_rejected() {
        let root = tempfile::tempdir().unwrap();
        let (staged, mets) = staged_sip(root.path());
        std::fs::write(staged.join("warcs/stray.warc.gz"), b"unexpected").unwrap();

        let err = create_bag(&staged, &mets, "20150708110924.xml", date()).unwrap_err();
        assert!(err.to_string().contains("not recorded in METS"), "{err}");
    }

    #[test]
    fn validate_detects_post_bag_corruption() {
        let root = tempfile::tempdir().unwrap();
        let (staged, mets) = staged_sip(root.path());
        create_bag(&staged, &mets, "20150708110924.xml", date()).unwrap();

        std::fs::write(
            staged.join("data/reports/crawl-report.txt"),
            b"bit rot",
        )
        .unwrap();
        let err = validate_bag(&staged, mets.algorithm()).unwrap_err();
        assert!(matches!(err, SipError::BagConsistency(_)));
    }
}
