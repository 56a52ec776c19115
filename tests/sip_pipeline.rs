use std::path::{Path, PathBuf};

use sippack::bagit;
use sippack::config::SipConfig;
use sippack::pipeline::{JobState, RunOptions, SipPipeline};

const JOB: &str = "daily/20150708110924";
const LAUNCH: &str = "20150708110924";

fn write(path: &Path, contents: &[u8]) {
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, contents).unwrap();
}

fn complete_job_tree(artifact_root: &Path) {
    let dir = artifact_root.join("daily").join(LAUNCH);
    write(
        &dir.join("warcs/BL-20150708110924-00000.warc.gz"),
        b"pretend warc payload",
    );
    write(
        &dir.join("logs/crawl.log.cp00001-20150708110924"),
        b"2015-07-08 crawl log line",
    );
    write(&dir.join("reports/crawl-report.txt"), b"crawl report body");
}

fn fixture_config(root: &Path) -> SipConfig {
    let mut config = SipConfig::default();
    config.artifact_root = root.join("crawls");
    config.output_root = root.join("sips");
    config
}

fn run_pipeline(config: SipConfig, jobs: &[&str], options: RunOptions) -> sippack::pipeline::BatchResult {
    let jobs: Vec<String> = jobs.iter().map(|j| j.to_string()).collect();
    let pipeline = SipPipeline::new(config).unwrap();
    tokio::runtime::Runtime::new()
        .unwrap()
        .block_on(pipeline.run("daily", &jobs, options))
}

#[test]
fn complete_job_produces_a_valid_bag() {
    let root = tempfile::tempdir().unwrap();
    let config = fixture_config(root.path());
    complete_job_tree(&config.artifact_root);
    let checksum = config.checksum;
    let output_root = config.output_root.clone();

    let result = run_pipeline(config, &[JOB], RunOptions::default());
    assert_eq!(result.outcomes.len(), 1);
    assert_eq!(result.outcomes[0].state, JobState::Complete);
    assert_eq!(result.outcomes[0].reason, None);

    let bag_dir = output_root.join("daily").join(LAUNCH);
    assert!(bag_dir.join("bagit.txt").is_file());
    assert!(bag_dir.join("bag-info.txt").is_file());
    assert!(bag_dir.join(format!("{LAUNCH}.xml")).is_file());

    let manifest = std::fs::read_to_string(bag_dir.join("manifest-sha512.txt")).unwrap();
    assert_eq!(manifest.lines().count(), 3);
    for entry in [
        "data/warcs/BL-20150708110924-00000.warc.gz",
        "data/logs/crawl.log.cp00001-20150708110924",
        "data/reports/crawl-report.txt",
    ] {
        assert!(manifest.contains(entry), "manifest missing {entry}");
        assert!(bag_dir.join(entry).is_file(), "payload missing {entry}");
    }

    // Round-trip: every manifest entry exists and re-hashes cleanly.
    let summary = bagit::validate_bag(&bag_dir, checksum).unwrap();
    assert_eq!(summary.payload_files, 3);

    // The METS record references the payload it sits next to.
    let mets = std::fs::read_to_string(bag_dir.join(format!("{LAUNCH}.xml"))).unwrap();
    assert!(mets.contains("OBJID=\"daily/20150708110924\""));
    assert!(mets.contains("xlink:href=\"data/warcs/BL-20150708110924-00000.warc.gz\""));

    // No staging leftovers.
    let leftovers: Vec<_> = std::fs::read_dir(output_root.join("daily"))
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
        .filter(|name| name.starts_with('.'))
        .collect();
    assert!(leftovers.is_empty(), "staging leftovers: {leftovers:?}");
}

#[test]
fn missing_report_fails_verification_with_no_writes() {
    let root = tempfile::tempdir().unwrap();
    let config = fixture_config(root.path());
    complete_job_tree(&config.artifact_root);
    std::fs::remove_dir_all(
        config
            .artifact_root
            .join("daily")
            .join(LAUNCH)
            .join("reports"),
    )
    .unwrap();
    let output_root = config.output_root.clone();

    let result = run_pipeline(config, &[JOB], RunOptions::default());
    assert_eq!(result.outcomes[0].state, JobState::VerifyFailed);
    assert_eq!(
        result.outcomes[0].reason.as_deref(),
        Some("missing artifact: report")
    );

    assert!(
        !output_root.exists(),
        "verify-failed job must not touch the destination root"
    );
}

#[test]
fn dry_run_verifies_without_writing() {
    let root = tempfile::tempdir().unwrap();
    let config = fixture_config(root.path());
    complete_job_tree(&config.artifact_root);
    let output_root = config.output_root.clone();

    let result = run_pipeline(
        config,
        &[JOB],
        RunOptions {
            dry_run: true,
            zip: false,
        },
    );
    assert_eq!(result.outcomes[0].state, JobState::Verified);
    assert!(!output_root.exists());
}

#[test]
fn one_failed_job_does_not_block_siblings() {
    let root = tempfile::tempdir().unwrap();
    let config = fixture_config(root.path());
    complete_job_tree(&config.artifact_root);
    let output_root = config.output_root.clone();

    let result = run_pipeline(
        config,
        &["daily/19990101000000", JOB, "not-a-job-id"],
        RunOptions::default(),
    );
    assert_eq!(result.outcomes[0].state, JobState::VerifyFailed);
    assert_eq!(result.outcomes[1].state, JobState::Complete);
    assert_eq!(result.outcomes[2].state, JobState::VerifyFailed);
    assert_eq!(result.failed_count(), 2);

    assert!(output_root.join("daily").join(LAUNCH).join("bagit.txt").is_file());
}

#[test]
fn rerunning_a_completed_job_reports_bag_already_exists() {
    let root = tempfile::tempdir().unwrap();
    let config = fixture_config(root.path());
    complete_job_tree(&config.artifact_root);

    let first = run_pipeline(config.clone(), &[JOB], RunOptions::default());
    assert_eq!(first.outcomes[0].state, JobState::Complete);

    let manifest_path = config
        .output_root
        .join("daily")
        .join(LAUNCH)
        .join("manifest-sha512.txt");
    let before = std::fs::read_to_string(&manifest_path).unwrap();

    let second = run_pipeline(config, &[JOB], RunOptions::default());
    assert_eq!(second.outcomes[0].state, JobState::BagFailed);
    assert!(
        second.outcomes[0]
            .reason
            .as_deref()
            .unwrap()
            .contains("bag already exists"),
        "{:?}",
        second.outcomes[0].reason
    );

    // The existing manifest is untouched.
    let after = std::fs::read_to_string(&manifest_path).unwrap();
    assert_eq!(before, after);
}

#[test]
fn default_archive_tool_failure_is_bag_failed_and_large_tool_succeeds() {
    let root = tempfile::tempdir().unwrap();
    let mut config = fixture_config(root.path());
    complete_job_tree(&config.artifact_root);

    // Stand-ins for the external binaries: the stock tool chokes (as it
    // does on oversized zips), the large-file-capable one works.
    config.archive.zip_command = ["sh", "-c", "echo 'zip error: entry too large' >&2; exit 12"]
        .iter()
        .map(|s| s.to_string())
        .collect();
    config.archive.large_zip_command = Some(
        ["sh", "-c", "touch \"$0\"", "{archive}"]
            .iter()
            .map(|s| s.to_string())
            .collect(),
    );

    let zip_options = RunOptions {
        dry_run: false,
        zip: true,
    };

    let mut failing = config.clone();
    failing.output_root = root.path().join("sips-default-tool");
    let result = run_pipeline(failing.clone(), &[JOB], zip_options);
    assert_eq!(result.outcomes[0].state, JobState::BagFailed);
    let reason = result.outcomes[0].reason.clone().unwrap();
    assert!(reason.contains("archive tool error"), "{reason}");
    assert!(reason.contains("entry too large"), "{reason}");
    assert!(
        !failing
            .output_root
            .join("daily")
            .join(format!("{LAUNCH}.zip"))
            .exists()
    );

    let mut capable = config;
    capable.output_root = root.path().join("sips-large-tool");
    capable.archive.use_large_tools = true;
    let result = run_pipeline(capable.clone(), &[JOB], zip_options);
    assert_eq!(result.outcomes[0].state, JobState::Complete);
    assert!(
        capable
            .output_root
            .join("daily")
            .join(format!("{LAUNCH}.zip"))
            .is_file()
    );
}

#[test]
fn optional_viral_artifacts_are_packaged_when_present() {
    let root = tempfile::tempdir().unwrap();
    let config = fixture_config(root.path());
    complete_job_tree(&config.artifact_root);
    write(
        &config
            .artifact_root
            .join("daily")
            .join(LAUNCH)
            .join("viral/BL-viral-00000.warc.gz"),
        b"quarantined warc",
    );
    let output_root = config.output_root.clone();
    let checksum = config.checksum;

    let result = run_pipeline(config, &[JOB], RunOptions::default());
    assert_eq!(result.outcomes[0].state, JobState::Complete);

    let bag_dir = output_root.join("daily").join(LAUNCH);
    let manifest = std::fs::read_to_string(bag_dir.join("manifest-sha512.txt")).unwrap();
    assert_eq!(manifest.lines().count(), 4);
    assert!(manifest.contains("data/viral/BL-viral-00000.warc.gz"));
    assert_eq!(
        bagit::validate_bag(&bag_dir, checksum).unwrap().payload_files,
        4
    );
}

#[test]
fn config_rejects_unknown_keys() {
    let root = tempfile::tempdir().unwrap();
    let path = root.path().join("bad.yaml");
    std::fs::write(&path, "artifact_root: /crawls\nnot_a_key: 1\n").unwrap();
    assert!(SipConfig::load(&path).is_err());
}

#[test]
fn yaml_config_drives_the_pipeline() {
    let root = tempfile::tempdir().unwrap();
    let artifact_root = root.path().join("crawls");
    let output_root = root.path().join("sips");
    complete_job_tree(&artifact_root);

    let config_path = root.path().join("sippack.yaml");
    std::fs::write(
        &config_path,
        format!(
            "artifact_root: {}\noutput_root: {}\nchecksum: sha256\n",
            artifact_root.display(),
            output_root.display()
        ),
    )
    .unwrap();

    let config = SipConfig::load(&config_path).unwrap();
    let result = run_pipeline(config, &[JOB], RunOptions::default());
    assert_eq!(result.outcomes[0].state, JobState::Complete);

    let bag_dir: PathBuf = output_root.join("daily").join(LAUNCH);
    assert!(bag_dir.join("manifest-sha256.txt").is_file());
    let mets = std::fs::read_to_string(bag_dir.join(format!("{LAUNCH}.xml"))).unwrap();
    assert!(mets.contains("CHECKSUMTYPE=\"SHA-256\""));
}
