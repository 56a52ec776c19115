use std::path::{Path, PathBuf};

use anyhow::Context as _;

use crate::cli::{PackageArgs, VerifyArgs};
use crate::config::SipConfig;
use crate::pipeline::{BatchResult, RunOptions, SipPipeline};

pub async fn package(args: PackageArgs) -> anyhow::Result<()> {
    let mut config = load_config(args.config.as_deref())?;
    if let Some(root) = &args.artifact_root {
        config.artifact_root = PathBuf::from(root);
    }
    if let Some(root) = &args.output_root {
        config.output_root = PathBuf::from(root);
    }
    if args.large_archives {
        config.archive.use_large_tools = true;
    }

    let pipeline = SipPipeline::new(config).context("construct pipeline")?;
    let options = RunOptions {
        dry_run: args.dry_run,
        zip: args.zip,
    };

    tracing::info!(label = %args.label, jobs = args.jobs.len(), dry_run = args.dry_run, "packaging batch");
    let result = pipeline.run(&args.label, &args.jobs, options).await;
    report(&result, args.json)
}

pub async fn verify(args: VerifyArgs) -> anyhow::Result<()> {
    let mut config = load_config(args.config.as_deref())?;
    if let Some(root) = &args.artifact_root {
        config.artifact_root = PathBuf::from(root);
    }

    let pipeline = SipPipeline::new(config).context("construct pipeline")?;
    let options = RunOptions {
        dry_run: true,
        zip: false,
    };

    let result = pipeline.run("verify", &args.jobs, options).await;
    report(&result, args.json)
}

fn load_config(path: Option<&str>) -> anyhow::Result<SipConfig> {
    match path {
        Some(path) => SipConfig::load(Path::new(path)),
        None => Ok(SipConfig::default()),
    }
}

fn report(result: &BatchResult, as_json: bool) -> anyhow::Result<()> {
    if as_json {
        let json = serde_json::to_string_pretty(result).context("serialize batch result")?;
        println!("{json}");
    } else {
        for outcome in &result.outcomes {
            match &outcome.reason {
                Some(reason) => println!("{}\t{}\t{reason}", outcome.job, outcome.state),
                None => println!("{}\t{}", outcome.job, outcome.state),
            }
        }
    }

    let failed = result.failed_count();
    if failed > 0 {
        anyhow::bail!("{failed} of {} jobs failed", result.outcomes.len());
    }
    Ok(())
}
