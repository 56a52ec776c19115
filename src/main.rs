use std::process::ExitCode;

use anyhow::Context as _;
use clap::Parser as _;

#[tokio::main]
async fn main() -> ExitCode {
    if let Err(err) = try_main().await {
        eprintln!("{err:#}");
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}

async fn try_main() -> anyhow::Result<()> {
    sippack::logging::init().context("init logging")?;

    let cli = sippack::cli::Cli::parse();
    tracing::debug!(?cli, "parsed cli");

    match cli.command {
        sippack::cli::Command::Package(args) => {
            sippack::package::package(args).await.context("package")?;
        }
        sippack::cli::Command::Verify(args) => {
            sippack::package::verify(args).await.context("verify")?;
        }
    }

    Ok(())
}
