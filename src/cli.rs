use clap::{Args, Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(author, version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Package completed crawl jobs into BagIt-wrapped SIPs.
    Package(PackageArgs),
    /// Verify job artifact sets without writing anything.
    Verify(VerifyArgs),
}

#[derive(Debug, Args)]
pub struct PackageArgs {
    /// Job identifier (`<stream>/<launch>`); repeatable.
    #[arg(long = "job", value_name = "ID", required = true)]
    pub jobs: Vec<String>,

    /// Batch label; names the output subdirectory.
    #[arg(long)]
    pub label: String,

    /// YAML config file (defaults apply when omitted).
    #[arg(long)]
    pub config: Option<String>,

    /// Override the configured crawler output root.
    #[arg(long)]
    pub artifact_root: Option<String>,

    /// Override the configured package destination root.
    #[arg(long)]
    pub output_root: Option<String>,

    /// Verify only; write nothing under the destination root.
    #[arg(long, default_value_t = false)]
    pub dry_run: bool,

    /// Compress each finished bag into a zip beside it.
    #[arg(long, default_value_t = false)]
    pub zip: bool,

    /// Use the large-file-capable archive tools from the config.
    #[arg(long, default_value_t = false)]
    pub large_archives: bool,

    /// Print the batch result as JSON on stdout.
    #[arg(long, default_value_t = false)]
    pub json: bool,
}

#[derive(Debug, Args)]
pub struct VerifyArgs {
    /// Job identifier (`<stream>/<launch>`); repeatable.
    #[arg(long = "job", value_name = "ID", required = true)]
    pub jobs: Vec<String>,

    /// YAML config file (defaults apply when omitted).
    #[arg(long)]
    pub config: Option<String>,

    /// Override the configured crawler output root.
    #[arg(long)]
    pub artifact_root: Option<String>,

    /// Print the batch result as JSON on stdout.
    #[arg(long, default_value_t = false)]
    pub json: bool,
}
