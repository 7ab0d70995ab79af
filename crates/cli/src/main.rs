mod cmd;
mod output;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use cmd::{BuildArgs, CleanArgs, StatusArgs};

/// kiln - incremental asset build pipeline
#[derive(Parser)]
#[command(name = "kiln")]
#[command(author, version, about, long_about = None)]
struct Cli {
  /// Enable verbose output
  #[arg(short, long, global = true)]
  verbose: bool,

  #[command(subcommand)]
  command: Commands,
}

#[derive(Subcommand)]
enum Commands {
  /// Build source assets into platform artifacts
  Build(BuildArgs),

  /// Delete every artifact and cache entry recorded for a target
  Clean(CleanArgs),

  /// Show cached items and whether they are up to date
  Status(StatusArgs),
}

fn main() -> Result<()> {
  let cli = Cli::parse();

  let default_level = if cli.verbose { "info" } else { "warn" };
  let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
  tracing_subscriber::fmt()
    .with_env_filter(filter)
    .with_writer(std::io::stderr)
    .without_time()
    .init();

  match cli.command {
    Commands::Build(args) => cmd::cmd_build(args),
    Commands::Clean(args) => cmd::cmd_clean(args),
    Commands::Status(args) => cmd::cmd_status(args, cli.verbose),
  }
}
