use anyhow::{Context, Result};
use clap::Args;

use kiln_lib::cache_lock::{CacheLock, LockMode};
use kiln_lib::{Orchestrator, PluginRegistry};

use super::TargetArgs;
use crate::output::{OutputFormat, format_bytes, print_json, print_stat, print_success};

#[derive(Debug, Args)]
pub struct CleanArgs {
  #[command(flatten)]
  pub target: TargetArgs,

  /// Output format
  #[arg(short, long, value_enum, default_value_t)]
  pub output: OutputFormat,
}

pub fn cmd_clean(args: CleanArgs) -> Result<()> {
  let config = args.target.config()?;
  let _lock = CacheLock::acquire(&config.intermediate_dir, LockMode::Exclusive, "clean")?;

  let orchestrator =
    Orchestrator::open(config, PluginRegistry::with_builtins()).context("Failed to open build session")?;
  let stats = orchestrator.clean().context("Failed to clean build output")?;

  if args.output.is_json() {
    return print_json(&stats);
  }

  if stats.entries_removed == 0 && stats.files_removed == 0 {
    print_success("Nothing to clean");
    return Ok(());
  }

  print_success("Clean complete");
  print_stat("Cache entries", &stats.entries_removed.to_string());
  print_stat("Files removed", &stats.files_removed.to_string());
  print_stat("Directories removed", &stats.dirs_removed.to_string());
  print_stat("Space freed", &format_bytes(stats.bytes_freed));
  Ok(())
}
