//! Implementation of the `kiln status` command.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use anyhow::Result;
use clap::Args;
use owo_colors::{OwoColorize, Stream};
use serde::Serialize;

use kiln_lib::BuildCache;
use kiln_lib::cache_lock::{CacheLock, LockMode};

use super::TargetArgs;
use crate::output::{OutputFormat, print_info, print_json, print_stat, symbols, truncate_hash};

#[derive(Debug, Args)]
pub struct StatusArgs {
  #[command(flatten)]
  pub target: TargetArgs,

  /// Output format
  #[arg(short, long, value_enum, default_value_t)]
  pub output: OutputFormat,
}

#[derive(Serialize)]
struct ItemStatus {
  fingerprint: String,
  asset: String,
  processor: String,
  output: Option<String>,
  up_to_date: bool,
  #[serde(skip_serializing_if = "Option::is_none")]
  stale_reason: Option<String>,
  built_at_unix: u64,
}

#[derive(Serialize)]
struct StatusReport {
  platform: String,
  profile: String,
  output_dir: String,
  cache_dir: String,
  items: Vec<ItemStatus>,
}

pub fn cmd_status(args: StatusArgs, verbose: bool) -> Result<()> {
  let config = args.target.config()?;
  let _lock = CacheLock::acquire(&config.intermediate_dir, LockMode::Shared, "status")?;

  let cache = BuildCache::load(config.cache_dir());
  let mut entries = cache.entries();
  entries.sort_by(|a, b| a.asset.cmp(&b.asset).then_with(|| a.fingerprint.cmp(&b.fingerprint)));

  let items: Vec<ItemStatus> = entries
    .iter()
    .map(|entry| {
      let stale = cache.stale_reason(&entry.fingerprint);
      ItemStatus {
        fingerprint: entry.fingerprint.to_string(),
        asset: entry.asset.clone(),
        processor: entry.processor.clone(),
        output: entry.outputs.first().map(|o| o.path.display().to_string()),
        up_to_date: stale.is_none(),
        stale_reason: stale.map(|r| r.to_string()),
        built_at_unix: entry.built_at_unix,
      }
    })
    .collect();

  let report = StatusReport {
    platform: config.platform.to_string(),
    profile: config.profile.to_string(),
    output_dir: config.output_dir.display().to_string(),
    cache_dir: config.cache_dir().display().to_string(),
    items,
  };

  if args.output.is_json() {
    return print_json(&report);
  }

  print_info(&format!("Target {} ({})", report.platform, report.profile));
  print_stat("Output", &report.output_dir);
  print_stat("Cache", &report.cache_dir);
  println!();

  if report.items.is_empty() {
    println!("No cached items.");
    return Ok(());
  }

  let now = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_secs();
  let stale_count = report.items.iter().filter(|i| !i.up_to_date).count();

  for item in &report.items {
    let symbol = if item.up_to_date {
      symbols::SUCCESS.if_supports_color(Stream::Stdout, |s| s.green()).to_string()
    } else {
      symbols::STALE.if_supports_color(Stream::Stdout, |s| s.yellow()).to_string()
    };
    println!(
      "  {} {} {}",
      symbol,
      item.asset,
      truncate_hash(&item.fingerprint).if_supports_color(Stream::Stdout, |s| s.dimmed())
    );
    if let Some(reason) = &item.stale_reason {
      println!("      {}", reason.if_supports_color(Stream::Stdout, |s| s.yellow()));
    }
    if verbose {
      let age = Duration::from_secs(now.saturating_sub(item.built_at_unix));
      println!("      processor: {}", item.processor);
      if let Some(output) = &item.output {
        println!("      output: {}", output);
      }
      println!("      built: {} ago", humantime::format_duration(age));
    }
  }

  println!();
  print_stat("Items", &report.items.len().to_string());
  print_stat("Stale", &stale_count.to_string());
  Ok(())
}
