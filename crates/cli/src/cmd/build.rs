//! Implementation of the `kiln build` command.

use std::collections::BTreeMap;
use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::Args;
use owo_colors::{OwoColorize, Stream};
use serde::Serialize;
use tracing::debug;

use kiln_lib::cache_lock::{CacheLock, LockMode};
use kiln_lib::{BuildRequest, Orchestrator, ParameterValue, PluginRegistry, SessionReport};

use super::TargetArgs;
use crate::output::{
  OutputFormat, format_duration, print_error, print_error_detail, print_info, print_json, print_stat, print_success,
  print_warning, symbols,
};

#[derive(Debug, Args)]
pub struct BuildArgs {
  /// Source files to build, relative to the source root
  #[arg(required = true)]
  pub files: Vec<PathBuf>,

  #[command(flatten)]
  pub target: TargetArgs,

  /// Build configuration name (e.g. Debug, Release)
  #[arg(long = "config", value_name = "NAME")]
  pub configuration: Option<String>,

  /// Ignore the cache and rebuild every requested asset
  #[arg(long)]
  pub rebuild: bool,

  /// Stop outstanding builds after the first failure
  #[arg(long)]
  pub fail_fast: bool,

  /// Maximum number of requests built concurrently
  #[arg(short, long)]
  pub jobs: Option<usize>,

  /// Importer to use instead of selecting by extension
  #[arg(long)]
  pub importer: Option<String>,

  /// Processor to use instead of the importer's default
  #[arg(long)]
  pub processor: Option<String>,

  /// Processor parameter override, KEY=VALUE (repeatable)
  #[arg(short, long = "param", value_name = "KEY=VALUE", value_parser = parse_param)]
  pub params: Vec<(String, String)>,

  /// Output format
  #[arg(short, long, value_enum, default_value_t)]
  pub output: OutputFormat,
}

fn parse_param(raw: &str) -> Result<(String, String), String> {
  match raw.split_once('=') {
    Some((key, value)) if !key.trim().is_empty() => Ok((key.trim().to_string(), value.to_string())),
    _ => Err(format!("expected KEY=VALUE, got '{}'", raw)),
  }
}

#[derive(Serialize)]
struct JsonFailure {
  request: String,
  chain: Vec<String>,
  error: String,
  root_cause: String,
}

#[derive(Serialize)]
struct JsonReport<'a> {
  succeeded: &'a [kiln_lib::BuiltAsset],
  failures: Vec<JsonFailure>,
  built: usize,
  cached: usize,
  failed: usize,
  cancelled: usize,
  duration_ms: u128,
  warnings: &'a BTreeMap<String, Vec<String>>,
}

impl BuildArgs {
  fn requests(&self) -> Vec<BuildRequest> {
    self
      .files
      .iter()
      .map(|file| {
        let mut request = BuildRequest::new(file);
        if let Some(importer) = &self.importer {
          request = request.with_importer(importer);
        }
        if let Some(processor) = &self.processor {
          request = request.with_processor(processor);
        }
        for (key, value) in &self.params {
          request = request.with_parameter(key, ParameterValue::Text(value.clone()));
        }
        request
      })
      .collect()
  }
}

pub fn cmd_build(args: BuildArgs) -> Result<()> {
  let mut config = args
    .target
    .config()?
    .with_rebuild(args.rebuild)
    .with_fail_fast(args.fail_fast);
  if let Some(name) = &args.configuration {
    config = config.with_configuration(name);
  }
  if let Some(jobs) = args.jobs {
    config = config.with_parallelism(jobs);
  }

  let _lock = CacheLock::acquire(&config.intermediate_dir, LockMode::Exclusive, "build")?;

  let orchestrator =
    Orchestrator::open(config, PluginRegistry::with_builtins()).context("Failed to open build session")?;

  let requests = args.requests();
  debug!(requests = requests.len(), platform = %orchestrator.config().platform, "starting build session");
  let runtime = tokio::runtime::Runtime::new().context("Failed to create async runtime")?;
  let report = runtime.block_on(orchestrator.build_all(requests));

  if args.output.is_json() {
    print_json(&json_report(&report))?;
  } else {
    print_report(&orchestrator, &report);
  }

  if !report.is_success() {
    bail!("{} of {} requests failed", report.failures.len(), report.total());
  }
  Ok(())
}

fn json_report(report: &SessionReport) -> JsonReport<'_> {
  JsonReport {
    succeeded: &report.succeeded,
    failures: report
      .failures
      .iter()
      .map(|f| JsonFailure {
        request: f.request.clone(),
        chain: f.chain.clone(),
        error: f.error.to_string(),
        root_cause: f.root_cause().to_string(),
      })
      .collect(),
    built: report.built,
    cached: report.cached,
    failed: report.failed,
    cancelled: report.cancelled,
    duration_ms: report.duration.as_millis(),
    warnings: &report.warnings,
  }
}

fn print_report(orchestrator: &Orchestrator, report: &SessionReport) {
  let output_dir = &orchestrator.config().output_dir;

  for built in &report.succeeded {
    let filename = built.reference.filename();
    let shown = filename.strip_prefix(output_dir).unwrap_or(filename);
    let status = if built.cached { "(cached)" } else { "(built)" };
    println!(
      "  {} {} {} {} {}",
      symbols::SUCCESS.if_supports_color(Stream::Stdout, |s| s.green()),
      built.asset,
      symbols::ARROW,
      shown.display(),
      status.if_supports_color(Stream::Stdout, |s| s.dimmed())
    );
  }

  for (asset, warnings) in &report.warnings {
    for warning in warnings {
      print_warning(&format!("{}: {}", asset, warning));
    }
  }

  for failure in &report.failures {
    print_error(&format!("{}: {}", failure.request, failure.error));
    if failure.chain.len() > 1 {
      print_error_detail("via", &failure.chain.join(&format!(" {} ", symbols::ARROW)));
    }
    let root = failure.root_cause();
    if root.to_string() != failure.error.to_string() {
      print_error_detail("caused by:", &root.to_string());
    }
  }

  println!();
  if report.is_success() {
    print_success("Build complete");
  } else {
    print_info("Build finished with errors");
  }
  print_stat("Built", &report.built.to_string());
  print_stat("Cached", &report.cached.to_string());
  if report.failed > 0 {
    print_stat("Failed", &report.failed.to_string());
  }
  if report.cancelled > 0 {
    print_stat("Cancelled", &report.cancelled.to_string());
  }
  print_stat("Duration", &format_duration(report.duration));
}
