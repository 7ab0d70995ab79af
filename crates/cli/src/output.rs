//! Terminal output helpers shared by the kiln subcommands.
//!
//! Status lines go to stdout, errors and warnings to stderr. Colors are only
//! emitted when the target stream supports them.

use std::time::Duration;

use anyhow::Context;
use clap::ValueEnum;
use owo_colors::{OwoColorize, Stream};

#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub enum OutputFormat {
  #[default]
  Text,
  Json,
}

impl OutputFormat {
  pub fn is_json(self) -> bool {
    matches!(self, OutputFormat::Json)
  }
}

pub mod symbols {
  pub const SUCCESS: &str = "✓";
  pub const ERROR: &str = "✗";
  pub const WARNING: &str = "⚠";
  pub const INFO: &str = "•";
  pub const ARROW: &str = "→";
  pub const STALE: &str = "~";
}

/// Fingerprints are long; twelve characters are enough to tell items apart on screen.
pub fn truncate_hash(hash: &str) -> &str {
  let len = hash.len().min(12);
  &hash[..len]
}

pub fn format_bytes(bytes: u64) -> String {
  const KB: u64 = 1024;
  const MB: u64 = KB * 1024;
  const GB: u64 = MB * 1024;

  match bytes {
    b if b >= GB => format!("{:.1} GB", b as f64 / GB as f64),
    b if b >= MB => format!("{:.1} MB", b as f64 / MB as f64),
    b if b >= KB => format!("{:.1} KB", b as f64 / KB as f64),
    b => format!("{} B", b),
  }
}

/// Session durations: milliseconds under a second, then seconds, then minutes.
pub fn format_duration(duration: Duration) -> String {
  let secs = duration.as_secs();
  if secs >= 60 {
    format!("{}m {}s", secs / 60, secs % 60)
  } else if secs > 0 {
    format!("{}.{:02}s", secs, duration.subsec_millis() / 10)
  } else {
    format!("{}ms", duration.subsec_millis())
  }
}

pub fn print_success(message: &str) {
  println!(
    "{} {}",
    symbols::SUCCESS.if_supports_color(Stream::Stdout, |s| s.green()),
    message
  );
}

pub fn print_error(message: &str) {
  eprintln!(
    "{} {}",
    symbols::ERROR.if_supports_color(Stream::Stderr, |s| s.red()),
    message.if_supports_color(Stream::Stderr, |s| s.red())
  );
}

pub fn print_warning(message: &str) {
  eprintln!(
    "{} {}",
    symbols::WARNING.if_supports_color(Stream::Stderr, |s| s.yellow()),
    message.if_supports_color(Stream::Stderr, |s| s.yellow())
  );
}

pub fn print_info(message: &str) {
  println!(
    "{} {}",
    symbols::INFO.if_supports_color(Stream::Stdout, |s| s.blue()),
    message
  );
}

/// Indented continuation line under an error.
pub fn print_error_detail(label: &str, detail: &str) {
  eprintln!(
    "    {} {}",
    label.if_supports_color(Stream::Stderr, |s| s.dimmed()),
    detail
  );
}

pub fn print_stat(label: &str, value: &str) {
  println!(
    "  {}: {}",
    label.if_supports_color(Stream::Stdout, |s| s.dimmed()),
    value
  );
}

pub fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
  let json = serde_json::to_string_pretty(value).context("Failed to serialize to JSON")?;
  println!("{}", json);
  Ok(())
}
