//! Pipeline configuration.
//!
//! Directories and target settings default from `KILN_*` environment variables
//! and can be overridden with the `with_*` builders.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::consts::{
  CACHE_DIR, DEFAULT_CONFIGURATION, DEFAULT_INTERMEDIATE_DIR, DEFAULT_OUTPUT_DIR, ENV_CONFIGURATION,
  ENV_INTERMEDIATE_DIR, ENV_OUTPUT_DIR, ENV_PLATFORM, ENV_PROFILE, ENV_SOURCE_ROOT,
};

/// Platform artifacts are compiled for, e.g. `"linux"` or `"android"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TargetPlatform(pub String);

impl TargetPlatform {
  pub fn new(name: impl Into<String>) -> Self {
    Self(name.into().to_lowercase())
  }

  /// The platform this process runs on.
  pub fn host() -> Self {
    Self::new(std::env::consts::OS)
  }

  pub fn as_str(&self) -> &str {
    &self.0
  }
}

impl fmt::Display for TargetPlatform {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.0)
  }
}

/// Capability tier of the target device.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TargetProfile {
  Reach,
  #[default]
  HiDef,
}

impl fmt::Display for TargetProfile {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      TargetProfile::Reach => f.write_str("Reach"),
      TargetProfile::HiDef => f.write_str("HiDef"),
    }
  }
}

impl FromStr for TargetProfile {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.to_ascii_lowercase().as_str() {
      "reach" => Ok(TargetProfile::Reach),
      "hidef" => Ok(TargetProfile::HiDef),
      other => Err(format!("unknown target profile '{}' (expected Reach or HiDef)", other)),
    }
  }
}

/// Configuration for a build session.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
  /// Root that source identities are made relative to.
  pub source_root: PathBuf,

  /// Where compiled artifacts are written.
  pub output_dir: PathBuf,

  /// Where the build cache and lock live.
  pub intermediate_dir: PathBuf,

  pub platform: TargetPlatform,
  pub profile: TargetProfile,

  /// Build configuration name, e.g. `Debug` or `Release`.
  pub configuration: String,

  /// Maximum number of top-level requests built concurrently.
  pub parallelism: usize,

  /// Ignore cache hits and rebuild everything requested.
  pub rebuild: bool,

  /// Cancel outstanding requests after the first failure.
  pub fail_fast: bool,
}

impl Default for PipelineConfig {
  fn default() -> Self {
    Self::from_env()
  }
}

impl PipelineConfig {
  /// Configuration rooted at `source_root`, with remaining settings from the environment.
  pub fn new(source_root: impl Into<PathBuf>) -> Self {
    let platform = env_var(ENV_PLATFORM).map(TargetPlatform::new).unwrap_or_else(TargetPlatform::host);
    Self::for_platform(source_root, platform)
  }

  /// Like [`new`](Self::new), but targeting `platform`. Default directories
  /// are derived from this platform rather than the environment's.
  pub fn for_platform(source_root: impl Into<PathBuf>, platform: TargetPlatform) -> Self {
    let source_root = source_root.into();
    let profile = env_var(ENV_PROFILE).and_then(|p| p.parse().ok()).unwrap_or_default();
    let configuration = env_var(ENV_CONFIGURATION).unwrap_or_else(|| DEFAULT_CONFIGURATION.to_string());

    let output_dir = env_var(ENV_OUTPUT_DIR)
      .map(PathBuf::from)
      .unwrap_or_else(|| source_root.join(DEFAULT_OUTPUT_DIR).join(platform.as_str()));
    let intermediate_dir = env_var(ENV_INTERMEDIATE_DIR)
      .map(PathBuf::from)
      .unwrap_or_else(|| source_root.join(DEFAULT_INTERMEDIATE_DIR).join(platform.as_str()));

    Self {
      source_root,
      output_dir,
      intermediate_dir,
      platform,
      profile,
      configuration,
      parallelism: num_cpus(),
      rebuild: false,
      fail_fast: false,
    }
  }

  /// Configuration rooted at `KILN_SOURCE_ROOT`, or the current directory.
  pub fn from_env() -> Self {
    Self::new(env_var(ENV_SOURCE_ROOT).map(PathBuf::from).unwrap_or_else(|| PathBuf::from(".")))
  }

  pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
    self.output_dir = dir.into();
    self
  }

  pub fn with_intermediate_dir(mut self, dir: impl Into<PathBuf>) -> Self {
    self.intermediate_dir = dir.into();
    self
  }

  pub fn with_platform(mut self, platform: TargetPlatform) -> Self {
    self.platform = platform;
    self
  }

  pub fn with_profile(mut self, profile: TargetProfile) -> Self {
    self.profile = profile;
    self
  }

  pub fn with_configuration(mut self, configuration: impl Into<String>) -> Self {
    self.configuration = configuration.into();
    self
  }

  pub fn with_parallelism(mut self, parallelism: usize) -> Self {
    self.parallelism = parallelism.max(1);
    self
  }

  pub fn with_rebuild(mut self, rebuild: bool) -> Self {
    self.rebuild = rebuild;
    self
  }

  pub fn with_fail_fast(mut self, fail_fast: bool) -> Self {
    self.fail_fast = fail_fast;
    self
  }

  pub fn cache_dir(&self) -> PathBuf {
    self.intermediate_dir.join(CACHE_DIR)
  }

  /// Resolve all directories to absolute paths, creating output and intermediate dirs.
  pub(crate) fn prepare(mut self) -> std::io::Result<Self> {
    let cwd = std::env::current_dir()?;
    self.source_root = absolute(&cwd, &self.source_root);
    std::fs::create_dir_all(&self.output_dir)?;
    std::fs::create_dir_all(&self.intermediate_dir)?;
    self.output_dir = absolute(&cwd, &self.output_dir);
    self.intermediate_dir = absolute(&cwd, &self.intermediate_dir);
    Ok(self)
  }
}

fn absolute(cwd: &Path, path: &Path) -> PathBuf {
  crate::util::paths::resolve(cwd, path)
}

fn env_var(name: &str) -> Option<String> {
  std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

/// Get the number of CPUs for default parallelism.
fn num_cpus() -> usize {
  std::thread::available_parallelism().map(|p| p.get()).unwrap_or(4)
}
