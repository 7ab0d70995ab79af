mod build;
mod clean;
mod status;

use std::path::PathBuf;

use anyhow::{Context, Result, anyhow};
use clap::Args;

use kiln_lib::{PipelineConfig, TargetPlatform, TargetProfile};

pub use build::{BuildArgs, cmd_build};
pub use clean::{CleanArgs, cmd_clean};
pub use status::{StatusArgs, cmd_status};

/// Where sources live and which target to build for.
///
/// Unset flags fall back to the `KILN_*` environment variables.
#[derive(Debug, Clone, Args)]
pub struct TargetArgs {
  /// Root directory that asset paths are relative to
  #[arg(long, value_name = "DIR")]
  pub source_root: Option<PathBuf>,

  /// Directory compiled artifacts are written to
  #[arg(long, value_name = "DIR")]
  pub output_dir: Option<PathBuf>,

  /// Directory holding the build cache
  #[arg(long, value_name = "DIR")]
  pub intermediate_dir: Option<PathBuf>,

  /// Target platform (defaults to the host OS)
  #[arg(long)]
  pub platform: Option<String>,

  /// Target profile: Reach or HiDef
  #[arg(long)]
  pub profile: Option<String>,
}

impl TargetArgs {
  pub fn config(&self) -> Result<PipelineConfig> {
    let base = match &self.source_root {
      Some(root) => {
        let root = dunce::canonicalize(root).with_context(|| format!("Source root not found: {}", root.display()))?;
        PipelineConfig::new(root)
      }
      None => PipelineConfig::from_env(),
    };

    let mut config = match &self.platform {
      Some(platform) => PipelineConfig::for_platform(base.source_root, TargetPlatform::new(platform)),
      None => base,
    };

    if let Some(dir) = &self.output_dir {
      config = config.with_output_dir(dir);
    }
    if let Some(dir) = &self.intermediate_dir {
      config = config.with_intermediate_dir(dir);
    }
    if let Some(profile) = &self.profile {
      let profile: TargetProfile = profile.parse().map_err(|e: String| anyhow!(e))?;
      config = config.with_profile(profile);
    }
    Ok(config)
  }
}
