//! Pipeline error taxonomy.
//!
//! `PipelineError` is `Clone` so that every waiter on a single-flight build
//! receives the same failure. Plugin errors are kept behind an `Arc`.

use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;

/// Error type plugins return. Anything `Error + Send + Sync` converts with `?`.
pub type PluginError = Box<dyn std::error::Error + Send + Sync>;

/// A plugin error shared between every observer of a failed item.
pub type SharedError = Arc<dyn std::error::Error + Send + Sync>;

#[derive(Debug, Clone, Error)]
pub enum PipelineError {
  #[error("no importer for {asset}: {lookup}")]
  ImporterNotFound { asset: String, lookup: String },

  #[error("no processor for {asset}: {lookup}")]
  ProcessorNotFound { asset: String, lookup: String },

  #[error("no writer for {asset}: content type {content_type} on platform {platform}")]
  WriterNotFound {
    asset: String,
    content_type: String,
    platform: String,
  },

  #[error("ambiguous {kind} for {asset} ({lookup}): candidates {}", candidates.join(", "))]
  AmbiguousPlugin {
    kind: &'static str,
    asset: String,
    lookup: String,
    candidates: Vec<String>,
  },

  /// `asset` is set when the mismatch was found while planning that asset.
  #[error("parameter '{key}' expects {expected}, got {found}")]
  ParameterTypeMismatch {
    asset: Option<String>,
    key: String,
    expected: String,
    found: String,
  },

  #[error("asset name '{name}' for {asset} escapes the output directory")]
  InvalidAssetName { asset: String, name: String },

  #[error("content type mismatch: expected {expected}, got {found}")]
  ContentTypeMismatch { expected: String, found: String },

  #[error("circular dependency: {}", chain.join(" -> "))]
  CircularDependency { chain: Vec<String> },

  #[error("import of {asset} failed: {cause}")]
  ImportFailure {
    asset: String,
    #[source]
    cause: SharedError,
  },

  #[error("processing {asset} failed: {cause}")]
  ProcessFailure {
    asset: String,
    #[source]
    cause: SharedError,
  },

  #[error("writing {asset} failed: {cause}")]
  WriteFailure {
    asset: String,
    #[source]
    cause: SharedError,
  },

  #[error("loading built {asset} failed: {cause}")]
  LoadFailure {
    asset: String,
    #[source]
    cause: SharedError,
  },

  #[error("{asset} failed because a nested build failed: {source}")]
  DependencyFailed { asset: String, source: Box<PipelineError> },

  #[error("corrupt cache entry {path}: {message}")]
  CacheCorruption { path: PathBuf, message: String },

  #[error("{operation} requires an active build item")]
  NoActiveBuildItem { operation: &'static str },

  #[error("context for {asset} is no longer active")]
  ContextSealed { asset: String },

  #[error("build task for {asset} did not complete: {message}")]
  TaskFailed { asset: String, message: String },

  #[error("io error at {path}: {message}")]
  Io { path: PathBuf, message: String },
}

impl PipelineError {
  pub(crate) fn io(path: impl Into<PathBuf>, err: impl std::fmt::Display) -> Self {
    PipelineError::Io {
      path: path.into(),
      message: err.to_string(),
    }
  }

  /// The asset an item-level failure belongs to.
  pub fn asset(&self) -> Option<&str> {
    match self {
      PipelineError::ImporterNotFound { asset, .. }
      | PipelineError::ProcessorNotFound { asset, .. }
      | PipelineError::WriterNotFound { asset, .. }
      | PipelineError::AmbiguousPlugin { asset, .. }
      | PipelineError::ImportFailure { asset, .. }
      | PipelineError::ProcessFailure { asset, .. }
      | PipelineError::WriteFailure { asset, .. }
      | PipelineError::LoadFailure { asset, .. }
      | PipelineError::DependencyFailed { asset, .. }
      | PipelineError::InvalidAssetName { asset, .. }
      | PipelineError::ContextSealed { asset }
      | PipelineError::TaskFailed { asset, .. } => Some(asset),
      PipelineError::ParameterTypeMismatch { asset, .. } => asset.as_deref(),
      _ => None,
    }
  }

  /// Follow `DependencyFailed` links down to the originating failure.
  pub fn root_cause(&self) -> &PipelineError {
    let mut current = self;
    while let PipelineError::DependencyFailed { source, .. } = current {
      current = source;
    }
    current
  }

  /// Asset names from this failure down to the item that originally failed.
  pub fn failure_chain(&self) -> Vec<String> {
    let mut chain = Vec::new();
    let mut current = self;
    loop {
      if let Some(asset) = current.asset()
        && chain.last().map(String::as_str) != Some(asset)
      {
        chain.push(asset.to_string());
      }
      match current {
        PipelineError::DependencyFailed { source, .. } => current = source,
        _ => break,
      }
    }
    chain
  }

  pub fn is_circular(&self) -> bool {
    matches!(self.root_cause(), PipelineError::CircularDependency { .. })
  }
}
