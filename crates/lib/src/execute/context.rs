//! The [`ProcessorContext`] implementation lent to plugins.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tracing::debug;

use crate::build::{BuildRequest, Fingerprint};
use crate::cache::RecordedFile;
use crate::config::{TargetPlatform, TargetProfile};
use crate::content::{Content, ExternalReference};
use crate::context::ProcessorContext;
use crate::error::PipelineError;
use crate::logger::BuildLogger;
use crate::params::ParameterBag;
use crate::util::paths;

use super::Inner;

/// Side effects a running item reports through its context.
#[derive(Debug, Default)]
pub(crate) struct ItemRecorder {
  dependencies: Mutex<Vec<RecordedFile>>,
  outputs: Mutex<Vec<PathBuf>>,
  nested: Mutex<Vec<Fingerprint>>,
}

impl ItemRecorder {
  pub(crate) fn add_dependency(&self, file: RecordedFile) {
    let mut dependencies = self.dependencies.lock().unwrap_or_else(|p| p.into_inner());
    match dependencies.iter_mut().find(|d| d.path == file.path) {
      Some(existing) => *existing = file,
      None => dependencies.push(file),
    }
  }

  fn add_output(&self, path: PathBuf) {
    let mut outputs = self.outputs.lock().unwrap_or_else(|p| p.into_inner());
    if !outputs.contains(&path) {
      outputs.push(path);
    }
  }

  pub(crate) fn add_nested(&self, fingerprint: &Fingerprint) {
    let mut nested = self.nested.lock().unwrap_or_else(|p| p.into_inner());
    if !nested.contains(fingerprint) {
      nested.push(fingerprint.clone());
    }
  }

  pub(crate) fn dependencies(&self) -> Vec<RecordedFile> {
    self.dependencies.lock().map(|d| d.clone()).unwrap_or_default()
  }

  pub(crate) fn outputs(&self) -> Vec<PathBuf> {
    self.outputs.lock().map(|o| o.clone()).unwrap_or_default()
  }

  pub(crate) fn nested(&self) -> Vec<Fingerprint> {
    self.nested.lock().map(|n| n.clone()).unwrap_or_default()
  }
}

/// The build item a context belongs to.
///
/// Cloned into every context created while the item runs (including the ones
/// handed to `convert` processors), so they all share one recorder and one
/// active flag.
#[derive(Debug, Clone)]
pub(crate) struct Frame {
  pub(crate) fingerprint: Fingerprint,
  pub(crate) asset: String,
  pub(crate) output_filename: PathBuf,
  pub(crate) logger: BuildLogger,
  /// Items on the nested-build stack leading here, this one last.
  pub(crate) chain: Arc<Vec<(Fingerprint, String)>>,
  pub(crate) recorder: Arc<ItemRecorder>,
  active: Arc<AtomicBool>,
}

impl Frame {
  pub(crate) fn new(
    parent: Option<&Frame>,
    fingerprint: Fingerprint,
    asset: String,
    output_filename: PathBuf,
    logger: BuildLogger,
  ) -> Self {
    let mut chain = parent.map(|p| p.chain.as_ref().clone()).unwrap_or_default();
    chain.push((fingerprint.clone(), asset.clone()));
    Self {
      fingerprint,
      asset,
      output_filename,
      logger,
      chain: Arc::new(chain),
      recorder: Arc::new(ItemRecorder::default()),
      active: Arc::new(AtomicBool::new(true)),
    }
  }

  pub(crate) fn seal(&self) {
    self.active.store(false, Ordering::SeqCst);
  }

  pub(crate) fn is_active(&self) -> bool {
    self.active.load(Ordering::SeqCst)
  }

  /// The part of the chain from `fingerprint` onwards, if it is on the stack.
  pub(crate) fn cycle_from(&self, fingerprint: &Fingerprint) -> Option<Vec<String>> {
    let pos = self.chain.iter().position(|(fp, _)| fp == fingerprint)?;
    Some(self.chain[pos..].iter().map(|(_, asset)| asset.clone()).collect())
  }
}

/// Context for one item, or for a `convert` call outside any item.
pub(crate) struct ItemContext {
  inner: Arc<Inner>,
  frame: Option<Frame>,
  parameters: ParameterBag,
  output_filename: PathBuf,
  logger: BuildLogger,
}

impl ItemContext {
  /// Context for the processor of an executing item.
  pub(crate) fn for_item(inner: Arc<Inner>, frame: Frame, parameters: ParameterBag) -> Self {
    Self {
      inner,
      output_filename: frame.output_filename.clone(),
      logger: frame.logger.clone(),
      frame: Some(frame),
      parameters,
    }
  }

  /// Context for a processor run by `convert`.
  ///
  /// Inside an item it shares that item's frame; at top level it has none and
  /// dependency recording fails with `NoActiveBuildItem`.
  pub(crate) fn for_convert(inner: Arc<Inner>, frame: Option<Frame>, parameters: ParameterBag, label: &str) -> Self {
    let (output_filename, logger) = match &frame {
      Some(frame) => (frame.output_filename.clone(), frame.logger.clone()),
      None => (inner.config.output_dir.clone(), BuildLogger::detached(label)),
    };
    Self {
      inner,
      frame,
      parameters,
      output_filename,
      logger,
    }
  }

  /// The frame, if side effects may still be recorded against it.
  fn recording_frame(&self, operation: &'static str) -> Result<&Frame, PipelineError> {
    match &self.frame {
      None => Err(PipelineError::NoActiveBuildItem { operation }),
      Some(frame) if !frame.is_active() => Err(PipelineError::ContextSealed {
        asset: frame.asset.clone(),
      }),
      Some(frame) => Ok(frame),
    }
  }

  /// The frame nested requests are attributed to. Top-level contexts have none.
  fn parent_frame(&self) -> Result<Option<&Frame>, PipelineError> {
    match &self.frame {
      Some(frame) if !frame.is_active() => Err(PipelineError::ContextSealed {
        asset: frame.asset.clone(),
      }),
      other => Ok(other.as_ref()),
    }
  }
}

#[async_trait]
impl ProcessorContext for ItemContext {
  fn build_configuration(&self) -> &str {
    &self.inner.config.configuration
  }

  fn intermediate_directory(&self) -> &Path {
    &self.inner.config.intermediate_dir
  }

  fn output_directory(&self) -> &Path {
    &self.inner.config.output_dir
  }

  fn output_filename(&self) -> &Path {
    &self.output_filename
  }

  fn parameters(&self) -> &ParameterBag {
    &self.parameters
  }

  fn target_platform(&self) -> &TargetPlatform {
    &self.inner.config.platform
  }

  fn target_profile(&self) -> TargetProfile {
    self.inner.config.profile
  }

  fn logger(&self) -> &BuildLogger {
    &self.logger
  }

  fn add_dependency(&self, filename: &Path) -> Result<(), PipelineError> {
    let frame = self.recording_frame("add_dependency")?;
    let path = paths::resolve(&self.inner.config.source_root, filename);
    debug!(asset = %frame.asset, dependency = %path.display(), "recorded dependency");
    frame.recorder.add_dependency(RecordedFile::capture(path));
    Ok(())
  }

  fn add_output_file(&self, filename: &Path) -> Result<(), PipelineError> {
    let frame = self.recording_frame("add_output_file")?;
    let path = paths::resolve(&self.inner.config.output_dir, filename);
    debug!(asset = %frame.asset, output = %path.display(), "recorded output file");
    frame.recorder.add_output(path);
    Ok(())
  }

  async fn build_asset(&self, request: BuildRequest) -> Result<ExternalReference, PipelineError> {
    let parent = self.parent_frame()?;
    let built = self.inner.request(request, parent).await?;
    Ok(built.reference)
  }

  async fn build_and_load_asset(&self, request: BuildRequest) -> Result<Content, PipelineError> {
    let parent = self.parent_frame()?;
    let built = self.inner.request(request, parent).await?;
    self.inner.load(&built).await
  }

  async fn convert(&self, input: Content, processor: &str, parameters: ParameterBag) -> Result<Content, PipelineError> {
    let parent = self.parent_frame()?;
    self.inner.convert(parent, input, processor, parameters).await
  }
}
