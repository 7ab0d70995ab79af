//! The facade plugins use to talk back to the pipeline.

use std::any::Any;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;

use crate::build::BuildRequest;
use crate::config::{TargetPlatform, TargetProfile};
use crate::content::{Content, ExternalReference};
use crate::error::PipelineError;
use crate::logger::BuildLogger;
use crate::params::ParameterBag;

/// Per-item view of the pipeline handed to importers and processors.
///
/// A context is lent to plugin code only while its build item executes. Once
/// the item finishes the context is sealed and `add_dependency` /
/// `add_output_file` fail with `ContextSealed`.
#[async_trait]
pub trait ProcessorContext: Send + Sync {
  fn build_configuration(&self) -> &str;

  fn intermediate_directory(&self) -> &Path;

  fn output_directory(&self) -> &Path;

  /// Path the primary artifact of this item is written to.
  fn output_filename(&self) -> &Path;

  /// Resolved parameters for the running processor.
  fn parameters(&self) -> &ParameterBag;

  fn target_platform(&self) -> &TargetPlatform;

  fn target_profile(&self) -> TargetProfile;

  fn logger(&self) -> &BuildLogger;

  /// Record a file whose changes must trigger a rebuild of this item.
  ///
  /// Relative paths resolve against the source root.
  fn add_dependency(&self, filename: &Path) -> Result<(), PipelineError>;

  /// Record an extra file this item produced, for tracking and cleanup.
  ///
  /// Relative paths resolve against the output directory.
  fn add_output_file(&self, filename: &Path) -> Result<(), PipelineError>;

  /// Build another asset as a nested item of this one.
  async fn build_asset(&self, request: BuildRequest) -> Result<ExternalReference, PipelineError>;

  /// Build another asset and read the compiled result back into memory.
  async fn build_and_load_asset(&self, request: BuildRequest) -> Result<Content, PipelineError>;

  /// Run a processor directly on `input`, attributing side effects to this item.
  async fn convert(&self, input: Content, processor: &str, parameters: ParameterBag) -> Result<Content, PipelineError>;
}

impl dyn ProcessorContext + '_ {
  /// `build_and_load_asset` downcast to `T`.
  pub async fn load_asset<T: Any + Send + Sync>(&self, request: BuildRequest) -> Result<Arc<T>, PipelineError> {
    self.build_and_load_asset(request).await?.into_arc::<T>()
  }

  /// `convert` downcast to `T`.
  pub async fn convert_to<T: Any + Send + Sync>(
    &self,
    input: Content,
    processor: &str,
    parameters: ParameterBag,
  ) -> Result<Arc<T>, PipelineError> {
    self.convert(input, processor, parameters).await?.into_arc::<T>()
  }
}
