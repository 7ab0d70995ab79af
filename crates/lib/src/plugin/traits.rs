use std::path::Path;

use async_trait::async_trait;

use crate::config::TargetPlatform;
use crate::content::{Content, ContentType};
use crate::context::ProcessorContext;
use crate::error::PluginError;
use crate::params::ParameterDecl;

/// Reads a source file into an in-memory object.
#[async_trait]
pub trait Importer: Send + Sync {
  fn name(&self) -> &str;

  /// File extensions (without the dot) this importer is the default for.
  fn extensions(&self) -> &[&str] {
    &[]
  }

  fn output_type(&self) -> ContentType;

  async fn import(&self, source: &Path, ctx: &dyn ProcessorContext) -> Result<Content, PluginError>;
}

/// Transforms an imported object into its compiled form.
#[async_trait]
pub trait Processor: Send + Sync {
  fn name(&self) -> &str;

  /// Accepted input type, or `None` to accept anything.
  fn input_type(&self) -> Option<ContentType>;

  /// Produced type, or `None` when it matches the input.
  fn output_type(&self) -> Option<ContentType>;

  /// Parameters this processor understands, with their defaults.
  fn parameters(&self) -> Vec<ParameterDecl> {
    Vec::new()
  }

  fn accepts(&self, input: ContentType) -> bool {
    self.input_type().is_none_or(|expected| expected == input)
  }

  async fn process(&self, input: Content, ctx: &dyn ProcessorContext) -> Result<Content, PluginError>;
}

/// Serializes a compiled object for a target platform, and reads it back.
#[async_trait]
pub trait Writer: Send + Sync {
  fn name(&self) -> &str;

  fn content_type(&self) -> ContentType;

  /// Platform this writer is specific to, or `None` for any platform.
  fn platform(&self) -> Option<TargetPlatform> {
    None
  }

  async fn write(&self, content: &Content, platform: &TargetPlatform, output: &Path) -> Result<(), PluginError>;

  async fn read(&self, input: &Path) -> Result<Content, PluginError>;
}
