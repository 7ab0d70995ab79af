use std::path::Path;

use async_trait::async_trait;

use crate::config::TargetPlatform;
use crate::content::{Content, ContentType};
use crate::context::ProcessorContext;
use crate::error::PluginError;

use super::traits::{Importer, Processor, Writer};

/// Imports any file as raw bytes.
pub struct BytesImporter;

#[async_trait]
impl Importer for BytesImporter {
  fn name(&self) -> &str {
    "BytesImporter"
  }

  fn extensions(&self) -> &[&str] {
    &["bin", "dat"]
  }

  fn output_type(&self) -> ContentType {
    ContentType::of::<Vec<u8>>()
  }

  async fn import(&self, source: &Path, _ctx: &dyn ProcessorContext) -> Result<Content, PluginError> {
    Ok(Content::new(tokio::fs::read(source).await?))
  }
}

/// Imports UTF-8 text files.
pub struct TextImporter;

#[async_trait]
impl Importer for TextImporter {
  fn name(&self) -> &str {
    "TextImporter"
  }

  fn extensions(&self) -> &[&str] {
    &["txt", "json", "xml", "csv", "md"]
  }

  fn output_type(&self) -> ContentType {
    ContentType::of::<String>()
  }

  async fn import(&self, source: &Path, _ctx: &dyn ProcessorContext) -> Result<Content, PluginError> {
    Ok(Content::new(tokio::fs::read_to_string(source).await?))
  }
}

/// Returns its input unchanged.
pub struct PassThroughProcessor;

#[async_trait]
impl Processor for PassThroughProcessor {
  fn name(&self) -> &str {
    "PassThroughProcessor"
  }

  fn input_type(&self) -> Option<ContentType> {
    None
  }

  fn output_type(&self) -> Option<ContentType> {
    None
  }

  async fn process(&self, input: Content, _ctx: &dyn ProcessorContext) -> Result<Content, PluginError> {
    Ok(input)
  }
}

/// Writes `Vec<u8>` content verbatim.
pub struct BytesWriter;

#[async_trait]
impl Writer for BytesWriter {
  fn name(&self) -> &str {
    "BytesWriter"
  }

  fn content_type(&self) -> ContentType {
    ContentType::of::<Vec<u8>>()
  }

  async fn write(&self, content: &Content, _platform: &TargetPlatform, output: &Path) -> Result<(), PluginError> {
    tokio::fs::write(output, content.get::<Vec<u8>>()?).await?;
    Ok(())
  }

  async fn read(&self, input: &Path) -> Result<Content, PluginError> {
    Ok(Content::new(tokio::fs::read(input).await?))
  }
}

/// Writes `String` content as UTF-8.
pub struct TextWriter;

#[async_trait]
impl Writer for TextWriter {
  fn name(&self) -> &str {
    "TextWriter"
  }

  fn content_type(&self) -> ContentType {
    ContentType::of::<String>()
  }

  async fn write(&self, content: &Content, _platform: &TargetPlatform, output: &Path) -> Result<(), PluginError> {
    tokio::fs::write(output, content.get::<String>()?.as_bytes()).await?;
    Ok(())
  }

  async fn read(&self, input: &Path) -> Result<Content, PluginError> {
    Ok(Content::new(tokio::fs::read_to_string(input).await?))
  }
}
