//! Plugin registry.
//!
//! Resolution order: an explicit plugin name always wins over inference. Without
//! a name, importers are chosen by source extension, processors by the input
//! content type, and writers by content type and target platform. A lookup that
//! matches nothing, or more than one default, is an error for that asset.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use tracing::debug;

use crate::config::TargetPlatform;
use crate::content::ContentType;
use crate::error::PipelineError;

use super::builtin::{BytesImporter, BytesWriter, PassThroughProcessor, TextImporter, TextWriter};
use super::traits::{Importer, Processor, Writer};

#[derive(Clone, Default)]
pub struct PluginRegistry {
  importers: HashMap<String, Arc<dyn Importer>>,
  processors: HashMap<String, Arc<dyn Processor>>,
  writers: HashMap<String, Arc<dyn Writer>>,
}

impl PluginRegistry {
  pub fn new() -> Self {
    Self::default()
  }

  /// Registry preloaded with the byte and text plugins.
  pub fn with_builtins() -> Self {
    Self::new()
      .with_importer(BytesImporter)
      .with_importer(TextImporter)
      .with_processor(PassThroughProcessor)
      .with_writer(BytesWriter)
      .with_writer(TextWriter)
  }

  pub fn with_importer<I: Importer + 'static>(mut self, importer: I) -> Self {
    self.register_importer(Arc::new(importer));
    self
  }

  pub fn with_processor<P: Processor + 'static>(mut self, processor: P) -> Self {
    self.register_processor(Arc::new(processor));
    self
  }

  pub fn with_writer<W: Writer + 'static>(mut self, writer: W) -> Self {
    self.register_writer(Arc::new(writer));
    self
  }

  pub fn register_importer(&mut self, importer: Arc<dyn Importer>) {
    let key = importer.name().to_lowercase();
    if self.importers.insert(key, importer.clone()).is_some() {
      debug!(importer = importer.name(), "replacing registered importer");
    }
  }

  pub fn register_processor(&mut self, processor: Arc<dyn Processor>) {
    let key = processor.name().to_lowercase();
    if self.processors.insert(key, processor.clone()).is_some() {
      debug!(processor = processor.name(), "replacing registered processor");
    }
  }

  pub fn register_writer(&mut self, writer: Arc<dyn Writer>) {
    let key = writer.name().to_lowercase();
    if self.writers.insert(key, writer.clone()).is_some() {
      debug!(writer = writer.name(), "replacing registered writer");
    }
  }

  pub fn get_importer(&self, name: &str) -> Option<Arc<dyn Importer>> {
    self.importers.get(&name.to_lowercase()).cloned()
  }

  pub fn get_processor(&self, name: &str) -> Option<Arc<dyn Processor>> {
    self.processors.get(&name.to_lowercase()).cloned()
  }

  pub fn get_writer(&self, name: &str) -> Option<Arc<dyn Writer>> {
    self.writers.get(&name.to_lowercase()).cloned()
  }

  pub fn importer_names(&self) -> Vec<String> {
    sorted_names(self.importers.values().map(|p| p.name()))
  }

  pub fn processor_names(&self) -> Vec<String> {
    sorted_names(self.processors.values().map(|p| p.name()))
  }

  pub fn writer_names(&self) -> Vec<String> {
    sorted_names(self.writers.values().map(|p| p.name()))
  }

  /// Importer by name, or the default for the source's extension.
  pub fn resolve_importer(
    &self,
    name: Option<&str>,
    source: &Path,
    asset: &str,
  ) -> Result<Arc<dyn Importer>, PipelineError> {
    if let Some(name) = name {
      return self.get_importer(name).ok_or_else(|| PipelineError::ImporterNotFound {
        asset: asset.to_string(),
        lookup: format!("no importer named '{}'", name),
      });
    }

    let extension = source
      .extension()
      .map(|e| e.to_string_lossy().to_lowercase())
      .unwrap_or_default();
    let matches: Vec<_> = self
      .importers
      .values()
      .filter(|i| i.extensions().iter().any(|e| e.eq_ignore_ascii_case(&extension)))
      .cloned()
      .collect();

    single(matches, "importer", asset, || format!("extension '.{}'", extension), |i| i.name())?.ok_or_else(|| {
      PipelineError::ImporterNotFound {
        asset: asset.to_string(),
        lookup: format!("no default importer for extension '.{}'", extension),
      }
    })
  }

  /// Processor by name, or the default for `input`.
  ///
  /// Processors declaring an exact input type win over ones accepting any input.
  pub fn resolve_processor(
    &self,
    name: Option<&str>,
    input: ContentType,
    asset: &str,
  ) -> Result<Arc<dyn Processor>, PipelineError> {
    if let Some(name) = name {
      return self.get_processor(name).ok_or_else(|| PipelineError::ProcessorNotFound {
        asset: asset.to_string(),
        lookup: format!("no processor named '{}'", name),
      });
    }

    let exact: Vec<_> = self
      .processors
      .values()
      .filter(|p| p.input_type() == Some(input))
      .cloned()
      .collect();
    if let Some(found) = single(exact, "processor", asset, || format!("input type {}", input), |p| p.name())? {
      return Ok(found);
    }

    let generic: Vec<_> = self.processors.values().filter(|p| p.input_type().is_none()).cloned().collect();
    single(generic, "processor", asset, || format!("input type {}", input), |p| p.name())?.ok_or_else(|| {
      PipelineError::ProcessorNotFound {
        asset: asset.to_string(),
        lookup: format!("no default processor for input type {}", input),
      }
    })
  }

  /// Writer for `content_type`; a platform-specific writer beats a generic one.
  pub fn resolve_writer(
    &self,
    content_type: ContentType,
    platform: &TargetPlatform,
    asset: &str,
  ) -> Result<Arc<dyn Writer>, PipelineError> {
    let candidates: Vec<_> = self
      .writers
      .values()
      .filter(|w| w.content_type() == content_type)
      .cloned()
      .collect();

    let specific: Vec<_> = candidates
      .iter()
      .filter(|w| w.platform().as_ref() == Some(platform))
      .cloned()
      .collect();
    let lookup = || format!("content type {} on {}", content_type, platform);
    if let Some(found) = single(specific, "writer", asset, lookup, |w| w.name())? {
      return Ok(found);
    }

    let generic: Vec<_> = candidates.into_iter().filter(|w| w.platform().is_none()).collect();
    single(generic, "writer", asset, lookup, |w| w.name())?.ok_or_else(|| PipelineError::WriterNotFound {
      asset: asset.to_string(),
      content_type: content_type.to_string(),
      platform: platform.to_string(),
    })
  }
}

fn sorted_names<'a>(names: impl Iterator<Item = &'a str>) -> Vec<String> {
  let mut names: Vec<String> = names.map(str::to_string).collect();
  names.sort();
  names
}

/// Zero or one match; more than one is ambiguous.
fn single<T: ?Sized>(
  mut matches: Vec<Arc<T>>,
  kind: &'static str,
  asset: &str,
  lookup: impl Fn() -> String,
  name: impl Fn(&T) -> &str,
) -> Result<Option<Arc<T>>, PipelineError> {
  match matches.len() {
    0 => Ok(None),
    1 => Ok(matches.pop()),
    _ => Err(PipelineError::AmbiguousPlugin {
      kind,
      asset: asset.to_string(),
      lookup: lookup(),
      candidates: sorted_names(matches.iter().map(|m| name(&**m))),
    }),
  }
}
