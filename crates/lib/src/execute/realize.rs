//! Single item realization.
//!
//! Reuses a cached artifact when nothing it depends on has changed, otherwise
//! runs importer, processor and writer and commits a new cache entry.

use std::sync::Arc;

use tokio::fs;
use tracing::{Instrument, debug, info, warn};

use crate::cache::{CacheEntry, RecordedFile};
use crate::content::{ContentType, ExternalReference};
use crate::context::ProcessorContext;
use crate::error::{PipelineError, PluginError, SharedError};
use crate::graph::ItemState;
use crate::logger::BuildLogger;
use crate::plugin::Writer;

use super::context::{Frame, ItemContext};
use super::{BuiltAsset, Inner, ItemPlan, Outcome};

pub(crate) fn import_failure(asset: String, cause: SharedError) -> PipelineError {
  PipelineError::ImportFailure { asset, cause }
}

pub(crate) fn process_failure(asset: String, cause: SharedError) -> PipelineError {
  PipelineError::ProcessFailure { asset, cause }
}

pub(crate) fn write_failure(asset: String, cause: SharedError) -> PipelineError {
  PipelineError::WriteFailure { asset, cause }
}

/// Turn an error returned by plugin code running for `asset` into a pipeline error.
///
/// Cycles pass through untouched so the requester sees the cycle itself. A
/// failure belonging to another asset means a nested build failed and is
/// wrapped in `DependencyFailed`. Everything else is attributed to `asset`.
pub(crate) fn classify(asset: &str, err: PluginError, wrap: fn(String, SharedError) -> PipelineError) -> PipelineError {
  match err.downcast::<PipelineError>() {
    Ok(nested) => {
      if matches!(*nested, PipelineError::CircularDependency { .. }) {
        return *nested;
      }
      if nested.asset().is_some_and(|other| other != asset) {
        return PipelineError::DependencyFailed {
          asset: asset.to_string(),
          source: nested,
        };
      }
      wrap(asset.to_string(), Arc::new(*nested))
    }
    Err(err) => wrap(asset.to_string(), Arc::from(err)),
  }
}

impl Inner {
  /// Execute one item and record its final state in the graph.
  pub(crate) async fn execute(self: &Arc<Self>, plan: ItemPlan, parent: Option<&Frame>) -> Outcome {
    let logger = BuildLogger::new(&plan.asset, plan.fingerprint.as_str());
    let span = logger.span();
    let fingerprint = plan.fingerprint.clone();

    let outcome = self.realize(plan, parent, logger.clone()).instrument(span).await;

    let mut graph = self.graph();
    if let Some(record) = graph.item_mut(&fingerprint) {
      record.warnings = logger.warnings();
    }
    match &outcome {
      Ok(built) => {
        let state = if built.cached { ItemState::Cached } else { ItemState::Built };
        graph.finish(&fingerprint, state);
      }
      Err(err) => {
        warn!(asset = %logger.asset(), error = %err, "build item failed");
        graph.finish(&fingerprint, ItemState::Failed(err.clone()));
      }
    }
    outcome
  }

  async fn realize(self: &Arc<Self>, plan: ItemPlan, parent: Option<&Frame>, logger: BuildLogger) -> Outcome {
    let reason = if self.config.rebuild {
      "rebuild requested".to_string()
    } else {
      match self.cache.stale_reason(&plan.fingerprint) {
        None => {
          if let Some(built) = self.reuse(&plan) {
            debug!(asset = %plan.asset, "artifact up to date (cache hit)");
            return Ok(built);
          }
          "cache entry vanished".to_string()
        }
        Some(reason) => reason.to_string(),
      }
    };

    info!(asset = %plan.asset, fingerprint = %plan.fingerprint, reason = %reason, "building asset");

    let frame = Frame::new(
      parent,
      plan.fingerprint.clone(),
      plan.asset.clone(),
      plan.output_path.clone(),
      logger,
    );
    let ctx = ItemContext::for_item(self.clone(), frame.clone(), plan.parameters.clone());

    let result = self.run_plugins(&plan, &ctx).await;
    frame.seal();
    let (writer, content_type) = result?;

    let mut entry = CacheEntry::new(
      plan.fingerprint.clone(),
      plan.asset.clone(),
      RecordedFile {
        path: plan.source_path.clone(),
        signature: plan.signature.clone(),
      },
    );
    entry.importer = plan.importer.name().to_string();
    entry.processor = plan.processor.name().to_string();
    entry.writer = writer.name().to_string();
    entry.content_type = content_type.to_string();
    entry.dependencies = frame.recorder.dependencies();
    entry.nested = frame.recorder.nested();
    entry.outputs.push(RecordedFile::capture(&plan.output_path));
    for extra in frame.recorder.outputs() {
      if extra == plan.output_path {
        continue;
      }
      if extra.is_file() {
        entry.outputs.push(RecordedFile::capture(extra));
      } else {
        warn!(asset = %plan.asset, output = %extra.display(), "declared output file was not produced");
      }
    }

    {
      let mut graph = self.graph();
      if let Some(record) = graph.item_mut(&plan.fingerprint) {
        record.artifact = Some(plan.output_path.clone());
        record.dependencies = entry.dependencies.iter().map(|d| d.path.clone()).collect();
        record.outputs = entry.outputs.iter().map(|o| o.path.clone()).collect();
      }
    }

    self.cache.commit(entry)?;

    info!(asset = %plan.asset, artifact = %plan.output_path.display(), "asset built");

    Ok(BuiltAsset {
      fingerprint: plan.fingerprint,
      asset: plan.asset,
      reference: ExternalReference::new(plan.output_path),
      writer: writer.name().to_string(),
      content_type: content_type.to_string(),
      cached: false,
    })
  }

  /// Result for an up-to-date cache entry, without running plugins.
  fn reuse(&self, plan: &ItemPlan) -> Option<BuiltAsset> {
    let entry = self.cache.get(&plan.fingerprint)?;
    let artifact = entry.primary_output()?.to_path_buf();

    let mut graph = self.graph();
    if let Some(record) = graph.item_mut(&plan.fingerprint) {
      record.artifact = Some(artifact.clone());
      record.dependencies = entry.dependencies.iter().map(|d| d.path.clone()).collect();
      record.outputs = entry.outputs.iter().map(|o| o.path.clone()).collect();
    }
    // Nested items reused along with this one still belong to the session graph.
    for nested in &entry.nested {
      graph.add_nested(&plan.fingerprint, nested);
    }

    Some(BuiltAsset {
      fingerprint: entry.fingerprint,
      asset: entry.asset,
      reference: ExternalReference::new(artifact),
      writer: entry.writer,
      content_type: entry.content_type,
      cached: true,
    })
  }

  /// Import, process and write one item.
  async fn run_plugins(
    &self,
    plan: &ItemPlan,
    ctx: &ItemContext,
  ) -> Result<(Arc<dyn Writer>, ContentType), PipelineError> {
    let asset = plan.asset.as_str();

    debug!(asset, importer = plan.importer.name(), "importing");
    let content = plan
      .importer
      .import(&plan.source_path, ctx)
      .await
      .map_err(|err| classify(asset, err, import_failure))?;

    if !plan.processor.accepts(content.content_type()) {
      return Err(PipelineError::ProcessFailure {
        asset: asset.to_string(),
        cause: Arc::new(PipelineError::ContentTypeMismatch {
          expected: plan.processor.input_type().map(|t| t.to_string()).unwrap_or_default(),
          found: content.content_type().to_string(),
        }),
      });
    }

    debug!(asset, processor = plan.processor.name(), "processing");
    let processed = plan
      .processor
      .process(content, ctx)
      .await
      .map_err(|err| classify(asset, err, process_failure))?;

    let content_type = processed.content_type();
    let platform = ctx.target_platform();
    let writer = self.registry.resolve_writer(content_type, platform, asset)?;

    if let Some(parent) = plan.output_path.parent() {
      fs::create_dir_all(parent)
        .await
        .map_err(|e| PipelineError::io(parent, e))?;
    }

    debug!(asset, writer = writer.name(), output = %plan.output_path.display(), "writing");
    writer
      .write(&processed, platform, &plan.output_path)
      .await
      .map_err(|err| classify(asset, err, write_failure))?;

    if !plan.output_path.is_file() {
      return Err(PipelineError::WriteFailure {
        asset: asset.to_string(),
        cause: Arc::new(std::io::Error::other(format!(
          "writer '{}' did not produce {}",
          writer.name(),
          plan.output_path.display()
        ))),
      });
    }

    Ok((writer, content_type))
  }
}
