//! Build orchestration.
//!
//! The [`Orchestrator`] is the entry point for building assets. It:
//! - resolves requests to plugins and fingerprints
//! - reuses cached artifacts whose inputs are unchanged
//! - runs importer, processor and writer for everything else
//! - deduplicates concurrent requests for the same fingerprint
//! - refuses circular nested builds instead of deadlocking

mod context;
mod realize;
pub mod types;

use std::any::Any;
use std::collections::HashMap;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;

use tokio::sync::{OnceCell, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::build::{BuildRequest, Fingerprint, FingerprintInput, output_key};
use crate::cache::{BuildCache, CleanStats, RecordedFile};
use crate::config::PipelineConfig;
use crate::consts::ARTIFACT_EXTENSION;
use crate::content::{Content, ExternalReference};
use crate::error::PipelineError;
use crate::graph::{DependencyGraph, ItemRecord, ItemState};
use crate::params::ParameterBag;
use crate::plugin::{Importer, PluginRegistry, Processor};
use crate::util::hash::{ContentHash, file_signature};
use crate::util::paths;

use context::{Frame, ItemContext};

pub use types::{BuildFailure, BuiltAsset, SessionReport};

type Outcome = Result<BuiltAsset, PipelineError>;
type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// A request resolved to plugins, parameters and an identity.
pub(crate) struct ItemPlan {
  pub(crate) fingerprint: Fingerprint,
  pub(crate) asset: String,
  pub(crate) source_path: PathBuf,
  pub(crate) signature: Option<ContentHash>,
  pub(crate) importer: Arc<dyn Importer>,
  pub(crate) processor: Arc<dyn Processor>,
  pub(crate) parameters: ParameterBag,
  pub(crate) output_path: PathBuf,
}

pub(crate) struct Inner {
  pub(crate) config: PipelineConfig,
  pub(crate) registry: PluginRegistry,
  pub(crate) cache: BuildCache,
  pub(crate) graph: Mutex<DependencyGraph>,
  /// One cell per fingerprint requested this session. The first requester
  /// runs the item; everyone else awaits the same cell.
  outcomes: Mutex<HashMap<Fingerprint, Arc<OnceCell<Outcome>>>>,
}

/// Coordinates build items for one session.
///
/// Cheap to clone; clones share the session state.
#[derive(Clone)]
pub struct Orchestrator {
  inner: Arc<Inner>,
}

impl Orchestrator {
  /// Prepare directories and load the persistent cache.
  pub fn open(config: PipelineConfig, registry: PluginRegistry) -> Result<Self, PipelineError> {
    let intermediate_dir = config.intermediate_dir.clone();
    let config = config.prepare().map_err(|e| PipelineError::io(intermediate_dir, e))?;
    let cache = BuildCache::load(config.cache_dir());

    info!(
      source_root = %config.source_root.display(),
      output_dir = %config.output_dir.display(),
      platform = %config.platform,
      profile = %config.profile,
      configuration = %config.configuration,
      cached_entries = cache.len(),
      "opened build session"
    );

    Ok(Self {
      inner: Arc::new(Inner {
        config,
        registry,
        cache,
        graph: Mutex::new(DependencyGraph::new()),
        outcomes: Mutex::new(HashMap::new()),
      }),
    })
  }

  pub fn config(&self) -> &PipelineConfig {
    &self.inner.config
  }

  pub fn registry(&self) -> &PluginRegistry {
    &self.inner.registry
  }

  pub fn cache(&self) -> &BuildCache {
    &self.inner.cache
  }

  /// Build one asset and return everything known about the result.
  pub async fn build(&self, request: BuildRequest) -> Result<BuiltAsset, PipelineError> {
    self.inner.request(request, None).await
  }

  /// Build one asset and return a reference to its compiled artifact.
  pub async fn build_asset(&self, request: BuildRequest) -> Result<ExternalReference, PipelineError> {
    Ok(self.build(request).await?.reference)
  }

  /// Build one asset and read the compiled artifact back.
  pub async fn build_and_load_asset(&self, request: BuildRequest) -> Result<Content, PipelineError> {
    let built = self.build(request).await?;
    self.inner.load(&built).await
  }

  /// `build_and_load_asset` downcast to `T`.
  pub async fn load_asset<T: Any + Send + Sync>(&self, request: BuildRequest) -> Result<Arc<T>, PipelineError> {
    self.build_and_load_asset(request).await?.into_arc::<T>()
  }

  /// Run a processor on in-memory content outside of any build item.
  pub async fn convert(
    &self,
    input: Content,
    processor: &str,
    parameters: ParameterBag,
  ) -> Result<Content, PipelineError> {
    self.inner.convert(None, input, processor, parameters).await
  }

  /// Build every request, up to `parallelism` at a time.
  ///
  /// Failures are isolated per request. With `fail_fast` set, the first
  /// failure cancels whatever has not finished yet.
  pub async fn build_all(&self, requests: Vec<BuildRequest>) -> SessionReport {
    let started = Instant::now();
    let parallelism = self.inner.config.parallelism.max(1);
    let semaphore = Arc::new(Semaphore::new(parallelism));
    let mut join_set = JoinSet::new();
    let mut labels = HashMap::new();

    info!(requests = requests.len(), parallelism, "starting build session");

    for (index, request) in requests.into_iter().enumerate() {
      let orchestrator = self.clone();
      let semaphore = semaphore.clone();
      let label = request.source.display().to_string();
      let task_label = label.clone();

      let handle = join_set.spawn(async move {
        let outcome = match semaphore.acquire_owned().await {
          Ok(_permit) => orchestrator.build(request).await,
          Err(_) => Err(PipelineError::TaskFailed {
            asset: task_label,
            message: "session closed before the request started".to_string(),
          }),
        };
        (index, outcome)
      });
      labels.insert(handle.id(), (index, label));
    }

    let mut finished: Vec<(usize, String, Outcome)> = Vec::new();
    let mut cancelled = 0;
    let mut aborted = false;

    while let Some(joined) = join_set.join_next_with_id().await {
      match joined {
        Ok((id, (index, outcome))) => {
          let label = labels.remove(&id).map(|(_, l)| l).unwrap_or_default();
          if let Err(err) = &outcome {
            warn!(request = %label, error = %err, "request failed");
            if self.inner.config.fail_fast && !aborted {
              info!("fail-fast: cancelling outstanding requests");
              join_set.abort_all();
              aborted = true;
            }
          }
          finished.push((index, label, outcome));
        }
        Err(err) if err.is_cancelled() => {
          labels.remove(&err.id());
          cancelled += 1;
        }
        Err(err) => {
          let (index, label) = labels.remove(&err.id()).unwrap_or_default();
          error!(request = %label, error = %err, "build task panicked");
          let failure = PipelineError::TaskFailed {
            asset: label.clone(),
            message: err.to_string(),
          };
          finished.push((index, label, Err(failure)));
        }
      }
    }

    finished.sort_by_key(|(index, _, _)| *index);

    let mut report = SessionReport {
      cancelled,
      ..Default::default()
    };
    for (_, label, outcome) in finished {
      match outcome {
        Ok(built) => report.succeeded.push(built),
        Err(err) => report.failures.push(BuildFailure::new(label, err)),
      }
    }

    for record in self.items() {
      match record.state {
        ItemState::Built => report.built += 1,
        ItemState::Cached => report.cached += 1,
        ItemState::Failed(_) => report.failed += 1,
        ItemState::Pending => {}
      }
      if !record.warnings.is_empty() {
        report.warnings.insert(record.asset, record.warnings);
      }
    }
    report.duration = started.elapsed();

    info!(
      succeeded = report.succeeded.len(),
      failed = report.failures.len(),
      cancelled = report.cancelled,
      built = report.built,
      cached = report.cached,
      "build session finished"
    );
    report
  }

  /// Remove every artifact and cache entry this pipeline knows about.
  pub fn clean(&self) -> Result<CleanStats, PipelineError> {
    self.inner.cache.clean(&self.inner.config.output_dir)
  }

  /// Items touched this session, ordered by asset.
  pub fn items(&self) -> Vec<ItemRecord> {
    self.inner.graph().items()
  }

  pub fn item(&self, fingerprint: &Fingerprint) -> Option<ItemRecord> {
    self.inner.graph().item(fingerprint).cloned()
  }

  /// Items that built `fingerprint`, directly or transitively, this session.
  pub fn dependents(&self, fingerprint: &Fingerprint) -> Vec<Fingerprint> {
    self.inner.graph().dependents(fingerprint)
  }
}

/// Removes a wait edge once the waiter resumes, however the wait ends.
struct WaitGuard {
  inner: Arc<Inner>,
  waiter: Fingerprint,
  target: Fingerprint,
}

impl Drop for WaitGuard {
  fn drop(&mut self) {
    self.inner.graph().remove_wait(&self.waiter, &self.target);
  }
}

impl Inner {
  pub(crate) fn graph(&self) -> MutexGuard<'_, DependencyGraph> {
    self.graph.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
  }

  fn outcomes(&self) -> MutexGuard<'_, HashMap<Fingerprint, Arc<OnceCell<Outcome>>>> {
    self.outcomes.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
  }

  /// Resolve plugins and parameters and compute the fingerprint.
  fn plan(&self, request: &BuildRequest) -> Result<ItemPlan, PipelineError> {
    let config = &self.config;
    let source_path = paths::resolve(&config.source_root, &request.source);
    let asset = paths::source_identity(&config.source_root, &source_path);

    let importer = self
      .registry
      .resolve_importer(request.importer.as_deref(), &source_path, &asset)?;
    let processor = self
      .registry
      .resolve_processor(request.processor.as_deref(), importer.output_type(), &asset)?;
    let parameters = request
      .parameters
      .resolve(&processor.parameters(), &asset, processor.name())?;
    let signature = file_signature(&source_path);

    let input = FingerprintInput::new(
      &asset,
      signature.as_ref(),
      importer.name(),
      processor.name(),
      &parameters,
      &config.platform,
      config.profile,
      &config.configuration,
    );
    let fingerprint = input.fingerprint().map_err(|e| PipelineError::io(&source_path, e))?;
    let key = output_key(&input).map_err(|e| PipelineError::io(&source_path, e))?;
    let output_path = self.output_path(&asset, request.asset_name.as_deref(), &key)?;

    Ok(ItemPlan {
      fingerprint,
      asset,
      source_path,
      signature,
      importer,
      processor,
      parameters,
      output_path,
    })
  }

  /// `<output_dir>/<asset_name>.kxb`, or `<output_dir>/<dir>/<stem>-<key>.kxb`.
  ///
  /// An asset name that lands outside the output directory is refused.
  fn output_path(&self, asset: &str, asset_name: Option<&str>, key: &str) -> Result<PathBuf, PipelineError> {
    let relative = match asset_name {
      Some(name) => PathBuf::from(format!("{}.{}", name, ARTIFACT_EXTENSION)),
      None => {
        let source = Path::new(asset);
        let stem = source
          .file_stem()
          .map(|s| s.to_string_lossy().into_owned())
          .unwrap_or_else(|| "asset".to_string());
        let file = format!("{}-{}.{}", stem, key, ARTIFACT_EXTENSION);
        match source.parent() {
          Some(parent) if !asset.starts_with('/') => parent.join(file),
          _ => PathBuf::from(file),
        }
      }
    };
    let output_dir = paths::normalize(&self.config.output_dir);
    let path = paths::normalize(&output_dir.join(relative));
    if let Some(name) = asset_name
      && (Path::new(name).is_absolute() || !path.starts_with(&output_dir))
    {
      return Err(PipelineError::InvalidAssetName {
        asset: asset.to_string(),
        name: name.to_string(),
      });
    }
    Ok(path)
  }

  /// Build `request`, nested under `parent` when called from a running item.
  pub(crate) fn request<'a>(self: &'a Arc<Self>, request: BuildRequest, parent: Option<&'a Frame>) -> BoxFuture<'a, Outcome> {
    Box::pin(async move {
      let plan = self.plan(&request)?;
      let fingerprint = plan.fingerprint.clone();

      if let Some(parent) = parent
        && let Some(mut chain) = parent.cycle_from(&fingerprint)
      {
        chain.push(plan.asset.clone());
        warn!(chain = %chain.join(" -> "), "circular nested build");
        return Err(PipelineError::CircularDependency { chain });
      }

      let (cell, _wait) = {
        let mut outcomes = self.outcomes();
        let mut graph = self.graph();
        graph.begin(&fingerprint, &plan.asset);

        let wait = match parent {
          Some(parent) => {
            graph.add_wait(&parent.fingerprint, &fingerprint)?;
            Some(WaitGuard {
              inner: self.clone(),
              waiter: parent.fingerprint.clone(),
              target: fingerprint.clone(),
            })
          }
          None => None,
        };

        let cell = match outcomes.get(&fingerprint) {
          Some(existing) => {
            if !existing.initialized() {
              debug!(asset = %plan.asset, fingerprint = %fingerprint, "joining in-flight build");
            }
            existing.clone()
          }
          None => {
            let cell = Arc::new(OnceCell::new());
            outcomes.insert(fingerprint.clone(), cell.clone());
            cell
          }
        };
        (cell, wait)
      };

      let outcome = cell.get_or_init(|| self.execute(plan, parent)).await.clone();

      if let Some(parent) = parent
        && let Ok(built) = &outcome
      {
        self.graph().add_nested(&parent.fingerprint, &fingerprint);
        parent.recorder.add_nested(&fingerprint);
        // The parent consumed the artifact, so a rewritten artifact invalidates it.
        parent
          .recorder
          .add_dependency(RecordedFile::capture(built.reference.filename()));
      }

      outcome
    })
  }

  /// Read a built artifact back through the writer that produced it.
  pub(crate) async fn load(&self, built: &BuiltAsset) -> Result<Content, PipelineError> {
    let writer = self
      .registry
      .get_writer(&built.writer)
      .ok_or_else(|| PipelineError::WriterNotFound {
        asset: built.asset.clone(),
        content_type: built.content_type.clone(),
        platform: self.config.platform.to_string(),
      })?;

    debug!(asset = %built.asset, artifact = %built.reference.filename().display(), "loading artifact");
    writer
      .read(built.reference.filename())
      .await
      .map_err(|cause| PipelineError::LoadFailure {
        asset: built.asset.clone(),
        cause: Arc::from(cause),
      })
  }

  /// Run a processor directly, attributing side effects to `frame` if any.
  pub(crate) async fn convert(
    self: &Arc<Self>,
    frame: Option<&Frame>,
    input: Content,
    processor: &str,
    parameters: ParameterBag,
  ) -> Result<Content, PipelineError> {
    let label = frame
      .map(|f| f.asset.clone())
      .unwrap_or_else(|| format!("convert:{}", processor));

    let processor = self
      .registry
      .get_processor(processor)
      .ok_or_else(|| PipelineError::ProcessorNotFound {
        asset: label.clone(),
        lookup: format!("no processor named '{}'", processor),
      })?;

    if !processor.accepts(input.content_type()) {
      return Err(PipelineError::ProcessFailure {
        asset: label,
        cause: Arc::new(PipelineError::ContentTypeMismatch {
          expected: processor.input_type().map(|t| t.to_string()).unwrap_or_default(),
          found: input.content_type().to_string(),
        }),
      });
    }

    let parameters = parameters.resolve(&processor.parameters(), &label, processor.name())?;
    let ctx = ItemContext::for_convert(self.clone(), frame.cloned(), parameters, &label);

    debug!(asset = %label, processor = processor.name(), "converting content");
    processor
      .process(input, &ctx)
      .await
      .map_err(|err| realize::classify(&label, err, realize::process_failure))
  }
}
