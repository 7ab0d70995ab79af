//! Shared helpers for pipeline integration tests.
//!
//! Assets are small text files interpreted by [`ScriptProcessor`]. Each line
//! is either literal text or a directive:
//!
//! - `@build <path> [key=value]...`: build and load another asset with the
//!   given parameters, appending its text
//! - `@convert <line>`: run `<line>` through this processor with `convert`,
//!   appending the result
//! - `@dep <path>`: record a dependency on a file under the source root and
//!   append its contents
//! - `@sleep <ms>`: suspend for a while
//! - `@warn <message>`: log a warning through the item logger
//! - `@fail`: return an error

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use kiln_lib::params::ParameterDecl;
use kiln_lib::{
  BuildRequest, Content, ContentType, Importer, Orchestrator, ParameterBag, PipelineConfig, PluginError, PluginRegistry,
  Processor,
  ProcessorContext, TargetPlatform, TargetProfile, Writer,
};
use tempfile::TempDir;

/// Invocation counts shared by the mock plugins.
#[derive(Debug, Default)]
pub struct Counters {
  imports: AtomicUsize,
  writes: AtomicUsize,
  processed: Mutex<HashMap<String, usize>>,
}

impl Counters {
  pub fn imports(&self) -> usize {
    self.imports.load(Ordering::SeqCst)
  }

  pub fn writes(&self) -> usize {
    self.writes.load(Ordering::SeqCst)
  }

  /// Times the processor ran for `asset`.
  pub fn processed(&self, asset: &str) -> usize {
    self.processed.lock().unwrap().get(asset).copied().unwrap_or(0)
  }

  pub fn total_processed(&self) -> usize {
    self.processed.lock().unwrap().values().sum()
  }

  fn record_process(&self, asset: &str) {
    *self.processed.lock().unwrap().entry(asset.to_string()).or_default() += 1;
  }
}

pub struct ScriptImporter {
  counters: Arc<Counters>,
}

#[async_trait]
impl Importer for ScriptImporter {
  fn name(&self) -> &str {
    "ScriptImporter"
  }

  fn extensions(&self) -> &[&str] {
    &["txt"]
  }

  fn output_type(&self) -> ContentType {
    ContentType::of::<String>()
  }

  async fn import(&self, source: &Path, _ctx: &dyn ProcessorContext) -> Result<Content, PluginError> {
    self.counters.imports.fetch_add(1, Ordering::SeqCst);
    let text = tokio::fs::read_to_string(source).await?;
    if text.starts_with("@import-fail") {
      return Err("importer rejected source".into());
    }
    Ok(Content::new(text))
  }
}

pub struct ScriptProcessor {
  counters: Arc<Counters>,
  source_root: PathBuf,
}

#[async_trait]
impl Processor for ScriptProcessor {
  fn name(&self) -> &str {
    "ScriptProcessor"
  }

  fn input_type(&self) -> Option<ContentType> {
    Some(ContentType::of::<String>())
  }

  fn output_type(&self) -> Option<ContentType> {
    Some(ContentType::of::<String>())
  }

  fn parameters(&self) -> Vec<ParameterDecl> {
    vec![ParameterDecl::new("suffix", ""), ParameterDecl::new("repeat", 1i64)]
  }

  async fn process(&self, input: Content, ctx: &dyn ProcessorContext) -> Result<Content, PluginError> {
    self.counters.record_process(ctx.logger().asset());

    let suffix: String = ctx.parameters().get_or("suffix", String::new())?;
    let repeat: i64 = ctx.parameters().get_or("repeat", 1i64)?;
    let script = input.get::<String>()?.clone();

    let mut out = String::new();
    for line in script.lines() {
      if let Some(spec) = line.strip_prefix("@build ") {
        let mut parts = spec.split_whitespace();
        let mut request = BuildRequest::new(parts.next().unwrap_or_default());
        for pair in parts {
          if let Some((key, value)) = pair.split_once('=') {
            request = request.with_parameter(key, value);
          }
        }
        let loaded = ctx.load_asset::<String>(request).await?;
        out.push_str(&loaded);
      } else if let Some(inline) = line.strip_prefix("@convert ") {
        let converted = ctx
          .convert(Content::new(inline.to_string()), "ScriptProcessor", ParameterBag::new())
          .await?;
        out.push_str(converted.get::<String>()?);
      } else if let Some(path) = line.strip_prefix("@dep ") {
        ctx.add_dependency(Path::new(path.trim()))?;
        if let Ok(data) = tokio::fs::read_to_string(self.source_root.join(path.trim())).await {
          out.push_str(&data);
          out.push('\n');
        }
      } else if let Some(ms) = line.strip_prefix("@sleep ") {
        tokio::time::sleep(Duration::from_millis(ms.trim().parse()?)).await;
      } else if let Some(message) = line.strip_prefix("@warn ") {
        ctx.logger().warning(message.trim());
      } else if line.trim() == "@fail" {
        return Err("scripted failure".into());
      } else {
        for _ in 0..repeat {
          out.push_str(line);
          out.push_str(&suffix);
        }
        out.push('\n');
      }
    }
    Ok(Content::new(out))
  }
}

pub struct TextArtifactWriter {
  counters: Arc<Counters>,
}

#[async_trait]
impl Writer for TextArtifactWriter {
  fn name(&self) -> &str {
    "TextArtifactWriter"
  }

  fn content_type(&self) -> ContentType {
    ContentType::of::<String>()
  }

  async fn write(&self, content: &Content, platform: &TargetPlatform, output: &Path) -> Result<(), PluginError> {
    self.counters.writes.fetch_add(1, Ordering::SeqCst);
    let text = content.get::<String>()?;
    tokio::fs::write(output, format!("{}\n{}", platform, text)).await?;
    Ok(())
  }

  async fn read(&self, input: &Path) -> Result<Content, PluginError> {
    let raw = tokio::fs::read_to_string(input).await?;
    let body = raw.split_once('\n').map(|(_, body)| body.to_string()).unwrap_or_default();
    Ok(Content::new(body))
  }
}

pub fn registry(counters: &Arc<Counters>, source_root: &Path) -> PluginRegistry {
  PluginRegistry::new()
    .with_importer(ScriptImporter {
      counters: counters.clone(),
    })
    .with_processor(ScriptProcessor {
      counters: counters.clone(),
      source_root: source_root.to_path_buf(),
    })
    .with_writer(TextArtifactWriter {
      counters: counters.clone(),
    })
}

/// Isolated project: sources under `src/`, artifacts under `bin/`, cache under `obj/`.
pub struct TestEnv {
  pub temp: TempDir,
  pub counters: Arc<Counters>,
}

impl TestEnv {
  pub fn new() -> Self {
    let temp = TempDir::new().unwrap();
    std::fs::create_dir_all(temp.path().join("src")).unwrap();
    Self {
      temp,
      counters: Arc::new(Counters::default()),
    }
  }

  pub fn source_root(&self) -> PathBuf {
    let p = self.temp.path().join("src");
    dunce::canonicalize(&p).unwrap_or(p)
  }

  pub fn output_dir(&self) -> PathBuf {
    self.temp.path().join("bin")
  }

  pub fn config(&self) -> PipelineConfig {
    PipelineConfig::new(self.source_root())
      .with_output_dir(self.output_dir())
      .with_intermediate_dir(self.temp.path().join("obj"))
      .with_platform(TargetPlatform::new("testos"))
      .with_profile(TargetProfile::HiDef)
      .with_configuration("Debug")
      .with_parallelism(4)
  }

  /// Write a file relative to the source root.
  pub fn write(&self, relative_path: &str, content: &str) -> PathBuf {
    let path = self.source_root().join(relative_path);
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(&path, content).unwrap();
    path
  }

  pub fn open(&self) -> Orchestrator {
    self.open_with(self.config())
  }

  pub fn open_with(&self, config: PipelineConfig) -> Orchestrator {
    Orchestrator::open(config, registry(&self.counters, &self.source_root())).unwrap()
  }
}
