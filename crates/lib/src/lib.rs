//! kiln-lib: incremental, dependency-aware asset builds
//!
//! Source assets are turned into platform-specific artifacts by three kinds of
//! plugins:
//! - `Importer`: reads a source file into in-memory content
//! - `Processor`: transforms content, optionally building other assets
//! - `Writer`: serializes content into the compiled artifact format
//!
//! The [`Orchestrator`] decides what needs rebuilding, runs plugins
//! concurrently, and remembers results in a persistent cache.

pub mod build;
pub mod cache;
pub mod cache_lock;
pub mod config;
pub mod consts;
pub mod content;
pub mod context;
pub mod error;
pub mod execute;
pub mod graph;
pub mod logger;
pub mod params;
pub mod plugin;
pub mod util;

pub use build::{BuildRequest, Fingerprint};
pub use cache::{BuildCache, CleanStats, StaleReason};
pub use config::{PipelineConfig, TargetPlatform, TargetProfile};
pub use content::{Content, ContentType, ExternalReference};
pub use context::ProcessorContext;
pub use error::{PipelineError, PluginError};
pub use execute::{BuildFailure, BuiltAsset, Orchestrator, SessionReport};
pub use logger::BuildLogger;
pub use params::{ParameterBag, ParameterDecl, ParameterKind, ParameterValue};
pub use plugin::{Importer, PluginRegistry, Processor, Writer};
