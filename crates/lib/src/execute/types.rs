//! Result types for build sessions.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::Serialize;

use crate::build::Fingerprint;
use crate::content::ExternalReference;
use crate::error::PipelineError;

/// A successfully built (or reused) artifact.
#[derive(Debug, Clone, Serialize)]
pub struct BuiltAsset {
  pub fingerprint: Fingerprint,
  pub asset: String,
  pub reference: ExternalReference,
  /// Writer that produced the artifact; used to read it back.
  pub writer: String,
  pub content_type: String,
  /// True when the artifact came from the cache without running plugins.
  pub cached: bool,
}

/// A top-level request that failed.
#[derive(Debug, Clone)]
pub struct BuildFailure {
  /// The source path as requested.
  pub request: String,
  /// Asset names from the requested item down to the item that failed first.
  pub chain: Vec<String>,
  pub error: PipelineError,
}

impl BuildFailure {
  pub fn new(request: impl Into<String>, error: PipelineError) -> Self {
    let request = request.into();
    let mut chain = error.failure_chain();
    if chain.is_empty() {
      chain.push(request.clone());
    }
    Self { request, chain, error }
  }

  pub fn root_cause(&self) -> &PipelineError {
    self.error.root_cause()
  }
}

/// Aggregate result of [`Orchestrator::build_all`](super::Orchestrator::build_all).
#[derive(Debug, Default)]
pub struct SessionReport {
  /// Successful top-level requests, in request order.
  pub succeeded: Vec<BuiltAsset>,

  /// Failed top-level requests, in request order.
  pub failures: Vec<BuildFailure>,

  /// Requests cancelled before completing (fail-fast).
  pub cancelled: usize,

  /// Items whose plugins ran this session, nested items included.
  pub built: usize,

  /// Items reused from the cache this session, nested items included.
  pub cached: usize,

  /// Items that failed this session, nested items included.
  pub failed: usize,

  /// Warnings logged by each item, keyed by asset.
  pub warnings: BTreeMap<String, Vec<String>>,

  pub duration: Duration,
}

impl SessionReport {
  /// Returns true if every request succeeded.
  pub fn is_success(&self) -> bool {
    self.failures.is_empty() && self.cancelled == 0
  }

  /// Returns the number of top-level requests accounted for.
  pub fn total(&self) -> usize {
    self.succeeded.len() + self.failures.len() + self.cancelled
  }
}
