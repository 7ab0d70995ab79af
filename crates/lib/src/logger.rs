//! Per-item logging handle given to plugins through their context.

use std::sync::{Arc, Mutex};

use tracing::{Span, debug, info, info_span, warn};

/// Logger attributed to a single build item.
///
/// Every event carries the item's `asset` and `fingerprint` fields. Warnings
/// are additionally retained so the session report can list them per item.
#[derive(Debug, Clone)]
pub struct BuildLogger {
  asset: Arc<str>,
  fingerprint: Arc<str>,
  warnings: Arc<Mutex<Vec<String>>>,
}

impl BuildLogger {
  pub fn new(asset: &str, fingerprint: &str) -> Self {
    Self {
      asset: Arc::from(asset),
      fingerprint: Arc::from(fingerprint),
      warnings: Arc::new(Mutex::new(Vec::new())),
    }
  }

  /// Logger for work that is not attached to any build item.
  pub fn detached(label: &str) -> Self {
    Self::new(label, "-")
  }

  pub fn asset(&self) -> &str {
    &self.asset
  }

  /// Span covering the item's execution.
  pub fn span(&self) -> Span {
    info_span!("build_item", asset = %self.asset, fingerprint = %self.fingerprint)
  }

  /// Low-priority progress detail.
  pub fn message(&self, message: &str) {
    debug!(asset = %self.asset, fingerprint = %self.fingerprint, "{}", message);
  }

  /// A message the user should see at normal verbosity.
  pub fn important(&self, message: &str) {
    info!(asset = %self.asset, fingerprint = %self.fingerprint, "{}", message);
  }

  pub fn warning(&self, message: &str) {
    warn!(asset = %self.asset, fingerprint = %self.fingerprint, "{}", message);
    if let Ok(mut warnings) = self.warnings.lock() {
      warnings.push(message.to_string());
    }
  }

  pub fn warnings(&self) -> Vec<String> {
    self.warnings.lock().map(|w| w.clone()).unwrap_or_default()
  }
}
