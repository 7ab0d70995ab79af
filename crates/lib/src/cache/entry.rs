use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::build::Fingerprint;
use crate::consts::CACHE_FORMAT_VERSION;
use crate::util::hash::{ContentHash, file_signature};

/// A file path together with the signature it had when recorded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordedFile {
  pub path: PathBuf,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub signature: Option<ContentHash>,
}

impl RecordedFile {
  /// Record `path` with its current signature.
  pub fn capture(path: impl Into<PathBuf>) -> Self {
    let path = path.into();
    let signature = file_signature(&path);
    Self { path, signature }
  }

  pub fn exists(&self) -> bool {
    self.path.is_file()
  }

  /// Whether the file on disk still has the recorded signature.
  pub fn is_current(&self) -> bool {
    file_signature(&self.path) == self.signature
  }
}

/// Persisted record of a successful build item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
  pub version: u32,
  pub fingerprint: Fingerprint,

  /// Source identity relative to the source root.
  pub asset: String,
  pub source: RecordedFile,

  pub importer: String,
  pub processor: String,
  pub writer: String,
  pub content_type: String,

  #[serde(default)]
  pub dependencies: Vec<RecordedFile>,

  /// Produced files; the primary artifact comes first.
  pub outputs: Vec<RecordedFile>,

  /// Fingerprints of assets this item built while it ran.
  #[serde(default)]
  pub nested: Vec<Fingerprint>,

  pub built_at_unix: u64,
}

impl CacheEntry {
  pub fn new(fingerprint: Fingerprint, asset: impl Into<String>, source: RecordedFile) -> Self {
    Self {
      version: CACHE_FORMAT_VERSION,
      fingerprint,
      asset: asset.into(),
      source,
      importer: String::new(),
      processor: String::new(),
      writer: String::new(),
      content_type: String::new(),
      dependencies: Vec::new(),
      outputs: Vec::new(),
      nested: Vec::new(),
      built_at_unix: SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs(),
    }
  }

  pub fn primary_output(&self) -> Option<&Path> {
    self.outputs.first().map(|o| o.path.as_path())
  }
}
