//! Hashing utilities for fingerprints and file signatures.
//!
//! - `ObjectHash`: a 20-character truncated hash identifying a serialized value
//! - `ContentHash`: a full 64-character hash of file or byte contents
//! - `Hashable`: derives an `ObjectHash` from any `Serialize` type

use std::fs;
use std::io::{self, Read};
use std::path::Path;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::consts::OBJ_HASH_PREFIX_LEN;

pub type HashError = serde_json::Error;

/// A truncated SHA-256 of a JSON-serialized value.
///
/// The hash is a lowercase hexadecimal string, e.g. `"a1b2c3d4e5f6789012ab"`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ObjectHash(pub String);

impl std::fmt::Display for ObjectHash {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "{}", self.0)
  }
}

/// Types whose identity is the hash of their canonical JSON form.
///
/// Implementors must serialize deterministically: use `BTreeMap` rather than
/// `HashMap` for any keyed collections.
pub trait Hashable: Serialize {
  fn compute_hash(&self) -> Result<ObjectHash, HashError> {
    let serialized = serde_json::to_string(self)?;
    let mut hasher = Sha256::new();
    hasher.update(serialized.as_bytes());
    let full = format!("{:x}", hasher.finalize());
    Ok(ObjectHash(full[..OBJ_HASH_PREFIX_LEN].to_string()))
  }
}

/// A full 64-character SHA-256 used as a file modification signature.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContentHash(pub String);

impl std::fmt::Display for ContentHash {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "{}", self.0)
  }
}

/// Hash a file's contents.
pub fn hash_file(path: &Path) -> io::Result<ContentHash> {
  let mut file = fs::File::open(path)?;
  let mut hasher = Sha256::new();
  let mut buffer = [0u8; 8192];

  loop {
    let bytes_read = file.read(&mut buffer)?;
    if bytes_read == 0 {
      break;
    }
    hasher.update(&buffer[..bytes_read]);
  }

  Ok(ContentHash(format!("{:x}", hasher.finalize())))
}

/// Signature of a file, or `None` when it does not exist or cannot be read.
pub fn file_signature(path: &Path) -> Option<ContentHash> {
  if !path.is_file() {
    return None;
  }
  hash_file(path).ok()
}

/// Hash arbitrary bytes.
pub fn hash_bytes(data: &[u8]) -> ContentHash {
  let mut hasher = Sha256::new();
  hasher.update(data);
  ContentHash(format!("{:x}", hasher.finalize()))
}
