//! Persistent build cache.
//!
//! Each successful build item is stored as `<cache_dir>/<fingerprint>.json`.
//! Entries are written atomically and loaded once per session. Loading never
//! fails: unreadable or outdated entries are logged and dropped, which only
//! forces the affected items to rebuild.

mod entry;

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::Serialize;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::build::Fingerprint;
use crate::consts::CACHE_FORMAT_VERSION;
use crate::error::PipelineError;

pub use entry::{CacheEntry, RecordedFile};

/// Why a cached item must be rebuilt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StaleReason {
  NotCached,
  SourceChanged(PathBuf),
  DependencyChanged(PathBuf),
  OutputMissing(PathBuf),
  OutputChanged(PathBuf),
  NestedStale(Fingerprint),
}

impl fmt::Display for StaleReason {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      StaleReason::NotCached => write!(f, "not cached"),
      StaleReason::SourceChanged(p) => write!(f, "source changed: {}", p.display()),
      StaleReason::DependencyChanged(p) => write!(f, "dependency changed: {}", p.display()),
      StaleReason::OutputMissing(p) => write!(f, "output missing: {}", p.display()),
      StaleReason::OutputChanged(p) => write!(f, "output modified: {}", p.display()),
      StaleReason::NestedStale(fp) => write!(f, "nested build {} is stale", fp),
    }
  }
}

/// Counts from [`BuildCache::clean`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CleanStats {
  pub entries_removed: usize,
  pub files_removed: usize,
  pub bytes_freed: u64,
  pub dirs_removed: usize,
}

pub struct BuildCache {
  dir: PathBuf,
  entries: Mutex<HashMap<Fingerprint, CacheEntry>>,
}

impl BuildCache {
  /// Load every entry under `dir`. A missing directory is an empty cache.
  pub fn load(dir: impl Into<PathBuf>) -> Self {
    let dir = dir.into();
    let mut entries = HashMap::new();

    match fs::read_dir(&dir) {
      Ok(read_dir) => {
        for item in read_dir.flatten() {
          let path = item.path();
          if path.extension().and_then(|e| e.to_str()) != Some("json") {
            continue;
          }
          match read_entry(&path) {
            Ok(entry) => {
              entries.insert(entry.fingerprint.clone(), entry);
            }
            Err(err) => {
              warn!(path = %path.display(), error = %err, "dropping unreadable cache entry");
              let _ = fs::remove_file(&path);
            }
          }
        }
      }
      Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
      Err(err) => {
        warn!(dir = %dir.display(), error = %err, "cache directory unreadable, starting empty");
      }
    }

    debug!(dir = %dir.display(), entries = entries.len(), "loaded build cache");
    Self {
      dir,
      entries: Mutex::new(entries),
    }
  }

  pub fn dir(&self) -> &Path {
    &self.dir
  }

  fn entry_path(&self, fingerprint: &Fingerprint) -> PathBuf {
    self.dir.join(format!("{}.json", fingerprint))
  }

  fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<Fingerprint, CacheEntry>> {
    self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
  }

  pub fn get(&self, fingerprint: &Fingerprint) -> Option<CacheEntry> {
    self.lock().get(fingerprint).cloned()
  }

  pub fn len(&self) -> usize {
    self.lock().len()
  }

  pub fn is_empty(&self) -> bool {
    self.lock().is_empty()
  }

  /// All entries, ordered by asset then fingerprint.
  pub fn entries(&self) -> Vec<CacheEntry> {
    let mut entries: Vec<CacheEntry> = self.lock().values().cloned().collect();
    entries.sort_by(|a, b| a.asset.cmp(&b.asset).then_with(|| a.fingerprint.cmp(&b.fingerprint)));
    entries
  }

  /// Persist `entry`, replacing any entry that claims the same primary output.
  pub fn commit(&self, entry: CacheEntry) -> Result<(), PipelineError> {
    fs::create_dir_all(&self.dir).map_err(|e| PipelineError::io(&self.dir, e))?;

    let path = self.entry_path(&entry.fingerprint);
    let json = serde_json::to_vec_pretty(&entry).map_err(|e| PipelineError::io(&path, e))?;
    let mut temp = tempfile::NamedTempFile::new_in(&self.dir).map_err(|e| PipelineError::io(&self.dir, e))?;
    temp.write_all(&json).map_err(|e| PipelineError::io(temp.path(), e))?;
    temp.persist(&path).map_err(|e| PipelineError::io(&path, e.error))?;

    let superseded: Vec<Fingerprint> = {
      let mut entries = self.lock();
      let primary = entry.primary_output().map(Path::to_path_buf);
      let superseded: Vec<Fingerprint> = entries
        .values()
        .filter(|other| other.fingerprint != entry.fingerprint && other.primary_output() == primary.as_deref())
        .map(|other| other.fingerprint.clone())
        .collect();
      for fingerprint in &superseded {
        entries.remove(fingerprint);
      }
      entries.insert(entry.fingerprint.clone(), entry);
      superseded
    };

    for fingerprint in superseded {
      debug!(fingerprint = %fingerprint, "evicting superseded cache entry");
      let _ = fs::remove_file(self.entry_path(&fingerprint));
    }

    Ok(())
  }

  /// Remove an entry from memory and disk.
  pub fn remove(&self, fingerprint: &Fingerprint) -> Option<CacheEntry> {
    let removed = self.lock().remove(fingerprint);
    if removed.is_some() {
      let _ = fs::remove_file(self.entry_path(fingerprint));
    }
    removed
  }

  /// Why the entry for `fingerprint` cannot be reused, or `None` if it can.
  pub fn stale_reason(&self, fingerprint: &Fingerprint) -> Option<StaleReason> {
    let mut memo = HashMap::new();
    let mut visiting = HashSet::new();
    self.check(fingerprint, &mut memo, &mut visiting)
  }

  fn check(
    &self,
    fingerprint: &Fingerprint,
    memo: &mut HashMap<Fingerprint, Option<StaleReason>>,
    visiting: &mut HashSet<Fingerprint>,
  ) -> Option<StaleReason> {
    if let Some(known) = memo.get(fingerprint) {
      return known.clone();
    }
    if !visiting.insert(fingerprint.clone()) {
      return None;
    }

    let reason = match self.get(fingerprint) {
      None => Some(StaleReason::NotCached),
      Some(entry) => self.check_entry(&entry, memo, visiting),
    };

    visiting.remove(fingerprint);
    memo.insert(fingerprint.clone(), reason.clone());
    reason
  }

  fn check_entry(
    &self,
    entry: &CacheEntry,
    memo: &mut HashMap<Fingerprint, Option<StaleReason>>,
    visiting: &mut HashSet<Fingerprint>,
  ) -> Option<StaleReason> {
    if !entry.source.is_current() {
      return Some(StaleReason::SourceChanged(entry.source.path.clone()));
    }
    if let Some(dep) = entry.dependencies.iter().find(|d| !d.is_current()) {
      return Some(StaleReason::DependencyChanged(dep.path.clone()));
    }
    if entry.outputs.is_empty() {
      return Some(StaleReason::NotCached);
    }
    for output in &entry.outputs {
      if !output.exists() {
        return Some(StaleReason::OutputMissing(output.path.clone()));
      }
      if !output.is_current() {
        return Some(StaleReason::OutputChanged(output.path.clone()));
      }
    }
    for nested in &entry.nested {
      if self.check(nested, memo, visiting).is_some() {
        return Some(StaleReason::NestedStale(nested.clone()));
      }
    }
    None
  }

  /// Delete every recorded output and cache entry, then prune empty
  /// directories left under `output_dir`.
  pub fn clean(&self, output_dir: &Path) -> Result<CleanStats, PipelineError> {
    let mut stats = CleanStats::default();
    let entries: Vec<CacheEntry> = self.lock().drain().map(|(_, e)| e).collect();

    for entry in &entries {
      for output in &entry.outputs {
        if let Ok(meta) = fs::metadata(&output.path)
          && meta.is_file()
        {
          fs::remove_file(&output.path).map_err(|e| PipelineError::io(&output.path, e))?;
          stats.files_removed += 1;
          stats.bytes_freed += meta.len();
        }
      }
      let path = self.entry_path(&entry.fingerprint);
      if path.exists() {
        fs::remove_file(&path).map_err(|e| PipelineError::io(&path, e))?;
      }
      stats.entries_removed += 1;
    }

    if output_dir.is_dir() {
      stats.dirs_removed = prune_empty_dirs(output_dir);
    }

    info!(
      entries = stats.entries_removed,
      files = stats.files_removed,
      bytes = stats.bytes_freed,
      "cleaned build outputs"
    );
    Ok(stats)
  }
}

fn read_entry(path: &Path) -> Result<CacheEntry, PipelineError> {
  let corrupt = |message: String| PipelineError::CacheCorruption {
    path: path.to_path_buf(),
    message,
  };
  let content = fs::read_to_string(path).map_err(|e| corrupt(e.to_string()))?;
  let entry: CacheEntry = serde_json::from_str(&content).map_err(|e| corrupt(e.to_string()))?;
  if entry.version != CACHE_FORMAT_VERSION {
    return Err(corrupt(format!("format version {} is not {}", entry.version, CACHE_FORMAT_VERSION)));
  }
  let expected = format!("{}.json", entry.fingerprint);
  if path.file_name().and_then(|n| n.to_str()) != Some(expected.as_str()) {
    return Err(corrupt(format!("entry does not match its file name (expected {})", expected)));
  }
  Ok(entry)
}

/// Remove empty directories below `root`, deepest first. The root itself is kept.
fn prune_empty_dirs(root: &Path) -> usize {
  let mut removed = 0;
  for entry in WalkDir::new(root).min_depth(1).contents_first(true).into_iter().flatten() {
    if entry.file_type().is_dir() && fs::remove_dir(entry.path()).is_ok() {
      removed += 1;
    }
  }
  removed
}
