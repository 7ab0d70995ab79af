//! Advisory lock on an intermediate directory.
//!
//! Two sessions sharing an intermediate directory would race on cache entries,
//! so writers take an exclusive lock and readers such as `status` a shared one.

use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::consts::{APP_NAME, LOCK_FILENAME};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockMode {
  Shared,
  Exclusive,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LockMetadata {
  pub version: u32,
  pub pid: u32,
  pub started_at_unix: u64,
  pub command: String,
  pub intermediate_dir: PathBuf,
}

#[derive(Debug, Error)]
pub enum CacheLockError {
  #[error(
    "Build cache is locked by another process: {command} (PID {pid}, started {started_at})\n\
     If you're sure no {app} process is running, remove the lock file:\n  {path}",
    app = APP_NAME,
    path = .lock_path.display()
  )]
  Contention {
    command: String,
    pid: u32,
    started_at: String,
    lock_path: PathBuf,
  },

  #[error(
    "Build cache is locked (could not read lock metadata)\n\
     If you're sure no {app} process is running, remove the lock file:\n  {path}",
    app = APP_NAME,
    path = .lock_path.display()
  )]
  ContentionUnknown { lock_path: PathBuf },

  #[error("Failed to create intermediate directory: {0}")]
  CreateDir(#[source] io::Error),

  #[error("Failed to open lock file: {0}")]
  OpenFile(#[source] io::Error),

  #[error("Failed to write lock metadata: {0}")]
  WriteMetadata(#[source] io::Error),

  #[error("Failed to acquire lock: {0}")]
  LockFailed(#[source] io::Error),
}

/// Held lock; released when dropped.
pub struct CacheLock {
  file: File,
  lock_path: PathBuf,
}

impl CacheLock {
  pub fn acquire(intermediate_dir: &Path, mode: LockMode, command: &str) -> Result<Self, CacheLockError> {
    let lock_path = intermediate_dir.join(LOCK_FILENAME);

    std::fs::create_dir_all(intermediate_dir).map_err(CacheLockError::CreateDir)?;

    let file = OpenOptions::new()
      .read(true)
      .write(true)
      .create(true)
      .truncate(false)
      .open(&lock_path)
      .map_err(CacheLockError::OpenFile)?;

    if let Err(err) = try_lock(&file, mode) {
      if err.kind() == io::ErrorKind::WouldBlock {
        return Err(read_contention_error(&lock_path));
      }
      return Err(CacheLockError::LockFailed(err));
    }

    if mode == LockMode::Exclusive {
      write_metadata(&file, command, intermediate_dir)?;
    }

    debug!(path = %lock_path.display(), ?mode, "acquired cache lock");
    Ok(CacheLock { file, lock_path })
  }

  /// Read metadata through the held handle. Opening a second handle would
  /// fail on Windows, where locks are mandatory.
  pub fn read_metadata(&self) -> io::Result<LockMetadata> {
    let mut file = &self.file;
    file.seek(SeekFrom::Start(0))?;
    let mut contents = String::new();
    file.read_to_string(&mut contents)?;
    serde_json::from_str(&contents).map_err(io::Error::other)
  }

  pub fn lock_path(&self) -> &Path {
    &self.lock_path
  }
}

fn write_metadata(file: &File, command: &str, intermediate_dir: &Path) -> Result<(), CacheLockError> {
  let metadata = LockMetadata {
    version: 1,
    pid: std::process::id(),
    started_at_unix: SystemTime::now()
      .duration_since(UNIX_EPOCH)
      .unwrap_or_default()
      .as_secs(),
    command: command.to_string(),
    intermediate_dir: intermediate_dir.to_path_buf(),
  };

  file.set_len(0).map_err(CacheLockError::WriteMetadata)?;
  let mut writer = io::BufWriter::new(file);
  serde_json::to_writer_pretty(&mut writer, &metadata).map_err(|e| CacheLockError::WriteMetadata(io::Error::other(e)))?;
  writer.flush().map_err(CacheLockError::WriteMetadata)?;
  Ok(())
}

fn read_contention_error(lock_path: &Path) -> CacheLockError {
  if let Ok(mut file) = File::open(lock_path) {
    let mut contents = String::new();
    if file.read_to_string(&mut contents).is_ok()
      && let Ok(metadata) = serde_json::from_str::<LockMetadata>(&contents)
    {
      return CacheLockError::Contention {
        command: metadata.command,
        pid: metadata.pid,
        started_at: format!("Unix timestamp {}", metadata.started_at_unix),
        lock_path: lock_path.to_path_buf(),
      };
    }
  }

  CacheLockError::ContentionUnknown {
    lock_path: lock_path.to_path_buf(),
  }
}

#[cfg(unix)]
fn try_lock(file: &File, mode: LockMode) -> io::Result<()> {
  use rustix::fs::{FlockOperation, flock};
  use std::os::unix::io::AsFd;

  let operation = match mode {
    LockMode::Shared => FlockOperation::NonBlockingLockShared,
    LockMode::Exclusive => FlockOperation::NonBlockingLockExclusive,
  };

  flock(file.as_fd(), operation).map_err(|e| io::Error::from_raw_os_error(e.raw_os_error()))
}

#[cfg(windows)]
fn try_lock(file: &File, mode: LockMode) -> io::Result<()> {
  use std::os::windows::io::AsRawHandle;
  use windows_sys::Win32::Foundation::HANDLE;
  use windows_sys::Win32::Storage::FileSystem::{LOCKFILE_EXCLUSIVE_LOCK, LOCKFILE_FAIL_IMMEDIATELY, LockFileEx};

  let handle = file.as_raw_handle() as HANDLE;
  let flags = match mode {
    LockMode::Shared => LOCKFILE_FAIL_IMMEDIATELY,
    LockMode::Exclusive => LOCKFILE_FAIL_IMMEDIATELY | LOCKFILE_EXCLUSIVE_LOCK,
  };

  // SAFETY: a zeroed OVERLAPPED is valid, and the handle stays open for the call.
  let result = unsafe {
    let mut overlapped = std::mem::zeroed();
    LockFileEx(handle, flags, 0, 1, 0, &mut overlapped)
  };

  if result == 0 {
    Err(io::Error::last_os_error())
  } else {
    Ok(())
  }
}
