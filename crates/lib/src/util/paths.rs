use std::path::{Component, Path, PathBuf};

/// Lexically normalize a path, collapsing `.` and `..` without touching the filesystem.
pub fn normalize(path: &Path) -> PathBuf {
  let mut out = PathBuf::new();
  for component in path.components() {
    match component {
      Component::CurDir => {}
      Component::ParentDir => {
        if !out.pop() {
          out.push("..");
        }
      }
      other => out.push(other.as_os_str()),
    }
  }
  out
}

/// Resolve `path` against `base` when relative, then normalize.
///
/// Existing paths are canonicalized so symlinked roots compare equal.
pub fn resolve(base: &Path, path: &Path) -> PathBuf {
  let joined = if path.is_absolute() {
    path.to_path_buf()
  } else {
    base.join(path)
  };
  dunce::canonicalize(&joined).unwrap_or_else(|_| normalize(&joined))
}

/// Stable, relocatable identity of a source file.
///
/// Paths under `root` become root-relative with `/` separators; anything else
/// keeps its absolute form.
pub fn source_identity(root: &Path, path: &Path) -> String {
  let relative = path.strip_prefix(root).unwrap_or(path);
  let parts: Vec<String> = relative
    .components()
    .filter_map(|c| match c {
      Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
      _ => None,
    })
    .collect();
  let joined = parts.join("/");
  if relative.is_absolute() {
    format!("/{}", joined)
  } else {
    joined
  }
}
