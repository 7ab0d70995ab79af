//! Type-erased asset objects passed between plugins.

use std::any::{Any, TypeId};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::PipelineError;

/// Runtime identity of an in-memory content type.
#[derive(Clone, Copy)]
pub struct ContentType {
  id: TypeId,
  name: &'static str,
}

impl ContentType {
  pub fn of<T: Any>() -> Self {
    Self {
      id: TypeId::of::<T>(),
      name: std::any::type_name::<T>(),
    }
  }

  /// Fully qualified Rust type name.
  pub fn name(&self) -> &'static str {
    self.name
  }
}

impl PartialEq for ContentType {
  fn eq(&self, other: &Self) -> bool {
    self.id == other.id
  }
}

impl Eq for ContentType {}

impl Hash for ContentType {
  fn hash<H: Hasher>(&self, state: &mut H) {
    self.id.hash(state);
  }
}

impl fmt::Debug for ContentType {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "ContentType({})", self.name)
  }
}

impl fmt::Display for ContentType {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.name)
  }
}

/// An in-memory asset object, cheap to clone.
#[derive(Clone)]
pub struct Content {
  content_type: ContentType,
  value: Arc<dyn Any + Send + Sync>,
}

impl Content {
  pub fn new<T: Any + Send + Sync>(value: T) -> Self {
    Self {
      content_type: ContentType::of::<T>(),
      value: Arc::new(value),
    }
  }

  pub fn content_type(&self) -> ContentType {
    self.content_type
  }

  pub fn is<T: Any>(&self) -> bool {
    self.content_type == ContentType::of::<T>()
  }

  pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
    self.value.downcast_ref::<T>()
  }

  /// Borrow the value as `T` or fail with `ContentTypeMismatch`.
  pub fn get<T: Any>(&self) -> Result<&T, PipelineError> {
    self.downcast_ref::<T>().ok_or_else(|| self.mismatch::<T>())
  }

  /// Take shared ownership of the value as `T`.
  pub fn into_arc<T: Any + Send + Sync>(self) -> Result<Arc<T>, PipelineError> {
    let mismatch = self.mismatch::<T>();
    self.value.downcast::<T>().map_err(|_| mismatch)
  }

  fn mismatch<T: Any>(&self) -> PipelineError {
    PipelineError::ContentTypeMismatch {
      expected: std::any::type_name::<T>().to_string(),
      found: self.content_type.name().to_string(),
    }
  }
}

impl fmt::Debug for Content {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Content").field("type", &self.content_type.name).finish()
  }
}

/// Handle to a compiled artifact on disk, typed by the content it holds.
///
/// This is only a location; load the content with `build_and_load_asset`.
#[derive(Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExternalReference<T = Content> {
  filename: PathBuf,
  #[serde(skip)]
  marker: PhantomData<fn() -> T>,
}

impl<T> ExternalReference<T> {
  pub fn new(filename: impl Into<PathBuf>) -> Self {
    Self {
      filename: filename.into(),
      marker: PhantomData,
    }
  }

  pub fn filename(&self) -> &Path {
    &self.filename
  }

  /// Reinterpret the reference as pointing at another content type.
  pub fn cast<U>(self) -> ExternalReference<U> {
    ExternalReference::new(self.filename)
  }
}

impl<T> Clone for ExternalReference<T> {
  fn clone(&self) -> Self {
    Self::new(self.filename.clone())
  }
}

impl<T> PartialEq for ExternalReference<T> {
  fn eq(&self, other: &Self) -> bool {
    self.filename == other.filename
  }
}

impl<T> Eq for ExternalReference<T> {}

impl<T> fmt::Debug for ExternalReference<T> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_tuple("ExternalReference").field(&self.filename).finish()
  }
}
