//! Processor parameters.
//!
//! A `ParameterBag` is a string-keyed map of loosely typed values. Processors
//! declare the parameters they understand with defaults; callers override them
//! per request. Values are coerced to the declared kind before they reach the
//! processor or the fingerprint, so `"5"` and `5` address the same cache entry.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::PipelineError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParameterValue {
  Bool(bool),
  Integer(i64),
  Float(f64),
  Text(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ParameterKind {
  Bool,
  Integer,
  Float,
  Text,
}

impl fmt::Display for ParameterKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let name = match self {
      ParameterKind::Bool => "bool",
      ParameterKind::Integer => "integer",
      ParameterKind::Float => "float",
      ParameterKind::Text => "text",
    };
    f.write_str(name)
  }
}

impl fmt::Display for ParameterValue {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      ParameterValue::Bool(v) => write!(f, "{}", v),
      ParameterValue::Integer(v) => write!(f, "{}", v),
      ParameterValue::Float(v) => write!(f, "{}", v),
      ParameterValue::Text(v) => f.write_str(v),
    }
  }
}

impl ParameterValue {
  pub fn kind(&self) -> ParameterKind {
    match self {
      ParameterValue::Bool(_) => ParameterKind::Bool,
      ParameterValue::Integer(_) => ParameterKind::Integer,
      ParameterValue::Float(_) => ParameterKind::Float,
      ParameterValue::Text(_) => ParameterKind::Text,
    }
  }

  /// Convert to `kind`, accepting the usual string and numeric widenings.
  ///
  /// Non-finite floats are refused: they have no distinct JSON form, so they
  /// would collapse into one fingerprint.
  pub fn coerce(&self, kind: ParameterKind) -> Option<ParameterValue> {
    match (kind, self) {
      (ParameterKind::Bool, ParameterValue::Bool(v)) => Some(ParameterValue::Bool(*v)),
      (ParameterKind::Bool, ParameterValue::Text(s)) => {
        let s = s.trim();
        if s.eq_ignore_ascii_case("true") {
          Some(ParameterValue::Bool(true))
        } else if s.eq_ignore_ascii_case("false") {
          Some(ParameterValue::Bool(false))
        } else {
          None
        }
      }
      (ParameterKind::Integer, ParameterValue::Integer(v)) => Some(ParameterValue::Integer(*v)),
      (ParameterKind::Integer, ParameterValue::Text(s)) => s.trim().parse().ok().map(ParameterValue::Integer),
      (ParameterKind::Float, ParameterValue::Float(v)) => v.is_finite().then_some(ParameterValue::Float(*v)),
      (ParameterKind::Float, ParameterValue::Integer(v)) => Some(ParameterValue::Float(*v as f64)),
      (ParameterKind::Float, ParameterValue::Text(s)) => s
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .map(ParameterValue::Float),
      (ParameterKind::Text, value) => Some(ParameterValue::Text(value.to_string())),
      _ => None,
    }
  }
}

impl From<bool> for ParameterValue {
  fn from(v: bool) -> Self {
    ParameterValue::Bool(v)
  }
}

impl From<i64> for ParameterValue {
  fn from(v: i64) -> Self {
    ParameterValue::Integer(v)
  }
}

impl From<i32> for ParameterValue {
  fn from(v: i32) -> Self {
    ParameterValue::Integer(v.into())
  }
}

impl From<f64> for ParameterValue {
  fn from(v: f64) -> Self {
    ParameterValue::Float(v)
  }
}

impl From<&str> for ParameterValue {
  fn from(v: &str) -> Self {
    ParameterValue::Text(v.to_string())
  }
}

impl From<String> for ParameterValue {
  fn from(v: String) -> Self {
    ParameterValue::Text(v)
  }
}

/// Rust types that can be read out of a `ParameterBag`.
pub trait ParameterType: Sized {
  const KIND: ParameterKind;

  fn from_value(value: &ParameterValue) -> Option<Self>;
}

impl ParameterType for bool {
  const KIND: ParameterKind = ParameterKind::Bool;

  fn from_value(value: &ParameterValue) -> Option<Self> {
    match value.coerce(Self::KIND)? {
      ParameterValue::Bool(v) => Some(v),
      _ => None,
    }
  }
}

impl ParameterType for i64 {
  const KIND: ParameterKind = ParameterKind::Integer;

  fn from_value(value: &ParameterValue) -> Option<Self> {
    match value.coerce(Self::KIND)? {
      ParameterValue::Integer(v) => Some(v),
      _ => None,
    }
  }
}

impl ParameterType for i32 {
  const KIND: ParameterKind = ParameterKind::Integer;

  fn from_value(value: &ParameterValue) -> Option<Self> {
    i64::from_value(value).and_then(|v| v.try_into().ok())
  }
}

impl ParameterType for u32 {
  const KIND: ParameterKind = ParameterKind::Integer;

  fn from_value(value: &ParameterValue) -> Option<Self> {
    i64::from_value(value).and_then(|v| v.try_into().ok())
  }
}

impl ParameterType for f64 {
  const KIND: ParameterKind = ParameterKind::Float;

  fn from_value(value: &ParameterValue) -> Option<Self> {
    match value.coerce(Self::KIND)? {
      ParameterValue::Float(v) => Some(v),
      _ => None,
    }
  }
}

impl ParameterType for String {
  const KIND: ParameterKind = ParameterKind::Text;

  fn from_value(value: &ParameterValue) -> Option<Self> {
    Some(value.to_string())
  }
}

/// A parameter a processor understands, with its default.
#[derive(Debug, Clone, PartialEq)]
pub struct ParameterDecl {
  pub name: String,
  pub kind: ParameterKind,
  pub default: ParameterValue,
}

impl ParameterDecl {
  pub fn new(name: impl Into<String>, default: impl Into<ParameterValue>) -> Self {
    let default = default.into();
    Self {
      name: name.into(),
      kind: default.kind(),
      default,
    }
  }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParameterBag {
  values: BTreeMap<String, ParameterValue>,
}

impl ParameterBag {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn with(mut self, key: impl Into<String>, value: impl Into<ParameterValue>) -> Self {
    self.insert(key, value);
    self
  }

  pub fn insert(&mut self, key: impl Into<String>, value: impl Into<ParameterValue>) {
    self.values.insert(key.into(), value.into());
  }

  pub fn get(&self, key: &str) -> Option<&ParameterValue> {
    self.values.get(key)
  }

  pub fn contains(&self, key: &str) -> bool {
    self.values.contains_key(key)
  }

  pub fn len(&self) -> usize {
    self.values.len()
  }

  pub fn is_empty(&self) -> bool {
    self.values.is_empty()
  }

  pub fn iter(&self) -> impl Iterator<Item = (&str, &ParameterValue)> {
    self.values.iter().map(|(k, v)| (k.as_str(), v))
  }

  /// Typed lookup falling back to `default` when the key is absent.
  ///
  /// A present value that cannot be coerced to `T` is an error rather than a
  /// silent fallback.
  pub fn get_or<T: ParameterType>(&self, key: &str, default: T) -> Result<T, PipelineError> {
    match self.values.get(key) {
      None => Ok(default),
      Some(value) => T::from_value(value).ok_or_else(|| PipelineError::ParameterTypeMismatch {
        asset: None,
        key: key.to_string(),
        expected: T::KIND.to_string(),
        found: format!("{} '{}'", value.kind(), value),
      }),
    }
  }

  /// Union of two bags where `overrides` wins on collision.
  pub fn merge(defaults: &ParameterBag, overrides: &ParameterBag) -> ParameterBag {
    let mut values = defaults.values.clone();
    for (key, value) in &overrides.values {
      values.insert(key.clone(), value.clone());
    }
    ParameterBag { values }
  }

  /// Merge caller values over declared defaults and coerce to declared kinds.
  ///
  /// Keys the processor does not declare are kept verbatim and logged.
  pub fn resolve(&self, decls: &[ParameterDecl], asset: &str, processor: &str) -> Result<ParameterBag, PipelineError> {
    let defaults = ParameterBag {
      values: decls.iter().map(|d| (d.name.clone(), d.default.clone())).collect(),
    };
    let mut resolved = ParameterBag::merge(&defaults, self);

    for (key, value) in resolved.values.iter_mut() {
      match decls.iter().find(|d| &d.name == key) {
        Some(decl) => {
          *value = value.coerce(decl.kind).ok_or_else(|| PipelineError::ParameterTypeMismatch {
            asset: Some(asset.to_string()),
            key: key.clone(),
            expected: decl.kind.to_string(),
            found: format!("{} '{}'", value.kind(), value),
          })?;
        }
        None => {
          warn!(asset, processor, key = %key, "unknown processor parameter");
          if let ParameterValue::Float(v) = value
            && !v.is_finite()
          {
            return Err(PipelineError::ParameterTypeMismatch {
              asset: Some(asset.to_string()),
              key: key.clone(),
              expected: "finite float".to_string(),
              found: format!("float '{}'", v),
            });
          }
        }
      }
    }

    Ok(resolved)
  }
}

impl<K: Into<String>, V: Into<ParameterValue>> FromIterator<(K, V)> for ParameterBag {
  fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
    let mut bag = ParameterBag::new();
    for (k, v) in iter {
      bag.insert(k, v);
    }
    bag
  }
}
