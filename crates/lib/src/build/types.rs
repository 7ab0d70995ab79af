use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::params::{ParameterBag, ParameterValue};

/// A request to compile one source asset.
///
/// Requests are values: the builder methods consume and return a new request,
/// so a submitted request is never mutated.
#[derive(Debug, Clone, PartialEq)]
pub struct BuildRequest {
  pub source: PathBuf,
  pub importer: Option<String>,
  pub processor: Option<String>,
  pub parameters: ParameterBag,
  pub asset_name: Option<String>,
}

impl BuildRequest {
  pub fn new(source: impl Into<PathBuf>) -> Self {
    Self {
      source: source.into(),
      importer: None,
      processor: None,
      parameters: ParameterBag::new(),
      asset_name: None,
    }
  }

  pub fn with_importer(mut self, importer: impl Into<String>) -> Self {
    self.importer = Some(importer.into());
    self
  }

  pub fn with_processor(mut self, processor: impl Into<String>) -> Self {
    self.processor = Some(processor.into());
    self
  }

  pub fn with_parameters(mut self, parameters: ParameterBag) -> Self {
    self.parameters = parameters;
    self
  }

  pub fn with_parameter(mut self, key: impl Into<String>, value: impl Into<ParameterValue>) -> Self {
    self.parameters.insert(key, value);
    self
  }

  /// Output name relative to the output directory, without extension.
  pub fn with_asset_name(mut self, name: impl Into<String>) -> Self {
    self.asset_name = Some(name.into());
    self
  }
}

/// Identity of a fully resolved build configuration.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(pub String);

impl Fingerprint {
  pub fn as_str(&self) -> &str {
    &self.0
  }
}

impl fmt::Display for Fingerprint {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.0)
  }
}
