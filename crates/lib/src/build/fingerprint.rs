use serde::Serialize;

use crate::config::{TargetPlatform, TargetProfile};
use crate::consts::{FINGERPRINT_VERSION, OUTPUT_KEY_LEN};
use crate::params::ParameterBag;
use crate::util::hash::{ContentHash, HashError, Hashable};

use super::Fingerprint;

/// Everything that can influence a compiled artifact.
///
/// Serialized to canonical JSON and hashed; the parameter bag is a `BTreeMap`
/// so key order never matters.
#[derive(Debug, Clone, Serialize)]
pub struct FingerprintInput<'a> {
  pub version: u32,
  pub source: &'a str,
  pub signature: Option<&'a ContentHash>,
  pub importer: &'a str,
  pub processor: &'a str,
  pub parameters: &'a ParameterBag,
  pub platform: &'a TargetPlatform,
  pub profile: TargetProfile,
  pub configuration: &'a str,
}

impl Hashable for FingerprintInput<'_> {}

impl<'a> FingerprintInput<'a> {
  #[allow(clippy::too_many_arguments)]
  pub fn new(
    source: &'a str,
    signature: Option<&'a ContentHash>,
    importer: &'a str,
    processor: &'a str,
    parameters: &'a ParameterBag,
    platform: &'a TargetPlatform,
    profile: TargetProfile,
    configuration: &'a str,
  ) -> Self {
    Self {
      version: FINGERPRINT_VERSION,
      source,
      signature,
      importer,
      processor,
      parameters,
      platform,
      profile,
      configuration,
    }
  }

  pub fn fingerprint(&self) -> Result<Fingerprint, HashError> {
    Ok(Fingerprint(self.compute_hash()?.0))
  }
}

#[derive(Serialize)]
struct OutputKeyInput<'a> {
  kind: &'static str,
  #[serde(flatten)]
  input: FingerprintInput<'a>,
}

impl Hashable for OutputKeyInput<'_> {}

/// Short key naming the default artifact for a configuration.
///
/// Ignores the source signature so edits to a source rewrite the same
/// artifact, while different parameters still get distinct artifacts.
pub fn output_key(input: &FingerprintInput<'_>) -> Result<String, HashError> {
  let keyed = OutputKeyInput {
    kind: "output",
    input: FingerprintInput {
      signature: None,
      ..input.clone()
    },
  };
  let hash = keyed.compute_hash()?;
  Ok(hash.0[..OUTPUT_KEY_LEN].to_string())
}
