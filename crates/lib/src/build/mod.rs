//! Build requests and fingerprints.
//!
//! A build request names a source asset and, optionally, the importer and
//! processor to run and the parameters to run them with. Before anything
//! executes the request is resolved into a fingerprint: the hash of every
//! input that can influence the compiled artifact. Equal fingerprints mean the
//! cached artifact can be reused.

mod fingerprint;
mod types;

pub use fingerprint::{FingerprintInput, output_key};
pub use types::*;
