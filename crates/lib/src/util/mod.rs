//! Shared utilities.
//!
//! Hashing and path normalization used by fingerprinting and the cache.

pub mod hash;
pub mod paths;
