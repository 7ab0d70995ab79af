//! Importer, processor and writer plugins.
//!
//! - [`traits`] - the contracts plugin authors implement
//! - [`registry`] - name and type based resolution
//! - [`builtin`] - content-agnostic plugins for raw bytes and text

pub mod builtin;
pub mod registry;
pub mod traits;

pub use registry::PluginRegistry;
pub use traits::{Importer, Processor, Writer};
