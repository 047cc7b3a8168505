//! Ember: a development-time module pipeline with hot module replacement.
//!
//! Source files are resolved into a [`graph::ModuleGraph`], file-system
//! changes are turned into HMR payloads by [`core::services::ChangePropagator`],
//! and pushed over the [`infrastructure::HmrChannel`] to browsers running the
//! [`client`] runtime.

pub mod cli;
pub mod client;
pub mod core;
pub mod graph;
pub mod infrastructure;
pub mod prebundle;
pub mod resolver;
pub mod transform;
pub mod utils;
