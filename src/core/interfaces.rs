use crate::core::protocol::HmrPayload;
use crate::utils::Result;
use async_trait::async_trait;
use serde_json::Value;
use std::path::Path;

/// Pulls import specifiers out of module source text.
///
/// Results keep source order and duplicates.
pub trait SpecifierExtractor: Send + Sync {
    fn name(&self) -> &str;
    fn extract(&self, path: &Path, source: &str) -> Vec<String>;
}

/// Where module source text comes from
#[async_trait]
pub trait ModuleSource: Send + Sync {
    async fn read_source(&self, path: &Path) -> Result<String>;
    async fn exists(&self, path: &Path) -> bool;
}

/// Outbound side of the HMR channel, as seen by the propagator
pub trait HmrBroadcaster: Send + Sync {
    /// Returns how many open connections the payload reached.
    fn broadcast(&self, payload: &HmrPayload) -> Result<usize>;
}

/// A freshly imported module instance handed to accept callbacks
#[derive(Debug, Clone, PartialEq)]
pub struct ImportedModule {
    pub url: String,
    pub exports: Value,
}

/// Client-side dynamic import
#[async_trait]
pub trait ModuleImporter: Send + Sync {
    async fn import(&self, url: &str) -> Result<ImportedModule>;
}

/// Client-side full page reload
pub trait PageReloader: Send + Sync {
    fn reload(&self);
}
