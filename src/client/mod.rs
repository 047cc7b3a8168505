// Client-side HMR runtime
pub mod connection;
pub mod context;
pub mod events;

pub use connection::connect;
pub use context::*;
pub use events::*;

use crate::core::interfaces::{ImportedModule, ModuleImporter, PageReloader};
use crate::utils::{Logger, Result};
use async_trait::async_trait;
use serde_json::Value;

/// Importer for a client without a module loader: logs the URL and returns
/// empty exports. Used by `ember client` to watch a dev server's traffic.
#[derive(Debug, Clone, Default)]
pub struct HeadlessImporter;

#[async_trait]
impl ModuleImporter for HeadlessImporter {
    async fn import(&self, url: &str) -> Result<ImportedModule> {
        Logger::info(&format!("📦 import {}", url));
        Ok(ImportedModule {
            url: url.to_string(),
            exports: Value::Null,
        })
    }
}

#[derive(Debug, Clone, Default)]
pub struct HeadlessReloader;

impl PageReloader for HeadlessReloader {
    fn reload(&self) {
        Logger::info("🔄 full reload requested");
    }
}
