//! Dependency resolution: source text in, graph edges out.
//!
//! Only relative specifiers (starting with `.`) become edges. Everything else
//! is a bare specifier, recorded in the importer's `externals` metadata and
//! never traversed.

use crate::core::interfaces::{ModuleSource, SpecifierExtractor};
use crate::graph::{Metadata, SharedGraph};
use crate::infrastructure::processors::RegexSpecifierExtractor;
use crate::infrastructure::TokioModuleSource;
use crate::utils::{paths, Logger, Result};
use serde_json::json;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub const CONTENT_HASH_KEY: &str = "contentHash";
pub const EXTERNALS_KEY: &str = "externals";

/// Graph identifier for a path on disk
pub fn module_id(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

pub fn content_hash(source: &str) -> String {
    blake3::hash(source.as_bytes()).to_hex().to_string()
}

pub fn is_relative_specifier(spec: &str) -> bool {
    spec.starts_with('.')
}

#[derive(Clone)]
pub struct DependencyResolver {
    source: Arc<dyn ModuleSource>,
    extractor: Arc<dyn SpecifierExtractor>,
}

impl DependencyResolver {
    pub fn new(source: Arc<dyn ModuleSource>, extractor: Arc<dyn SpecifierExtractor>) -> Self {
        Self { source, extractor }
    }

    pub fn source(&self) -> &Arc<dyn ModuleSource> {
        &self.source
    }

    pub fn extractor(&self) -> &Arc<dyn SpecifierExtractor> {
        &self.extractor
    }

    /// Specifiers of every static import in `path`, in source order.
    pub async fn parse_dependencies(&self, path: &Path) -> Result<Vec<String>> {
        let source = self.source.read_source(path).await?;
        Ok(self.extractor.extract(path, &source))
    }

    /// Resolve `spec` against the directory of `parent`.
    ///
    /// Bare specifiers come back unchanged. Existence of the target is not checked here.
    pub fn resolve_module_path(parent: &Path, spec: &str) -> String {
        if !is_relative_specifier(spec) {
            return spec.to_string();
        }

        let base = parent.parent().unwrap_or_else(|| Path::new(""));
        module_id(&paths::normalize_path(&base.join(spec)))
    }

    /// Re-derive the outgoing edges of `path` from its current source.
    ///
    /// Returns the module's direct dependencies after the refresh. An
    /// unreadable module keeps its node but ends up with no outgoing edges.
    pub async fn analyze_module(&self, path: &Path, graph: &SharedGraph) -> Vec<String> {
        Logger::analyzing_module(path);
        let id = module_id(path);

        let source = match self.source.read_source(path).await {
            Ok(source) => Some(source),
            Err(e) => {
                Logger::debug(&format!("No dependency discovery past {}: {}", path.display(), e));
                None
            }
        };

        let specifiers = source
            .as_deref()
            .map(|text| self.extractor.extract(path, text))
            .unwrap_or_default();

        let mut resolved = Vec::new();
        let mut externals = Vec::new();
        for spec in specifiers {
            if !is_relative_specifier(&spec) {
                externals.push(spec);
                continue;
            }

            let dep = Self::resolve_module_path(path, &spec);
            if !self.source.exists(Path::new(&dep)).await {
                Logger::debug(&format!(
                    "Unresolved import '{}' in {} (recorded as {})",
                    spec,
                    path.display(),
                    dep
                ));
            }
            resolved.push(dep);
        }

        let mut metadata = Metadata::new();
        metadata.insert(EXTERNALS_KEY.to_string(), json!(externals));
        if let Some(text) = &source {
            metadata.insert(CONTENT_HASH_KEY.to_string(), json!(content_hash(text)));
        }

        let mut graph = graph.write();
        graph.clear_dependencies(&id);
        graph.add_module(&id);
        for dep in &resolved {
            graph.add_dependency(&id, dep);
        }
        graph.set_module_metadata(&id, metadata);
        graph.get_dependencies(&id)
    }

    /// Build the subgraph reachable from `path`, skipping anything in `visited`.
    pub async fn resolve_module(&self, graph: &SharedGraph, path: &Path, visited: &mut HashSet<String>) {
        let mut stack = vec![path.to_path_buf()];

        while let Some(current) = stack.pop() {
            if !visited.insert(module_id(&current)) {
                continue;
            }

            let deps = self.analyze_module(&current, graph).await;
            // reversed so the first import is explored first
            for dep in deps.into_iter().rev() {
                if !visited.contains(&dep) {
                    stack.push(PathBuf::from(dep));
                }
            }
        }
    }

    /// Re-derive the edges of a changed module.
    ///
    /// Only `path` itself is re-analyzed; the walk continues into dependencies
    /// that have never been analyzed, so other modules keep their stored hashes.
    pub async fn refresh_module(&self, graph: &SharedGraph, path: &Path) {
        let mut visited: HashSet<String> = {
            let graph = graph.read();
            graph
                .module_ids()
                .into_iter()
                .filter(|id| {
                    graph
                        .get_module_metadata(id)
                        .is_some_and(|metadata| metadata.contains_key(EXTERNALS_KEY))
                })
                .collect()
        };
        visited.remove(&module_id(path));
        self.resolve_module(graph, path, &mut visited).await;
    }

    /// `resolve_module` with a fresh visited set; returns how many modules were analyzed.
    pub async fn resolve_entry(&self, graph: &SharedGraph, path: &Path) -> usize {
        let mut visited = HashSet::new();
        self.resolve_module(graph, path, &mut visited).await;
        visited.len()
    }
}

impl Default for DependencyResolver {
    fn default() -> Self {
        Self::new(
            Arc::new(TokioModuleSource),
            Arc::new(RegexSpecifierExtractor::new()),
        )
    }
}
