//! In-memory module dependency graph.
//!
//! An edge `A -> B` means module `A` imports module `B`. Every edge is stored
//! twice (`A.dependencies` and `B.dependents`) and all mutation goes through
//! [`ModuleGraph`] so the two sides never drift apart. Cycles are allowed.

use indexmap::{IndexMap, IndexSet};
use parking_lot::RwLock;
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::HashSet;
use std::sync::Arc;

pub type Metadata = Map<String, Value>;

/// Process-wide graph handle; never hold the guard across an `.await`
pub type SharedGraph = Arc<RwLock<ModuleGraph>>;

#[derive(Debug, Clone, Default)]
pub struct ModuleNode {
    id: String,
    dependencies: IndexSet<String>,
    dependents: IndexSet<String>,
    metadata: Metadata,
}

impl ModuleNode {
    fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            ..Default::default()
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn dependencies(&self) -> impl Iterator<Item = &str> {
        self.dependencies.iter().map(String::as_str)
    }

    pub fn dependents(&self) -> impl Iterator<Item = &str> {
        self.dependents.iter().map(String::as_str)
    }

    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }
}

/// Nested view of a module and everything it imports
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModuleTree {
    pub id: String,
    pub dependencies: Vec<ModuleTree>,
}

#[derive(Debug, Default)]
pub struct ModuleGraph {
    modules: IndexMap<String, ModuleNode>,
}

impl ModuleGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> SharedGraph {
        Arc::new(RwLock::new(Self::new()))
    }

    /// Returns the existing node or creates an empty one.
    pub fn add_module(&mut self, id: &str) -> &ModuleNode {
        self.modules
            .entry(id.to_string())
            .or_insert_with(|| ModuleNode::new(id))
    }

    /// Remove a node and every edge that references it.
    pub fn delete_module(&mut self, id: &str) -> Option<ModuleNode> {
        let node = self.modules.shift_remove(id)?;

        for dep in &node.dependencies {
            if let Some(dep_node) = self.modules.get_mut(dep) {
                dep_node.dependents.shift_remove(id);
            }
        }
        for parent in &node.dependents {
            if let Some(parent_node) = self.modules.get_mut(parent) {
                parent_node.dependencies.shift_remove(id);
            }
        }

        Some(node)
    }

    pub fn add_dependency(&mut self, from: &str, to: &str) {
        self.add_module(from);
        self.add_module(to);

        if let Some(from_node) = self.modules.get_mut(from) {
            from_node.dependencies.insert(to.to_string());
        }
        if let Some(to_node) = self.modules.get_mut(to) {
            to_node.dependents.insert(from.to_string());
        }
    }

    /// Drop every outgoing edge of `id`, keeping the node itself.
    pub fn clear_dependencies(&mut self, id: &str) {
        let Some(node) = self.modules.get_mut(id) else {
            return;
        };
        let previous = std::mem::take(&mut node.dependencies);

        for dep in &previous {
            if let Some(dep_node) = self.modules.get_mut(dep) {
                dep_node.dependents.shift_remove(id);
            }
        }
    }

    pub fn get_module(&self, id: &str) -> Option<&ModuleNode> {
        self.modules.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.modules.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    pub fn module_ids(&self) -> Vec<String> {
        self.modules.keys().cloned().collect()
    }

    pub fn get_dependencies(&self, id: &str) -> Vec<String> {
        self.modules
            .get(id)
            .map(|node| node.dependencies.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn get_dependents(&self, id: &str) -> Vec<String> {
        self.modules
            .get(id)
            .map(|node| node.dependents.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Every module reachable from `id`, depth-first, each at most once.
    ///
    /// `id` itself is never part of the result, even when a cycle leads back to it.
    pub fn get_all_dependencies(&self, id: &str) -> Vec<String> {
        let mut result = Vec::new();
        if !self.modules.contains_key(id) {
            return result;
        }

        let mut visited = HashSet::new();
        visited.insert(id.to_string());

        // pre-order DFS; each frame is a node and the index of its next dependency
        let mut stack: Vec<(&ModuleNode, usize)> = self.modules.get(id).map(|node| (node, 0)).into_iter().collect();
        while let Some(top) = stack.last_mut() {
            let node: &ModuleNode = top.0;
            let next = top.1;
            top.1 += 1;

            let Some(dep) = node.dependencies.get_index(next) else {
                stack.pop();
                continue;
            };
            if visited.insert(dep.clone()) {
                result.push(dep.clone());
                if let Some(child) = self.modules.get(dep) {
                    stack.push((child, 0));
                }
            }
        }
        result
    }

    pub fn get_module_metadata(&self, id: &str) -> Option<&Metadata> {
        self.modules.get(id).map(|node| &node.metadata)
    }

    /// Shallow-merge `metadata` into the node's metadata, creating the node if needed.
    pub fn set_module_metadata(&mut self, id: &str, metadata: Metadata) {
        self.add_module(id);
        if let Some(node) = self.modules.get_mut(id) {
            node.metadata.extend(metadata);
        }
    }

    /// Nested dependency tree rooted at `id`.
    ///
    /// A dependency that is already on the current path (a cycle) is emitted
    /// as a leaf instead of being expanded again.
    pub fn get_module_tree(&self, id: &str) -> Option<ModuleTree> {
        if !self.modules.contains_key(id) {
            return None;
        }

        let mut on_path = HashSet::new();
        Some(self.build_tree(id, &mut on_path))
    }

    fn build_tree(&self, id: &str, on_path: &mut HashSet<String>) -> ModuleTree {
        let mut tree = ModuleTree {
            id: id.to_string(),
            dependencies: Vec::new(),
        };

        if !on_path.insert(id.to_string()) {
            return tree;
        }

        if let Some(node) = self.modules.get(id) {
            for dep in &node.dependencies {
                tree.dependencies.push(self.build_tree(dep, on_path));
            }
        }

        on_path.remove(id);
        tree
    }

    /// The subset of `candidates` still in the graph with nothing importing them.
    pub fn orphaned_modules<'a, I>(&self, candidates: I) -> Vec<String>
    where
        I: IntoIterator<Item = &'a String>,
    {
        candidates
            .into_iter()
            .filter(|id| {
                self.modules
                    .get(id.as_str())
                    .map(|node| node.dependents.is_empty())
                    .unwrap_or(false)
            })
            .cloned()
            .collect()
    }
}
