use crate::core::interfaces::ModuleSource;
use crate::utils::{paths, EmberError, ErrorContext, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs;

/// Reads module sources from disk through `tokio::fs`
#[derive(Debug, Clone, Default)]
pub struct TokioModuleSource;

#[async_trait]
impl ModuleSource for TokioModuleSource {
    async fn read_source(&self, path: &Path) -> Result<String> {
        fs::read_to_string(path).await.map_err(|e| {
            EmberError::parse_with_context(
                format!("cannot read module source: {}", e),
                ErrorContext::new().with_file(path.to_path_buf()),
            )
        })
    }

    async fn exists(&self, path: &Path) -> bool {
        fs::try_exists(path).await.unwrap_or(false)
    }
}

pub fn is_script_file(path: &Path) -> bool {
    paths::has_script_extension(path)
}

/// Every script file below `dir`, skipping dot-directories and `node_modules`.
pub async fn scan_script_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut found = Vec::new();
    let mut pending = vec![dir.to_path_buf()];

    while let Some(current) = pending.pop() {
        let mut entries = fs::read_dir(&current).await?;

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if name.starts_with('.') || name == "node_modules" {
                continue;
            }

            let file_type = entry.file_type().await?;
            if file_type.is_dir() {
                pending.push(path);
            } else if file_type.is_file() && is_script_file(&path) {
                found.push(path);
            }
        }
    }

    found.sort();
    Ok(found)
}

/// Absolute, normalized form of a user-supplied root
pub fn canonical_root(root: &Path) -> Result<PathBuf> {
    let absolute = if root.is_absolute() {
        root.to_path_buf()
    } else {
        std::env::current_dir()?.join(root)
    };
    Ok(paths::normalize_path(&absolute))
}
