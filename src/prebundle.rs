//! Bare-specifier discovery for the dependency pre-bundler.
//!
//! Only the scan lives here; turning the result into bundles belongs to
//! whatever consumes it.

use crate::core::interfaces::SpecifierExtractor;
use crate::infrastructure::scan_script_files;
use crate::resolver::is_relative_specifier;
use crate::utils::{Logger, Result};
use std::collections::BTreeSet;
use std::path::Path;

/// Sorted, de-duplicated bare specifiers imported by any script under `dir`.
///
/// Unreadable files are skipped with a warning.
pub async fn scan_bare_specifiers(dir: &Path, extractor: &dyn SpecifierExtractor) -> Result<Vec<String>> {
    let mut specifiers = BTreeSet::new();

    for file in scan_script_files(dir).await? {
        let source = match tokio::fs::read_to_string(&file).await {
            Ok(source) => source,
            Err(e) => {
                Logger::warn(&format!("Skipping {}: {}", file.display(), e));
                continue;
            }
        };

        specifiers.extend(
            extractor
                .extract(&file, &source)
                .into_iter()
                .filter(|spec| !is_relative_specifier(spec) && !spec.starts_with('/')),
        );
    }

    Logger::debug(&format!("Found {} bare specifier(s) under {}", specifiers.len(), dir.display()));
    Ok(specifiers.into_iter().collect())
}
