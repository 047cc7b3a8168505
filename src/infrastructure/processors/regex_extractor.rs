use crate::core::interfaces::SpecifierExtractor;
use once_cell::sync::Lazy;
use regex::Regex;
use std::path::Path;

// `import x from "y"`, `import { a, b } from "y"`, `import * as ns from "y"`, `import "y"`
static STATIC_IMPORT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?m)^\s*import\s+(?:[\w*${}\s,]+?\s+from\s*)?['"]([^'"\n]+)['"]"#)
        .expect("static import pattern is valid")
});

/// Lightweight line-oriented extractor; the default.
#[derive(Debug, Clone, Default)]
pub struct RegexSpecifierExtractor;

impl RegexSpecifierExtractor {
    pub fn new() -> Self {
        Self
    }
}

impl SpecifierExtractor for RegexSpecifierExtractor {
    fn name(&self) -> &str {
        "regex"
    }

    fn extract(&self, _path: &Path, source: &str) -> Vec<String> {
        STATIC_IMPORT
            .captures_iter(source)
            .filter_map(|caps| caps.get(1))
            .map(|m| m.as_str().to_string())
            .collect()
    }
}
