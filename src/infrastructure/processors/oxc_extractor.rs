use crate::core::interfaces::SpecifierExtractor;
use crate::utils::Logger;
use oxc_allocator::Allocator;
use oxc_ast::ast::Statement;
use oxc_parser::Parser;
use oxc_span::SourceType;
use std::path::Path;

/// Parser-backed extractor: reads top-level import declarations from the AST.
///
/// Type-only imports are skipped since they never load at runtime.
#[derive(Debug, Clone, Default)]
pub struct OxcSpecifierExtractor;

impl OxcSpecifierExtractor {
    pub fn new() -> Self {
        Self
    }
}

impl SpecifierExtractor for OxcSpecifierExtractor {
    fn name(&self) -> &str {
        "oxc"
    }

    fn extract(&self, path: &Path, source: &str) -> Vec<String> {
        let allocator = Allocator::default();
        let source_type = SourceType::from_path(path).unwrap_or_else(|_| SourceType::mjs());
        let ret = Parser::new(&allocator, source, source_type).parse();

        if ret.panicked {
            Logger::warn(&format!("Could not parse {}, no imports recorded", path.display()));
            return Vec::new();
        }
        if !ret.errors.is_empty() {
            Logger::debug(&format!(
                "{} recoverable parse error(s) in {}",
                ret.errors.len(),
                path.display()
            ));
        }

        ret.program
            .body
            .iter()
            .filter_map(|stmt| match stmt {
                Statement::ImportDeclaration(decl) if !decl.import_kind.is_type() => {
                    Some(decl.source.value.to_string())
                }
                _ => None,
            })
            .collect()
    }
}
