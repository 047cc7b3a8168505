// Specifier extraction strategies
pub mod oxc_extractor;
pub mod regex_extractor;

pub use oxc_extractor::*;
pub use regex_extractor::*;

use crate::core::interfaces::SpecifierExtractor;
use crate::core::models::ExtractorKind;
use std::sync::Arc;

pub fn create_extractor(kind: ExtractorKind) -> Arc<dyn SpecifierExtractor> {
    match kind {
        ExtractorKind::Regex => Arc::new(RegexSpecifierExtractor::new()),
        ExtractorKind::Oxc => Arc::new(OxcSpecifierExtractor::new()),
    }
}
