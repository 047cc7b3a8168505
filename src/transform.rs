//! Hot-context bootstrap injection.
//!
//! Every script module served to the browser gets `import.meta.hot` wired to
//! the client runtime before its own code runs.

use crate::utils::paths;
use std::path::Path;

/// URL the browser loads the client runtime from
pub const CLIENT_PUBLIC_PATH: &str = "/@ember/client";

const INTERNAL_SEGMENT: &str = "@ember";
const CREATE_HOT_CONTEXT_ALIAS: &str = "__ember__createHotContext";

/// True for `.js/.jsx/.ts/.tsx` modules that are not part of the runtime itself.
pub fn should_inject(public_path: &str) -> bool {
    paths::has_script_extension(Path::new(public_path))
        && !public_path.split('/').any(|segment| segment == INTERNAL_SEGMENT)
}

/// The two lines prepended to an instrumented module
pub fn bootstrap_prelude(public_path: &str) -> String {
    format!(
        "import {{ createHotContext as {alias} }} from \"{client}\";\nimport.meta.hot = {alias}({path});\n",
        alias = CREATE_HOT_CONTEXT_ALIAS,
        client = CLIENT_PUBLIC_PATH,
        path = serde_json::Value::String(public_path.to_string()),
    )
}

/// Prepend the bootstrap to `code` if `path` qualifies, else return it unchanged.
pub fn inject_hot_context(root: &Path, path: &Path, code: &str) -> String {
    let public_path = paths::public_path(root, path);
    if !should_inject(&public_path) {
        return code.to_string();
    }

    let mut out = bootstrap_prelude(&public_path);
    out.push_str(code);
    out
}
