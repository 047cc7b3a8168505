use std::path::{Component, Path, PathBuf};

/// Lexically normalize a path: fold `.` and `..` without touching the disk.
pub fn normalize_path(path: &Path) -> PathBuf {
    let mut normalized = PathBuf::new();

    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match normalized.components().next_back() {
                Some(Component::Normal(_)) => {
                    normalized.pop();
                }
                // `..` at the root stays at the root
                Some(Component::RootDir) | Some(Component::Prefix(_)) => {}
                _ => normalized.push(".."),
            },
            other => normalized.push(other.as_os_str()),
        }
    }

    normalized
}

/// Root-relative, forward-slash identifier used on the wire and in bootstrap code.
///
/// Identifiers outside `root` keep their full path, with separators normalized.
pub fn public_path(root: &Path, id: &Path) -> String {
    let relative = id.strip_prefix(root).unwrap_or(id);
    let joined = relative
        .components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            Component::ParentDir => Some("..".to_string()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/");

    format!("/{}", joined)
}

/// Any component starting with `.` (except `.` and `..` themselves)
/// Extensions of the modules the dev pipeline tracks and instruments
pub const SCRIPT_EXTENSIONS: [&str; 4] = ["js", "jsx", "ts", "tsx"];

pub fn has_script_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| SCRIPT_EXTENSIONS.contains(&ext))
}

pub fn is_dotfile_path(path: &Path) -> bool {
    path.components().any(|c| match c {
        Component::Normal(part) => part.to_string_lossy().starts_with('.'),
        _ => false,
    })
}
