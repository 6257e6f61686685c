use std::path::{Component, Path};

/// Error returned when a received file name would escape the destination
/// directory.
#[derive(Debug, thiserror::Error)]
#[error("invalid file name {name:?}: {reason}")]
pub struct InvalidName {
    pub name: String,
    pub reason: &'static str,
}

/// Validates that a received file name stays inside its destination directory.
///
/// Rejects:
/// - Empty names
/// - Absolute paths
/// - Parent directory traversal (`..`)
/// - Windows prefix components (`C:`, `\\server`)
///
/// Relative names with subdirectories (`a/b.bin`) are accepted.
pub fn validate_received_name(name: &str) -> Result<(), InvalidName> {
    let reject = |reason| {
        Err(InvalidName {
            name: name.to_string(),
            reason,
        })
    };

    if name.is_empty() {
        return reject("empty name");
    }

    let path = Path::new(name);
    if path.is_absolute() {
        return reject("absolute path not allowed");
    }

    for component in path.components() {
        match component {
            Component::ParentDir => return reject("parent directory traversal not allowed"),
            Component::Prefix(_) => return reject("path prefix not allowed"),
            Component::RootDir => return reject("absolute path not allowed"),
            Component::CurDir | Component::Normal(_) => {}
        }
    }

    // Drive letters and UNC prefixes only parse as such on Windows.
    if name.len() >= 2 && name.as_bytes()[1] == b':' {
        return reject("drive prefix not allowed");
    }
    if name.starts_with("\\\\") {
        return reject("UNC path not allowed");
    }

    Ok(())
}
