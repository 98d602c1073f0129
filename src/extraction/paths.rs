//! Archive entry name validation

use crate::error::ExtractionError;
use std::path::{Component, Path, PathBuf};

/// Turn an archive entry name into a path relative to the extraction root
///
/// Both `/` and `\` count as separators so that archives built on Windows
/// cannot smuggle a traversal past a Unix check. Absolute names, drive
/// prefixes, `..` segments and NUL bytes are rejected. `.` and empty
/// segments are dropped; an empty result means the root itself.
pub(crate) fn relative_entry_path(name: &str) -> Result<PathBuf, ExtractionError> {
    let reject = |reason: &str| ExtractionError::UnsafePath {
        entry: name.to_string(),
        reason: reason.to_string(),
    };

    if name.contains('\0') {
        return Err(reject("contains a NUL byte"));
    }
    if name.starts_with('/') || name.starts_with('\\') {
        return Err(reject("absolute path"));
    }

    let mut relative = PathBuf::new();
    for (i, segment) in name.split(['/', '\\']).enumerate() {
        match segment {
            "" | "." => continue,
            ".." => return Err(reject("parent directory reference")),
            s if i == 0 && is_drive_prefix(s) => return Err(reject("drive-qualified path")),
            s => relative.push(s),
        }
    }

    if !relative
        .components()
        .all(|c| matches!(c, Component::Normal(_)))
    {
        return Err(reject("path does not stay below the target directory"));
    }
    Ok(relative)
}

fn is_drive_prefix(segment: &str) -> bool {
    let bytes = segment.as_bytes();
    bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':'
}

/// Whether a path created under `root` still resolves inside it
pub(crate) fn resolves_within(root: &Path, created: &Path) -> std::io::Result<bool> {
    Ok(created.canonicalize()?.starts_with(root))
}
