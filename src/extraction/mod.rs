//! Safe ZIP extraction
//!
//! [`ArchiveExtractor`] expands an archive into a directory that it owns:
//! the directory is emptied first, every entry name is validated before a
//! single byte is written, and any entry that could land outside the
//! directory fails the whole extraction.

mod paths;

use crate::config::ExtractionConfig;
use crate::error::ExtractionError;
use crate::utils::get_available_space;
use paths::{relative_entry_path, resolves_within};
use std::fs::File;
use std::path::{Path, PathBuf};
use tokio::task::spawn_blocking;
use tracing::{debug, info, warn};

const SYMLINK_MODE: u32 = 0o120000;
const FILE_TYPE_MASK: u32 = 0o170000;

/// Extracts ZIP archives with path-traversal rejection
#[derive(Clone, Debug, Default)]
pub struct ArchiveExtractor {
    config: ExtractionConfig,
}

impl ArchiveExtractor {
    /// Create an extractor
    pub fn new(config: ExtractionConfig) -> Self {
        Self { config }
    }

    /// Extract `archive` into `target`, replacing whatever `target` held
    ///
    /// Blocking; call [`ArchiveExtractor::extract_async`] from async code.
    /// `progress(entries_extracted, entries_total)` runs after each entry.
    /// Returns the number of entries written.
    pub fn extract<F>(&self, archive: &Path, target: &Path, mut progress: F) -> Result<u64, ExtractionError>
    where
        F: FnMut(u64, u64),
    {
        let corrupt = |reason: String| ExtractionError::Corrupt {
            archive: archive.to_path_buf(),
            reason,
        };
        let file = File::open(archive).map_err(|e| io_error(archive, e))?;
        let mut zip = zip::ZipArchive::new(file).map_err(|e| corrupt(e.to_string()))?;
        let total = zip.len() as u64;

        // Validate everything up front so a hostile entry late in the archive
        // cannot leave earlier entries behind
        let mut plan = Vec::with_capacity(zip.len());
        let mut required: u64 = 0;
        for index in 0..zip.len() {
            let entry = zip.by_index_raw(index).map_err(|e| corrupt(e.to_string()))?;
            let name = entry.name().to_string();
            if entry
                .unix_mode()
                .is_some_and(|mode| mode & FILE_TYPE_MASK == SYMLINK_MODE)
            {
                return Err(ExtractionError::UnsafePath {
                    entry: name,
                    reason: "symbolic link entries are not extracted".to_string(),
                });
            }
            let relative = relative_entry_path(&name)?;
            if relative.as_os_str().is_empty() && !entry.is_dir() {
                return Err(ExtractionError::UnsafePath {
                    entry: name,
                    reason: "file entry without a name".to_string(),
                });
            }
            required = required.saturating_add(entry.size());
            plan.push((relative, entry.is_dir()));
        }

        clear_dir(target)?;
        let root = target.canonicalize().map_err(|e| io_error(target, e))?;

        if self.config.check_disk_space {
            check_free_space(&root, required)?;
        }

        info!(
            archive = %archive.display(),
            target = %root.display(),
            entries = total,
            bytes = required,
            "extracting archive"
        );

        let mut extracted = 0u64;
        for (index, (relative, is_dir)) in plan.into_iter().enumerate() {
            let destination = root.join(&relative);
            if is_dir {
                create_dir_within(&root, &destination, &relative)?;
            } else {
                if let Some(parent) = destination.parent() {
                    create_dir_within(&root, parent, &relative)?;
                }
                let mut entry = zip.by_index(index).map_err(|e| corrupt(e.to_string()))?;
                let mut out = File::create(&destination).map_err(|e| io_error(&destination, e))?;
                std::io::copy(&mut entry, &mut out).map_err(|e| match e.kind() {
                    std::io::ErrorKind::InvalidData | std::io::ErrorKind::UnexpectedEof => {
                        corrupt(format!("entry {}: {}", relative.display(), e))
                    }
                    _ => io_error(&destination, e),
                })?;
            }
            extracted += 1;
            progress(extracted, total);
        }

        info!(archive = %archive.display(), entries = extracted, "extraction complete");
        Ok(extracted)
    }

    /// Run [`ArchiveExtractor::extract`] on the blocking pool
    pub async fn extract_async<F>(
        &self,
        archive: &Path,
        target: &Path,
        progress: F,
    ) -> Result<u64, ExtractionError>
    where
        F: FnMut(u64, u64) + Send + 'static,
    {
        let extractor = self.clone();
        let archive = archive.to_path_buf();
        let target = target.to_path_buf();

        spawn_blocking(move || extractor.extract(&archive, &target, progress))
            .await
            .map_err(|e| ExtractionError::TaskFailed(e.to_string()))?
    }
}

fn io_error(path: &Path, source: std::io::Error) -> ExtractionError {
    ExtractionError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Remove and recreate `dir`
fn clear_dir(dir: &Path) -> Result<(), ExtractionError> {
    match std::fs::symlink_metadata(dir) {
        Ok(meta) if meta.is_dir() => {
            debug!(dir = %dir.display(), "clearing previous extraction");
            std::fs::remove_dir_all(dir).map_err(|e| io_error(dir, e))?;
        }
        Ok(_) => std::fs::remove_file(dir).map_err(|e| io_error(dir, e))?,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(io_error(dir, e)),
    }
    std::fs::create_dir_all(dir).map_err(|e| io_error(dir, e))
}

fn create_dir_within(root: &Path, dir: &Path, relative: &Path) -> Result<(), ExtractionError> {
    std::fs::create_dir_all(dir).map_err(|e| io_error(dir, e))?;
    if !resolves_within(root, dir).map_err(|e| io_error(dir, e))? {
        return Err(ExtractionError::UnsafePath {
            entry: relative.display().to_string(),
            reason: "resolves outside the target directory".to_string(),
        });
    }
    Ok(())
}

fn check_free_space(root: &Path, required: u64) -> Result<(), ExtractionError> {
    match get_available_space(root) {
        Ok(available) if available < required => {
            Err(ExtractionError::InsufficientSpace { required, available })
        }
        Ok(_) => Ok(()),
        Err(e) => {
            warn!(path = %root.display(), error = %e, "could not check free disk space");
            Ok(())
        }
    }
}

/// Paths of every regular file below `dir`, relative to it, sorted
#[cfg(test)]
pub(crate) fn list_tree(dir: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = walkdir::WalkDir::new(dir)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter_map(|e| e.path().strip_prefix(dir).ok().map(Path::to_path_buf))
        .collect();
    files.sort();
    files
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;
