//! Input and output path checks run before any PDF work.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::{LoadError, WriteError};

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

fn has_pdf_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("pdf"))
}

/// Check that the input exists, is a non-empty PDF and is within the size limit.
///
/// Returns the file size in bytes.
pub fn validate_input(path: &Path, max_file_size_mb: u64) -> Result<u64, LoadError> {
    if !path.exists() {
        return Err(LoadError::NotFound(path.to_path_buf()));
    }

    if !has_pdf_extension(path) {
        let ext = path
            .extension()
            .map(|e| format!(".{}", e.to_string_lossy()))
            .unwrap_or_default();
        return Err(LoadError::NotPdf(ext));
    }

    let metadata = fs::metadata(path).map_err(|source| LoadError::Unreadable {
        path: path.to_path_buf(),
        source,
    })?;
    let size = metadata.len();

    let size_mb = size as f64 / BYTES_PER_MB;
    if size_mb > max_file_size_mb as f64 {
        return Err(LoadError::TooLarge {
            size_mb,
            limit_mb: max_file_size_mb,
        });
    }

    if size == 0 {
        return Err(LoadError::Empty(path.to_path_buf()));
    }

    debug!("Input {} validated ({:.2} MB)", path.display(), size_mb);
    Ok(size)
}

/// Resolve `path` to an absolute path without requiring it to exist.
///
/// The parent directory must exist for a missing file to resolve.
fn resolve(path: &Path) -> Option<PathBuf> {
    if let Ok(resolved) = fs::canonicalize(path) {
        return Some(resolved);
    }
    let name = path.file_name()?;
    let parent = path.parent().filter(|p| !p.as_os_str().is_empty()).unwrap_or(Path::new("."));
    fs::canonicalize(parent).ok().map(|dir| dir.join(name))
}

/// Check the output path and create its parent directory if needed.
///
/// The output must not resolve to `input`, including through symlinks.
pub fn validate_output(input: &Path, path: &Path) -> Result<(), WriteError> {
    if !has_pdf_extension(path) {
        return Err(WriteError::NotPdf(path.to_path_buf()));
    }

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        if !parent.exists() {
            fs::create_dir_all(parent).map_err(|source| WriteError::CreateDir {
                path: parent.to_path_buf(),
                source,
            })?;
            debug!("Created output directory {}", parent.display());
        }
    }

    if let (Some(input), Some(output)) = (resolve(input), resolve(path)) {
        if input == output {
            return Err(WriteError::SameAsInput(path.to_path_buf()));
        }
    }

    if let Ok(metadata) = fs::metadata(path) {
        if metadata.permissions().readonly() {
            return Err(WriteError::ReadOnly(path.to_path_buf()));
        }
    }

    Ok(())
}
