// sbx-core/src/extract.rs
use std::fs::{self, File};
use std::path::{Component, Path};
use std::time::Instant;

use flate2::read::GzDecoder;
use sbx_common::error::{Result, SbxError};
use tar::{Archive, EntryType};
use tracing::{debug, error};

/// Extracts a gzip-compressed tar archive into `target_dir`.
///
/// Each entry name is joined onto the destination component-by-component;
/// `..`, root and prefix components are rejected so no entry can write
/// outside `target_dir`. Entry types other than regular files, directories
/// and symlinks fail extraction. When a `deadline` is given it is checked
/// before every entry, so a stuck extraction surfaces as an error instead of
/// running unbounded.
///
/// Returns the number of regular files written; an archive yielding none is
/// an error.
pub fn extract_archive(
    archive_path: &Path,
    target_dir: &Path,
    deadline: Option<Instant>,
) -> Result<usize> {
    debug!(
        "Extracting archive '{}' to '{}'",
        archive_path.display(),
        target_dir.display()
    );

    if !archive_path.is_file() {
        return Err(SbxError::FileNotFound {
            path: archive_path.to_path_buf(),
        });
    }

    fs::create_dir_all(target_dir).map_err(|e| SbxError::FileSystem {
        path: target_dir.to_path_buf(),
        reason: format!("failed to create extraction directory: {e}"),
    })?;

    let file = File::open(archive_path).map_err(|e| SbxError::Extraction {
        archive: archive_path.to_path_buf(),
        reason: format!("failed to open archive: {e}"),
    })?;

    let mut archive = Archive::new(GzDecoder::new(file));
    archive.set_preserve_permissions(true);
    archive.set_overwrite(true);

    let extraction_error = |reason: String| SbxError::Extraction {
        archive: archive_path.to_path_buf(),
        reason,
    };

    let mut files_written = 0usize;
    for entry_result in archive
        .entries()
        .map_err(|e| extraction_error(format!("failed to read archive entries: {e}")))?
    {
        if deadline.is_some_and(|d| Instant::now() >= d) {
            return Err(extraction_error("deadline exceeded".to_string()));
        }

        let mut entry =
            entry_result.map_err(|e| extraction_error(format!("error reading entry: {e}")))?;

        let entry_type = entry.header().entry_type();
        match entry_type {
            EntryType::Regular | EntryType::Directory | EntryType::Symlink => {}
            other => {
                return Err(extraction_error(format!(
                    "unsupported entry type {other:?}"
                )))
            }
        }

        let entry_path = entry
            .path()
            .map_err(|e| extraction_error(format!("invalid entry path: {e}")))?
            .into_owned();

        let mut target_path = target_dir.to_path_buf();
        for component in entry_path.components() {
            match component {
                Component::Normal(part) => target_path.push(part),
                Component::CurDir => {}
                unsafe_component => {
                    let msg = format!(
                        "unsafe component {:?} in entry '{}'",
                        unsafe_component,
                        entry_path.display()
                    );
                    error!("{}", msg);
                    return Err(extraction_error(msg));
                }
            }
        }
        if !target_path.starts_with(target_dir) {
            return Err(extraction_error(format!(
                "entry '{}' escapes the destination directory",
                entry_path.display()
            )));
        }

        if let Some(parent) = target_path.parent() {
            if !parent.exists() {
                fs::create_dir_all(parent).map_err(|e| {
                    extraction_error(format!(
                        "failed to create parent directory {}: {}",
                        parent.display(),
                        e
                    ))
                })?;
            }
        }

        entry.unpack(&target_path).map_err(|e| {
            extraction_error(format!(
                "failed to unpack '{}' to {}: {}",
                entry_path.display(),
                target_path.display(),
                e
            ))
        })?;
        if entry_type == EntryType::Regular {
            files_written += 1;
        }
    }

    if files_written == 0 {
        return Err(extraction_error(
            "archive contained no regular files".to_string(),
        ));
    }

    debug!(
        "Finished extraction of {} ({} files)",
        archive_path.display(),
        files_written
    );
    Ok(files_written)
}
