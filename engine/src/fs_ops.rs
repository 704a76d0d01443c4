//! Filesystem operations module.
//!
//! This module provides the low-level steps a transfer is made of:
//! - Streaming file copies in 1 MiB chunks with cancellation between chunks
//! - Link-preserving symlink copies
//! - Recursive directory copies
//! - Removing existing destinations
//! - Same-filesystem detection and byte estimation
//!
//! Nothing here reports progress; callers account for the returned byte counts.

use std::fs;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

use filetime::FileTime;
use walkdir::WalkDir;

use crate::cancel::CancellationToken;
use crate::error::{EngineError, EngineResult};
use crate::model::TransferMethod;

/// Chunk size for streamed copies.
pub const COPY_BUFFER_SIZE: usize = 1024 * 1024;

/// Copy a file, directory or symlink from `src` to `dst`.
///
/// Symlinks are recreated as links and never dereferenced. Directories are
/// copied entry by entry so cancellation applies uniformly.
///
/// # Returns
/// Number of bytes copied
pub fn copy_item(
    src: &Path,
    dst: &Path,
    preserve: bool,
    cancel: &CancellationToken,
) -> EngineResult<u64> {
    let metadata = fs::symlink_metadata(src).map_err(|e| metadata_error(src, e))?;
    let file_type = metadata.file_type();

    if file_type.is_symlink() {
        copy_symlink(src, dst, preserve)
    } else if file_type.is_dir() {
        copy_dir(src, dst, preserve, cancel)
    } else {
        copy_file_chunked(src, dst, preserve, cancel)
    }
}

/// Stream a regular file into `dst` through a fixed-size buffer.
///
/// Cancellation is checked before every chunk; a cancelled copy returns
/// `EngineError::Cancelled` and leaves a truncated destination behind.
pub fn copy_file_chunked(
    src: &Path,
    dst: &Path,
    preserve: bool,
    cancel: &CancellationToken,
) -> EngineResult<u64> {
    ensure_parent_dir_exists(dst)?;

    let mut src_file = fs::File::open(src).map_err(|e| EngineError::ReadError {
        path: src.to_path_buf(),
        source: e,
    })?;
    let mut dst_file = fs::File::create(dst).map_err(|e| EngineError::WriteError {
        path: dst.to_path_buf(),
        source: e,
    })?;

    let mut buffer = vec![0u8; COPY_BUFFER_SIZE];
    let mut bytes_copied = 0u64;
    loop {
        cancel.check()?;
        let read = match src_file.read(&mut buffer) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => {
                return Err(EngineError::ReadError {
                    path: src.to_path_buf(),
                    source: e,
                })
            }
        };
        dst_file
            .write_all(&buffer[..read])
            .map_err(|e| EngineError::WriteError {
                path: dst.to_path_buf(),
                source: e,
            })?;
        bytes_copied += read as u64;
    }
    dst_file.flush().map_err(|e| EngineError::WriteError {
        path: dst.to_path_buf(),
        source: e,
    })?;
    drop(dst_file);

    if preserve {
        let src_metadata = src_file.metadata().map_err(|e| metadata_error(src, e))?;
        apply_metadata(&src_metadata, dst)?;
    }

    Ok(bytes_copied)
}

/// Recreate the symlink `src` at `dst`, pointing at the same target.
///
/// With `preserve`, the link's own timestamps are replicated. Returns the
/// size of the link itself.
pub fn copy_symlink(src: &Path, dst: &Path, preserve: bool) -> EngineResult<u64> {
    ensure_parent_dir_exists(dst)?;

    let link_metadata = fs::symlink_metadata(src).map_err(|e| metadata_error(src, e))?;
    let target = fs::read_link(src).map_err(|e| EngineError::SymlinkFailed {
        path: src.to_path_buf(),
        source: e,
    })?;

    create_symlink(src, &target, dst).map_err(|e| EngineError::SymlinkFailed {
        path: dst.to_path_buf(),
        source: e,
    })?;

    if preserve {
        let atime = FileTime::from_last_access_time(&link_metadata);
        let mtime = FileTime::from_last_modification_time(&link_metadata);
        filetime::set_symlink_file_times(dst, atime, mtime).map_err(|e| metadata_error(dst, e))?;
    }

    Ok(link_metadata.len())
}

#[cfg(unix)]
fn create_symlink(_src: &Path, target: &Path, dst: &Path) -> io::Result<()> {
    std::os::unix::fs::symlink(target, dst)
}

#[cfg(windows)]
fn create_symlink(src: &Path, target: &Path, dst: &Path) -> io::Result<()> {
    if fs::metadata(src).map(|m| m.is_dir()).unwrap_or(false) {
        std::os::windows::fs::symlink_dir(target, dst)
    } else {
        std::os::windows::fs::symlink_file(target, dst)
    }
}

/// Copy a directory tree.
///
/// Directories are created before their contents; every file is copied
/// individually; symlinks inside the tree are recreated as links. Preserved
/// metadata is applied to the top-level directory once all children are done.
pub fn copy_dir(
    src: &Path,
    dst: &Path,
    preserve: bool,
    cancel: &CancellationToken,
) -> EngineResult<u64> {
    if dst.starts_with(src) {
        return Err(EngineError::InvalidState {
            reason: format!(
                "Cannot copy {} into its own subtree {}",
                src.display(),
                dst.display()
            ),
        });
    }

    let mut bytes_copied = 0u64;
    for entry in WalkDir::new(src).follow_links(false) {
        cancel.check()?;
        let entry = entry.map_err(|e| EngineError::enumeration(src, e))?;
        let rel_path = entry.path().strip_prefix(src).unwrap_or(Path::new(""));
        let target = dst.join(rel_path);
        let file_type = entry.file_type();

        if file_type.is_dir() {
            fs::create_dir_all(&target).map_err(|e| EngineError::DirectoryCreationFailed {
                path: target.clone(),
                source: e,
            })?;
        } else if file_type.is_symlink() {
            bytes_copied += copy_symlink(entry.path(), &target, preserve)?;
        } else {
            bytes_copied += copy_file_chunked(entry.path(), &target, preserve, cancel)?;
        }
    }

    if preserve {
        let src_metadata = fs::symlink_metadata(src).map_err(|e| metadata_error(src, e))?;
        apply_metadata(&src_metadata, dst)?;
    }

    Ok(bytes_copied)
}

/// Copy modification/access times and permission bits onto `dst`.
pub fn apply_metadata(src_metadata: &fs::Metadata, dst: &Path) -> EngineResult<()> {
    let atime = FileTime::from_last_access_time(src_metadata);
    let mtime = FileTime::from_last_modification_time(src_metadata);
    filetime::set_file_times(dst, atime, mtime).map_err(|e| metadata_error(dst, e))?;
    fs::set_permissions(dst, src_metadata.permissions()).map_err(|e| metadata_error(dst, e))?;
    Ok(())
}

/// Remove whatever exists at `path`.
///
/// Directories are removed recursively; files and symlinks (including links
/// to directories) are unlinked. A missing path is not an error.
pub fn remove_existing(path: &Path) -> EngineResult<()> {
    let metadata = match fs::symlink_metadata(path) {
        Ok(metadata) => metadata,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(metadata_error(path, e)),
    };

    let result = if metadata.is_dir() {
        fs::remove_dir_all(path)
    } else {
        fs::remove_file(path)
    };
    result.map_err(|e| EngineError::RemoveFailed {
        path: path.to_path_buf(),
        source: e,
    })
}

/// Whether `src` and the parent directory of `dest` live on the same filesystem.
///
/// Any metadata failure answers `false`, which routes a move through the
/// copy-then-delete path.
#[cfg(unix)]
pub fn same_filesystem(src: &Path, dest: &Path) -> bool {
    use std::os::unix::fs::MetadataExt;

    let parent = parent_or_current(dest);
    match (fs::symlink_metadata(src), fs::metadata(parent)) {
        (Ok(src_meta), Ok(parent_meta)) => src_meta.dev() == parent_meta.dev(),
        _ => false,
    }
}

/// Whether `src` and the parent directory of `dest` live on the same volume.
#[cfg(not(unix))]
pub fn same_filesystem(src: &Path, dest: &Path) -> bool {
    let parent = parent_or_current(dest);
    match (fs::canonicalize(src), fs::canonicalize(parent)) {
        (Ok(src), Ok(parent)) => src.components().next() == parent.components().next(),
        _ => false,
    }
}

fn parent_or_current(path: &Path) -> &Path {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    }
}

/// Move `src` to `dst`: rename when both share a filesystem, otherwise copy
/// (preserving metadata) and delete the source.
pub fn move_path(src: &Path, dst: &Path, cancel: &CancellationToken) -> EngineResult<TransferMethod> {
    if same_filesystem(src, dst) {
        fs::rename(src, dst).map_err(|e| EngineError::RenameFailed {
            from: src.to_path_buf(),
            to: dst.to_path_buf(),
            source: e,
        })?;
        return Ok(TransferMethod::Rename);
    }

    copy_item(src, dst, true, cancel)?;
    remove_existing(src)?;
    Ok(TransferMethod::Copy)
}

/// Bytes a copy of `path` would move.
///
/// Directory trees are walked without following symlinks; links count with
/// their own size. Unreadable entries are skipped. Cancellation stops the
/// walk and returns the partial sum.
pub fn size_for_path(path: &Path, cancel: &CancellationToken) -> u64 {
    let metadata = match fs::symlink_metadata(path) {
        Ok(metadata) => metadata,
        Err(_) => return 0,
    };
    if !metadata.is_dir() {
        return metadata.len();
    }

    let mut total = 0u64;
    for entry in WalkDir::new(path).follow_links(false) {
        if cancel.is_cancelled() {
            break;
        }
        let Ok(entry) = entry else { continue };
        if entry.file_type().is_dir() {
            continue;
        }
        if let Ok(metadata) = entry.metadata() {
            total += metadata.len();
        }
    }
    total
}

/// Ensure the parent directory of a path exists, creating it if necessary.
///
/// # Errors
/// Returns EngineError if the parent exists but is not a directory, or if
/// creating it fails
pub fn ensure_parent_dir_exists(path: &Path) -> EngineResult<()> {
    let Some(parent) = path.parent() else {
        return Ok(());
    };
    if parent.as_os_str().is_empty() {
        return Ok(());
    }

    match fs::metadata(parent) {
        Ok(metadata) if metadata.is_dir() => Ok(()),
        Ok(_) => Err(EngineError::DirectoryCreationFailed {
            path: parent.to_path_buf(),
            source: io::Error::new(
                io::ErrorKind::InvalidInput,
                "Parent path exists but is not a directory",
            ),
        }),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            fs::create_dir_all(parent).map_err(|e| EngineError::DirectoryCreationFailed {
                path: parent.to_path_buf(),
                source: e,
            })
        }
        Err(e) => Err(EngineError::DirectoryCreationFailed {
            path: parent.to_path_buf(),
            source: e,
        }),
    }
}

fn metadata_error(path: &Path, source: io::Error) -> EngineError {
    EngineError::MetadataFailed {
        path: PathBuf::from(path),
        source,
    }
}
