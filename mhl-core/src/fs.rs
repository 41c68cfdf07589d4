//! Filesystem primitives: stat, probing and sorted directory walks.

use crate::error::{ErrorKind, MhlError, Result};
use chrono::{DateTime, Utc};
use globset::GlobMatcher;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use tracing::debug;
use walkdir::WalkDir;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Dir,
    Other,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FileStat {
    pub size: u64,
    /// Seconds since the Unix epoch, UTC.
    pub mtime: i64,
    pub kind: EntryKind,
}

/// Stat `path`, following symlinks. A missing path is `NoSuchFile`.
pub fn stat(path: &Path) -> Result<FileStat> {
    let md = fs::metadata(path).map_err(|e| MhlError::io(path, e))?;
    let kind = if md.is_file() {
        EntryKind::File
    } else if md.is_dir() {
        EntryKind::Dir
    } else {
        EntryKind::Other
    };
    // Zero sorts first in the check pass.
    let mtime = match md.modified() {
        Ok(t) => DateTime::<Utc>::from(t).timestamp(),
        Err(e) => {
            debug!(path = %path.display(), error = %e, "modification time unavailable");
            0
        }
    };
    Ok(FileStat { size: md.len(), mtime, kind })
}

pub fn exists(path: &Path) -> bool {
    path.exists()
}

/// True when `path` is a regular file that can be opened for reading.
pub fn can_open(path: &Path) -> bool {
    path.is_file() && File::open(path).is_ok()
}

fn walk_error(err: walkdir::Error) -> MhlError {
    let path = err.path().map(Path::to_path_buf).unwrap_or_default();
    match err.into_io_error() {
        Some(io) => MhlError::io(path, io),
        None => MhlError::new(ErrorKind::IoError, format!("filesystem loop detected at {}", path.display())),
    }
}

/// Regular files below `root`, depth first, entries sorted by name.
///
/// Errors are yielded in place; callers stop early by breaking out of the
/// loop.
pub fn walk_files(root: &Path) -> impl Iterator<Item = Result<PathBuf>> {
    WalkDir::new(root)
        .follow_links(true)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(e) if e.file_type().is_file() => Some(Ok(e.into_path())),
            Ok(_) => None,
            Err(err) => Some(Err(walk_error(err))),
        })
}

/// Regular files directly inside `dir` whose name matches `pattern`, sorted.
pub fn list_dir_matching(dir: &Path, pattern: &GlobMatcher) -> Result<Vec<PathBuf>> {
    let mut out = Vec::new();
    for entry in WalkDir::new(dir).min_depth(1).max_depth(1).sort_by_file_name() {
        let entry = match entry {
            Ok(e) => e,
            // Unreadable siblings do not prevent discovery in the rest of the directory.
            Err(err) if err.depth() > 0 => continue,
            Err(err) => return Err(walk_error(err)),
        };
        if !entry.file_type().is_file() {
            continue;
        }
        if pattern.is_match(entry.file_name()) {
            out.push(entry.into_path());
        }
    }
    Ok(out)
}
