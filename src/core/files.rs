//! core::files
//!
//! File system helpers for staging foundation code into checkouts.
//!
//! Terraform working state (`.terraform/` directories and
//! `.terraform.lock.hcl`) is never copied and never searched: it belongs to
//! the machine that ran `init`, not to the repository.

use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;
use walkdir::WalkDir;

const TERRAFORM_DIR: &str = ".terraform";
const TERRAFORM_LOCK: &str = ".terraform.lock.hcl";

/// Errors from file helpers.
#[derive(Debug, Error)]
pub enum FileError {
    #[error("{op} '{path}': {source}")]
    Io {
        op: &'static str,
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to walk '{path}': {source}")]
    Walk {
        path: PathBuf,
        source: walkdir::Error,
    },
}

fn io<'a>(op: &'static str, path: &'a Path) -> impl FnOnce(std::io::Error) -> FileError + 'a {
    move |source| FileError::Io {
        op,
        path: path.to_path_buf(),
        source,
    }
}

/// Copy one file, preserving permissions. Parent directories are created.
pub fn copy_file(src: &Path, dest: &Path) -> Result<(), FileError> {
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent).map_err(io("create directory", parent))?;
    }
    fs::copy(src, dest).map_err(io("copy", src))?;
    Ok(())
}

/// Recursively copy `src` into `dest`, merging with existing content.
///
/// Skips Terraform working directories and lock files.
pub fn copy_directory(src: &Path, dest: &Path) -> Result<(), FileError> {
    fs::create_dir_all(dest).map_err(io("create directory", dest))?;

    let walker = WalkDir::new(src)
        .min_depth(1)
        .into_iter()
        .filter_entry(|e| !is_terraform_state(e.path()));

    for entry in walker {
        let entry = entry.map_err(|source| FileError::Walk {
            path: src.to_path_buf(),
            source,
        })?;
        let relative = entry
            .path()
            .strip_prefix(src)
            .unwrap_or_else(|_| entry.path());
        let target = dest.join(relative);

        if entry.file_type().is_dir() {
            fs::create_dir_all(&target).map_err(io("create directory", &target))?;
        } else {
            copy_file(entry.path(), &target)?;
        }
    }

    Ok(())
}

/// Remove a file.
pub fn remove_file(path: &Path) -> Result<(), FileError> {
    fs::remove_file(path).map_err(io("remove", path))
}

/// Replace every occurrence of `old` with `new` in a file.
///
/// Returns the number of replacements made.
pub fn replace_in_file(path: &Path, old: &str, new: &str) -> Result<usize, FileError> {
    let content = fs::read_to_string(path).map_err(io("read", path))?;
    let count = content.matches(old).count();
    if count > 0 {
        fs::write(path, content.replace(old, new)).map_err(io("write", path))?;
    }
    Ok(count)
}

/// Find every file named `filename` below `dir`, outside Terraform state.
///
/// Results are sorted for deterministic processing.
pub fn find_files(dir: &Path, filename: &str) -> Result<Vec<PathBuf>, FileError> {
    let mut found = Vec::new();
    let walker = WalkDir::new(dir)
        .into_iter()
        .filter_entry(|e| !is_terraform_state(e.path()));

    for entry in walker {
        let entry = entry.map_err(|source| FileError::Walk {
            path: dir.to_path_buf(),
            source,
        })?;
        if entry.file_type().is_file() && entry.file_name() == filename {
            found.push(entry.into_path());
        }
    }

    found.sort();
    Ok(found)
}

fn is_terraform_state(path: &Path) -> bool {
    path.file_name()
        .map(|n| n == TERRAFORM_DIR || n == TERRAFORM_LOCK)
        .unwrap_or(false)
}
