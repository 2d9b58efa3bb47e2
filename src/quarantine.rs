//! Moving (or deleting) service host state out of the way.
//!
//! Both operations are fail-fast and never roll back: whatever was moved
//! before a failure stays in the backup directory.

use crate::error::FixError;
use serde::Serialize;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

pub const BACKUP_DIR_NAME: &str = "Old_service_host_files";
pub const MAX_BACKUP_ATTEMPTS: u32 = 25;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BackupDirectory {
    pub path: PathBuf,
}

/// Attempt 1 is the bare name, attempt N (N >= 2) appends N.
pub fn backup_candidate(root: &Path, attempt: u32) -> PathBuf {
    if attempt <= 1 {
        root.join(BACKUP_DIR_NAME)
    } else {
        root.join(format!("{BACKUP_DIR_NAME}{attempt}"))
    }
}

pub fn allocate_backup_dir(root: &Path) -> Result<BackupDirectory, FixError> {
    for attempt in 1..=MAX_BACKUP_ATTEMPTS {
        let candidate = backup_candidate(root, attempt);
        match fs::create_dir(&candidate) {
            Ok(()) => {
                tracing::info!(path = %candidate.display(), "created backup directory");
                return Ok(BackupDirectory { path: candidate });
            }
            Err(err) if err.kind() == io::ErrorKind::AlreadyExists => {
                tracing::debug!(path = %candidate.display(), "backup directory name taken");
            }
            Err(err) => return Err(FixError::resource("create", candidate, err)),
        }
    }
    Err(FixError::BackupExhausted {
        root: root.to_path_buf(),
        attempts: MAX_BACKUP_ATTEMPTS,
    })
}

#[derive(Debug)]
pub enum QuarantineOutcome {
    /// `moved` holds the destinations inside the backup directory. `missing`
    /// lists sources that no longer existed, usually because a native
    /// uninstaller already removed them.
    Moved {
        backup: BackupDirectory,
        moved: Vec<PathBuf>,
        missing: Vec<PathBuf>,
    },
    PartialFailure {
        moved_count: usize,
        failed: PathBuf,
        error: io::Error,
    },
}

#[derive(Debug)]
pub enum DeleteOutcome {
    Deleted {
        deleted: Vec<PathBuf>,
        missing: Vec<PathBuf>,
    },
    PartialFailure {
        deleted_count: usize,
        failed: PathBuf,
        error: io::Error,
    },
}

/// Owns the one backup directory of a run. It is created on first use and
/// every later call moves into the same place.
pub struct QuarantineMover {
    root: PathBuf,
    backup: Option<BackupDirectory>,
}

impl QuarantineMover {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            backup: None,
        }
    }

    pub fn backup_dir(&mut self) -> Result<&BackupDirectory, FixError> {
        let backup = match self.backup.take() {
            Some(backup) => backup,
            None => allocate_backup_dir(&self.root)?,
        };
        Ok(self.backup.insert(backup))
    }

    pub fn quarantine(&mut self, items: &[PathBuf]) -> Result<QuarantineOutcome, FixError> {
        let backup = self.backup_dir()?.clone();
        let mut moved = Vec::new();
        let mut missing = Vec::new();
        for item in items {
            if is_gone(item) {
                tracing::info!(path = %item.display(), "already gone, nothing to move");
                missing.push(item.clone());
                continue;
            }
            match move_into(item, &backup.path) {
                Ok(destination) => {
                    tracing::info!(path = %item.display(), "moved into backup directory");
                    moved.push(destination);
                }
                Err(error) => {
                    tracing::warn!(path = %item.display(), error = %error, "move failed");
                    return Ok(QuarantineOutcome::PartialFailure {
                        moved_count: moved.len(),
                        failed: item.clone(),
                        error,
                    });
                }
            }
        }
        Ok(QuarantineOutcome::Moved {
            backup,
            moved,
            missing,
        })
    }
}

fn is_gone(path: &Path) -> bool {
    matches!(fs::symlink_metadata(path), Err(err) if err.kind() == io::ErrorKind::NotFound)
}

fn move_into(item: &Path, backup: &Path) -> Result<PathBuf, io::Error> {
    let name = item.file_name().ok_or_else(|| {
        io::Error::new(io::ErrorKind::InvalidInput, "path has no file name")
    })?;
    let destination = backup.join(name);
    // rename replaces existing files on some platforms
    if fs::symlink_metadata(&destination).is_ok() {
        return Err(io::Error::new(
            io::ErrorKind::AlreadyExists,
            format!("{} already exists", destination.display()),
        ));
    }
    fs::rename(item, &destination)?;
    Ok(destination)
}

pub fn remove_path(path: &Path) -> Result<bool, io::Error> {
    let meta = match fs::symlink_metadata(path) {
        Ok(meta) => meta,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(false),
        Err(err) => return Err(err),
    };
    if meta.file_type().is_dir() {
        fs::remove_dir_all(path)?;
    } else {
        fs::remove_file(path)?;
    }
    Ok(true)
}

pub fn delete_items(items: &[PathBuf]) -> DeleteOutcome {
    let mut deleted = Vec::new();
    let mut missing = Vec::new();
    for item in items {
        match remove_path(item) {
            Ok(true) => {
                tracing::info!(path = %item.display(), "deleted");
                deleted.push(item.clone());
            }
            Ok(false) => {
                tracing::info!(path = %item.display(), "already gone, nothing to delete");
                missing.push(item.clone());
            }
            Err(error) => {
                tracing::warn!(path = %item.display(), error = %error, "delete failed");
                return DeleteOutcome::PartialFailure {
                    deleted_count: deleted.len(),
                    failed: item.clone(),
                    error,
                };
            }
        }
    }
    DeleteOutcome::Deleted { deleted, missing }
}
