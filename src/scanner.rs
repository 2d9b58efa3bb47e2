use crate::error::FixError;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Version directories at or above this size are treated as real installs.
pub const ACTIVE_THRESHOLD_BYTES: u64 = 10 * 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Classification {
    Active,
    Inactive,
}

pub fn classify(size_bytes: u64) -> Classification {
    if size_bytes >= ACTIVE_THRESHOLD_BYTES {
        Classification::Active
    } else {
        Classification::Inactive
    }
}

/// A version directory as seen at scan time. Never re-measured afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InstallationEntry {
    path: PathBuf,
    size_bytes: u64,
    classification: Classification,
}

impl InstallationEntry {
    pub fn new(path: PathBuf, size_bytes: u64) -> Self {
        Self {
            path,
            size_bytes,
            classification: classify(size_bytes),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn size_bytes(&self) -> u64 {
        self.size_bytes
    }

    pub fn classification(&self) -> Classification {
        self.classification
    }

    pub fn is_active(&self) -> bool {
        self.classification == Classification::Active
    }

    pub fn name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| self.path.display().to_string())
    }
}

pub fn matches_version_prefix(name: &str, prefixes: &[String]) -> bool {
    prefixes.iter().any(|prefix| name.starts_with(prefix.as_str()))
}

/// Total size of regular files below `path`. Symlinks are not followed;
/// unreadable entries are skipped.
pub fn dir_size(path: &Path) -> u64 {
    let mut size = 0;
    for entry in WalkDir::new(path).follow_links(false) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                tracing::warn!(error = %err, "skipping unreadable entry while sizing");
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        match entry.metadata() {
            Ok(meta) => size += meta.len(),
            Err(err) => {
                tracing::warn!(path = %entry.path().display(), error = %err, "skipping file while sizing");
            }
        }
    }
    size
}

pub fn scan(root: &Path, prefixes: &[String]) -> Result<Vec<InstallationEntry>, FixError> {
    let read_dir = fs::read_dir(root).map_err(|source| FixError::Scan {
        path: root.to_path_buf(),
        source,
    })?;
    let mut entries = Vec::new();
    for entry in read_dir {
        let entry = entry.map_err(|source| FixError::Scan {
            path: root.to_path_buf(),
            source,
        })?;
        if !entry.file_type()?.is_dir() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().to_string();
        if !matches_version_prefix(&name, prefixes) {
            tracing::debug!(name, "ignoring directory without a version prefix");
            continue;
        }
        let path = entry.path();
        let size = dir_size(&path);
        let scanned = InstallationEntry::new(path, size);
        tracing::info!(
            name,
            size_bytes = size,
            classification = ?scanned.classification(),
            "found installation"
        );
        entries.push(scanned);
    }
    entries.sort_by(|a, b| a.path.cmp(&b.path));
    Ok(entries)
}

pub fn format_size(bytes: u64) -> String {
    const MIB: f64 = 1024.0 * 1024.0;
    if bytes as f64 >= MIB {
        format!("{:.1} MiB", bytes as f64 / MIB)
    } else {
        format!("{:.1} KiB", bytes as f64 / 1024.0)
    }
}
