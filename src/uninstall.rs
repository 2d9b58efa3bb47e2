use crate::error::FixError;
use crate::runner::{ProgramRunner, Window};
use crate::scanner::InstallationEntry;
use serde::Serialize;
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum UninstallStatus {
    Success,
    Failed { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UninstallResult {
    pub entry: InstallationEntry,
    pub status: UninstallStatus,
}

/// Runs the native uninstaller of every Active entry, one at a time.
///
/// Inactive entries are skipped: they are too small to be a real install and
/// are only ever cleaned up on disk. A program that cannot be launched aborts
/// the whole batch; a non-zero exit is recorded and the batch continues.
pub fn uninstall_all<R: ProgramRunner + ?Sized>(
    entries: &[InstallationEntry],
    relative_executable: &Path,
    runner: &R,
) -> Result<Vec<UninstallResult>, FixError> {
    let mut results = Vec::new();
    for entry in entries.iter().filter(|e| e.is_active()) {
        let program = entry.path().join(relative_executable);
        tracing::info!(program = %program.display(), "running native uninstaller");
        let code = runner
            .run(&program, Window::Hidden)
            .map_err(|source| FixError::Launch {
                program: program.clone(),
                source,
            })?;
        let status = if code == 0 {
            UninstallStatus::Success
        } else {
            tracing::warn!(program = %program.display(), code, "uninstaller reported failure");
            UninstallStatus::Failed {
                reason: format!("uninstaller exited with status {code}"),
            }
        };
        results.push(UninstallResult {
            entry: entry.clone(),
            status,
        });
    }
    Ok(results)
}
