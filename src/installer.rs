//! Fetching and running the service host installer.

use crate::config::RunContext;
use crate::error::FixError;
use crate::runner::{ProgramRunner, Window};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Exit status the installer uses when it hands over to the connector setup
/// dialog. The install itself went through.
pub const MANUAL_STEP_EXIT_CODE: i32 = 66;

pub const MANUAL_STEP_GUIDANCE: &str = "Installation started! Please wait.\n\
When you are prompted to \"Setup MATLAB Drive Connector\", you may then select \"Exit\" and then \"OK\".";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum InstallOutcome {
    Installed,
    InstalledWithManualStep { guidance: String },
    Failed { reason: String },
}

pub fn interpret_exit(code: i32) -> InstallOutcome {
    match code {
        0 => InstallOutcome::Installed,
        MANUAL_STEP_EXIT_CODE => InstallOutcome::InstalledWithManualStep {
            guidance: MANUAL_STEP_GUIDANCE.to_string(),
        },
        other => InstallOutcome::Failed {
            reason: format!("installer exited with status {other}"),
        },
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DownloadedArtifact {
    pub local_path: PathBuf,
    pub source_url: String,
    pub bytes: u64,
}

pub trait Downloader {
    /// Writes the full response body to `dest`, returning its length.
    fn download(&self, url: &str, dest: &Path) -> Result<u64, FixError>;
}

pub struct HttpDownloader {
    client: reqwest::blocking::Client,
}

impl HttpDownloader {
    /// Only connecting is bounded; a slow transfer is left to finish.
    pub fn new(connect_timeout: Duration) -> Result<Self, FixError> {
        let client = reqwest::blocking::Client::builder()
            .connect_timeout(connect_timeout)
            .timeout(None::<Duration>)
            .user_agent(concat!("shfix/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client })
    }
}

impl Downloader for HttpDownloader {
    fn download(&self, url: &str, dest: &Path) -> Result<u64, FixError> {
        let mut response = self.client.get(url).send()?;
        let status = response.status();
        if !status.is_success() {
            return Err(FixError::Download(format!("{url} (HTTP {status})")));
        }
        let mut file = File::create(dest).map_err(|err| FixError::resource("create", dest, err))?;
        let written = response.copy_to(&mut file)?;
        file.sync_all()?;
        Ok(written)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveLayout {
    pub extract_dir: PathBuf,
    pub entry_point: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallPlan {
    pub url: String,
    pub artifact_path: PathBuf,
    pub archive: Option<ArchiveLayout>,
    pub sha256: Option<String>,
}

impl InstallPlan {
    pub fn from_context(ctx: &RunContext) -> Self {
        let installer = &ctx.config.installer;
        let download_dir = &ctx.paths.download_dir;
        let archive = installer.archive.then(|| ArchiveLayout {
            extract_dir: download_dir.join(&installer.extract_dir_name),
            entry_point: PathBuf::from(&installer.entry_point),
        });
        let sha = installer.sha256.trim();
        Self {
            url: installer.url.clone(),
            artifact_path: download_dir.join(&installer.file_name),
            archive,
            sha256: (!sha.is_empty()).then(|| sha.to_lowercase()),
        }
    }

    pub fn executable(&self) -> PathBuf {
        match &self.archive {
            Some(layout) => layout.extract_dir.join(&layout.entry_point),
            None => self.artifact_path.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InstallReport {
    pub artifact: DownloadedArtifact,
    pub outcome: InstallOutcome,
}

/// A leftover file from a previous run is never reused.
fn remove_stale_artifact(path: &Path) -> Result<(), FixError> {
    if fs::symlink_metadata(path).is_err() {
        return Ok(());
    }
    tracing::info!(path = %path.display(), "removing stale installer download");
    fs::remove_file(path).map_err(|err| FixError::resource("delete stale installer", path, err))
}

pub fn sha256_file(path: &Path) -> Result<String, FixError> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    io::copy(&mut file, &mut hasher)?;
    Ok(hex::encode(hasher.finalize()))
}

fn verify_checksum(path: &Path, expected: &str) -> Result<(), FixError> {
    let actual = sha256_file(path)?;
    if actual != expected {
        return Err(FixError::Download(format!(
            "checksum mismatch for {}: expected {}, got {}",
            path.display(),
            expected,
            actual
        )));
    }
    Ok(())
}

pub fn extract_zip(archive_path: &Path, extract_dir: &Path) -> Result<(), FixError> {
    let file = File::open(archive_path)
        .map_err(|err| FixError::resource("open archive", archive_path, err))?;
    let mut archive = zip::ZipArchive::new(file)?;
    fs::create_dir_all(extract_dir)?;
    // Directory modes are applied last so a read-only directory can still
    // receive its files.
    let mut dir_modes = Vec::new();

    for i in 0..archive.len() {
        let mut entry = archive.by_index(i)?;
        let Some(relative) = entry.enclosed_name() else {
            tracing::warn!(name = entry.name(), "skipping archive entry outside the target");
            continue;
        };
        let outpath = extract_dir.join(relative);

        if entry.is_dir() {
            fs::create_dir_all(&outpath)?;
        } else {
            if let Some(parent) = outpath.parent() {
                fs::create_dir_all(parent)?;
            }
            let mut outfile =
                File::create(&outpath).map_err(|err| FixError::resource("create", &outpath, err))?;
            io::copy(&mut entry, &mut outfile)?;
        }

        if let Some(mode) = entry.unix_mode() {
            if entry.is_dir() {
                dir_modes.push((outpath, mode));
            } else {
                set_unix_mode(&outpath, mode)?;
            }
        }
    }
    for (path, mode) in dir_modes.iter().rev() {
        set_unix_mode(path, *mode)?;
    }
    Ok(())
}

#[cfg(unix)]
fn set_unix_mode(path: &Path, mode: u32) -> Result<(), FixError> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(mode))?;
    Ok(())
}

#[cfg(not(unix))]
fn set_unix_mode(_path: &Path, _mode: u32) -> Result<(), FixError> {
    Ok(())
}

/// Download, unpack if needed, then run the installer and read its exit code.
pub fn fetch_and_install<D, R>(
    plan: &InstallPlan,
    downloader: &D,
    runner: &R,
) -> Result<InstallReport, FixError>
where
    D: Downloader + ?Sized,
    R: ProgramRunner + ?Sized,
{
    remove_stale_artifact(&plan.artifact_path)?;
    if let Some(parent) = plan.artifact_path.parent() {
        fs::create_dir_all(parent)
            .map_err(|err| FixError::resource("create", parent, err))?;
    }

    tracing::info!(url = %plan.url, dest = %plan.artifact_path.display(), "downloading installer");
    let bytes = downloader.download(&plan.url, &plan.artifact_path)?;
    let artifact = DownloadedArtifact {
        local_path: plan.artifact_path.clone(),
        source_url: plan.url.clone(),
        bytes,
    };
    if let Some(expected) = &plan.sha256 {
        verify_checksum(&plan.artifact_path, expected)?;
    }

    if let Some(layout) = &plan.archive {
        if fs::symlink_metadata(&layout.extract_dir).is_ok() {
            fs::remove_dir_all(&layout.extract_dir).map_err(|err| {
                FixError::resource("delete previous extraction", &layout.extract_dir, err)
            })?;
        }
        extract_zip(&plan.artifact_path, &layout.extract_dir)?;
    }

    let program = plan.executable();
    tracing::info!(program = %program.display(), "running installer");
    let outcome = match runner.run(&program, Window::Attached) {
        Ok(code) => interpret_exit(code),
        Err(err) => InstallOutcome::Failed {
            reason: format!("could not start {}: {err}", program.display()),
        },
    };
    Ok(InstallReport { artifact, outcome })
}
