use std::io;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FixError {
    #[error("config error: {0}")]
    Config(String),
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("yaml error: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("zip error: {0}")]
    Zip(#[from] zip::result::ZipError),
    #[error("prompt error: {0}")]
    Prompt(#[from] dialoguer::Error),
    #[error("signal handler error: {0}")]
    Signal(#[from] ctrlc::Error),
    #[error("cannot list installation directory {}: {source}", path.display())]
    Scan {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to {action} {}: {source}", path.display())]
    Resource {
        action: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error(
        "could not create a backup directory under {} after {attempts} attempts",
        root.display()
    )]
    BackupExhausted { root: PathBuf, attempts: u32 },
    #[error(
        "stopped after {moved} item(s): could not {action} {}: {source}",
        failed.display()
    )]
    Cleanup {
        action: &'static str,
        moved: usize,
        failed: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("process error: {0}")]
    Process(String),
    #[error("failed to launch {}: {source}", program.display())]
    Launch {
        program: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("download failed: {0}")]
    Download(String),
    #[error("installer failed: {0}")]
    Installer(String),
}

impl FixError {
    pub fn resource(action: &'static str, path: impl Into<PathBuf>, source: io::Error) -> Self {
        FixError::Resource {
            action,
            path: path.into(),
            source,
        }
    }
}
