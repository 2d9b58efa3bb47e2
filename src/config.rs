use crate::error::FixError;
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

pub const DEFAULT_CONFIG_YAML: &str = include_str!("../config/default.yaml");
const CONFIG_VERSION: u32 = 1;

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub version: u32,
    pub process: ProcessConfig,
    pub paths: Paths,
    pub scan: ScanConfig,
    pub uninstall: UninstallConfig,
    pub installer: InstallerConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct ProcessConfig {
    pub name: String,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct Paths {
    pub service_host_root: String,
    pub connector_dir: String,
    pub download_dir: String,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct ScanConfig {
    pub version_prefixes: Vec<String>,
    pub metadata_files: Vec<String>,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct UninstallConfig {
    pub executable: String,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct InstallerConfig {
    pub url: String,
    pub file_name: String,
    pub archive: bool,
    pub extract_dir_name: String,
    pub entry_point: String,
    pub sha256: String,
    pub connect_timeout_sec: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: CONFIG_VERSION,
            process: ProcessConfig::default(),
            paths: Paths::default(),
            scan: ScanConfig::default(),
            uninstall: UninstallConfig::default(),
            installer: InstallerConfig::default(),
        }
    }
}

impl Default for ProcessConfig {
    fn default() -> Self {
        Self {
            name: "MathWorksServiceHost.exe".to_string(),
        }
    }
}

impl Default for Paths {
    fn default() -> Self {
        Self {
            service_host_root: String::new(),
            connector_dir: String::new(),
            download_dir: String::new(),
        }
    }
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            version_prefixes: vec!["v.1".to_string(), "v20".to_string()],
            metadata_files: vec!["LatestInstall.info".to_string()],
        }
    }
}

impl Default for UninstallConfig {
    fn default() -> Self {
        Self {
            executable: "bin/win64/UninstallMathWorksServiceHost.exe".to_string(),
        }
    }
}

impl Default for InstallerConfig {
    fn default() -> Self {
        Self {
            url: "https://ssd.mathworks.com/supportfiles/downloads/MathWorksServiceHost/v2024.2.0.3/installers/mathworksservicehost_2024.2.0.3_win64_installer.exe".to_string(),
            file_name: "mathworksservicehost_installer.exe".to_string(),
            archive: true,
            extract_dir_name: "extractedMWSInstaller".to_string(),
            entry_point: "bin/win64/InstallMathWorksServiceHost.exe".to_string(),
            sha256: String::new(),
            connect_timeout_sec: 30,
        }
    }
}

/// Where the config came from. Implicit locations may be absent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    Explicit(PathBuf),
    Implicit(PathBuf),
}

impl ConfigSource {
    pub fn path(&self) -> &Path {
        match self {
            ConfigSource::Explicit(path) | ConfigSource::Implicit(path) => path,
        }
    }
}

pub fn resolve_config_source(override_path: Option<&PathBuf>) -> ConfigSource {
    if let Some(path) = override_path {
        return ConfigSource::Explicit(path.clone());
    }
    if let Ok(path) = env::var("SHFIX_CONFIG") {
        return ConfigSource::Explicit(PathBuf::from(path));
    }
    let mut base = default_config_dir();
    base.push("config.yaml");
    ConfigSource::Implicit(base)
}

pub fn default_config_dir() -> PathBuf {
    if let Ok(path) = env::var("SHFIX_CONFIG_DIR") {
        return PathBuf::from(path);
    }
    let mut base = dirs::config_dir().unwrap_or_else(|| PathBuf::from("."));
    base.push("shfix");
    base
}

pub fn read_config_from_str(content: &str) -> Result<Config, FixError> {
    let cfg: Config = serde_yaml::from_str(content)?;
    validate_config(&cfg)?;
    Ok(cfg)
}

pub fn read_config(path: &Path) -> Result<Config, FixError> {
    let content = fs::read_to_string(path)?;
    read_config_from_str(&content)
}

pub fn load_config(source: &ConfigSource) -> Result<Config, FixError> {
    match source {
        ConfigSource::Explicit(path) => {
            if !path.exists() {
                return Err(FixError::Config(format!(
                    "config file not found: {}",
                    path.display()
                )));
            }
            read_config(path)
        }
        ConfigSource::Implicit(path) => {
            if path.exists() {
                read_config(path)
            } else {
                tracing::debug!(path = %path.display(), "no config file, using defaults");
                Ok(Config::default())
            }
        }
    }
}

pub fn validate_config(cfg: &Config) -> Result<(), FixError> {
    if cfg.version != CONFIG_VERSION {
        return Err(FixError::Config(format!(
            "unsupported config version {}",
            cfg.version
        )));
    }
    if cfg.process.name.trim().is_empty() {
        return Err(FixError::Config("process.name must not be empty".to_string()));
    }
    if cfg.scan.version_prefixes.is_empty()
        || cfg.scan.version_prefixes.iter().any(|p| p.trim().is_empty())
    {
        return Err(FixError::Config(
            "scan.version_prefixes must list at least one non-empty prefix".to_string(),
        ));
    }
    if cfg.uninstall.executable.trim().is_empty() {
        return Err(FixError::Config(
            "uninstall.executable must not be empty".to_string(),
        ));
    }
    if cfg.installer.url.trim().is_empty() {
        return Err(FixError::Config("installer.url must not be empty".to_string()));
    }
    if cfg.installer.file_name.trim().is_empty() {
        return Err(FixError::Config(
            "installer.file_name must not be empty".to_string(),
        ));
    }
    if cfg.installer.archive && cfg.installer.extract_dir_name.trim().is_empty() {
        return Err(FixError::Config(
            "installer.extract_dir_name is required when installer.archive is true".to_string(),
        ));
    }
    let sha = cfg.installer.sha256.trim();
    if !sha.is_empty() && (sha.len() != 64 || !sha.chars().all(|c| c.is_ascii_hexdigit())) {
        return Err(FixError::Config(
            "installer.sha256 must be 64 hex characters".to_string(),
        ));
    }
    Ok(())
}

/// Filesystem locations the run works on, resolved once from config.
#[derive(Debug, Clone, Serialize)]
pub struct ResolvedPaths {
    pub service_host_root: PathBuf,
    pub connector_dir: PathBuf,
    pub download_dir: PathBuf,
}

fn local_app_data_path(configured: &str, leaf: &str, field: &str) -> Result<PathBuf, FixError> {
    if !configured.trim().is_empty() {
        return Ok(PathBuf::from(configured.trim()));
    }
    let base = dirs::data_local_dir().ok_or_else(|| {
        FixError::Config(format!(
            "cannot determine the local app data directory; set {field} in the config"
        ))
    })?;
    Ok(base.join("MathWorks").join(leaf))
}

pub fn resolve_paths(cfg: &Config) -> Result<ResolvedPaths, FixError> {
    let service_host_root = local_app_data_path(
        &cfg.paths.service_host_root,
        "ServiceHost",
        "paths.service_host_root",
    )?;
    let connector_dir = local_app_data_path(
        &cfg.paths.connector_dir,
        "MATLABConnector",
        "paths.connector_dir",
    )?;
    let download_dir = if cfg.paths.download_dir.trim().is_empty() {
        env::temp_dir()
    } else {
        PathBuf::from(cfg.paths.download_dir.trim())
    };
    Ok(ResolvedPaths {
        service_host_root,
        connector_dir,
        download_dir,
    })
}

/// Immutable per-run state. The working directory is captured once here and
/// is where the backup directory gets created.
#[derive(Debug, Clone)]
pub struct RunContext {
    pub working_dir: PathBuf,
    pub config_source: ConfigSource,
    pub config: Config,
    pub paths: ResolvedPaths,
    pub json: bool,
}

impl RunContext {
    pub fn build(
        working_dir: PathBuf,
        config_source: ConfigSource,
        config: Config,
        json: bool,
    ) -> Result<Self, FixError> {
        let paths = resolve_paths(&config)?;
        Ok(Self {
            working_dir,
            config_source,
            config,
            paths,
            json,
        })
    }
}
