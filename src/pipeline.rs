//! The repair sequence: stop the service, scan, uninstall, clean up,
//! reinstall. Each stage finishes before the next starts and an error in one
//! stage ends the run.

use crate::config::RunContext;
use crate::confirm::{ActionKind, ConfirmationGate, Decision, YesNo};
use crate::error::FixError;
use crate::installer::{fetch_and_install, Downloader, InstallOutcome, InstallPlan, InstallReport};
use crate::process::{find_and_stop, find_matches, ProcessTable, RunningProcess, StopOutcome};
use crate::quarantine::{delete_items, DeleteOutcome, QuarantineMover, QuarantineOutcome};
use crate::runner::ProgramRunner;
use crate::scanner::{format_size, scan, Classification, InstallationEntry};
use crate::uninstall::{uninstall_all, UninstallResult, UninstallStatus};
use chrono::{DateTime, Utc};
use dialoguer::console::style;
use serde::Serialize;
use std::fs;
use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};

pub const EXIT_OK: i32 = 0;
pub const EXIT_FAILURE: i32 = 1;
pub const EXIT_NOTHING_TO_DO: i32 = 2;
pub const EXIT_INTERRUPTED: i32 = 130;

/// External capabilities the pipeline drives.
pub struct Services<'a> {
    pub processes: &'a dyn ProcessTable,
    pub runner: &'a dyn ProgramRunner,
    pub downloader: &'a dyn Downloader,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CleanupMode {
    #[default]
    Move,
    Delete,
}

impl CleanupMode {
    pub fn token(self) -> &'static str {
        match self {
            CleanupMode::Move => "move",
            CleanupMode::Delete => "delete",
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RepairOptions {
    pub cleanup: CleanupMode,
    pub skip_install: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    StopProcess,
    Uninstall,
    Cleanup,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum CleanupReport {
    Moved {
        backup_dir: PathBuf,
        items: Vec<PathBuf>,
        already_gone: Vec<PathBuf>,
    },
    Deleted {
        items: Vec<PathBuf>,
        already_gone: Vec<PathBuf>,
    },
}

#[derive(Debug, Clone, Serialize)]
pub struct RepairReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub terminated: Vec<RunningProcess>,
    pub entries: Vec<InstallationEntry>,
    pub uninstalled: Vec<UninstallResult>,
    pub cleanup: CleanupReport,
    pub install: Option<InstallReport>,
}

#[derive(Debug)]
pub enum RunOutcome {
    Completed(Box<RepairReport>),
    Declined(Stage),
    NothingToDo,
}

impl RunOutcome {
    pub fn exit_code(&self) -> i32 {
        match self {
            RunOutcome::Completed(_) | RunOutcome::Declined(_) => EXIT_OK,
            RunOutcome::NothingToDo => EXIT_NOTHING_TO_DO,
        }
    }
}

/// Everything that gets moved or deleted: all scanned entries, the connector
/// folder, and metadata files next to the version directories.
pub fn cleanup_items(ctx: &RunContext, entries: &[InstallationEntry]) -> Vec<PathBuf> {
    let mut items: Vec<PathBuf> = entries.iter().map(|e| e.path().to_path_buf()).collect();
    if ctx.paths.connector_dir.exists() {
        items.push(ctx.paths.connector_dir.clone());
    }
    for name in &ctx.config.scan.metadata_files {
        let path = ctx.paths.service_host_root.join(name);
        if fs::symlink_metadata(&path).is_ok() {
            items.push(path);
        }
    }
    items
}

fn describe_entries<I: BufRead, O: Write>(
    gate: &mut ConfirmationGate<I, O>,
    entries: &[InstallationEntry],
) -> Result<(), FixError> {
    gate.say(format!("Found {} installation folder(s):", entries.len()))?;
    for entry in entries {
        let label = match entry.classification() {
            Classification::Active => style("active").green(),
            Classification::Inactive => style("inactive").yellow(),
        };
        gate.say(format!(
            "  {}  {}  ({})",
            entry.name(),
            format_size(entry.size_bytes()),
            label
        ))?;
    }
    Ok(())
}

fn run_uninstall_stage<I: BufRead, O: Write>(
    ctx: &RunContext,
    services: &Services<'_>,
    gate: &mut ConfirmationGate<I, O>,
    entries: &[InstallationEntry],
) -> Result<Option<Vec<UninstallResult>>, FixError> {
    let active = entries.iter().filter(|e| e.is_active()).count();
    if active == 0 {
        gate.say("No active installations; skipping the native uninstallers.")?;
        return Ok(Some(Vec::new()));
    }
    gate.say(format!(
        "\n{active} active installation(s) will be removed with their own uninstaller."
    ))?;
    if gate.confirm("uninstall", ActionKind::Destructive)? == Decision::Denied {
        gate.say(style("Exiting since the user has declined uninstalling.").red())?;
        return Ok(None);
    }
    let executable = Path::new(&ctx.config.uninstall.executable);
    let results = uninstall_all(entries, executable, services.runner)?;
    for result in &results {
        match &result.status {
            UninstallStatus::Success => {
                gate.say(format!("Uninstalled {}.", result.entry.name()))?;
            }
            UninstallStatus::Failed { reason } => {
                gate.say(style(format!(
                    "Uninstalling {} failed: {reason}",
                    result.entry.name()
                ))
                .red())?;
            }
        }
    }
    Ok(Some(results))
}

fn run_cleanup_stage<I: BufRead, O: Write>(
    ctx: &RunContext,
    options: &RepairOptions,
    gate: &mut ConfirmationGate<I, O>,
    items: &[PathBuf],
) -> Result<Option<CleanupReport>, FixError> {
    let token = options.cleanup.token();
    match options.cleanup {
        CleanupMode::Move => {
            gate.say("\nAre you ready to move the old ServiceHost folders, the MATLAB Connector folder and related files?")?;
            gate.say(style(format!(
                "They will be moved into a folder called \"{}\" in {}. You are responsible for deleting it afterwards.",
                crate::quarantine::BACKUP_DIR_NAME,
                ctx.working_dir.display()
            ))
            .cyan())?;
        }
        CleanupMode::Delete => {
            gate.say("\nAre you ready to permanently delete the old ServiceHost folders, the MATLAB Connector folder and related files?")?;
            gate.say(style("Deleted files cannot be recovered.").red())?;
        }
    }
    for item in items {
        gate.say(format!("  {}", item.display()))?;
    }
    if gate.confirm(token, ActionKind::Destructive)? == Decision::Denied {
        gate.say(style(format!("Exiting since the user has declined to {token} the old files.")).red())?;
        return Ok(None);
    }

    let report = match options.cleanup {
        CleanupMode::Move => {
            let mut mover = QuarantineMover::new(&ctx.working_dir);
            gate.say(format!(
                "Directory created successfully: {}",
                mover.backup_dir()?.path.display()
            ))?;
            match mover.quarantine(items)? {
                QuarantineOutcome::Moved {
                    backup,
                    moved,
                    missing,
                } => {
                    gate.say(format!("Moved {} item(s).", moved.len()))?;
                    report_already_gone(gate, &missing)?;
                    CleanupReport::Moved {
                        backup_dir: backup.path,
                        items: moved,
                        already_gone: missing,
                    }
                }
                QuarantineOutcome::PartialFailure {
                    moved_count,
                    failed,
                    error,
                } => {
                    return Err(FixError::Cleanup {
                        action: "move",
                        moved: moved_count,
                        failed,
                        source: error,
                    })
                }
            }
        }
        CleanupMode::Delete => match delete_items(items) {
            DeleteOutcome::Deleted { deleted, missing } => {
                gate.say(format!("Deleted {} item(s).", deleted.len()))?;
                report_already_gone(gate, &missing)?;
                CleanupReport::Deleted {
                    items: deleted,
                    already_gone: missing,
                }
            }
            DeleteOutcome::PartialFailure {
                deleted_count,
                failed,
                error,
            } => {
                return Err(FixError::Cleanup {
                    action: "delete",
                    moved: deleted_count,
                    failed,
                    source: error,
                })
            }
        },
    };
    Ok(Some(report))
}

fn report_already_gone<I: BufRead, O: Write>(
    gate: &mut ConfirmationGate<I, O>,
    missing: &[PathBuf],
) -> Result<(), FixError> {
    for item in missing {
        gate.say(format!("Already removed, skipped: {}", item.display()))?;
    }
    Ok(())
}

/// Runs the installer fetch stage and prints its result. `Failed` becomes an
/// error so the run exits non-zero.
pub fn run_install_stage<I: BufRead, O: Write>(
    ctx: &RunContext,
    services: &Services<'_>,
    gate: &mut ConfirmationGate<I, O>,
) -> Result<InstallReport, FixError> {
    gate.say("Downloading latest Service Host installer. Please wait.")?;
    let plan = InstallPlan::from_context(ctx);
    let report = fetch_and_install(&plan, services.downloader, services.runner)?;
    match &report.outcome {
        InstallOutcome::Installed => {
            gate.say("Installation completed! Please attempt to launch MATLAB.")?;
        }
        InstallOutcome::InstalledWithManualStep { guidance } => {
            gate.say(style(guidance).cyan())?;
        }
        InstallOutcome::Failed { reason } => {
            return Err(FixError::Installer(reason.clone()));
        }
    }
    Ok(report)
}

pub fn run_repair<I: BufRead, O: Write>(
    ctx: &RunContext,
    options: RepairOptions,
    services: &Services<'_>,
    gate: &mut ConfirmationGate<I, O>,
) -> Result<RunOutcome, FixError> {
    let started_at = Utc::now();

    let terminated = match find_and_stop(services.processes, &ctx.config.process.name, gate)? {
        StopOutcome::Declined => return Ok(RunOutcome::Declined(Stage::StopProcess)),
        StopOutcome::NotFound => Vec::new(),
        StopOutcome::Terminated(processes) => processes,
    };

    let entries = scan(
        &ctx.paths.service_host_root,
        &ctx.config.scan.version_prefixes,
    )?;
    if entries.is_empty() {
        gate.say(format!(
            "No Service Host installations found in {}. Nothing to do.",
            ctx.paths.service_host_root.display()
        ))?;
        return Ok(RunOutcome::NothingToDo);
    }
    describe_entries(gate, &entries)?;

    let Some(uninstalled) = run_uninstall_stage(ctx, services, gate, &entries)? else {
        return Ok(RunOutcome::Declined(Stage::Uninstall));
    };

    let items = cleanup_items(ctx, &entries);
    let Some(cleanup) = run_cleanup_stage(ctx, &options, gate, &items)? else {
        return Ok(RunOutcome::Declined(Stage::Cleanup));
    };

    let install = if options.skip_install {
        gate.say("Skipping the installer download.")?;
        None
    } else {
        Some(run_install_stage(ctx, services, gate)?)
    };

    if let CleanupReport::Moved {
        backup_dir, items, ..
    } = &cleanup
    {
        if gate.ask_yes_no("Do you want to see where the old files were moved?")? == YesNo::Yes {
            gate.say(format!("Backup folder: {}", backup_dir.display()))?;
            for item in items {
                gate.say(format!("  {}", item.display()))?;
            }
        }
    }

    Ok(RunOutcome::Completed(Box::new(RepairReport {
        started_at,
        finished_at: Utc::now(),
        terminated,
        entries,
        uninstalled,
        cleanup,
        install,
    })))
}

/// Read-only view used by `shfix scan`.
#[derive(Debug, Clone, Serialize)]
pub struct ScanReport {
    pub scanned_at: DateTime<Utc>,
    pub process_name: String,
    pub running: Vec<RunningProcess>,
    pub service_host_root: PathBuf,
    pub entries: Vec<InstallationEntry>,
    pub cleanup_items: Vec<PathBuf>,
}

pub fn run_scan(ctx: &RunContext, processes: &dyn ProcessTable) -> Result<ScanReport, FixError> {
    let running = find_matches(&processes.list()?, &ctx.config.process.name);
    let entries = scan(
        &ctx.paths.service_host_root,
        &ctx.config.scan.version_prefixes,
    )?;
    let cleanup_items = cleanup_items(ctx, &entries);
    Ok(ScanReport {
        scanned_at: Utc::now(),
        process_name: ctx.config.process.name.clone(),
        running,
        service_host_root: ctx.paths.service_host_root.clone(),
        entries,
        cleanup_items,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Config, ConfigSource};
    use crate::process::tests::MockProcessTable;
    use crate::runner::tests::MockRunner;
    use crate::runner::Window;
    use crate::scanner::tests::make_sized_file;
    use std::cell::RefCell;
    use std::io::{self, Cursor};
    use tempfile::{tempdir, TempDir};

    const MIB: u64 = 1024 * 1024;

    #[derive(Default)]
    struct RecordingDownloader {
        urls: RefCell<Vec<String>>,
    }

    impl Downloader for RecordingDownloader {
        fn download(&self, url: &str, dest: &Path) -> Result<u64, FixError> {
            self.urls.borrow_mut().push(url.to_string());
            fs::write(dest, b"installer")?;
            Ok(9)
        }
    }

    /// Behaves like a native uninstaller that removes its own version
    /// directory before exiting 0.
    struct SelfRemovingUninstaller {
        root: PathBuf,
        calls: RefCell<Vec<PathBuf>>,
    }

    impl ProgramRunner for SelfRemovingUninstaller {
        fn run(&self, program: &Path, _window: Window) -> Result<i32, io::Error> {
            self.calls.borrow_mut().push(program.to_path_buf());
            if let Ok(relative) = program.strip_prefix(&self.root) {
                if let Some(version) = relative.components().next() {
                    fs::remove_dir_all(self.root.join(version))?;
                }
            }
            Ok(0)
        }
    }

    struct Fixture {
        _dir: TempDir,
        ctx: RunContext,
        processes: MockProcessTable,
        runner: MockRunner,
        downloader: RecordingDownloader,
    }

    impl Fixture {
        fn new() -> Self {
            let dir = tempdir().unwrap();
            let root = dir.path();
            let mut cfg = Config::default();
            cfg.paths.service_host_root = root.join("ServiceHost").to_string_lossy().to_string();
            cfg.paths.connector_dir = root.join("MATLABConnector").to_string_lossy().to_string();
            cfg.paths.download_dir = root.join("Temp").to_string_lossy().to_string();
            cfg.installer.archive = false;
            let work = root.join("work");
            fs::create_dir_all(&work).unwrap();
            fs::create_dir_all(root.join("ServiceHost")).unwrap();
            let ctx = RunContext::build(
                work,
                ConfigSource::Implicit(root.join("config.yaml")),
                cfg,
                false,
            )
            .unwrap();
            Self {
                _dir: dir,
                ctx,
                processes: MockProcessTable::default(),
                runner: MockRunner::default(),
                downloader: RecordingDownloader::default(),
            }
        }

        fn root(&self) -> PathBuf {
            self.ctx.paths.service_host_root.clone()
        }

        fn backup(&self) -> PathBuf {
            self.ctx.working_dir.join("Old_service_host_files")
        }

        fn run(&self, input: &str, options: RepairOptions) -> (Result<RunOutcome, FixError>, String) {
            self.run_with(&self.runner, input, options)
        }

        fn run_with(
            &self,
            runner: &dyn ProgramRunner,
            input: &str,
            options: RepairOptions,
        ) -> (Result<RunOutcome, FixError>, String) {
            let services = Services {
                processes: &self.processes,
                runner,
                downloader: &self.downloader,
            };
            let mut gate =
                ConfirmationGate::new(Cursor::new(input.as_bytes().to_vec()), Vec::new());
            let result = run_repair(&self.ctx, options, &services, &mut gate);
            let out = String::from_utf8(gate.into_output()).unwrap();
            (result, out)
        }
    }

    #[test]
    fn declining_termination_stops_before_scanning() {
        let mut fx = Fixture::new();
        fx.processes = MockProcessTable::with(&[("MathWorksServiceHost.exe", 4821)]);
        make_sized_file(&fx.root().join("v2023.1.0/big.bin"), 40 * MIB);

        let (result, out) = fx.run("n\n", RepairOptions::default());
        let outcome = result.unwrap();
        assert!(matches!(outcome, RunOutcome::Declined(Stage::StopProcess)));
        assert_eq!(outcome.exit_code(), EXIT_OK);
        assert!(out.contains("PID 4821"));
        assert!(!out.contains("Found"));
        assert!(fx.root().join("v2023.1.0").exists());
        assert!(!fx.backup().exists());
        assert!(fx.processes.terminated.borrow().is_empty());
    }

    #[test]
    fn full_run_uninstalls_active_moves_everything_and_installs() {
        let mut fx = Fixture::new();
        fx.processes = MockProcessTable::with(&[("MathWorksServiceHost.exe", 4821)]);
        make_sized_file(&fx.root().join("v23.1.0/bin/core.dll"), 40 * MIB);
        make_sized_file(&fx.root().join("v22.2.0/stub.bin"), 2 * MIB);
        fs::write(fx.root().join("LatestInstall.info"), b"v23.1.0").unwrap();
        fs::create_dir_all(&fx.ctx.paths.connector_dir).unwrap();
        fx.ctx.config.scan.version_prefixes = vec!["v2".to_string()];

        let (result, out) = fx.run("yes\nuninstall\nmove\nn\n", RepairOptions::default());
        let RunOutcome::Completed(report) = result.unwrap() else {
            panic!("expected completion: {out}");
        };

        assert_eq!(*fx.processes.terminated.borrow(), vec![4821]);
        assert_eq!(report.entries.len(), 2);
        assert_eq!(
            fx.runner.programs()[0],
            fx.root()
                .join("v23.1.0")
                .join("bin/win64/UninstallMathWorksServiceHost.exe")
        );
        assert_eq!(report.uninstalled.len(), 1);

        let backup = fx.backup();
        assert!(backup.join("v23.1.0/bin/core.dll").exists());
        assert!(backup.join("v22.2.0").exists());
        assert!(backup.join("MATLABConnector").is_dir());
        assert!(backup.join("LatestInstall.info").exists());
        assert!(!fx.ctx.paths.connector_dir.exists());

        assert_eq!(fx.downloader.urls.borrow().len(), 1);
        assert_eq!(fx.runner.calls.borrow().len(), 2);
        assert!(matches!(
            report.install.as_ref().map(|r| &r.outcome),
            Some(InstallOutcome::Installed)
        ));
        assert!(out.contains("Installation completed!"));
    }

    #[test]
    fn wrong_case_uninstall_token_declines() {
        let fx = Fixture::new();
        make_sized_file(&fx.root().join("v2023.1.0/big.bin"), 40 * MIB);
        let (result, _) = fx.run("Uninstall\n", RepairOptions::default());
        assert!(matches!(result.unwrap(), RunOutcome::Declined(Stage::Uninstall)));
        assert!(fx.runner.calls.borrow().is_empty());
        assert!(fx.root().join("v2023.1.0").exists());
    }

    #[test]
    fn inactive_only_skips_uninstall_gate() {
        let fx = Fixture::new();
        make_sized_file(&fx.root().join("v2022.2.0/stub.bin"), MIB);
        let (result, out) = fx.run("cancel\n", RepairOptions::default());
        assert!(matches!(result.unwrap(), RunOutcome::Declined(Stage::Cleanup)));
        assert!(out.contains("No active installations"));
        assert!(fx.root().join("v2022.2.0").exists());
        assert!(!fx.backup().exists());
        assert!(fx.downloader.urls.borrow().is_empty());
    }

    #[test]
    fn empty_service_host_root_means_nothing_to_do() {
        let fx = Fixture::new();
        let (result, _) = fx.run("", RepairOptions::default());
        let outcome = result.unwrap();
        assert!(matches!(outcome, RunOutcome::NothingToDo));
        assert_eq!(outcome.exit_code(), EXIT_NOTHING_TO_DO);
    }

    #[test]
    fn missing_service_host_root_is_fatal() {
        let fx = Fixture::new();
        fs::remove_dir_all(fx.root()).unwrap();
        let (result, _) = fx.run("", RepairOptions::default());
        assert!(matches!(result.unwrap_err(), FixError::Scan { .. }));
    }

    #[test]
    fn uninstaller_failures_do_not_stop_cleanup() {
        let fx = Fixture::new();
        make_sized_file(&fx.root().join("v2023.1.0/big.bin"), 20 * MIB);
        fx.runner.push_exit(5);
        let options = RepairOptions {
            skip_install: true,
            ..RepairOptions::default()
        };
        let (result, out) = fx.run("uninstall\nmove\nno\n", options);
        let RunOutcome::Completed(report) = result.unwrap() else {
            panic!("expected completion");
        };
        assert!(matches!(report.uninstalled[0].status, UninstallStatus::Failed { .. }));
        assert!(out.contains("failed: uninstaller exited with status 5"));
        assert!(fx.backup().join("v2023.1.0").exists());
        assert!(report.install.is_none());
    }

    #[test]
    fn entries_removed_by_their_uninstaller_are_skipped_when_moving() {
        let fx = Fixture::new();
        make_sized_file(&fx.root().join("v2024.2.0.3/bin/core.dll"), 30 * MIB);
        make_sized_file(&fx.root().join("v2023.1.0/stub.bin"), MIB);
        fs::write(fx.root().join("LatestInstall.info"), b"v2024.2.0.3").unwrap();
        let runner = SelfRemovingUninstaller {
            root: fx.root(),
            calls: RefCell::new(Vec::new()),
        };

        let (result, out) = fx.run_with(&runner, "uninstall\nmove\nn\n", RepairOptions::default());
        let RunOutcome::Completed(report) = result.unwrap() else {
            panic!("expected completion: {out}");
        };
        let CleanupReport::Moved {
            items,
            already_gone,
            ..
        } = &report.cleanup
        else {
            panic!("expected move mode");
        };
        assert_eq!(already_gone, &vec![fx.root().join("v2024.2.0.3")]);
        assert_eq!(items.len(), 2);
        assert!(fx.backup().join("v2023.1.0").exists());
        assert!(fx.backup().join("LatestInstall.info").exists());
        assert!(out.contains("Already removed, skipped:"));
        assert_eq!(fx.downloader.urls.borrow().len(), 1);
        // one uninstaller run, then the installer
        assert_eq!(runner.calls.borrow().len(), 2);
    }

    #[test]
    fn entries_removed_by_their_uninstaller_are_skipped_when_deleting() {
        let fx = Fixture::new();
        make_sized_file(&fx.root().join("v2024.2.0.3/bin/core.dll"), 30 * MIB);
        make_sized_file(&fx.root().join("v2023.1.0/stub.bin"), MIB);
        let runner = SelfRemovingUninstaller {
            root: fx.root(),
            calls: RefCell::new(Vec::new()),
        };
        let options = RepairOptions {
            cleanup: CleanupMode::Delete,
            skip_install: true,
        };

        let (result, out) = fx.run_with(&runner, "uninstall\ndelete\n", options);
        let RunOutcome::Completed(report) = result.unwrap() else {
            panic!("expected completion: {out}");
        };
        assert_eq!(
            report.cleanup,
            CleanupReport::Deleted {
                items: vec![fx.root().join("v2023.1.0")],
                already_gone: vec![fx.root().join("v2024.2.0.3")],
            }
        );
        assert!(out.contains("Deleted 1 item(s)."));
    }

    #[test]
    fn delete_mode_removes_instead_of_moving() {
        let fx = Fixture::new();
        make_sized_file(&fx.root().join("v2022.2.0/stub.bin"), MIB);
        let options = RepairOptions {
            cleanup: CleanupMode::Delete,
            skip_install: true,
        };
        let (result, _) = fx.run("delete\n", options);
        let RunOutcome::Completed(report) = result.unwrap() else {
            panic!("expected completion");
        };
        assert!(matches!(report.cleanup, CleanupReport::Deleted { ref items, .. } if items.len() == 1));
        assert!(!fx.root().join("v2022.2.0").exists());
        assert!(!fx.backup().exists());
    }

    #[test]
    fn installer_failure_is_fatal() {
        let fx = Fixture::new();
        make_sized_file(&fx.root().join("v2022.2.0/stub.bin"), MIB);
        fx.runner.push_exit(1);
        let (result, _) = fx.run("move\n", RepairOptions::default());
        assert!(matches!(result.unwrap_err(), FixError::Installer(_)));
        assert!(fx.backup().join("v2022.2.0").exists());
    }

    #[test]
    fn manual_step_exit_is_a_success_with_guidance() {
        let fx = Fixture::new();
        make_sized_file(&fx.root().join("v2022.2.0/stub.bin"), MIB);
        fx.runner.push_exit(66);
        let (result, out) = fx.run("move\ny\n", RepairOptions::default());
        let RunOutcome::Completed(report) = result.unwrap() else {
            panic!("expected completion");
        };
        assert!(matches!(
            report.install.map(|r| r.outcome),
            Some(InstallOutcome::InstalledWithManualStep { .. })
        ));
        assert!(out.contains("Setup MATLAB Drive Connector"));
        assert!(out.contains("Backup folder:"));
    }

    #[test]
    fn scan_report_is_read_only() {
        let mut fx = Fixture::new();
        fx.processes = MockProcessTable::with(&[("mathworksservicehost.exe", 9)]);
        make_sized_file(&fx.root().join("v2023.1.0/big.bin"), 11 * MIB);
        let report = run_scan(&fx.ctx, &fx.processes).unwrap();
        assert_eq!(report.running.len(), 1);
        assert_eq!(report.entries.len(), 1);
        assert!(report.entries[0].is_active());
        assert_eq!(report.cleanup_items, vec![fx.root().join("v2023.1.0")]);
        assert!(fx.processes.terminated.borrow().is_empty());
        assert!(fx.root().join("v2023.1.0").exists());
    }
}
