use crate::confirm::{ConfirmationGate, YesNo};
use crate::error::FixError;
use dialoguer::console::style;
use serde::Serialize;
use std::io::{BufRead, Write};
use sysinfo::{Pid, ProcessesToUpdate, Signal, System};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunningProcess {
    pub name: String,
    pub pid: u32,
}

pub trait ProcessTable {
    fn list(&self) -> Result<Vec<RunningProcess>, FixError>;
    fn terminate(&self, pid: u32) -> Result<(), FixError>;
}

pub struct SystemProcessTable;

impl ProcessTable for SystemProcessTable {
    fn list(&self) -> Result<Vec<RunningProcess>, FixError> {
        let mut system = System::new();
        system.refresh_processes(ProcessesToUpdate::All, true);
        Ok(system
            .processes()
            .iter()
            .map(|(pid, process)| RunningProcess {
                name: process.name().to_string_lossy().to_string(),
                pid: pid.as_u32(),
            })
            .collect())
    }

    fn terminate(&self, pid: u32) -> Result<(), FixError> {
        let pid = Pid::from_u32(pid);
        let mut system = System::new();
        system.refresh_processes(ProcessesToUpdate::Some(&[pid]), true);
        let Some(process) = system.process(pid) else {
            return Err(FixError::Process(format!("process {pid} is no longer running")));
        };
        // Windows has no TERM; sysinfo reports that as None.
        let sent = process
            .kill_with(Signal::Term)
            .unwrap_or_else(|| process.kill());
        if !sent {
            return Err(FixError::Process(format!(
                "could not send a terminate signal to process {pid}"
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopOutcome {
    NotFound,
    Terminated(Vec<RunningProcess>),
    Declined,
}

/// Case-insensitive exact name matches, ordered by PID.
pub fn find_matches(processes: &[RunningProcess], name: &str) -> Vec<RunningProcess> {
    let mut matches: Vec<RunningProcess> = processes
        .iter()
        .filter(|p| p.name.eq_ignore_ascii_case(name))
        .cloned()
        .collect();
    matches.sort_by_key(|p| p.pid);
    matches
}

/// Offers to terminate every running instance of `name`. Declining stops the
/// run because a live instance keeps its files locked.
pub fn find_and_stop<T, I, O>(
    table: &T,
    name: &str,
    gate: &mut ConfirmationGate<I, O>,
) -> Result<StopOutcome, FixError>
where
    T: ProcessTable + ?Sized,
    I: BufRead,
    O: Write,
{
    gate.say(format!("Searching for the {name} process."))?;
    let matches = find_matches(&table.list()?, name);
    if matches.is_empty() {
        gate.say(format!("{name} is not running. Skipping termination."))?;
        return Ok(StopOutcome::NotFound);
    }

    for process in &matches {
        gate.say(format!(
            "Process '{}' is running with PID {}",
            process.name, process.pid
        ))?;
    }
    let question = if matches.len() == 1 {
        "Do you want to end this process?".to_string()
    } else {
        format!("Do you want to end these {} processes?", matches.len())
    };
    if gate.ask_yes_no(&question)? == YesNo::No {
        gate.say(style("Exiting since the process must be stopped before its files can be moved.").red())?;
        return Ok(StopOutcome::Declined);
    }

    for process in &matches {
        table.terminate(process.pid).map_err(|err| {
            FixError::Process(format!(
                "error terminating {} (PID {}): {err}",
                process.name, process.pid
            ))
        })?;
        tracing::info!(pid = process.pid, name = %process.name, "terminated process");
        gate.say(format!(
            "{} (PID {}) has been terminated.",
            process.name, process.pid
        ))?;
    }
    Ok(StopOutcome::Terminated(matches))
}
