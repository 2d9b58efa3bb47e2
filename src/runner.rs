use std::io;
use std::path::Path;
use std::process::{Command, Stdio};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Window {
    /// No console window, output discarded.
    Hidden,
    /// Output streams attached to the operator's terminal.
    Attached,
}

/// Launches an executable with no arguments and waits for it. The error case
/// is a failure to start the program; a non-zero exit is a status code.
pub trait ProgramRunner {
    fn run(&self, program: &Path, window: Window) -> Result<i32, io::Error>;
}

pub struct SystemRunner;

#[cfg(windows)]
const CREATE_NO_WINDOW: u32 = 0x0800_0000;

impl ProgramRunner for SystemRunner {
    fn run(&self, program: &Path, window: Window) -> Result<i32, io::Error> {
        let mut cmd = Command::new(program);
        match window {
            Window::Hidden => {
                cmd.stdin(Stdio::null())
                    .stdout(Stdio::null())
                    .stderr(Stdio::null());
                #[cfg(windows)]
                {
                    use std::os::windows::process::CommandExt;
                    cmd.creation_flags(CREATE_NO_WINDOW);
                }
            }
            Window::Attached => {
                cmd.stdout(Stdio::inherit()).stderr(Stdio::inherit());
            }
        }
        let status = cmd.status()?;
        Ok(status
            .code()
            .unwrap_or(if status.success() { 0 } else { 1 }))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::path::PathBuf;

    /// Replays queued results in order; defaults to exit 0 once drained.
    #[derive(Default)]
    pub struct MockRunner {
        pub calls: RefCell<Vec<(PathBuf, Window)>>,
        pub results: RefCell<Vec<Result<i32, io::ErrorKind>>>,
    }

    impl MockRunner {
        pub fn push_exit(&self, code: i32) {
            self.results.borrow_mut().push(Ok(code));
        }

        pub fn push_launch_error(&self, kind: io::ErrorKind) {
            self.results.borrow_mut().push(Err(kind));
        }

        pub fn programs(&self) -> Vec<PathBuf> {
            self.calls.borrow().iter().map(|(p, _)| p.clone()).collect()
        }
    }

    impl ProgramRunner for MockRunner {
        fn run(&self, program: &Path, window: Window) -> Result<i32, io::Error> {
            self.calls.borrow_mut().push((program.to_path_buf(), window));
            let mut queued = self.results.borrow_mut();
            if queued.is_empty() {
                return Ok(0);
            }
            queued.remove(0).map_err(io::Error::from)
        }
    }

    #[test]
    fn missing_program_fails_to_launch() {
        let err = SystemRunner
            .run(Path::new("/definitely/not/here/uninstall.exe"), Window::Hidden)
            .unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }

    #[cfg(unix)]
    #[test]
    fn exit_code_is_reported() {
        let program = Path::new("/bin/false");
        if !program.exists() {
            return;
        }
        assert_eq!(SystemRunner.run(program, Window::Hidden).unwrap(), 1);
    }
}
