use crate::command::{ExitCode, InputSink, OutputSource, Runnable, RunnableError};
use crate::env::Environment;
use crate::io_adapters::RejectingWriter;
use std::ffi::OsStr;
use std::io::{self, Cursor, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use tracing::{debug, warn};

/// Exit code of a command the OS refused to launch.
pub const LAUNCH_FAILURE_EXIT_CODE: ExitCode = 1;

/// Outcome of an attempt to spawn the process.
enum Launch {
    Started(Child),
    /// Spawning failed; holds the diagnostic shown in place of the output.
    FailedToLaunch(String),
}

enum ProcessState {
    NotStarted,
    Running(Child),
    Exited(ExitCode),
}

/// Command that is not a builtin: a program run as a child process.
///
/// The child runs in the environment's current directory with exactly the environment's
/// variables; stderr is inherited from the shell.
///
/// A program that cannot be launched does not make [`Runnable::start`] fail. Instead the
/// runnable behaves like a command that printed one diagnostic line and exited with
/// [`LAUNCH_FAILURE_EXIT_CODE`]; writes to its stdin are rejected.
pub struct ExternalProcess {
    name: String,
    args: Vec<String>,
    env: Environment,
    state: ProcessState,
    stdin: Option<InputSink>,
    stdout: Option<OutputSource>,
}

impl ExternalProcess {
    pub fn new(name: impl Into<String>, args: Vec<String>, env: Environment) -> Self {
        Self {
            name: name.into(),
            args,
            env,
            state: ProcessState::NotStarted,
            stdin: None,
            stdout: None,
        }
    }

    fn launch(&self, inherit_stdin: bool, inherit_stdout: bool) -> Launch {
        let current_dir = self.env.current_dir();
        let search_paths = self.env.get_var("PATH").unwrap_or_default();
        let Some(program) =
            find_command_path(OsStr::new(&search_paths), &current_dir, Path::new(&self.name))
        else {
            return Launch::FailedToLaunch(format!("{}: command not found", self.name));
        };

        debug!(program = %program.display(), args = ?self.args, "spawning process");
        let spawned = Command::new(&program)
            .args(&self.args)
            .env_clear()
            .envs(self.env.vars())
            .current_dir(&current_dir)
            .stdin(stdio(inherit_stdin))
            .stdout(stdio(inherit_stdout))
            .stderr(Stdio::inherit())
            .spawn();
        match spawned {
            Ok(child) => Launch::Started(child),
            Err(e) => Launch::FailedToLaunch(format!("{}: {}", self.name, e)),
        }
    }
}

fn stdio(inherit: bool) -> Stdio {
    if inherit {
        Stdio::inherit()
    } else {
        Stdio::piped()
    }
}

impl Runnable for ExternalProcess {
    fn start(&mut self, inherit_stdin: bool, inherit_stdout: bool) -> Result<(), RunnableError> {
        if !matches!(self.state, ProcessState::NotStarted) {
            return Err(RunnableError::AlreadyStarted);
        }

        match self.launch(inherit_stdin, inherit_stdout) {
            Launch::Started(mut child) => {
                self.stdin = child.stdin.take().map(|s| Box::new(s) as InputSink);
                self.stdout = child.stdout.take().map(|s| Box::new(s) as OutputSource);
                self.state = ProcessState::Running(child);
            }
            Launch::FailedToLaunch(diagnostic) => {
                warn!(command = %self.name, "{diagnostic}");
                let line = format!("{diagnostic}\n").into_bytes();
                if !inherit_stdin {
                    self.stdin = Some(Box::new(RejectingWriter));
                }
                if inherit_stdout {
                    let _ = io::stdout().write_all(&line);
                } else {
                    self.stdout = Some(Box::new(Cursor::new(line)));
                }
                self.state = ProcessState::Exited(LAUNCH_FAILURE_EXIT_CODE);
            }
        }
        Ok(())
    }

    fn take_stdin(&mut self) -> Option<InputSink> {
        self.stdin.take()
    }

    fn take_stdout(&mut self) -> Option<OutputSource> {
        self.stdout.take()
    }

    fn exit_code(&mut self) -> Option<ExitCode> {
        match &mut self.state {
            ProcessState::NotStarted => None,
            ProcessState::Exited(code) => Some(*code),
            ProcessState::Running(child) => match child.try_wait() {
                Ok(Some(status)) => {
                    let code = exit_code_of(status);
                    self.state = ProcessState::Exited(code);
                    Some(code)
                }
                Ok(None) | Err(_) => None,
            },
        }
    }

    fn wait_for_termination(&mut self) -> Result<ExitCode, RunnableError> {
        match &mut self.state {
            ProcessState::NotStarted => Err(RunnableError::NotStarted),
            ProcessState::Exited(code) => Ok(*code),
            ProcessState::Running(child) => {
                // Same as `Child::wait`: the child must not wait for input forever.
                drop(self.stdin.take());
                let status = child.wait()?;
                let code = exit_code_of(status);
                debug!(command = %self.name, code, "process exited");
                self.state = ProcessState::Exited(code);
                Ok(code)
            }
        }
    }
}

fn exit_code_of(status: ExitStatus) -> ExitCode {
    match status.code() {
        Some(x) => x,
        None => terminated_by_signal(status),
    }
}

#[cfg(unix)]
fn terminated_by_signal(exit_status: ExitStatus) -> i32 {
    use std::os::unix::process::ExitStatusExt;
    if let Some(signal) = ExitStatusExt::signal(&exit_status) {
        128 + signal
    } else if ExitStatusExt::core_dumped(&exit_status) {
        255
    } else {
        -1
    }
}

#[cfg(not(unix))]
fn terminated_by_signal(_exit_status: ExitStatus) -> i32 {
    -1
}

/// Resolve a command path the way a typical shell would.
///
/// Behavior:
/// - Absolute path: returns it if it exists.
/// - Relative with multiple components (e.g., `bin/sh` or `./foo`): resolved against
///   `current_dir`, returned if it exists.
/// - Single path component (no separators): search each directory in `search_paths`
///   (PATH) and return the first existing match.
/// - Empty path: returns `None`.
pub fn find_command_path(search_paths: &OsStr, current_dir: &Path, path: &Path) -> Option<PathBuf> {
    if path.is_absolute() {
        return find_by_path(path);
    }

    let mut components = path.components();
    let first = components.next();
    let second = components.next();
    match (first, second) {
        // Empty path -> not found
        (None, _) => None,
        (Some(x), None) if !path.starts_with(".") => find_in_path(search_paths, x.as_os_str()),
        _ => find_by_path(&current_dir.join(path)),
    }
}

fn find_in_path(search_paths: &OsStr, cmd: &OsStr) -> Option<PathBuf> {
    std::env::split_paths(search_paths).find_map(|dir| find_by_path(&dir.join(cmd)))
}

fn find_by_path(path: &Path) -> Option<PathBuf> {
    path.is_file().then(|| path.to_path_buf())
}
