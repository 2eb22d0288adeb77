use crate::env::Environment;
use std::io::{self, Read, Write};
use std::thread;
use thiserror::Error;

/// Conventional process exit code type used by this crate.
///
/// A value of 0 indicates success; any non-zero value indicates failure.
/// This mirrors the convention used by POSIX shells and many command-line tools.
pub type ExitCode = i32;

/// Writable end connected to a runnable's standard input.
pub type InputSink = Box<dyn Write + Send>;

/// Readable end connected to a runnable's standard output.
pub type OutputSource = Box<dyn Read + Send>;

/// Misuse of the [`Runnable`] contract or failure to set up its plumbing.
///
/// Failures of the command itself are never reported through this type: they are
/// written to the command's output and reflected in its exit code.
#[derive(Debug, Error)]
pub enum RunnableError {
    #[error("runnable is already started")]
    AlreadyStarted,
    #[error("runnable is not started yet")]
    NotStarted,
    #[error("i/o failure while managing runnable: {0}")]
    Io(#[from] io::Error),
}

/// Anything the shell can execute: a builtin, an external process or a pipeline.
///
/// Each of stdin/stdout works in one of two modes chosen by [`Runnable::start`]:
///
/// 1. Standalone. The runnable creates a pipe and hands its outer end out through
///    [`Runnable::take_stdin`] / [`Runnable::take_stdout`]. Whoever takes an end owns
///    it and closes it by dropping.
/// 2. Inherited. The stream is bound to the shell's own standard stream and there is
///    nothing to take.
///
/// Standard error is always inherited from the shell.
pub trait Runnable: Send {
    /// Start execution in background. Never blocks on the command itself.
    fn start(&mut self, inherit_stdin: bool, inherit_stdout: bool) -> Result<(), RunnableError>;

    /// Take the writable end of the standard input.
    ///
    /// Returns `None` before start, when stdin is inherited, or if it was already taken.
    fn take_stdin(&mut self) -> Option<InputSink>;

    /// Take the readable end of the standard output.
    ///
    /// Returns `None` before start, when stdout is inherited, or if it was already taken.
    fn take_stdout(&mut self) -> Option<OutputSource>;

    /// Exit code if the runnable has terminated, `None` otherwise. Does not block.
    fn exit_code(&mut self) -> Option<ExitCode>;

    /// Block until the runnable terminates and return its exit code.
    fn wait_for_termination(&mut self) -> Result<ExitCode, RunnableError>;
}

/// Constructor of commands registered under a name.
///
/// The registry of a [`crate::parser::CommandParser`] maps command names to factories.
/// Any closure with the matching signature is a factory.
pub trait CommandFactory: Send + Sync {
    fn create(&self, name: &str, args: &[String], env: &Environment) -> Box<dyn Runnable>;
}

impl<F> CommandFactory for F
where
    F: Fn(&str, &[String], &Environment) -> Box<dyn Runnable> + Send + Sync,
{
    fn create(&self, name: &str, args: &[String], env: &Environment) -> Box<dyn Runnable> {
        self(name, args, env)
    }
}

/// Run `runnable` in standalone mode: feed it `input`, collect everything it prints
/// and wait for it to finish.
///
/// Input is written from a separate thread so that a command producing output before
/// consuming all of its input cannot deadlock on a full pipe.
pub fn run_captured(
    runnable: &mut dyn Runnable,
    input: &[u8],
) -> Result<(ExitCode, Vec<u8>), RunnableError> {
    runnable.start(false, false)?;
    let stdin = runnable.take_stdin();
    let stdout = runnable.take_stdout();

    let output = thread::scope(|scope| {
        if let Some(mut stdin) = stdin {
            scope.spawn(move || {
                // A command may exit without reading its input.
                let _ = stdin.write_all(input);
            });
        }
        let mut output = Vec::new();
        if let Some(mut stdout) = stdout {
            stdout.read_to_end(&mut output)?;
        }
        Ok::<_, io::Error>(output)
    })?;

    let code = runnable.wait_for_termination()?;
    Ok((code, output))
}
