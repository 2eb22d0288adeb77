use crate::command::{ExitCode, InputSink, OutputSource, Runnable, RunnableError};
use crate::io_adapters::OutputGuard;
use std::io::{self, PipeReader, PipeWriter, Read, Write};
use std::thread::{self, JoinHandle};
use tracing::{debug, warn};

/// Exit code reported when the command's logic panics.
const PANIC_EXIT_CODE: ExitCode = 1;

/// Exit code of a command that failed because its reader went away, as for a process
/// killed by `SIGPIPE`.
pub const BROKEN_PIPE_EXIT_CODE: ExitCode = 128 + 13;

type Task = Box<dyn FnOnce(&mut dyn Read, &mut dyn Write) -> ExitCode + Send>;

/// Runnable executing Rust code on a background thread of the shell process.
///
/// The task reads from its input and writes to its output. In standalone mode both are
/// OS pipes: writes block while the pipe is full, reads block while it is empty and see
/// end of stream once every writer is closed. In inherited mode the task talks to the
/// shell's own stdin/stdout, which are flushed but never closed.
///
/// Once the output cannot be written anymore every further write fails, see
/// [`OutputGuard`]. A task that gives up because of that reports
/// [`BROKEN_PIPE_EXIT_CODE`].
///
/// Ownership: the thread owns the inner ends of its pipes and closes them when the task
/// returns; the outer ends belong to whoever takes them.
pub struct InProcess {
    name: String,
    task: Option<Task>,
    stdin: Option<PipeWriter>,
    stdout: Option<PipeReader>,
    handle: Option<JoinHandle<ExitCode>>,
    exit_code: Option<ExitCode>,
}

impl InProcess {
    /// Create a runnable for `task`. `name` is used for the thread and in logs.
    pub fn new<F>(name: impl Into<String>, task: F) -> Self
    where
        F: FnOnce(&mut dyn Read, &mut dyn Write) -> ExitCode + Send + 'static,
    {
        Self {
            name: name.into(),
            task: Some(Box::new(task)),
            stdin: None,
            stdout: None,
            handle: None,
            exit_code: None,
        }
    }

    fn join(&mut self) {
        if let Some(handle) = self.handle.take() {
            let code = handle.join().unwrap_or_else(|_| {
                warn!(command = %self.name, "builtin panicked");
                PANIC_EXIT_CODE
            });
            debug!(command = %self.name, code, "builtin finished");
            self.exit_code = Some(code);
        }
    }
}

impl Runnable for InProcess {
    fn start(&mut self, inherit_stdin: bool, inherit_stdout: bool) -> Result<(), RunnableError> {
        let task = self.task.take().ok_or(RunnableError::AlreadyStarted)?;

        let mut input: Box<dyn Read + Send> = if inherit_stdin {
            Box::new(io::stdin())
        } else {
            let (reader, writer) = io::pipe()?;
            self.stdin = Some(writer);
            Box::new(reader)
        };
        let output: Box<dyn Write + Send> = if inherit_stdout {
            Box::new(io::stdout())
        } else {
            let (reader, writer) = io::pipe()?;
            self.stdout = Some(reader);
            Box::new(writer)
        };
        let mut output = OutputGuard::new(output);

        let name = self.name.clone();
        let handle = thread::Builder::new()
            .name(self.name.clone())
            .spawn(move || {
                let mut code = task(&mut input, &mut output);
                let _ = output.flush();
                if code != 0 && output.is_broken() {
                    debug!(command = %name, code, "output closed by reader");
                    code = BROKEN_PIPE_EXIT_CODE;
                }
                // Closing our ends lets the neighbours see end of stream.
                drop(input);
                drop(output);
                code
            })?;
        self.handle = Some(handle);
        Ok(())
    }

    fn take_stdin(&mut self) -> Option<InputSink> {
        self.stdin
            .take()
            .map(|writer| Box::new(writer) as InputSink)
    }

    fn take_stdout(&mut self) -> Option<OutputSource> {
        self.stdout
            .take()
            .map(|reader| Box::new(reader) as OutputSource)
    }

    fn exit_code(&mut self) -> Option<ExitCode> {
        if self.handle.as_ref().is_some_and(JoinHandle::is_finished) {
            self.join();
        }
        self.exit_code
    }

    fn wait_for_termination(&mut self) -> Result<ExitCode, RunnableError> {
        if self.handle.is_none() && self.exit_code.is_none() {
            return Err(RunnableError::NotStarted);
        }
        // Input nobody took can never be written anymore.
        drop(self.stdin.take());
        self.join();
        self.exit_code.ok_or(RunnableError::NotStarted)
    }
}
