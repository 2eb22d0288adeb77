use crate::builtin::{BuiltinCommand, Cat, Cd, Echo, Exit, Grep, Pwd, Wc};
use crate::command::{CommandFactory, ExitCode, Runnable, RunnableError, run_captured};
use crate::env::Environment;
use crate::parser::{CommandParser, LineParser, ParsingError};
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use std::marker::PhantomData;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Factory creating builtin commands of type `T`.
///
/// Only supports commands defined in this crate, see [`crate::builtin`].
pub(crate) struct Factory<T> {
    _phantom: PhantomData<fn() -> T>,
}

impl<T> Default for Factory<T> {
    fn default() -> Self {
        Self {
            _phantom: PhantomData,
        }
    }
}

/// Why a line could not be executed.
#[derive(Debug, Error)]
pub enum LineError {
    #[error("Unable to parse command line: {0}")]
    Parsing(#[from] ParsingError),
    #[error(transparent)]
    Runnable(#[from] RunnableError),
}

/// A line-oriented shell interpreter: pipelines of builtin and external commands.
///
/// The interpreter owns an [`Environment`] shared by every command it starts, and a
/// registry of commands, see [`Interpreter::with_builtins`] for the commands included
/// out of the box. Any other name is launched as an external program.
///
/// Example
/// ```
/// use shell_pipeline::{Environment, Interpreter};
/// let sh = Interpreter::with_builtins(Environment::new("/"));
/// let (code, out) = sh.execute_captured("echo hello | wc", b"").unwrap();
/// assert_eq!(code, 0);
/// assert_eq!(out, b"1 1 6\n");
/// ```
pub struct Interpreter {
    env: Environment,
    line_parser: LineParser,
    commands: CommandParser,
}

impl Interpreter {
    /// Create an interpreter without any builtin command.
    pub fn new(env: Environment) -> Self {
        Self {
            line_parser: LineParser::new(env.clone()),
            commands: CommandParser::new(env.clone()),
            env,
        }
    }

    /// Create an interpreter with `pwd`, `echo`, `cat`, `wc`, `grep`, `cd` and `exit`.
    pub fn with_builtins(env: Environment) -> Self {
        let mut interpreter = Self::new(env);
        interpreter.register::<Pwd>();
        interpreter.register::<Echo>();
        interpreter.register::<Cat>();
        interpreter.register::<Wc>();
        interpreter.register::<Grep>();
        interpreter.register::<Cd>();
        interpreter.register::<Exit>();
        interpreter
    }

    fn register<T: BuiltinCommand>(&mut self) {
        self.commands.add_command(T::name(), Factory::<T>::default());
    }

    /// Register a custom command, replacing any command with the same name.
    pub fn add_command(&mut self, name: impl Into<String>, factory: impl CommandFactory + 'static) {
        self.commands.add_command(name, factory);
    }

    pub fn env(&self) -> &Environment {
        &self.env
    }

    /// Parse a line into a pipeline which is not started yet.
    ///
    /// Returns `None` for a line without any word.
    pub fn parse_line(&self, line: &str) -> Result<Option<Box<dyn Runnable>>, ParsingError> {
        let tokens = self.line_parser.parse(line)?;
        if tokens.is_empty() {
            return Ok(None);
        }
        self.commands.build(&tokens).map(Some)
    }

    /// Execute a line attached to the shell's own stdin and stdout, wait for it and
    /// return its exit code. An empty line does nothing and succeeds.
    pub fn execute_line(&self, line: &str) -> Result<ExitCode, LineError> {
        let Some(mut pipeline) = self.parse_line(line)? else {
            return Ok(0);
        };
        pipeline.start(true, true)?;
        let code = pipeline.wait_for_termination()?;
        debug!(line, code, "line finished");
        Ok(code)
    }

    /// Execute a line feeding it `input` and collecting its output.
    pub fn execute_captured(&self, line: &str, input: &[u8]) -> Result<(ExitCode, Vec<u8>), LineError> {
        match self.parse_line(line)? {
            Some(mut pipeline) => Ok(run_captured(pipeline.as_mut(), input)?),
            None => Ok((0, Vec::new())),
        }
    }

    /// Interactive Read-Eval-Print Loop.
    ///
    /// Stops on end of input or once `exit` was executed, returning the exit code of the
    /// last executed line.
    pub fn repl(&self, prompt: &str) -> anyhow::Result<ExitCode> {
        let mut rl = DefaultEditor::new()?;
        let mut last_code = 0;

        while !self.env.should_exit() {
            let line = match rl.readline(prompt) {
                Ok(line) => line,
                Err(ReadlineError::Interrupted) => continue,
                Err(ReadlineError::Eof) => {
                    info!("end of input");
                    break;
                }
                Err(err) => return Err(err.into()),
            };
            if !line.trim().is_empty() {
                rl.add_history_entry(line.as_str())?;
            }

            match self.execute_line(&line) {
                Ok(code) => last_code = code,
                Err(e @ LineError::Parsing(_)) => println!("{e}"),
                Err(e) => {
                    warn!(error = %e, "failed to run line");
                    last_code = 1;
                }
            }
        }
        Ok(last_code)
    }
}

impl Default for Interpreter {
    /// Interpreter over the process environment with all builtins.
    fn default() -> Self {
        Self::with_builtins(Environment::from_process())
    }
}
