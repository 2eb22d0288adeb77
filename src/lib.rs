//! A small line-oriented shell: pipelines of builtin and external commands.
//!
//! A command line goes through quoting, `$VAR` substitution and tokenization (see
//! [`parser::LineParser`]), is split on unquoted `|` into segments and turned into a
//! single [`Runnable`] (see [`parser::CommandParser`]). Builtins run on threads of the
//! shell process, anything else is launched as an OS process, and neighbouring stages
//! are connected by relay threads copying bytes between them.
//!
//! The main entry point is [`Interpreter`], which executes lines against a shared
//! [`Environment`] either attached to the process standard streams or captured in
//! memory. The public modules [`command`] and [`env`] expose traits and types for
//! implementing your own commands.

mod builtin;
pub mod command;
pub mod env;
pub mod external;
pub mod in_process;
mod interpreter;
mod io_adapters;
pub mod lexer;
pub mod parser;
pub mod pipe;

pub use command::{CommandFactory, ExitCode, Runnable, RunnableError};
pub use env::Environment;
/// Just a convenient re-export of the interactive command runner.
///
/// See [`Interpreter`] for the high-level API and examples.
pub use interpreter::{Interpreter, LineError};
