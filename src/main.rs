use argh::FromArgs;
use shell_pipeline::{Interpreter, LineError};
use std::process::ExitCode;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

#[derive(FromArgs)]
/// line-oriented shell with pipes, variables and builtin commands.
struct ShellArgs {
    #[argh(option, short = 'c')]
    /// run a single command line and exit with its exit code.
    command: Option<String>,

    #[argh(option, default = "String::from(\"$ \")")]
    /// prompt of the interactive loop.
    prompt: String,
}

fn exit_code(code: i32) -> ExitCode {
    ExitCode::from((code & 0xff) as u8)
}

fn main() -> ExitCode {
    // Logs go to stderr, the shell's stdout belongs to the commands.
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::from_default_env())
        .init();

    let args: ShellArgs = argh::from_env();
    let interpreter = Interpreter::default();

    match args.command {
        Some(line) => match interpreter.execute_line(&line) {
            Ok(code) => exit_code(code),
            Err(e @ LineError::Parsing(_)) => {
                println!("{e}");
                ExitCode::FAILURE
            }
            Err(e) => {
                eprintln!("shell_pipeline: {e}");
                ExitCode::FAILURE
            }
        },
        None => match interpreter.repl(&args.prompt) {
            Ok(code) => exit_code(code),
            Err(e) => {
                eprintln!("shell_pipeline: {e:#}");
                ExitCode::FAILURE
            }
        },
    }
}
