use crate::command::{CommandFactory, ExitCode, Runnable};
use crate::env::Environment;
use crate::in_process::InProcess;
use crate::interpreter::Factory;
use anyhow::{Context, Result, anyhow};
use argh::{EarlyExit, FromArgs};
use regex::{Regex, RegexBuilder};
use std::fs::{self, File};
use std::io::{self, BufRead, BufReader, Read, Write};
use std::path::PathBuf;

/// Name standing for the standard input in file lists of `cat`, `wc` and `grep`.
const STDIN_NAME: &str = "-";

/// Stand-in for a `-` argument while it goes through `argh`, which would take it for an
/// option. A NUL byte never occurs in a real argument or file name.
const STDIN_OPERAND: &str = "\0-";

/// Map an argument that went through `argh` back to what the user typed.
fn operand(arg: &str) -> &str {
    if arg == STDIN_OPERAND { STDIN_NAME } else { arg }
}

/// Built-in commands known to the shell at compile time.
///
/// Builtins are parsed using the [`argh`] crate (`FromArgs`) and executed on a thread of
/// the shell process, see [`InProcess`].
pub(crate) trait BuiltinCommand: Sized + FromArgs + Send + 'static {
    /// Canonical name of the command, e.g. "echo" or "cd".
    fn name() -> &'static str;

    /// Whether a lone `-` among the arguments is an operand rather than an option.
    const DASH_IS_OPERAND: bool = false;

    /// Executes the command using provided IO streams and environment.
    ///
    /// Return value should follow shell conventions: 0 for success, non-zero for error.
    /// An error is printed to `stdout` by the caller and turns into exit code 1.
    fn execute(
        self,
        stdin: &mut dyn Read,
        stdout: &mut dyn Write,
        env: &Environment,
    ) -> Result<ExitCode>;
}

fn is_broken_pipe(e: &anyhow::Error) -> bool {
    e.chain().any(|cause| {
        cause
            .downcast_ref::<io::Error>()
            .is_some_and(|e| e.kind() == io::ErrorKind::BrokenPipe)
    })
}

fn write_message(stdout: &mut dyn Write, message: &str) {
    let _ = stdout.write_all(message.as_bytes());
    if !message.ends_with('\n') {
        let _ = stdout.write_all(b"\n");
    }
}

impl<T: BuiltinCommand> CommandFactory for Factory<T> {
    fn create(&self, name: &str, args: &[String], env: &Environment) -> Box<dyn Runnable> {
        let args: Vec<&str> = args
            .iter()
            .map(|arg| match arg.as_str() {
                STDIN_NAME if T::DASH_IS_OPERAND => STDIN_OPERAND,
                arg => arg,
            })
            .collect();
        match T::from_args(&[name], &args) {
            Ok(cmd) => {
                let env = env.clone();
                Box::new(InProcess::new(name, move |stdin, stdout| {
                    match cmd.execute(stdin, stdout, &env) {
                        Ok(code) => code,
                        // Nobody reads the output anymore, there is no one to tell.
                        Err(e) if is_broken_pipe(&e) => 1,
                        Err(e) => {
                            write_message(stdout, &format!("{e:#}"));
                            1
                        }
                    }
                }))
            }
            // `--help` or invalid arguments
            Err(EarlyExit { output, status }) => Box::new(InProcess::new(name, move |_, stdout| {
                write_message(stdout, &output);
                if status.is_ok() { 0 } else { 1 }
            })),
        }
    }
}

/// Runnable performing `name=value`. Prints nothing and always succeeds.
pub(crate) fn assignment(name: &str, value: &str, env: &Environment) -> Box<dyn Runnable> {
    let (name, value, env) = (name.to_string(), value.to_string(), env.clone());
    Box::new(InProcess::new("assignment", move |_, _| {
        env.set_var(name, value);
        0
    }))
}

/// Open every entry of `files` in turn, `-` being the command's stdin.
fn for_each_source(
    command: &str,
    files: &[String],
    stdin: &mut dyn Read,
    stdout: &mut dyn Write,
    env: &Environment,
    mut process: impl FnMut(&str, &mut dyn Read, &mut dyn Write) -> io::Result<()>,
) -> Result<ExitCode> {
    let mut code = 0;
    for name in files.iter().map(|name| operand(name)) {
        let result = if name == STDIN_NAME {
            process(name, stdin, stdout)
        } else {
            File::open(env.resolve_path(name)).and_then(|mut file| process(name, &mut file, stdout))
        };
        if let Err(e) = result {
            if e.kind() == io::ErrorKind::BrokenPipe {
                return Err(e.into());
            }
            writeln!(stdout, "{command}: {name}: {e}")?;
            code = 1;
        }
    }
    Ok(code)
}

fn stdin_if_empty(files: Vec<String>) -> Vec<String> {
    if files.is_empty() {
        vec![STDIN_NAME.to_string()]
    } else {
        files
    }
}

#[derive(FromArgs)]
/// print the current working directory to standard output.
pub struct Pwd {}

impl BuiltinCommand for Pwd {
    fn name() -> &'static str {
        "pwd"
    }

    fn execute(
        self,
        _stdin: &mut dyn Read,
        stdout: &mut dyn Write,
        env: &Environment,
    ) -> Result<ExitCode> {
        writeln!(stdout, "{}", env.current_dir().to_string_lossy())?;
        Ok(0)
    }
}

#[derive(FromArgs)]
/// change the current working directory.
/// If no target is provided, changes to the directory specified by the HOME variable.
pub struct Cd {
    #[argh(positional)]
    /// directory to switch to; absolute or relative to the current directory. Defaults to $HOME when omitted.
    pub target: Option<String>,
}

impl BuiltinCommand for Cd {
    fn name() -> &'static str {
        "cd"
    }

    fn execute(
        self,
        _stdin: &mut dyn Read,
        _stdout: &mut dyn Write,
        env: &Environment,
    ) -> Result<ExitCode> {
        let target = match self.target {
            Some(t) if !t.is_empty() => PathBuf::from(t),
            _ => env
                .get_var("HOME")
                .map(PathBuf::from)
                .ok_or_else(|| anyhow!("cd: no target and HOME not set"))?,
        };

        let new_dir = env.resolve_path(&target);
        let canonical = fs::canonicalize(&new_dir)
            .with_context(|| format!("cd: can't canonicalize {}", new_dir.display()))?;
        if !canonical.is_dir() {
            return Err(anyhow!("cd: {}: not a directory", target.display()));
        }

        env.set_current_dir(canonical);
        Ok(0)
    }
}

#[derive(FromArgs)]
/// stop the interactive shell after the current line.
pub struct Exit {
    #[argh(positional)]
    /// exit code of the command, 0 by default.
    pub code: Option<ExitCode>,
}

impl BuiltinCommand for Exit {
    fn name() -> &'static str {
        "exit"
    }

    fn execute(
        self,
        _stdin: &mut dyn Read,
        _stdout: &mut dyn Write,
        env: &Environment,
    ) -> Result<ExitCode> {
        env.request_exit();
        Ok(self.code.unwrap_or(0))
    }
}

/// Write the arguments to standard output, separated by spaces.
///
/// By default, a trailing newline is printed. A leading `-n` suppresses it; every other
/// argument, including `--help` or `-5`, is printed as-is.
pub struct Echo {
    pub no_newline: bool,
    pub args: Vec<String>,
}

impl FromArgs for Echo {
    fn from_args(_command_name: &[&str], args: &[&str]) -> Result<Self, EarlyExit> {
        let (no_newline, args) = match args.split_first() {
            Some((&"-n", rest)) => (true, rest),
            _ => (false, args),
        };
        Ok(Self {
            no_newline,
            args: args.iter().map(|arg| arg.to_string()).collect(),
        })
    }
}

impl BuiltinCommand for Echo {
    fn name() -> &'static str {
        "echo"
    }

    fn execute(
        self,
        _stdin: &mut dyn Read,
        stdout: &mut dyn Write,
        _env: &Environment,
    ) -> Result<ExitCode> {
        let s = self.args.join(" ");
        if self.no_newline {
            write!(stdout, "{}", s)?;
        } else {
            writeln!(stdout, "{}", s)?;
        }
        Ok(0)
    }
}

/// Line, word and byte counts of some data.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
struct Counts {
    lines: usize,
    words: usize,
    bytes: usize,
}

impl Counts {
    fn of(data: &[u8]) -> Self {
        let newlines = data.iter().filter(|&&b| b == b'\n').count();
        let unterminated = !data.is_empty() && !data.ends_with(b"\n");
        Self {
            lines: newlines + usize::from(unterminated),
            words: String::from_utf8_lossy(data).split_whitespace().count(),
            bytes: data.len(),
        }
    }

    fn add(&mut self, other: Counts) {
        self.lines += other.lines;
        self.words += other.words;
        self.bytes += other.bytes;
    }
}

#[derive(FromArgs)]
/// count lines, words and bytes.
pub struct Wc {
    #[argh(positional, greedy)]
    /// files to count, `-` is the standard input. Reads standard input when omitted.
    pub files: Vec<String>,
}

impl BuiltinCommand for Wc {
    fn name() -> &'static str {
        "wc"
    }

    const DASH_IS_OPERAND: bool = true;

    fn execute(
        self,
        stdin: &mut dyn Read,
        stdout: &mut dyn Write,
        env: &Environment,
    ) -> Result<ExitCode> {
        let named = !self.files.is_empty();
        let files = stdin_if_empty(self.files);
        let mut total = Counts::default();

        let code = for_each_source("wc", &files, stdin, stdout, env, |name, input, stdout| {
            let mut data = Vec::new();
            input.read_to_end(&mut data)?;
            let counts = Counts::of(&data);
            total.add(counts);
            if named {
                writeln!(stdout, "{} {} {} {}", counts.lines, counts.words, counts.bytes, name)?;
            }
            Ok(())
        })?;

        if !named {
            writeln!(stdout, "{} {} {}", total.lines, total.words, total.bytes)?;
        } else if files.len() >= 2 {
            writeln!(stdout, "{} {} {} total", total.lines, total.words, total.bytes)?;
        }
        Ok(code)
    }
}

#[derive(FromArgs)]
/// print file(s) to stdout.
pub struct Cat {
    #[argh(positional, greedy)]
    /// files to print, `-` is the standard input. Reads standard input when omitted.
    pub files: Vec<String>,
}

impl BuiltinCommand for Cat {
    fn name() -> &'static str {
        "cat"
    }

    const DASH_IS_OPERAND: bool = true;

    fn execute(
        self,
        stdin: &mut dyn Read,
        stdout: &mut dyn Write,
        env: &Environment,
    ) -> Result<ExitCode> {
        let files = stdin_if_empty(self.files);
        for_each_source("cat", &files, stdin, stdout, env, |_, input, stdout| {
            io::copy(input, stdout).map(|_| ())
        })
    }
}

#[derive(FromArgs)]
/// print lines matching a pattern.
pub struct Grep {
    #[argh(positional)]
    /// the pattern to search for (a regular expression).
    pub pattern: String,

    #[argh(positional, greedy)]
    /// files to search. If none provided, reads from stdin.
    pub files: Vec<String>,

    #[argh(switch, short = 'w')]
    /// match only whole words (using non-word characters as boundaries).
    pub word_regexp: bool,

    #[argh(switch, short = 'i')]
    /// ignore case distinctions.
    pub ignore_case: bool,

    #[argh(option, short = 'A')]
    /// print NUM lines of trailing context after matching lines.
    pub after_context: Option<usize>,
}

/// Decides which lines `grep` prints while lines arrive one by one.
///
/// A match opens a group of `1 + after_context` lines; a later match inside the group
/// extends it. When trailing context is requested, groups that are not adjacent are
/// separated by `--`.
struct GrepPrinter {
    after_context: Option<usize>,
    remaining_in_group: usize,
    previous_printed: bool,
    found: bool,
}

impl GrepPrinter {
    fn new(after_context: Option<usize>) -> Self {
        Self {
            after_context,
            remaining_in_group: 0,
            previous_printed: false,
            found: false,
        }
    }

    fn process(
        &mut self,
        line: &str,
        matched: bool,
        file_name: Option<&str>,
        stdout: &mut dyn Write,
    ) -> io::Result<()> {
        if matched {
            self.remaining_in_group = self.after_context.unwrap_or(0) + 1;
        }
        if self.remaining_in_group == 0 {
            self.previous_printed = false;
            return Ok(());
        }
        self.remaining_in_group -= 1;

        if self.after_context.is_some() && self.found && !self.previous_printed {
            writeln!(stdout, "--")?;
        }
        match file_name {
            Some(name) => {
                let separator = if matched { ':' } else { '-' };
                writeln!(stdout, "{name}{separator}{line}")?;
            }
            None => writeln!(stdout, "{line}")?,
        }
        self.found = true;
        self.previous_printed = true;
        Ok(())
    }

    /// Groups never continue into the next file.
    fn file_ended(&mut self) {
        self.remaining_in_group = 0;
        self.previous_printed = false;
    }
}

impl Grep {
    fn build_regex(&self) -> Result<Regex> {
        let user_pattern = operand(&self.pattern);
        let pattern = if self.word_regexp {
            format!(r"\b(?:{})\b", user_pattern)
        } else {
            user_pattern.to_string()
        };
        RegexBuilder::new(&pattern)
            .case_insensitive(self.ignore_case)
            .build()
            .with_context(|| format!("grep: invalid regex pattern: {}", user_pattern))
    }
}

impl BuiltinCommand for Grep {
    fn name() -> &'static str {
        "grep"
    }

    const DASH_IS_OPERAND: bool = true;

    fn execute(
        self,
        stdin: &mut dyn Read,
        stdout: &mut dyn Write,
        env: &Environment,
    ) -> Result<ExitCode> {
        let re = self.build_regex()?;
        let mut printer = GrepPrinter::new(self.after_context);
        let files = stdin_if_empty(self.files);
        let print_names = files.len() >= 2;

        for_each_source("grep", &files, stdin, stdout, env, |name, input, stdout| {
            let file_name = print_names.then_some(name);
            let result = BufReader::new(input).lines().try_for_each(|line| {
                let line = line?;
                printer.process(&line, re.is_match(&line), file_name, stdout)
            });
            printer.file_ended();
            result
        })?;

        Ok(if printer.found { 0 } else { 1 })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::run_captured;
    use pretty_assertions::assert_eq;
    use rstest::rstest;
    use std::env as stdenv;
    use std::io::Cursor;
    use std::path::Path;
    use std::time::{SystemTime, UNIX_EPOCH};

    fn make_unique_temp_dir(label: &str) -> io::Result<PathBuf> {
        let mut p = stdenv::temp_dir();
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        p.push(format!("shell_test_{}_{}_{}", label, std::process::id(), nanos));
        fs::create_dir_all(&p)?;
        fs::canonicalize(p)
    }

    fn write_file(dir: &Path, name: &str, content: &str) {
        let mut f = File::create(dir.join(name)).expect("create file");
        write!(f, "{}", content).expect("write");
    }

    /// Run `T` the way the shell does: parse arguments, start it and collect its output.
    fn run<T: BuiltinCommand>(args: &[&str], input: &[u8], env: &Environment) -> (ExitCode, String) {
        let args: Vec<String> = args.iter().map(|a| a.to_string()).collect();
        let mut runnable = Factory::<T>::default().create(T::name(), &args, env);
        let (code, out) = run_captured(runnable.as_mut(), input).unwrap();
        (code, String::from_utf8(out).unwrap())
    }

    #[test]
    fn test_pwd_prints_current_dir() {
        let env = Environment::new("/some/dir");
        let mut out = Vec::new();
        let res = Pwd {}.execute(&mut Cursor::new(Vec::new()), &mut out, &env);

        assert_eq!(res.unwrap(), 0);
        assert_eq!(String::from_utf8(out).unwrap(), "/some/dir\n");
    }

    #[test]
    fn test_pwd_rejects_arguments() {
        let (code, out) = run::<Pwd>(&["extra"], b"", &Environment::new("/"));
        assert_eq!(code, 1);
        assert!(!out.is_empty());
    }

    #[test]
    fn test_echo_with_and_without_newline() {
        let env = Environment::new("/");

        // With newline
        let mut out1 = Vec::new();
        let echo1 = Echo {
            no_newline: false,
            args: vec!["hello".to_string(), "world".to_string()],
        };
        let res1 = echo1.execute(&mut Cursor::new(Vec::new()), &mut out1, &env);
        assert!(res1.is_ok());
        assert_eq!(String::from_utf8(out1).unwrap(), "hello world\n");

        // Without newline
        assert_eq!(run::<Echo>(&["-n", "foo", "bar"], b"", &env), (0, "foo bar".to_string()));
    }

    #[rstest]
    #[case(&["-5"], "-5\n")]
    #[case(&["-"], "-\n")]
    #[case(&["--help"], "--help\n")]
    #[case(&["a", "-n"], "a -n\n")]
    #[case(&["-n", "-n", "x"], "-n x")]
    #[case(&[], "\n")]
    fn test_echo_prints_dashed_arguments(#[case] args: &[&str], #[case] expected: &str) {
        assert_eq!(run::<Echo>(args, b"", &Environment::new("/")), (0, expected.to_string()));
    }

    #[test]
    fn test_help_is_printed_and_succeeds() {
        let (code, out) = run::<Grep>(&["--help"], b"", &Environment::new("/"));
        assert_eq!(code, 0);
        assert!(out.contains("Usage: grep"));
    }

    #[test]
    fn test_unknown_option_fails() {
        let (code, out) = run::<Grep>(&["--no-such-option", "x"], b"", &Environment::new("/"));
        assert_eq!(code, 1);
        assert!(out.ends_with('\n'));
    }

    #[test]
    fn test_cd_to_absolute_path() {
        let temp = make_unique_temp_dir("cd_abs").expect("failed to create temp dir");
        let orig = stdenv::current_dir().unwrap();
        let env = Environment::new("/");

        let cmd = Cd {
            target: Some(temp.to_string_lossy().to_string()),
        };
        let res = cmd.execute(&mut Cursor::new(Vec::new()), &mut Vec::new(), &env);

        assert_eq!(res.unwrap(), 0);
        assert_eq!(env.current_dir(), temp);
        // The shell process itself stays where it was.
        assert_eq!(stdenv::current_dir().unwrap(), orig);

        let _ = fs::remove_dir_all(&temp);
    }

    #[test]
    fn test_cd_relative_path() {
        let temp = make_unique_temp_dir("cd_rel").expect("failed to create temp dir");
        fs::create_dir(temp.join("inner")).unwrap();
        let env = Environment::new(&temp);

        assert_eq!(run::<Cd>(&["inner"], b"", &env).0, 0);
        assert_eq!(env.current_dir(), temp.join("inner"));
        assert_eq!(run::<Cd>(&[".."], b"", &env).0, 0);
        assert_eq!(env.current_dir(), temp);

        let _ = fs::remove_dir_all(&temp);
    }

    #[test]
    fn test_cd_to_home_when_none() {
        let temp = make_unique_temp_dir("cd_home").expect("failed to create temp dir");
        let env = Environment::new("/");
        env.set_var("HOME", temp.to_string_lossy().to_string());

        let res = Cd { target: None }.execute(&mut Cursor::new(Vec::new()), &mut Vec::new(), &env);

        assert!(res.is_ok());
        assert_eq!(env.current_dir(), temp);

        let _ = fs::remove_dir_all(&temp);
    }

    #[test]
    fn test_cd_nonexistent_path_errors() {
        let env = Environment::new("/");
        let name = format!("nonexistent_dir_for_shell_test_{}", std::process::id());

        let (code, out) = run::<Cd>(&[name.as_str()], b"", &env);

        assert_eq!(code, 1);
        assert!(out.starts_with("cd: "));
        assert_eq!(env.current_dir(), PathBuf::from("/"));
    }

    #[test]
    fn test_cd_to_file_errors() {
        let temp = make_unique_temp_dir("cd_file").expect("failed to create temp dir");
        write_file(&temp, "plain", "");
        let env = Environment::new(&temp);

        assert_eq!(run::<Cd>(&["plain"], b"", &env).0, 1);
        assert_eq!(env.current_dir(), temp);

        let _ = fs::remove_dir_all(&temp);
    }

    #[rstest]
    #[case(&[], 0)]
    #[case(&["3"], 3)]
    fn test_exit_requests_termination(#[case] args: &[&str], #[case] expected: ExitCode) {
        let env = Environment::new("/");
        assert!(!env.should_exit());
        assert_eq!(run::<Exit>(args, b"", &env), (expected, String::new()));
        assert!(env.should_exit());
    }

    #[test]
    fn test_assignment_sets_variable() {
        let env = Environment::new("/");
        let mut runnable = assignment("x", "ex", &env);
        let (code, out) = run_captured(runnable.as_mut(), b"").unwrap();
        assert_eq!(code, 0);
        assert!(out.is_empty());
        assert_eq!(env.get_var("x").as_deref(), Some("ex"));
    }

    #[test]
    fn test_cat_reads_file_relative_to_current_dir() {
        let temp = make_unique_temp_dir("cat").expect("failed to create temp dir");
        write_file(&temp, "data.txt", "hello\nworld\n");
        let env = Environment::new(&temp);

        assert_eq!(run::<Cat>(&["data.txt"], b"", &env), (0, "hello\nworld\n".to_string()));

        let _ = fs::remove_dir_all(&temp);
    }

    #[test]
    fn test_cat_reads_stdin_when_no_args() {
        let env = Environment::new("/");
        let cat = Cat { files: Vec::new() };
        let mut out = Vec::new();
        let res = cat.execute(&mut Cursor::new(b"from stdin\nline2\n".to_vec()), &mut out, &env);

        assert_eq!(res.unwrap(), 0);
        assert_eq!(String::from_utf8(out).unwrap(), "from stdin\nline2\n");
    }

    #[test]
    fn test_cat_dash_and_missing_file() {
        let temp = make_unique_temp_dir("cat_dash").expect("failed to create temp dir");
        write_file(&temp, "a", "file a\n");
        let env = Environment::new(&temp);

        let (code, out) = run::<Cat>(&["a", "-", "missing", "a"], b"stdin\n", &env);

        assert_eq!(code, 1);
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(&lines[..2], &["file a", "stdin"]);
        assert!(lines[2].starts_with("cat: missing: "));
        assert_eq!(lines[3], "file a");

        let _ = fs::remove_dir_all(&temp);
    }

    #[rstest]
    #[case(b"", Counts { lines: 0, words: 0, bytes: 0 })]
    #[case(b"a b c\n", Counts { lines: 1, words: 3, bytes: 6 })]
    #[case(b"one two\nthree", Counts { lines: 2, words: 3, bytes: 13 })]
    #[case(b"\n\n  \t\n", Counts { lines: 3, words: 0, bytes: 6 })]
    fn test_counts(#[case] data: &[u8], #[case] expected: Counts) {
        assert_eq!(Counts::of(data), expected);
    }

    #[test]
    fn test_wc_counts_stdin_when_no_args() {
        let env = Environment::new("/");
        let wc = Wc { files: Vec::new() };
        let mut out = Vec::new();
        let res = wc.execute(&mut Cursor::new(b"a b c\n".to_vec()), &mut out, &env);

        assert_eq!(res.unwrap(), 0);
        assert_eq!(String::from_utf8(out).unwrap(), "1 3 6\n");
    }

    #[test]
    fn test_wc_counts_file() {
        let temp = make_unique_temp_dir("wc").expect("failed to create temp dir");
        write_file(&temp, "data.txt", "one two\nthree\n");
        let env = Environment::new(&temp);

        assert_eq!(run::<Wc>(&["data.txt"], b"", &env), (0, "2 3 14 data.txt\n".to_string()));

        let _ = fs::remove_dir_all(&temp);
    }

    #[test]
    fn test_wc_multiple_files_prints_total() {
        let temp = make_unique_temp_dir("wc_multi").expect("failed to create temp dir");
        write_file(&temp, "first", "a b\n");
        write_file(&temp, "second", "c\n");
        let env = Environment::new(&temp);

        let (code, out) = run::<Wc>(&["first", "second", "-"], b"x y z", &env);

        assert_eq!(code, 0);
        assert_eq!(out, "1 2 4 first\n1 1 2 second\n1 3 5 -\n3 6 11 total\n");

        let _ = fs::remove_dir_all(&temp);
    }

    #[test]
    fn test_dash_alone_reads_stdin() {
        let env = Environment::new("/");
        assert_eq!(run::<Cat>(&["-"], b"piped\n", &env), (0, "piped\n".to_string()));
        assert_eq!(run::<Wc>(&["-"], b"a b\n", &env), (0, "1 2 4 -\n".to_string()));
        assert_eq!(run::<Grep>(&["b", "-"], b"a\nb\n", &env), (0, "b\n".to_string()));
        assert_eq!(run::<Grep>(&["-i", "B", "-"], b"a\nb\n", &env), (0, "b\n".to_string()));
    }

    #[test]
    fn test_dash_first_then_file() {
        let temp = make_unique_temp_dir("dash_first").expect("failed to create temp dir");
        write_file(&temp, "a", "file a\n");
        let env = Environment::new(&temp);

        assert_eq!(run::<Cat>(&["-", "a"], b"stdin\n", &env), (0, "stdin\nfile a\n".to_string()));
        assert_eq!(
            run::<Wc>(&["-", "a"], b"x\n", &env),
            (0, "1 1 2 -\n1 2 7 a\n2 3 9 total\n".to_string())
        );
        assert_eq!(
            run::<Grep>(&["-", "-", "a"], b"x-y\nz\n", &env),
            (0, "-:x-y\n".to_string())
        );

        let _ = fs::remove_dir_all(&temp);
    }

    #[test]
    fn test_dash_is_still_an_error_for_other_commands() {
        let (code, out) = run::<Cd>(&["-"], b"", &Environment::new("/"));
        assert_eq!(code, 1);
        assert!(out.starts_with("Unrecognized argument"));
    }

    fn grep(args: &[&str], input: &str) -> (ExitCode, String) {
        run::<Grep>(args, input.as_bytes(), &Environment::new("/"))
    }

    #[test]
    fn test_grep_stdin_pipe() {
        let (code, out) = grep(&["pipe"], "Line 1\nLine with pipe target\nLine 3\n");
        assert_eq!(code, 0);
        assert_eq!(out, "Line with pipe target\n");
    }

    #[test]
    fn test_grep_no_match_fails() {
        assert_eq!(grep(&["absent"], "Line 1\nLine 2\n"), (1, String::new()));
    }

    #[rstest]
    #[case(&["target"], "")]
    #[case(&["-i", "target"], "Target 1\nTaRgEt 2\n")]
    #[case(&["-w", "Tar"], "")]
    #[case(&["-w", "-i", "target"], "Target 1\nTaRgEt 2\n")]
    #[case(&["-w", "No"], "No match\n")]
    #[case(&["^T.*[0-9]$"], "Target 1\nTaRgEt 2\n")]
    fn test_grep_options(#[case] args: &[&str], #[case] expected: &str) {
        let (_, out) = grep(args, "Target 1\nTaRgEt 2\nNo match\n");
        assert_eq!(out, expected);
    }

    #[test]
    fn test_grep_trailing_context_a_1() {
        let content = "Line 1\nMATCH 1\nLine 3\nLine 4\nMATCH 2\nLine 6\nLine 7\nLine 8\n";
        let (code, out) = grep(&["-A", "1", "MATCH"], content);
        assert_eq!(code, 0);
        assert_eq!(out, "MATCH 1\nLine 3\n--\nMATCH 2\nLine 6\n");
    }

    #[test]
    fn test_grep_context_overlap_a_2() {
        let content = "MATCH 1\nLine 2\nMATCH 2\nLine 4\nLine 5\nLine 6\n";
        let (_, out) = grep(&["-A", "2", "MATCH"], content);
        assert_eq!(out, "MATCH 1\nLine 2\nMATCH 2\nLine 4\nLine 5\n");
    }

    #[test]
    fn test_grep_adjacent_groups_have_no_separator() {
        let (_, out) = grep(&["-A", "1", "m"], "m1\nc1\nm2\nc2\nx\n");
        assert_eq!(out, "m1\nc1\nm2\nc2\n");
        let (_, out) = grep(&["-A", "0", "m"], "m1\nx\nm2\n");
        assert_eq!(out, "m1\n--\nm2\n");
    }

    #[test]
    fn test_grep_multiple_files_prefixes_lines() -> Result<()> {
        let temp = make_unique_temp_dir("grep_multi")?;
        write_file(&temp, "a", "x\nMATCH a\nafter a\n");
        write_file(&temp, "b", "MATCH b\n");
        let env = Environment::new(&temp);

        let (code, out) = run::<Grep>(&["-A", "1", "MATCH", "a", "b", "missing"], b"", &env);

        assert_eq!(code, 0);
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(&lines[..4], &["a:MATCH a", "a-after a", "--", "b:MATCH b"]);
        assert!(lines[4].starts_with("grep: missing: "));

        fs::remove_dir_all(temp)?;
        Ok(())
    }

    #[test]
    fn test_grep_invalid_pattern() {
        let (code, out) = grep(&["(unclosed"], "text\n");
        assert_eq!(code, 1);
        assert!(out.starts_with("grep: invalid regex pattern: (unclosed"));
    }
}
