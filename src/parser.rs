//! From a command line to a ready-to-start [`Runnable`].
//!
//! [`LineParser`] performs quoting, variable substitution and tokenization; the
//! [`CommandParser`] splits the tokens into pipeline segments, turns each segment into a
//! command and splices the commands together.

use crate::builtin::assignment;
use crate::command::{CommandFactory, Runnable};
use crate::env::Environment;
use crate::external::ExternalProcess;
use crate::lexer::{AnnotatedChar, LexingError, Quotation, Token, process_quotes, tokenize};
use crate::pipe::PipedRunnable;
use std::collections::HashMap;
use thiserror::Error;
use tracing::debug;

/// Errors that can occur while turning a command line into a pipeline.
///
/// A line that fails to parse never starts any command.
#[derive(Debug, Error)]
pub enum ParsingError {
    #[error(transparent)]
    Lexing(#[from] LexingError),
    /// `$NAME` refers to a variable which is not set.
    #[error("undefined variable '{name}' at position {position}")]
    UndefinedVariable { name: String, position: usize },
    /// A pipeline segment without any word.
    #[error("no tokens")]
    NoTokens,
    /// The line contains no command at all.
    #[error("no commands found")]
    NoCommands,
    /// Segment `index` (0-based) of the pipeline could not be parsed.
    #[error("illegal command after pipe #{index}: {source}")]
    IllegalCommand {
        index: usize,
        #[source]
        source: Box<ParsingError>,
    },
}

fn is_shell_identifier_part(ch: char) -> bool {
    ch.is_alphanumeric() || ch == '_'
}

/// Only names made of identifier characters can be referenced with `$NAME`.
fn is_variable_name(name: &str) -> bool {
    !name.is_empty() && name.chars().all(is_shell_identifier_part)
}

/// Turns a raw line into tokens, substituting variables from the environment.
pub struct LineParser {
    env: Environment,
}

impl LineParser {
    pub fn new(env: Environment) -> Self {
        Self { env }
    }

    /// Replaces every `$NAME` that is not single-quoted (or escaped) with the value of the
    /// variable. Substituted values are inserted as-is and are not scanned again.
    ///
    /// Quote marks are kept in the result, so the text must be passed through
    /// [`process_quotes`] again before tokenizing.
    pub fn substitute(&self, chars: &[AnnotatedChar]) -> Result<String, ParsingError> {
        let mut result = String::with_capacity(chars.len());
        let mut pos = 0;
        while pos < chars.len() {
            let c = &chars[pos];
            pos += 1;
            if c.ch != '$' || c.quotation == Quotation::SingleQuoted {
                result.push(c.ch);
                continue;
            }

            let name: String = chars[pos..]
                .iter()
                .map(|next| next.ch)
                .take_while(|&ch| is_shell_identifier_part(ch))
                .collect();
            pos += name.chars().count();
            let value = self
                .env
                .get_var(&name)
                .ok_or(ParsingError::UndefinedVariable {
                    name,
                    position: c.position,
                })?;
            result.push_str(&value);
        }
        Ok(result)
    }

    /// Parses a line into words, performing one round of substitutions.
    pub fn parse(&self, line: &str) -> Result<Vec<Token>, ParsingError> {
        let substituted = self.substitute(&process_quotes(line)?)?;
        let tokens = tokenize(&process_quotes(&substituted)?);
        debug!(line, ?tokens, "parsed line");
        Ok(tokens)
    }
}

/// Splits tokens into pipeline segments on unquoted `|` tokens.
///
/// No tokens give no segments. Leading, trailing or consecutive pipes give empty
/// segments, which are rejected later by [`CommandParser::parse`].
pub fn split_by_pipes(tokens: &[Token]) -> Vec<Vec<String>> {
    if tokens.is_empty() {
        return Vec::new();
    }
    tokens
        .split(|token| token.is_pipe_operator())
        .map(|segment| segment.iter().map(|token| token.text.clone()).collect())
        .collect()
}

/// Turns words into commands.
///
/// Processing of a single segment is performed as follows:
/// 1. A single word containing `=` is a variable assignment.
/// 2. If a command is registered under the first word, its factory is called.
/// 3. Otherwise the words are an external process call.
pub struct CommandParser {
    env: Environment,
    commands: HashMap<String, Box<dyn CommandFactory>>,
}

impl CommandParser {
    /// Create a parser without any registered commands.
    pub fn new(env: Environment) -> Self {
        Self {
            env,
            commands: HashMap::new(),
        }
    }

    /// Register (or replace) the factory used for command `name`.
    pub fn add_command(&mut self, name: impl Into<String>, factory: impl CommandFactory + 'static) {
        self.commands.insert(name.into(), Box::new(factory));
    }

    pub fn construct_command(&self, name: &str, args: &[String]) -> Box<dyn Runnable> {
        match self.commands.get(name) {
            Some(factory) => factory.create(name, args, &self.env),
            None => Box::new(ExternalProcess::new(name, args.to_vec(), self.env.clone())),
        }
    }

    /// Parse a single pipeline segment.
    pub fn parse(&self, words: &[String]) -> Result<Box<dyn Runnable>, ParsingError> {
        let (command, args) = words.split_first().ok_or(ParsingError::NoTokens)?;
        if args.is_empty() {
            if let Some((name, value)) = command.split_once('=').filter(|(name, _)| is_variable_name(name)) {
                return Ok(assignment(name, value, &self.env));
            }
        }
        Ok(self.construct_command(command, args))
    }

    /// Build the whole pipeline described by `tokens`.
    pub fn build(&self, tokens: &[Token]) -> Result<Box<dyn Runnable>, ParsingError> {
        let mut stages = split_by_pipes(tokens)
            .iter()
            .enumerate()
            .map(|(index, words)| {
                self.parse(words)
                    .map_err(|e| ParsingError::IllegalCommand {
                        index,
                        source: Box::new(e),
                    })
            })
            .collect::<Result<Vec<_>, _>>()?
            .into_iter();

        let first = stages.next().ok_or(ParsingError::NoCommands)?;
        Ok(stages.fold(first, |piped, next| {
            Box::new(PipedRunnable::new(piped, next)) as Box<dyn Runnable>
        }))
    }
}
