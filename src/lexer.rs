//! Quote-aware lexical analysis of a single command line.
//!
//! Lexing happens in two steps. [`process_quotes`] walks the raw line and tags every
//! character with the quoting context it was found in, then [`tokenize`] splits the
//! tagged characters into shell words. Keeping the tags around lets later stages tell
//! a literal `|` (quoted or escaped) apart from the pipe operator.

use thiserror::Error;

/// Quoting context of a single character.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Quotation {
    /// Plain character outside of any quotes.
    Unquoted,
    /// The quote mark or backslash itself. Structural only, never part of a word.
    Quoter,
    /// Character inside `"..."`.
    DoubleQuoted,
    /// Character inside `'...'` or escaped with a backslash.
    SingleQuoted,
}

impl Quotation {
    fn by_quote_char(ch: char) -> Option<Self> {
        match ch {
            '"' => Some(Quotation::DoubleQuoted),
            '\'' => Some(Quotation::SingleQuoted),
            _ => None,
        }
    }
}

/// A character of the input line together with its quoting context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnnotatedChar {
    pub ch: char,
    pub quotation: Quotation,
    /// Index of the character in the line it was read from.
    pub position: usize,
}

impl AnnotatedChar {
    pub fn new(ch: char, quotation: Quotation, position: usize) -> Self {
        Self {
            ch,
            quotation,
            position,
        }
    }

    fn is_separator(&self) -> bool {
        self.quotation == Quotation::Unquoted && self.ch.is_whitespace()
    }

    fn is_pipe(&self) -> bool {
        self.quotation == Quotation::Unquoted && self.ch == '|'
    }
}

/// A shell word produced by [`tokenize`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub text: String,
    /// Whether the very first character of the word was quoted or escaped.
    /// Such a token is never treated as the pipe operator.
    pub started_quoted: bool,
}

impl Token {
    pub fn new(text: impl Into<String>, started_quoted: bool) -> Self {
        Self {
            text: text.into(),
            started_quoted,
        }
    }

    /// Returns true if this token separates two commands of a pipeline.
    pub fn is_pipe_operator(&self) -> bool {
        !self.started_quoted && self.text == "|"
    }
}

/// Errors that can occur while processing quotes of the input line.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LexingError {
    /// A closing quote (single or double) was not found.
    #[error("unclosed quote at position {position}")]
    UnclosedQuote { position: usize },
    /// The line ends right after a backslash.
    #[error("unexpected end after backslash at position {position}")]
    UnexpectedEndAfterBackslash { position: usize },
}

struct QuotingFSM {
    input: Vec<char>,
    pos: usize,
    state: Quotation,
}

impl QuotingFSM {
    fn new(line: &str) -> Self {
        QuotingFSM {
            input: line.chars().collect(),
            pos: 0,
            state: Quotation::Unquoted,
        }
    }

    fn annotate(mut self) -> Result<Vec<AnnotatedChar>, LexingError> {
        let mut out = Vec::with_capacity(self.input.len());

        while let Some(ch) = self.read_char() {
            let position = self.pos - 1;
            if ch == '\\' && self.state != Quotation::SingleQuoted {
                self.handle_backslash(position, &mut out)?;
            } else if let Some(quote) = Quotation::by_quote_char(ch) {
                self.handle_quote(ch, quote, position, &mut out);
            } else {
                out.push(AnnotatedChar::new(ch, self.state, position));
            }
        }

        if self.state != Quotation::Unquoted {
            return Err(LexingError::UnclosedQuote { position: self.pos });
        }
        Ok(out)
    }

    fn read_char(&mut self) -> Option<char> {
        let ch = self.input.get(self.pos).copied();
        if ch.is_some() {
            self.pos += 1;
        }
        ch
    }

    /// An escaped character behaves as if it was put in single quotes.
    fn handle_backslash(
        &mut self,
        position: usize,
        out: &mut Vec<AnnotatedChar>,
    ) -> Result<(), LexingError> {
        out.push(AnnotatedChar::new('\\', Quotation::Quoter, position));
        let escaped = self
            .read_char()
            .ok_or(LexingError::UnexpectedEndAfterBackslash { position: self.pos })?;
        out.push(AnnotatedChar::new(
            escaped,
            Quotation::SingleQuoted,
            position + 1,
        ));
        Ok(())
    }

    fn handle_quote(
        &mut self,
        ch: char,
        quote: Quotation,
        position: usize,
        out: &mut Vec<AnnotatedChar>,
    ) {
        match self.state {
            Quotation::Unquoted => {
                self.state = quote;
                out.push(AnnotatedChar::new(ch, Quotation::Quoter, position));
            }
            current if current == quote => {
                self.state = Quotation::Unquoted;
                out.push(AnnotatedChar::new(ch, Quotation::Quoter, position));
            }
            // The other kind of quote is a literal inside quotes.
            current => out.push(AnnotatedChar::new(ch, current, position)),
        }
    }
}

/// Annotates every character of `line` with its quoting context.
///
/// Backslash escapes the next character (except inside single quotes), single and
/// double quotes open and close quoted regions. The quote marks and backslashes are
/// kept in the output tagged as [`Quotation::Quoter`].
///
/// Fails if a quote is left open or the line ends with a lone backslash.
pub fn process_quotes(line: &str) -> Result<Vec<AnnotatedChar>, LexingError> {
    QuotingFSM::new(line).annotate()
}

/// Splits annotated characters into tokens.
///
/// Tokens are separated by unquoted whitespace. Every unquoted `|` forms a token
/// of its own. A quoted region always opens a token, so `""` yields an empty word.
pub fn tokenize(chars: &[AnnotatedChar]) -> Vec<Token> {
    let mut out = Vec::new();
    let mut current: Option<Token> = None;
    let mut previous: Option<&AnnotatedChar> = None;

    for c in chars {
        let boundary = previous.is_some_and(|p| {
            p.is_separator() || p.is_pipe() || c.is_separator() || c.is_pipe()
        });
        if boundary {
            out.extend(current.take());
        }

        if !c.is_separator() {
            let token = current
                .get_or_insert_with(|| Token::new("", c.quotation != Quotation::Unquoted));
            if c.quotation != Quotation::Quoter {
                token.text.push(c.ch);
            }
        }
        previous = Some(c);
    }

    out.extend(current);
    out
}
