use thiserror::Error;

/// Errors produced while scanning for a single token
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LexerError {
    #[error("could not find a token at {remainder:?}")]
    UnknownToken { remainder: String },

    #[error("integer literal out of range: {literal}")]
    IntegerOutOfRange { literal: String },

    #[error("string escape sequences are not implemented")]
    EscapeNotImplemented,

    #[error("unterminated string literal")]
    UnterminatedString,
}

/// Individual units of source code
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Token<'a> {
    LeftParen,
    RightParen,
    Quote,
    Dot,
    Symbol(&'a str),
    Integer(i64),
    String(&'a str),
    Eof,
}

/// Characters allowed to start a symbol
fn is_symbol_initial(c: char) -> bool {
    c.is_ascii_alphabetic()
        || matches!(
            c,
            '-' | '_' | '!' | '?' | '+' | '=' | '<' | '>' | '/' | '*' | '@' | '$' | '%' | '^' | '&'
        )
}

/// Characters allowed after the first character of a symbol
fn is_symbol_subsequent(c: char) -> bool {
    is_symbol_initial(c) || c.is_ascii_digit()
}

/// Clip the remaining source for inclusion in an error message
pub(crate) fn snippet(rest: &str) -> String {
    const MAX: usize = 60;

    if rest.len() <= MAX {
        rest.to_string()
    } else {
        let mut end = MAX;
        while !rest.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}...", &rest[..end])
    }
}

/// State used when scanning a string for tokens.  Cloning is cheap and is
/// how lookahead works.
#[derive(Debug, Clone)]
pub struct Lexer<'a> {
    /// The source text not yet consumed
    rest: &'a str,
}

impl<'a> Lexer<'a> {
    pub fn new(source: &'a str) -> Self {
        Self { rest: source }
    }

    /// The source not yet consumed, including leading whitespace
    pub fn rest(&self) -> &'a str {
        self.rest
    }

    /// Read the next token without consuming it
    pub fn peek(&self) -> Result<Token<'a>, LexerError> {
        self.clone().next_token()
    }

    /// Read and consume the next token
    pub fn next_token(&mut self) -> Result<Token<'a>, LexerError> {
        self.rest = self.rest.trim_start();

        let mut chars = self.rest.chars();
        let first = match chars.next() {
            Some(c) => c,
            None => return Ok(Token::Eof),
        };

        match first {
            '(' => Ok(self.single(Token::LeftParen)),
            ')' => Ok(self.single(Token::RightParen)),
            '\'' => Ok(self.single(Token::Quote)),
            '.' => Ok(self.single(Token::Dot)),
            '"' => self.string(),

            // a minus sign directly before a digit reads as a number, any
            // other minus starts a symbol
            '-' if matches!(chars.next(), Some(c) if c.is_ascii_digit()) => self.integer(),
            c if c.is_ascii_digit() => self.integer(),

            c if is_symbol_initial(c) => Ok(Token::Symbol(self.take_while(is_symbol_subsequent))),

            _ => Err(LexerError::UnknownToken {
                remainder: snippet(self.rest),
            }),
        }
    }

    /// Consume len bytes of input
    fn take(&mut self, len: usize) -> &'a str {
        let (tok, rest) = self.rest.split_at(len);
        self.rest = rest;
        tok
    }

    /// Consume a token that is exactly one byte long
    fn single(&mut self, tok: Token<'a>) -> Token<'a> {
        self.take(1);
        tok
    }

    /// Consume the longest prefix whose characters match the predicate
    fn take_while(&mut self, pred: impl Fn(char) -> bool) -> &'a str {
        let len = self
            .rest
            .find(|c: char| !pred(c))
            .unwrap_or_else(|| self.rest.len());
        self.take(len)
    }

    fn integer(&mut self) -> Result<Token<'a>, LexerError> {
        let sign = if self.rest.starts_with('-') { 1 } else { 0 };
        let digits = self.rest[sign..]
            .find(|c: char| !c.is_ascii_digit())
            .unwrap_or_else(|| self.rest.len() - sign);
        let literal = self.take(sign + digits);

        match literal.parse() {
            Ok(value) => Ok(Token::Integer(value)),
            Err(_) => Err(LexerError::IntegerOutOfRange {
                literal: literal.to_string(),
            }),
        }
    }

    /// Scan a string literal.  The only escape the grammar knows about is
    /// a backslash-quote pair and it is explicitly not implemented.
    fn string(&mut self) -> Result<Token<'a>, LexerError> {
        let body = &self.rest[1..];

        for (idx, c) in body.char_indices() {
            match c {
                '"' => {
                    let tok = Token::String(&body[..idx]);
                    self.take(idx + 2);
                    return Ok(tok);
                }
                '\\' if body[idx + 1..].starts_with('"') => {
                    return Err(LexerError::EscapeNotImplemented);
                }
                _ => {}
            }
        }

        Err(LexerError::UnterminatedString)
    }
}
