use thiserror::Error;

use crate::{
    environment::Environment,
    lexer::{snippet, Lexer, LexerError, Token},
    value::{consify, Value},
};

/// Errors produced while reading expressions.  Variants that can only be
/// caused by the input ending too early report themselves as incomplete,
/// so an interactive reader knows to ask for another line instead of
/// rejecting what it has.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("unexpected end of input")]
    Eof,

    #[error("unexpected right paren at {remainder:?}")]
    UnexpectedRightParen { remainder: String },

    #[error("unterminated list, end of input before `)`")]
    UnterminatedList,

    #[error("`.` is only valid before the final element of a list, at {remainder:?}")]
    UnexpectedDot { remainder: String },

    #[error("expected exactly one expression then `)` after `.`, at {remainder:?}")]
    BadDottedTail { remainder: String },

    #[error("unexpected trailing content: {remainder:?}")]
    TrailingContent { remainder: String },

    #[error(transparent)]
    Lexer(#[from] LexerError),
}

impl ParseError {
    /// True when the input so far is a valid prefix of an expression and
    /// reading more text could still succeed
    pub fn is_incomplete(&self) -> bool {
        matches!(
            self,
            ParseError::Eof
                | ParseError::UnterminatedList
                | ParseError::Lexer(LexerError::UnterminatedString)
        )
    }
}

/// State required to read expressions out of a source buffer
pub struct Reader<'a> {
    /// The token source for the buffer being read
    lexer: Lexer<'a>,

    /// The environment symbol names are interned into
    env: &'a mut Environment,
}

impl<'a> Reader<'a> {
    pub fn new(source: &'a str, env: &'a mut Environment) -> Self {
        Reader {
            lexer: Lexer::new(source),
            env,
        }
    }

    /// The source not yet consumed.  After parse_all this reports where
    /// reading stopped.
    pub fn rest(&self) -> &'a str {
        self.lexer.rest()
    }

    /// True when nothing except whitespace remains
    pub fn at_eof(&self) -> bool {
        self.rest().trim_start().is_empty()
    }

    /// Error unless nothing except whitespace remains.  A whole-file read
    /// only succeeded if the reader ends up here.
    pub fn expect_eof(&self) -> Result<(), ParseError> {
        if self.at_eof() {
            Ok(())
        } else {
            Err(ParseError::TrailingContent {
                remainder: snippet(self.rest()),
            })
        }
    }

    /// Parse a single expression
    pub fn parse_exp(&mut self) -> Result<Value, ParseError> {
        match self.lexer.next_token()? {
            Token::Eof => Err(ParseError::Eof),

            Token::LeftParen => self.parse_list(),

            Token::RightParen => Err(ParseError::UnexpectedRightParen {
                remainder: snippet(self.lexer.rest()),
            }),

            Token::Dot => Err(ParseError::UnexpectedDot {
                remainder: snippet(self.lexer.rest()),
            }),

            // reads as the symbol itself, not as a (quote x) wrapper
            Token::Quote => Ok(Value::Symbol(self.env.intern("quote"))),

            Token::Symbol(name) => Ok(Value::Symbol(self.env.intern(name))),
            Token::Integer(value) => Ok(Value::Integer(value)),
            Token::String(text) => Ok(Value::String(text.into())),
        }
    }

    /// Parse expressions until the end of input or a stray `)`, leaving
    /// the stopping point readable through [`Reader::rest`]
    pub fn parse_all(&mut self) -> Result<Vec<Value>, ParseError> {
        let mut exps = vec![];

        loop {
            match self.lexer.peek()? {
                Token::Eof | Token::RightParen => return Ok(exps),
                _ => exps.push(self.parse_exp()?),
            }
        }
    }

    /// Parses the elements of a list after its `(`.  A `.` after at least
    /// one element reads a single dotted tail, otherwise the chain ends
    /// in ().
    fn parse_list(&mut self) -> Result<Value, ParseError> {
        let mut elements = vec![];

        loop {
            match self.lexer.peek()? {
                Token::RightParen => {
                    self.lexer.next_token()?;
                    return Ok(consify(elements));
                }

                Token::Eof => return Err(ParseError::UnterminatedList),

                Token::Dot if !elements.is_empty() => {
                    self.lexer.next_token()?;
                    return self.parse_dotted_tail(elements);
                }

                _ => elements.push(self.parse_exp()?),
            }
        }
    }

    fn parse_dotted_tail(&mut self, elements: Vec<Value>) -> Result<Value, ParseError> {
        let tail = match self.lexer.peek()? {
            Token::Eof => return Err(ParseError::UnterminatedList),
            Token::RightParen | Token::Dot => {
                return Err(ParseError::BadDottedTail {
                    remainder: snippet(self.lexer.rest()),
                })
            }
            _ => self.parse_exp()?,
        };

        match self.lexer.next_token()? {
            Token::RightParen => {}
            Token::Eof => return Err(ParseError::UnterminatedList),
            _ => {
                return Err(ParseError::BadDottedTail {
                    remainder: snippet(self.lexer.rest()),
                })
            }
        }

        let mut list = tail;
        for element in elements.into_iter().rev() {
            list = Value::cons(element, list);
        }
        Ok(list)
    }
}
