use std::borrow::Cow;
use std::fmt::Display;

use miette::{Diagnostic, Error, NamedSource, SourceSpan};
use thiserror::Error;
use tracing::trace;

use crate::parse::SyntaxError;

#[derive(Error, Debug, Diagnostic)]
#[error("invalid character '{token}'")]
#[diagnostic(help("remove or correct the character: `{token}`"))]
pub struct LexError {
    #[source_code]
    src: NamedSource<String>,

    #[label("this character")]
    bad_bit: SourceSpan,

    pub token: char,
}

#[derive(Error, Debug, Diagnostic)]
#[error("number literal out of range")]
#[diagnostic(help("numbers must fit in a signed 64-bit integer"))]
pub struct NumberLiteralError {
    #[source_code]
    src: NamedSource<String>,

    #[label("this numeric literal")]
    bad_bit: SourceSpan,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Token<'de> {
    pub kind: TokenKind,
    pub literal: &'de str,
    pub offset: usize,
}

impl Token<'_> {
    pub fn span(&self) -> SourceSpan {
        SourceSpan::from(self.offset..self.offset + self.literal.len())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Number(i64),
    Symbol(Symbol),
    EndOfLine,
}

/// Single-character operator and grouping symbols, in their canonical order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Symbol {
    Plus,
    Minus,
    Asterisk,
    Slash,
    LeftParenthesis,
    RightParenthesis,
}

impl Symbol {
    pub const ALL: [Symbol; 6] = [
        Symbol::Plus,
        Symbol::Minus,
        Symbol::Asterisk,
        Symbol::Slash,
        Symbol::LeftParenthesis,
        Symbol::RightParenthesis,
    ];

    pub fn from_char(c: char) -> Option<Symbol> {
        Symbol::ALL.into_iter().find(|symbol| symbol.as_char() == c)
    }

    pub fn as_char(self) -> char {
        match self {
            Symbol::Plus => '+',
            Symbol::Minus => '-',
            Symbol::Asterisk => '*',
            Symbol::Slash => '/',
            Symbol::LeftParenthesis => '(',
            Symbol::RightParenthesis => ')',
        }
    }
}

impl Display for Symbol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_char())
    }
}

impl Display for Token<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let lit = self.literal;
        match self.kind {
            TokenKind::Number(n) => write!(f, "NUMBER {lit} {n}"),
            TokenKind::Symbol(Symbol::Plus) => write!(f, "PLUS {lit} null"),
            TokenKind::Symbol(Symbol::Minus) => write!(f, "MINUS {lit} null"),
            TokenKind::Symbol(Symbol::Asterisk) => write!(f, "ASTERISK {lit} null"),
            TokenKind::Symbol(Symbol::Slash) => write!(f, "SLASH {lit} null"),
            TokenKind::Symbol(Symbol::LeftParenthesis) => write!(f, "LEFT_PAREN {lit} null"),
            TokenKind::Symbol(Symbol::RightParenthesis) => write!(f, "RIGHT_PAREN {lit} null"),
            TokenKind::EndOfLine => write!(f, "EOL  null"),
        }
    }
}

/// Lazy tokenizer over a single line.
///
/// Lexing stops at the first `'\n'` (or the end of the input) and yields one
/// [`TokenKind::EndOfLine`] before the iterator is exhausted. After an error
/// the rest of the line is dropped, so nothing further is produced.
pub struct Lexer<'de> {
    filename: Option<&'de str>,
    whole: &'de str,
    rest: &'de str,
    byte: usize,
    peeked: Option<Token<'de>>,
    done: bool,
}

impl<'de> Lexer<'de> {
    pub fn new(filename: Option<&'de str>, input: &'de str) -> Self {
        Lexer {
            filename,
            whole: input,
            rest: input,
            byte: 0,
            peeked: None,
            done: false,
        }
    }

    pub fn source(&self) -> NamedSource<String> {
        NamedSource::new(self.filename.unwrap_or("<input>"), self.whole.to_string())
    }

    /// Look at the current token without consuming it.
    ///
    /// Once the line is finished this keeps returning `EndOfLine`.
    pub fn peek(&mut self) -> Result<Token<'de>, Error> {
        if let Some(token) = self.peeked {
            return Ok(token);
        }
        let token = self.lex_token()?;
        self.peeked = Some(token);
        Ok(token)
    }

    /// Consume and return the current token.
    pub fn advance(&mut self) -> Result<Token<'de>, Error> {
        match self.peeked.take() {
            Some(token) => Ok(token),
            None => self.lex_token(),
        }
    }

    /// Consume the current token only if `accept` matches its kind.
    pub fn next_if(
        &mut self,
        accept: impl FnOnce(&TokenKind) -> bool,
    ) -> Result<Option<Token<'de>>, Error> {
        let token = self.peek()?;
        if accept(&token.kind) {
            self.peeked = None;
            Ok(Some(token))
        } else {
            Ok(None)
        }
    }

    pub fn expect(&mut self, expected: Symbol) -> Result<Token<'de>, Error> {
        let token = self.peek()?;
        if token.kind == TokenKind::Symbol(expected) {
            return self.advance();
        }
        Err(SyntaxError::build(self, &token, format!("use `{expected}` here instead")).into())
    }

    fn lex_token(&mut self) -> Result<Token<'de>, Error> {
        let token = self.scan()?;
        trace!(%token, offset = token.offset, "lexed");
        Ok(token)
    }

    fn scan(&mut self) -> Result<Token<'de>, Error> {
        loop {
            let offset = self.byte;
            let mut chars = self.rest.chars();
            let Some(c) = chars.next() else {
                return Ok(self.finish(offset, ""));
            };
            let literal = &self.rest[..c.len_utf8()];
            let cur = self.rest;
            self.rest = chars.as_str();
            self.byte += c.len_utf8();

            match c {
                ' ' | '\r' => continue,
                '\n' => return Ok(self.finish(offset, literal)),
                '0'..='9' => return self.number(cur, offset),
                c => {
                    if let Some(symbol) = Symbol::from_char(c) {
                        return Ok(Token {
                            kind: TokenKind::Symbol(symbol),
                            literal,
                            offset,
                        });
                    }
                    let error = LexError {
                        src: self.source(),
                        bad_bit: SourceSpan::from(offset..self.byte),
                        token: c,
                    };
                    self.drain();
                    return Err(error.into());
                }
            }
        }
    }

    fn number(&mut self, cur: &'de str, offset: usize) -> Result<Token<'de>, Error> {
        // carriage returns are dropped even inside a digit run
        let end = cur
            .find(|c: char| !(c.is_ascii_digit() || c == '\r'))
            .unwrap_or(cur.len());
        let literal = cur[..end].trim_end_matches('\r');
        let digits = if literal.contains('\r') {
            Cow::Owned(literal.replace('\r', ""))
        } else {
            Cow::Borrowed(literal)
        };

        // the first digit has already been consumed
        let extra_bytes = literal.len() - 1;
        self.byte += extra_bytes;
        self.rest = &self.rest[extra_bytes..];

        match digits.parse() {
            Ok(n) => Ok(Token {
                kind: TokenKind::Number(n),
                literal,
                offset,
            }),
            Err(_) => {
                let error = NumberLiteralError {
                    src: self.source(),
                    bad_bit: SourceSpan::from(offset..self.byte),
                };
                self.drain();
                Err(error.into())
            }
        }
    }

    fn finish(&mut self, offset: usize, literal: &'de str) -> Token<'de> {
        self.drain();
        Token {
            kind: TokenKind::EndOfLine,
            literal,
            offset,
        }
    }

    fn drain(&mut self) {
        self.byte += self.rest.len();
        self.rest = "";
        self.done = true;
    }
}

impl<'de> Iterator for Lexer<'de> {
    type Item = Result<Token<'de>, Error>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.peeked.is_none() && self.done {
            return None;
        }
        Some(self.advance())
    }
}
