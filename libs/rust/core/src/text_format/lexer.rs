//! Lexer for protobuf text format using Logos

use logos::Logos;
use std::fmt;

use super::error::{ParseError, ParseResult, Position};

#[derive(Logos, Debug, Clone, PartialEq)]
#[logos(skip r"[ \t\r\n\f]+")]
#[logos(skip r"#[^\n]*")]
pub enum Token {
    #[token("{")]
    LBrace,
    #[token("}")]
    RBrace,
    #[token("<")]
    LAngle,
    #[token(">")]
    RAngle,
    #[token("[")]
    LBracket,
    #[token("]")]
    RBracket,
    #[token(":")]
    Colon,
    #[token(",")]
    Comma,
    #[token(";")]
    Semicolon,
    #[token("-")]
    Minus,

    /// Decimal or hex digits, range-checked by the parser against the field type.
    #[regex(r"[0-9]+|0[xX][0-9a-fA-F]+", |lex| lex.slice().to_string())]
    Integer(String),

    #[regex(r"[0-9]+\.[0-9]*([eE][+-]?[0-9]+)?|[0-9]+[eE][+-]?[0-9]+|\.[0-9]+([eE][+-]?[0-9]+)?", |lex| lex.slice().to_string())]
    Float(String),

    /// Body of a quoted literal, escapes still encoded.
    #[regex(r#""([^"\\\n]|\\.)*""#, |lex| {
        let s = lex.slice();
        s[1..s.len()-1].to_string()
    })]
    #[regex(r#"'([^'\\\n]|\\.)*'"#, |lex| {
        let s = lex.slice();
        s[1..s.len()-1].to_string()
    })]
    String(String),

    #[regex(r"[a-zA-Z_][a-zA-Z0-9_]*", |lex| lex.slice().to_string())]
    Ident(String),

    Eof,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::LBrace => write!(f, "`{{`"),
            Token::RBrace => write!(f, "`}}`"),
            Token::LAngle => write!(f, "`<`"),
            Token::RAngle => write!(f, "`>`"),
            Token::LBracket => write!(f, "`[`"),
            Token::RBracket => write!(f, "`]`"),
            Token::Colon => write!(f, "`:`"),
            Token::Comma => write!(f, "`,`"),
            Token::Semicolon => write!(f, "`;`"),
            Token::Minus => write!(f, "`-`"),
            Token::Integer(s) | Token::Float(s) => write!(f, "`{}`", s),
            Token::String(s) => write!(f, "\"{}\"", s),
            Token::Ident(s) => write!(f, "`{}`", s),
            Token::Eof => write!(f, "end of input"),
        }
    }
}

/// Spanned token with position information
#[derive(Debug, Clone, PartialEq)]
pub struct SpannedToken {
    pub token: Token,
    pub start: usize,
    pub end: usize,
}

/// Lexer wrapper that produces spanned tokens, then `Eof` forever.
pub struct Lexer<'source> {
    source: &'source str,
    inner: logos::Lexer<'source, Token>,
}

impl<'source> Lexer<'source> {
    pub fn new(source: &'source str) -> Self {
        Self { source, inner: Token::lexer(source) }
    }

    pub fn next_token(&mut self) -> ParseResult<SpannedToken> {
        match self.inner.next() {
            Some(Ok(token)) => {
                let span = self.inner.span();
                Ok(SpannedToken { token, start: span.start, end: span.end })
            }
            Some(Err(())) => Err(ParseError::InvalidToken {
                position: Position::locate(self.source, self.inner.span().start),
                text: self.inner.slice().to_string(),
            }),
            None => {
                let pos = self.source.len();
                Ok(SpannedToken { token: Token::Eof, start: pos, end: pos })
            }
        }
    }
}

/// Tokenize a source string, stopping at the first error.
pub fn tokenize(source: &str) -> ParseResult<Vec<SpannedToken>> {
    let mut lexer = Lexer::new(source);
    let mut tokens = Vec::new();
    loop {
        let tok = lexer.next_token()?;
        let done = tok.token == Token::Eof;
        tokens.push(tok);
        if done { return Ok(tokens); }
    }
}
