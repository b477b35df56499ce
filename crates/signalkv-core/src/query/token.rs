//! Query tokens

use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenKind {
    /// A set name, bare or quoted.
    Ident(String),
    /// `|`
    Union,
    /// `&`
    Intersection,
    /// `-`
    Difference,
    LParen,
    RParen,
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenKind::Ident(name) => write!(f, "identifier `{name}`"),
            TokenKind::Union => write!(f, "`|`"),
            TokenKind::Intersection => write!(f, "`&`"),
            TokenKind::Difference => write!(f, "`-`"),
            TokenKind::LParen => write!(f, "`(`"),
            TokenKind::RParen => write!(f, "`)`"),
        }
    }
}

/// A token with its byte offset into the query text, for error reporting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub offset: usize,
}
