//! Query lexer

use std::iter::Peekable;
use std::str::CharIndices;

use crate::error::Error;

use super::token::{Token, TokenKind};

pub struct Lexer<'a> {
    chars: Peekable<CharIndices<'a>>,
}

impl<'a> Lexer<'a> {
    pub fn new(source: &'a str) -> Self {
        Self {
            chars: source.char_indices().peekable(),
        }
    }

    /// Tokenize the entire source, failing on the first unexpected
    /// character.
    pub fn tokenize(mut self) -> Result<Vec<Token>, Error> {
        let mut tokens = Vec::new();
        while let Some(&(offset, c)) = self.chars.peek() {
            match c {
                c if c.is_whitespace() => {
                    self.chars.next();
                }
                '|' => tokens.push(self.symbol(TokenKind::Union)),
                '&' => tokens.push(self.symbol(TokenKind::Intersection)),
                '-' => tokens.push(self.symbol(TokenKind::Difference)),
                '(' => tokens.push(self.symbol(TokenKind::LParen)),
                ')' => tokens.push(self.symbol(TokenKind::RParen)),
                '"' => tokens.push(self.quoted_ident(offset)?),
                c if is_ident_char(c) => tokens.push(self.bare_ident(offset)),
                c => {
                    return Err(Error::InvalidArgument(format!(
                        "unexpected character `{c}` at offset {offset}"
                    )));
                }
            }
        }
        Ok(tokens)
    }

    fn symbol(&mut self, kind: TokenKind) -> Token {
        let (offset, _) = self.chars.next().expect("peeked");
        Token { kind, offset }
    }

    fn bare_ident(&mut self, offset: usize) -> Token {
        let mut name = String::new();
        while let Some(&(_, c)) = self.chars.peek() {
            if !is_ident_char(c) {
                break;
            }
            name.push(c);
            self.chars.next();
        }
        Token {
            kind: TokenKind::Ident(name),
            offset,
        }
    }

    fn quoted_ident(&mut self, offset: usize) -> Result<Token, Error> {
        self.chars.next(); // opening quote
        let mut name = String::new();
        loop {
            match self.chars.next() {
                Some((_, '"')) => break,
                Some((_, '\\')) => match self.chars.next() {
                    Some((_, escaped)) => name.push(escaped),
                    None => {
                        return Err(Error::InvalidArgument(format!(
                            "unterminated quoted identifier at offset {offset}"
                        )));
                    }
                },
                Some((_, c)) => name.push(c),
                None => {
                    return Err(Error::InvalidArgument(format!(
                        "unterminated quoted identifier at offset {offset}"
                    )));
                }
            }
        }
        Ok(Token {
            kind: TokenKind::Ident(name),
            offset,
        })
    }
}

fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        Lexer::new(source)
            .tokenize()
            .unwrap()
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    #[test]
    fn test_symbols_and_idents() {
        assert_eq!(
            kinds("(A & b_2) - c3"),
            vec![
                TokenKind::LParen,
                TokenKind::Ident("A".into()),
                TokenKind::Intersection,
                TokenKind::Ident("b_2".into()),
                TokenKind::RParen,
                TokenKind::Difference,
                TokenKind::Ident("c3".into()),
            ]
        );
    }

    #[test]
    fn test_quoted_ident_allows_arbitrary_keys() {
        assert_eq!(
            kinds(r#""ad/slot-7" | plain"#),
            vec![
                TokenKind::Ident("ad/slot-7".into()),
                TokenKind::Union,
                TokenKind::Ident("plain".into()),
            ]
        );
    }

    #[test]
    fn test_quoted_ident_escapes() {
        assert_eq!(
            kinds(r#""quo\"ted""#),
            vec![TokenKind::Ident("quo\"ted".into())]
        );
    }

    #[test]
    fn test_unexpected_character() {
        assert!(Lexer::new("A ^ B").tokenize().is_err());
    }

    #[test]
    fn test_unterminated_quote() {
        assert!(Lexer::new("\"open").tokenize().is_err());
    }

    #[test]
    fn test_no_whitespace_needed() {
        assert_eq!(kinds("A&B|C"), kinds("A & B | C"));
    }
}
