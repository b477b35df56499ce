//! Recursive-descent parser for set queries
//!
//! ```text
//! expr   := term (('|' | '-') term)*
//! term   := factor ('&' factor)*
//! factor := IDENT | '(' expr ')'
//! ```

use crate::error::Error;

use super::ast::Node;
use super::lexer::Lexer;
use super::token::{Token, TokenKind};

/// Parse a query into its AST. Any syntactic failure is
/// `Error::InvalidArgument`.
pub fn parse(query: &str) -> Result<Node, Error> {
    let tokens = Lexer::new(query).tokenize()?;
    let mut parser = Parser { tokens, pos: 0 };
    let node = parser.expr()?;
    match parser.peek() {
        None => Ok(node),
        Some(token) => Err(Error::InvalidArgument(format!(
            "unexpected {} at offset {}",
            token.kind, token.offset
        ))),
    }
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn expr(&mut self) -> Result<Node, Error> {
        let mut node = self.term()?;
        while let Some(token) = self.peek() {
            let op = match token.kind {
                TokenKind::Union => TokenKind::Union,
                TokenKind::Difference => TokenKind::Difference,
                _ => break,
            };
            self.advance();
            let right = self.term()?;
            node = match op {
                TokenKind::Union => Node::Union(Box::new(node), Box::new(right)),
                _ => Node::Difference(Box::new(node), Box::new(right)),
            };
        }
        Ok(node)
    }

    fn term(&mut self) -> Result<Node, Error> {
        let mut node = self.factor()?;
        while matches!(self.peek(), Some(t) if t.kind == TokenKind::Intersection) {
            self.advance();
            let right = self.factor()?;
            node = Node::Intersection(Box::new(node), Box::new(right));
        }
        Ok(node)
    }

    fn factor(&mut self) -> Result<Node, Error> {
        match self.advance() {
            Some(Token {
                kind: TokenKind::Ident(name),
                ..
            }) => Ok(Node::Value(name)),
            Some(Token {
                kind: TokenKind::LParen,
                offset,
            }) => {
                let node = self.expr()?;
                match self.advance() {
                    Some(Token {
                        kind: TokenKind::RParen,
                        ..
                    }) => Ok(node),
                    _ => Err(Error::InvalidArgument(format!(
                        "unclosed `(` at offset {offset}"
                    ))),
                }
            }
            Some(token) => Err(Error::InvalidArgument(format!(
                "expected identifier or `(`, found {} at offset {}",
                token.kind, token.offset
            ))),
            None => Err(Error::InvalidArgument(
                "unexpected end of query".to_string(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn value(name: &str) -> Box<Node> {
        Box::new(Node::Value(name.to_string()))
    }

    #[test]
    fn test_single_ident() {
        assert_eq!(parse("A").unwrap(), Node::Value("A".into()));
    }

    #[test]
    fn test_intersection_binds_tighter_than_union() {
        assert_eq!(
            parse("A | B & C").unwrap(),
            Node::Union(value("A"), Box::new(Node::Intersection(value("B"), value("C"))))
        );
    }

    #[test]
    fn test_union_and_difference_left_associative() {
        assert_eq!(
            parse("A - B | C").unwrap(),
            Node::Union(Box::new(Node::Difference(value("A"), value("B"))), value("C"))
        );
    }

    #[test]
    fn test_parens_override_precedence() {
        assert_eq!(
            parse("(A | B) & C").unwrap(),
            Node::Intersection(Box::new(Node::Union(value("A"), value("B"))), value("C"))
        );
    }

    #[test]
    fn test_keys_of_parsed_query() {
        let ast = parse("(A & B) - C").unwrap();
        assert_eq!(ast.keys(), ["A", "B", "C"].into_iter().collect());
    }

    #[test]
    fn test_parse_errors() {
        assert!(parse("").is_err());
        assert!(parse("A &").is_err());
        assert!(parse("| A").is_err());
        assert!(parse("(A | B").is_err());
        assert!(parse("A B").is_err());
        assert!(parse("A ) B").is_err());
    }
}
