//! Recursive descent parser for the query string.
//!
//! ## Grammar
//!
//! ```text
//! query    := or_expr EOF
//! or_expr  := and_expr (OR and_expr)*
//! and_expr := primary (AND? primary)*        adjacency is an implicit AND
//! primary  := '(' or_expr ')'                 -> Group
//!           | TERM ':' '(' or_expr ')'        -> Group, bare terms inside use TERM as field
//!           | TERM ':' range                  -> Range
//!           | TERM ':' value                  -> Field
//!           | value                           -> Field on the default field
//! range    := ('[' | '{') bound TO bound (']' | '}')
//! value    := TERM | QUOTED
//! ```
//!
//! Chains of the same junction are flattened into a single n-ary node, so
//! `a AND b AND c` yields one `And` with three children.
//!
//! ## Examples
//!
//! ```text
//! type:Person AND name:Bob
//! status:(Open OR Pending)
//! created:[2020-01-01 TO *]
//! owner:current AND priority:?
//! ```

use crate::ast::{AstBuilder, NodeId, NodeKind, QueryAst, ScalarValue, Term};
use crate::token::{Span, Token, TokenKind};
use thiserror::Error;

/// Deepest parenthesis nesting accepted before parsing gives up.
pub const MAX_NESTING: usize = 128;

#[derive(Debug, Clone, PartialEq, Error)]
#[error("{message}")]
pub struct ParseError {
    pub message: String,
    pub span: Option<Span>,
}

impl ParseError {
    fn new(message: String, span: Option<Span>) -> Self {
        Self { message, span }
    }

    fn at_position(message: String, span: Span) -> Self {
        Self { message, span: Some(span) }
    }
}

pub struct Parser<'a> {
    tokens: &'a [Token],
    position: usize,
    builder: AstBuilder,
    /// Open parentheses around the current position.
    depth: usize,
    /// Field applied to values written without a `field:` prefix.
    default_field: String,
}

impl<'a> Parser<'a> {
    pub fn new(tokens: &'a [Token], default_field: &str) -> Self {
        Self {
            tokens,
            position: 0,
            builder: AstBuilder::new(),
            depth: 0,
            default_field: default_field.to_string(),
        }
    }

    fn peek(&self) -> Option<&'a Token> {
        self.tokens.get(self.position)
    }

    fn peek_kind(&self) -> Option<&'a TokenKind> {
        self.peek().map(|t| &t.kind)
    }

    fn advance(&mut self) -> Option<&'a Token> {
        let token = self.tokens.get(self.position);
        if token.is_some() {
            self.position += 1;
        }
        token
    }

    /// Consumes a token of the expected kind or fails.
    fn expect(&mut self, expected: TokenKind) -> Result<&'a Token, ParseError> {
        match self.peek() {
            Some(token) if std::mem::discriminant(&token.kind) == std::mem::discriminant(&expected) => {
                self.position += 1;
                Ok(token)
            }
            Some(token) => Err(ParseError::at_position(
                format!("Expected {:?}, found {:?}", expected, token.kind),
                token.span,
            )),
            None => Err(ParseError::new(
                format!("Expected {:?}, but reached end of input", expected),
                None,
            )),
        }
    }

    fn match_token(&self, kind: &TokenKind) -> bool {
        self.peek_kind()
            .is_some_and(|k| std::mem::discriminant(k) == std::mem::discriminant(kind))
    }

    /// Whether the current token can begin a primary expression.
    fn starts_primary(&self) -> bool {
        matches!(
            self.peek_kind(),
            Some(TokenKind::LParen | TokenKind::Term(_) | TokenKind::Quoted(_))
        )
    }

    /// Parses the whole token stream into an arena.
    pub fn parse(mut self) -> Result<QueryAst, ParseError> {
        if self.tokens.is_empty() {
            return Err(ParseError::new("Empty query".to_string(), None));
        }
        let root = self.parse_or_expression()?;
        if let Some(token) = self.peek() {
            return Err(ParseError::at_position(
                format!("Unexpected token: {:?}", token.kind),
                token.span,
            ));
        }
        Ok(self.builder.finish(root))
    }

    /// `and_expr (OR and_expr)*`
    fn parse_or_expression(&mut self) -> Result<NodeId, ParseError> {
        let mut operands = vec![self.parse_and_expression()?];
        while self.match_token(&TokenKind::Or) {
            self.advance();
            operands.push(self.parse_and_expression()?);
        }
        Ok(self.junction(NodeKind::Or, operands))
    }

    /// `primary (AND? primary)*`
    fn parse_and_expression(&mut self) -> Result<NodeId, ParseError> {
        let mut operands = vec![self.parse_primary_expression()?];
        loop {
            if self.match_token(&TokenKind::And) {
                self.advance();
                operands.push(self.parse_primary_expression()?);
            } else if self.starts_primary() {
                operands.push(self.parse_primary_expression()?);
            } else {
                break;
            }
        }
        Ok(self.junction(NodeKind::And, operands))
    }

    fn junction(&mut self, kind: NodeKind, mut operands: Vec<NodeId>) -> NodeId {
        if operands.len() == 1 {
            operands.remove(0)
        } else {
            self.builder.branch(kind, operands)
        }
    }

    fn parse_primary_expression(&mut self) -> Result<NodeId, ParseError> {
        let Some(token) = self.advance() else {
            return Err(ParseError::new("Unexpected end of input".to_string(), None));
        };
        match &token.kind {
            TokenKind::LParen => self.parse_group(),
            TokenKind::Term(text) => {
                if self.match_token(&TokenKind::Colon) {
                    self.advance();
                    self.parse_field_value(text)
                } else {
                    let field = self.default_field.clone();
                    Ok(self.field_leaf(field, Term::bare(text)))
                }
            }
            TokenKind::Quoted(text) => {
                let field = self.default_field.clone();
                Ok(self.field_leaf(field, Term::quoted(text)))
            }
            TokenKind::Illegal(c) => Err(ParseError::at_position(
                format!("Illegal character '{c}'"),
                token.span,
            )),
            other => Err(ParseError::at_position(
                format!("Unexpected token: {other:?}"),
                token.span,
            )),
        }
    }

    /// The opening parenthesis has been consumed.
    fn parse_group(&mut self) -> Result<NodeId, ParseError> {
        if self.depth == MAX_NESTING {
            let span = self.position.checked_sub(1).and_then(|i| self.tokens.get(i)).map(|t| t.span);
            return Err(ParseError::new(
                format!("Query nests more than {MAX_NESTING} groups"),
                span,
            ));
        }
        self.depth += 1;
        let inner = self.parse_or_expression();
        self.depth -= 1;
        let inner = inner?;
        self.expect(TokenKind::RParen)?;
        Ok(self.builder.branch(NodeKind::Group, vec![inner]))
    }

    /// Parses what follows `field:`.
    fn parse_field_value(&mut self, field: &str) -> Result<NodeId, ParseError> {
        let Some(token) = self.advance() else {
            return Err(ParseError::new(
                format!("Expected a value for field '{field}', but reached end of input"),
                None,
            ));
        };
        match &token.kind {
            TokenKind::Term(text) => Ok(self.field_leaf(field.to_string(), Term::bare(text))),
            TokenKind::Quoted(text) => Ok(self.field_leaf(field.to_string(), Term::quoted(text))),
            TokenKind::LBracket | TokenKind::LBrace => {
                let lower_inclusive = matches!(token.kind, TokenKind::LBracket);
                self.parse_range(field, lower_inclusive)
            }
            TokenKind::LParen => {
                let outer = std::mem::replace(&mut self.default_field, field.to_string());
                let group = self.parse_group();
                self.default_field = outer;
                group
            }
            other => Err(ParseError::at_position(
                format!("Expected a value for field '{field}', found {other:?}"),
                token.span,
            )),
        }
    }

    /// The opening bracket has been consumed.
    fn parse_range(&mut self, field: &str, lower_inclusive: bool) -> Result<NodeId, ParseError> {
        let lower = self.parse_bound(field)?;
        self.expect(TokenKind::To)?;
        let upper = self.parse_bound(field)?;

        let upper_inclusive = match self.advance() {
            Some(Token { kind: TokenKind::RBracket, .. }) => true,
            Some(Token { kind: TokenKind::RBrace, .. }) => false,
            Some(token) => {
                return Err(ParseError::at_position(
                    format!("Expected ']' or '}}' to close range, found {:?}", token.kind),
                    token.span,
                ));
            }
            None => {
                return Err(ParseError::new("Unterminated range".to_string(), None));
            }
        };

        Ok(self.builder.branch(
            NodeKind::Range { field: field.to_string(), lower_inclusive, upper_inclusive },
            vec![lower, upper],
        ))
    }

    /// Range bounds keep their raw text; typing happens at compile time.
    fn parse_bound(&mut self, field: &str) -> Result<NodeId, ParseError> {
        let Some(token) = self.advance() else {
            return Err(ParseError::new("Expected range bound".to_string(), None));
        };
        let term = match &token.kind {
            TokenKind::Term(text) => Term { value: ScalarValue::String(text.clone()), quoted: false },
            TokenKind::Quoted(text) => Term::quoted(text),
            other => {
                return Err(ParseError::at_position(
                    format!("Expected range bound, found {other:?}"),
                    token.span,
                ));
            }
        };
        Ok(self.field_leaf(field.to_string(), term))
    }

    fn field_leaf(&mut self, field: String, term: Term) -> NodeId {
        self.builder.leaf(NodeKind::Field { field, term })
    }
}
