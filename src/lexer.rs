//! Lexer for the Lucene-style query string.

use crate::token::{Span, Token, TokenKind};

pub struct Lexer<'a> {
    input: &'a str,
    /// Current byte offset into the input.
    position: usize,
}

impl<'a> Lexer<'a> {
    pub fn new(input: &'a str) -> Self {
        Lexer { input, position: 0 }
    }

    fn peek(&self) -> Option<char> {
        self.input[self.position..].chars().next()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek();
        if let Some(c) = c {
            self.position += c.len_utf8();
        }
        c
    }

    fn skip_whitespace(&mut self) {
        while let Some(c) = self.peek() {
            if c.is_whitespace() {
                self.bump();
            } else {
                break;
            }
        }
    }

    /// Reads a double-quoted string. The opening quote has already been consumed.
    /// A backslash escapes the next character; an unterminated string is illegal.
    fn read_quoted(&mut self, start: usize) -> Token {
        let mut content = String::new();
        loop {
            match self.bump() {
                Some('"') => {
                    return Token {
                        kind: TokenKind::Quoted(content),
                        span: Span::new(start, self.position),
                    };
                }
                Some('\\') => {
                    if let Some(escaped) = self.bump() {
                        content.push(escaped);
                    }
                }
                Some(c) => content.push(c),
                None => {
                    return Token {
                        kind: TokenKind::Illegal('"'),
                        span: Span::new(start, self.position),
                    };
                }
            }
        }
    }

    /// Reads a bare term. `first` is the already consumed first character.
    fn read_term(&mut self, start: usize, first: char) -> Token {
        let mut text = String::new();
        let mut escaped_any = false;
        let mut current = Some(first);
        while let Some(c) = current {
            if c == '\\' {
                escaped_any = true;
                if let Some(escaped) = self.bump() {
                    text.push(escaped);
                }
            } else {
                text.push(c);
            }
            current = match self.peek() {
                Some(next) if is_term_char(next) => self.bump(),
                _ => None,
            };
        }

        let kind = if escaped_any {
            TokenKind::Term(text)
        } else {
            match_keyword(text)
        };
        Token { kind, span: Span::new(start, self.position) }
    }
}

fn is_term_char(c: char) -> bool {
    !c.is_whitespace() && !matches!(c, '(' | ')' | '[' | ']' | '{' | '}' | ':' | '"')
}

/// Keywords are recognised in upper case only; the normalizer takes care of
/// lower case input.
fn match_keyword(s: String) -> TokenKind {
    match s.as_str() {
        "AND" => TokenKind::And,
        "OR" => TokenKind::Or,
        "TO" => TokenKind::To,
        _ => TokenKind::Term(s),
    }
}

impl Iterator for Lexer<'_> {
    type Item = Token;

    fn next(&mut self) -> Option<Self::Item> {
        self.skip_whitespace();
        let start = self.position;

        let c = self.bump()?;

        let punct = |kind| Token { kind, span: Span::new(start, start + c.len_utf8()) };
        let token = match c {
            '(' => punct(TokenKind::LParen),
            ')' => punct(TokenKind::RParen),
            '[' => punct(TokenKind::LBracket),
            ']' => punct(TokenKind::RBracket),
            '{' => punct(TokenKind::LBrace),
            '}' => punct(TokenKind::RBrace),
            ':' => punct(TokenKind::Colon),
            '"' => self.read_quoted(start),
            c => self.read_term(start, c),
        };
        Some(token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(input: &str) -> Vec<TokenKind> {
        Lexer::new(input).map(|t| t.kind).collect()
    }

    fn term(s: &str) -> TokenKind {
        TokenKind::Term(s.to_string())
    }

    #[test]
    fn test_simple_field() {
        assert_eq!(
            kinds("status:Open"),
            vec![term("status"), TokenKind::Colon, term("Open")]
        );
    }

    #[test]
    fn test_keywords_and_punctuation() {
        assert_eq!(
            kinds("( a AND b ) OR [ x TO y } { }"),
            vec![
                TokenKind::LParen,
                term("a"),
                TokenKind::And,
                term("b"),
                TokenKind::RParen,
                TokenKind::Or,
                TokenKind::LBracket,
                term("x"),
                TokenKind::To,
                term("y"),
                TokenKind::RBrace,
                TokenKind::LBrace,
                TokenKind::RBrace,
            ]
        );
    }

    #[test]
    fn test_lowercase_keywords_are_terms() {
        assert_eq!(kinds("and or to"), vec![term("and"), term("or"), term("to")]);
    }

    #[test]
    fn test_escaped_colon_stays_in_term() {
        assert_eq!(
            kinds(r"link:http\://example.org/a#b"),
            vec![term("link"), TokenKind::Colon, term("http://example.org/a#b")]
        );
    }

    #[test]
    fn test_escaped_keyword_is_a_term() {
        assert_eq!(kinds(r"\AND"), vec![term("AND")]);
    }

    #[test]
    fn test_quoted_string() {
        assert_eq!(
            kinds(r#"title:"hello \"world\"""#),
            vec![
                term("title"),
                TokenKind::Colon,
                TokenKind::Quoted(r#"hello "world""#.to_string()),
            ]
        );
    }

    #[test]
    fn test_unterminated_quote_is_illegal() {
        assert_eq!(kinds(r#""open"#), vec![TokenKind::Illegal('"')]);
    }

    #[test]
    fn test_spans() {
        let tokens: Vec<_> = Lexer::new("ab:cd").collect();
        assert_eq!(tokens[0].span, Span::new(0, 2));
        assert_eq!(tokens[1].span, Span::new(2, 3));
        assert_eq!(tokens[2].span, Span::new(3, 5));
    }
}
