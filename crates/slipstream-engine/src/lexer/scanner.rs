//! The scanner that produces tokens from source text.

use super::{Span, Token, TokenKind};

/// A scanner that tokenizes JavaScript source code.
pub struct Scanner<'a> {
    chars: std::iter::Peekable<std::str::CharIndices<'a>>,
    current_pos: usize,
}

impl<'a> Scanner<'a> {
    /// Creates a new scanner for the given source code.
    pub fn new(source: &'a str) -> Self {
        Self {
            chars: source.char_indices().peekable(),
            current_pos: 0,
        }
    }

    /// Returns the next token from the source.
    pub fn next_token(&mut self) -> Token {
        self.skip_whitespace_and_comments();

        let start = self.current_pos;

        let Some(ch) = self.advance() else {
            return Token::new(TokenKind::Eof, Span::new(start, start));
        };

        let kind = match ch {
            '{' => TokenKind::LeftBrace,
            '}' => TokenKind::RightBrace,
            '(' => TokenKind::LeftParen,
            ')' => TokenKind::RightParen,
            '[' => TokenKind::LeftBracket,
            ']' => TokenKind::RightBracket,
            ';' => TokenKind::Semicolon,
            ',' => TokenKind::Comma,
            ':' => TokenKind::Colon,
            '.' => TokenKind::Dot,
            '+' => TokenKind::Plus,
            '-' => TokenKind::Minus,
            '*' => TokenKind::Star,
            '/' => TokenKind::Slash,
            '%' => TokenKind::Percent,
            '=' => self.scan_equal(),
            '!' => self.scan_bang(),
            '<' => {
                if self.eat('=') {
                    TokenKind::LessEq
                } else {
                    TokenKind::Less
                }
            }
            '>' => {
                if self.eat('=') {
                    TokenKind::GreaterEq
                } else {
                    TokenKind::Greater
                }
            }
            '&' => {
                if self.eat('&') {
                    TokenKind::AmpAmp
                } else {
                    TokenKind::Unexpected('&')
                }
            }
            '|' => {
                if self.eat('|') {
                    TokenKind::PipePipe
                } else {
                    TokenKind::Unexpected('|')
                }
            }
            '"' | '\'' => self.scan_string(ch),
            '0'..='9' => self.scan_number(ch),
            c if unicode_xid::UnicodeXID::is_xid_start(c) || c == '_' || c == '$' => {
                self.scan_identifier(c)
            }
            c => TokenKind::Unexpected(c),
        };

        Token::new(kind, Span::new(start, self.current_pos))
    }

    fn advance(&mut self) -> Option<char> {
        let (pos, ch) = self.chars.next()?;
        self.current_pos = pos + ch.len_utf8();
        Some(ch)
    }

    fn peek(&mut self) -> Option<char> {
        self.chars.peek().map(|&(_, c)| c)
    }

    fn eat(&mut self, expected: char) -> bool {
        if self.peek() == Some(expected) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn skip_whitespace_and_comments(&mut self) {
        loop {
            match self.peek() {
                Some(c) if c.is_whitespace() => {
                    self.advance();
                }
                Some('/') => {
                    // Look ahead one more character without consuming the slash
                    let mut clone = self.chars.clone();
                    clone.next();
                    match clone.peek().map(|&(_, c)| c) {
                        Some('/') => {
                            while let Some(c) = self.peek() {
                                if c == '\n' {
                                    break;
                                }
                                self.advance();
                            }
                        }
                        Some('*') => {
                            self.advance();
                            self.advance();
                            let mut prev = '\0';
                            while let Some(c) = self.advance() {
                                if prev == '*' && c == '/' {
                                    break;
                                }
                                prev = c;
                            }
                        }
                        _ => break,
                    }
                }
                _ => break,
            }
        }
    }

    fn scan_equal(&mut self) -> TokenKind {
        if self.eat('=') {
            if self.eat('=') {
                TokenKind::StrictEq
            } else {
                TokenKind::Eq
            }
        } else {
            TokenKind::Assign
        }
    }

    fn scan_bang(&mut self) -> TokenKind {
        if self.eat('=') {
            if self.eat('=') {
                TokenKind::StrictNotEq
            } else {
                TokenKind::NotEq
            }
        } else {
            TokenKind::Bang
        }
    }

    fn scan_string(&mut self, quote: char) -> TokenKind {
        let mut value = String::new();
        loop {
            match self.advance() {
                None => return TokenKind::Unexpected(quote),
                Some(c) if c == quote => break,
                Some('\\') => match self.advance() {
                    Some('n') => value.push('\n'),
                    Some('t') => value.push('\t'),
                    Some('r') => value.push('\r'),
                    Some('0') => value.push('\0'),
                    Some(c) => value.push(c),
                    None => return TokenKind::Unexpected(quote),
                },
                Some(c) => value.push(c),
            }
        }
        TokenKind::String(value)
    }

    fn scan_number(&mut self, first: char) -> TokenKind {
        let mut text = String::new();
        text.push(first);
        while let Some(c) = self.peek() {
            if c.is_ascii_digit() || c == '.' {
                text.push(c);
                self.advance();
            } else {
                break;
            }
        }
        match text.parse::<f64>() {
            Ok(n) => TokenKind::Number(n),
            Err(_) => TokenKind::Unexpected(first),
        }
    }

    fn scan_identifier(&mut self, first: char) -> TokenKind {
        let mut name = String::new();
        name.push(first);
        while let Some(c) = self.peek() {
            if unicode_xid::UnicodeXID::is_xid_continue(c) || c == '$' {
                name.push(c);
                self.advance();
            } else {
                break;
            }
        }
        match name.as_str() {
            "const" => TokenKind::Const,
            "else" => TokenKind::Else,
            "false" => TokenKind::False,
            "function" => TokenKind::Function,
            "if" => TokenKind::If,
            "let" => TokenKind::Let,
            "null" => TokenKind::Null,
            "return" => TokenKind::Return,
            "true" => TokenKind::True,
            "typeof" => TokenKind::Typeof,
            "var" => TokenKind::Var,
            "while" => TokenKind::While,
            _ => TokenKind::Identifier(name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(src: &str) -> Vec<TokenKind> {
        let mut scanner = Scanner::new(src);
        let mut out = Vec::new();
        loop {
            let token = scanner.next_token();
            if token.kind == TokenKind::Eof {
                break;
            }
            out.push(token.kind);
        }
        out
    }

    #[test]
    fn test_scan_numbers_and_strings() {
        assert_eq!(
            kinds("42 'hi'"),
            vec![TokenKind::Number(42.0), TokenKind::String("hi".into())]
        );
        assert_eq!(kinds("3.5"), vec![TokenKind::Number(3.5)]);
    }

    #[test]
    fn test_scan_operators() {
        assert_eq!(
            kinds("== === != !== <="),
            vec![
                TokenKind::Eq,
                TokenKind::StrictEq,
                TokenKind::NotEq,
                TokenKind::StrictNotEq,
                TokenKind::LessEq,
            ]
        );
    }

    #[test]
    fn test_scan_keywords_and_identifiers() {
        assert_eq!(
            kinds("var foo function"),
            vec![
                TokenKind::Var,
                TokenKind::Identifier("foo".into()),
                TokenKind::Function,
            ]
        );
    }

    #[test]
    fn test_skip_comments() {
        assert_eq!(
            kinds("1 // line\n/* block */ 2"),
            vec![TokenKind::Number(1.0), TokenKind::Number(2.0)]
        );
    }

    #[test]
    fn test_string_escapes() {
        assert_eq!(
            kinds(r#""a\nb""#),
            vec![TokenKind::String("a\nb".into())]
        );
    }
}
