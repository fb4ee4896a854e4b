use super::token::{Kind, Token};
use super::LineNumber;

/// Scan a whole source text into tokens. The result always ends with a
/// single `Eof` token.
pub fn lex(source: &str) -> Vec<Token> {
    Lexer::lex(source)
}

fn is_ident_start(c: char) -> bool {
    c.is_ascii_alphabetic()
}

fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

struct Lexer<'a> {
    chars: std::iter::Peekable<std::str::Chars<'a>>,
    line: LineNumber,
}

impl<'a> Iterator for Lexer<'a> {
    type Item = Token;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let pk = *self.chars.peek()?;
            if pk == '\n' {
                self.chars.next();
                self.line += 1;
                continue;
            }
            if pk.is_whitespace() {
                self.chars.next();
                continue;
            }
            if pk == '{' {
                self.comment();
                continue;
            }
            if is_ident_start(pk) {
                return self.word();
            }
            if pk.is_ascii_digit() {
                return self.number();
            }
            if pk == '\'' {
                return self.string();
            }
            return self.minutia();
        }
    }
}

impl<'a> Lexer<'a> {
    fn lex(source: &str) -> Vec<Token> {
        let mut lexer = Lexer {
            chars: source.chars().peekable(),
            line: 1,
        };
        let mut tokens: Vec<Token> = lexer.by_ref().collect();
        let line = tokens.last().map(|t| t.line).unwrap_or(1);
        tokens.push(Token::new(Kind::Eof, line));
        tokens
    }

    fn comment(&mut self) {
        self.chars.next();
        while let Some(ch) = self.chars.next() {
            if ch == '\n' {
                self.line += 1;
            }
            if ch == '}' {
                break;
            }
        }
    }

    fn word(&mut self) -> Option<Token> {
        let mut s = String::new();
        while let Some(pk) = self.chars.peek() {
            if !is_ident_char(*pk) {
                break;
            }
            s.push(*pk);
            self.chars.next();
        }
        match Kind::from_keyword(&s) {
            Some(kind) => Some(Token::new(kind, self.line)),
            None => Some(Token::with_string(Kind::Identifier, self.line, s.into())),
        }
    }

    fn number(&mut self) -> Option<Token> {
        let mut s = String::new();
        let mut real = false;
        while let Some(pk) = self.chars.peek() {
            if pk.is_ascii_digit() {
                s.push(*pk);
                self.chars.next();
            } else if *pk == '.' && !real {
                // "1..5" is an integer, an ellipsis, and an integer
                let mut ahead = self.chars.clone();
                ahead.next();
                if ahead.peek() == Some(&'.') {
                    break;
                }
                real = true;
                s.push('.');
                self.chars.next();
            } else if *pk == 'e' || *pk == 'E' {
                real = true;
                s.push('e');
                self.chars.next();
                if let Some(sign) = self.chars.peek() {
                    if *sign == '+' || *sign == '-' {
                        s.push(*sign);
                        self.chars.next();
                    }
                }
            } else {
                break;
            }
        }
        if real {
            match s.parse::<f64>() {
                Ok(value) => Some(Token::real(self.line, value)),
                Err(_) => Some(Token::with_string(Kind::Unknown, self.line, s.into())),
            }
        } else {
            match s.parse::<i64>() {
                Ok(value) => Some(Token::integer(self.line, value)),
                Err(_) => Some(Token::with_string(Kind::Unknown, self.line, s.into())),
            }
        }
    }

    fn string(&mut self) -> Option<Token> {
        let mut s = String::new();
        self.chars.next();
        while let Some(ch) = self.chars.next() {
            if ch == '\n' {
                self.line += 1;
            }
            if ch == '\'' {
                if self.chars.peek() == Some(&'\'') {
                    self.chars.next();
                    s.push('\'');
                    continue;
                }
                break;
            }
            s.push(ch);
        }
        Some(Token::with_string(Kind::StringLit, self.line, s.into()))
    }

    fn minutia(&mut self) -> Option<Token> {
        let ch = self.chars.next()?;
        let kind = match ch {
            '+' => Kind::Add,
            '-' => Kind::Subtract,
            '*' => Kind::Multiply,
            '/' => Kind::Divide,
            '=' => Kind::EQU,
            '(' => Kind::OpenParen,
            ')' => Kind::CloseParen,
            '[' => Kind::OpenBrkt,
            ']' => Kind::CloseBrkt,
            '^' => Kind::Caret,
            ',' => Kind::Comma,
            ';' => Kind::SemiColon,
            '<' => match self.chars.peek() {
                Some('=') => {
                    self.chars.next();
                    Kind::LTE
                }
                Some('>') => {
                    self.chars.next();
                    Kind::NEQ
                }
                _ => Kind::LT,
            },
            '>' => match self.chars.peek() {
                Some('=') => {
                    self.chars.next();
                    Kind::GTE
                }
                _ => Kind::GT,
            },
            ':' => match self.chars.peek() {
                Some('=') => {
                    self.chars.next();
                    Kind::Assign
                }
                _ => Kind::Colon,
            },
            '.' => match self.chars.peek() {
                Some('.') => {
                    self.chars.next();
                    Kind::Ellipsis
                }
                _ => Kind::Period,
            },
            _ => {
                return Some(Token::with_string(
                    Kind::Unknown,
                    self.line,
                    ch.to_string().into(),
                ))
            }
        };
        Some(Token::new(kind, self.line))
    }
}

/// The compiler's view of the source: the current token plus single-token
/// advance. The stream parks on `Eof` once the input is exhausted.
pub struct TokenStream {
    tokens: Vec<Token>,
    index: usize,
}

impl TokenStream {
    pub fn new(source: &str) -> TokenStream {
        TokenStream {
            tokens: lex(source),
            index: 0,
        }
    }

    pub fn current(&self) -> &Token {
        &self.tokens[self.index]
    }

    pub fn next(&mut self) -> &Token {
        if self.index + 1 < self.tokens.len() {
            self.index += 1;
        }
        self.current()
    }
}
