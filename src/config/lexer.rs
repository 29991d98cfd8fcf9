use std::iter::Peekable;
use std::str::Chars;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenKind {
    Word(String),
    LBrace,
    RBrace,
    Semicolon,
}

impl TokenKind {
    pub fn describe(&self) -> String {
        match self {
            TokenKind::Word(w) => format!("'{}'", w),
            TokenKind::LBrace => "'{'".to_string(),
            TokenKind::RBrace => "'}'".to_string(),
            TokenKind::Semicolon => "';'".to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Token {
    pub kind: TokenKind,
    pub line: usize,
}

pub struct Lexer<'a> {
    input: Peekable<Chars<'a>>,
    line: usize,
}

impl<'a> Lexer<'a> {
    pub fn new(input: &'a str) -> Self {
        Self {
            input: input.chars().peekable(),
            line: 1,
        }
    }

    fn advance(&mut self) {
        if let Some(c) = self.input.next() {
            if c == '\n' {
                self.line += 1;
            }
        }
    }

    fn skip_comment(&mut self) {
        while let Some(&c) = self.input.peek() {
            if c == '\n' {
                break;
            }
            self.advance();
        }
    }

    pub fn tokenize(&mut self) -> Vec<Token> {
        let mut tokens = Vec::new();

        while let Some(&c) = self.input.peek() {
            let line = self.line;
            match c {
                '#' => self.skip_comment(),
                '{' => {
                    tokens.push(Token { kind: TokenKind::LBrace, line });
                    self.advance();
                }
                '}' => {
                    tokens.push(Token { kind: TokenKind::RBrace, line });
                    self.advance();
                }
                ';' => {
                    tokens.push(Token { kind: TokenKind::Semicolon, line });
                    self.advance();
                }
                c if c.is_whitespace() => {
                    self.advance();
                }
                _ => {
                    let mut word = String::new();
                    while let Some(&n) = self.input.peek() {
                        if n.is_whitespace() || "{};#".contains(n) {
                            break;
                        }
                        word.push(n);
                        self.advance();
                    }
                    tokens.push(Token { kind: TokenKind::Word(word), line });
                }
            }
        }

        tokens
    }
}
