use std::collections::BTreeMap;

use thiserror::Error;

use crate::config::lexer::{Lexer, Token, TokenKind};
use crate::config::{
    Config, HttpContext, LimitExcept, Listen, LocationContext, ReturnDirective, ServerContext,
};

#[derive(Debug, Error, PartialEq, Eq)]
#[error("line {line}: {message}")]
pub struct ConfigError {
    pub line: usize,
    pub message: String,
}

impl ConfigError {
    fn new(line: usize, message: impl Into<String>) -> Self {
        ConfigError {
            line,
            message: message.into(),
        }
    }
}

pub type ParseResult<T> = Result<T, ConfigError>;

pub fn parse_str(input: &str) -> ParseResult<Config> {
    let tokens = Lexer::new(input).tokenize();
    ConfParser::new(tokens).parse()
}

const VALID_METHODS: [&str; 5] = ["GET", "HEAD", "POST", "PUT", "DELETE"];

pub struct ConfParser {
    tokens: Vec<Token>,
    cursor: usize,
}

impl ConfParser {
    pub fn new(tokens: Vec<Token>) -> Self {
        Self { tokens, cursor: 0 }
    }

    // ====== Token Access ======

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.cursor)
    }

    fn line(&self) -> usize {
        self.tokens
            .get(self.cursor)
            .or_else(|| self.tokens.last())
            .map(|t| t.line)
            .unwrap_or(1)
    }

    fn next_token(&mut self) -> Option<Token> {
        let t = self.tokens.get(self.cursor).cloned();
        if t.is_some() {
            self.cursor += 1;
        }
        t
    }

    fn peek_is_word(&self, expected: &str) -> bool {
        matches!(self.peek(), Some(Token { kind: TokenKind::Word(w), .. }) if w == expected)
    }

    // ====== Consumption & Validation ======

    fn expect_kind(&mut self, expected: TokenKind) -> ParseResult<()> {
        let line = self.line();
        match self.next_token() {
            Some(t) if t.kind == expected => Ok(()),
            Some(t) => Err(ConfigError::new(
                t.line,
                format!("expected {} but got {}", expected.describe(), t.kind.describe()),
            )),
            None => Err(ConfigError::new(
                line,
                format!("expected {} but reached end of file", expected.describe()),
            )),
        }
    }

    fn expect_word(&mut self, expected: &str) -> ParseResult<()> {
        let line = self.line();
        match self.next_token() {
            Some(Token { kind: TokenKind::Word(w), .. }) if w == expected => Ok(()),
            Some(t) => Err(ConfigError::new(
                t.line,
                format!("expected '{}' but got {}", expected, t.kind.describe()),
            )),
            None => Err(ConfigError::new(
                line,
                format!("expected '{}' but reached end of file", expected),
            )),
        }
    }

    /// Consume a word token used as a directive value.
    fn take_value(&mut self, directive: &str) -> ParseResult<(String, usize)> {
        let line = self.line();
        match self.next_token() {
            Some(Token { kind: TokenKind::Word(w), line }) => Ok((w, line)),
            Some(t) => Err(ConfigError::new(
                t.line,
                format!("'{}' directive requires a value", directive),
            )),
            None => Err(ConfigError::new(
                line,
                format!("'{}' directive requires a value", directive),
            )),
        }
    }

    fn check_unset<T>(slot: &Option<T>, directive: &str, line: usize) -> ParseResult<()> {
        if slot.is_some() {
            return Err(ConfigError::new(
                line,
                format!("duplicate '{}' directive", directive),
            ));
        }
        Ok(())
    }

    // ====== Grammar ======

    pub fn parse(&mut self) -> ParseResult<Config> {
        let mut http = None;

        while let Some(token) = self.peek().cloned() {
            match token.kind {
                TokenKind::Word(ref w) if w == "http" => {
                    if http.is_some() {
                        return Err(ConfigError::new(
                            token.line,
                            "duplicate 'http' block in configuration file",
                        ));
                    }
                    http = Some(self.parse_http_context()?);
                }
                kind => {
                    return Err(ConfigError::new(
                        token.line,
                        format!("unexpected {} outside 'http' block", kind.describe()),
                    ));
                }
            }
        }

        match http {
            Some(http) => Ok(Config { http }),
            None => Err(ConfigError::new(
                self.line(),
                "no 'http' block found in configuration file",
            )),
        }
    }

    fn parse_http_context(&mut self) -> ParseResult<HttpContext> {
        let mut ctx = HttpContext::default();

        self.expect_word("http")?;
        self.expect_kind(TokenKind::LBrace)?;

        loop {
            let (directive, line) = match self.peek() {
                Some(Token { kind: TokenKind::RBrace, .. }) => break,
                Some(Token { kind: TokenKind::Word(w), line }) => (w.clone(), *line),
                Some(t) => {
                    return Err(ConfigError::new(
                        t.line,
                        format!("expected directive but got {}", t.kind.describe()),
                    ))
                }
                None => {
                    return Err(ConfigError::new(self.line(), "unterminated 'http' block"))
                }
            };

            match directive.as_str() {
                "server" => ctx.servers.push(self.parse_server_context()?),
                "client_max_body_size" => {
                    Self::check_unset(&ctx.body_size, &directive, line)?;
                    ctx.body_size = Some(self.parse_body_size()?);
                }
                "root" => {
                    Self::check_unset(&ctx.root, &directive, line)?;
                    ctx.root = Some(self.parse_path_directive("root")?);
                }
                "index" => {
                    Self::check_unset(&ctx.index, &directive, line)?;
                    ctx.index = Some(self.parse_index()?);
                }
                "error_page" => self.parse_error_page(&mut ctx.error_pages)?,
                _ => {
                    return Err(ConfigError::new(
                        line,
                        format!("unknown directive '{}' in http context", directive),
                    ))
                }
            }
        }

        self.expect_kind(TokenKind::RBrace)?;
        Ok(ctx)
    }

    fn parse_server_context(&mut self) -> ParseResult<ServerContext> {
        let mut ctx = ServerContext::default();

        self.expect_word("server")?;
        self.expect_kind(TokenKind::LBrace)?;

        loop {
            let (directive, line) = match self.peek() {
                Some(Token { kind: TokenKind::RBrace, .. }) => break,
                Some(Token { kind: TokenKind::Word(w), line }) => (w.clone(), *line),
                Some(t) => {
                    return Err(ConfigError::new(
                        t.line,
                        format!("expected directive but got {}", t.kind.describe()),
                    ))
                }
                None => {
                    return Err(ConfigError::new(self.line(), "unterminated 'server' block"))
                }
            };

            match directive.as_str() {
                "location" => ctx.locations.push(self.parse_location_context()?),
                "listen" => ctx.listens.push(self.parse_listen()?),
                "server_name" => {
                    Self::check_unset(&ctx.server_name, &directive, line)?;
                    ctx.server_name = Some(self.parse_server_name()?);
                }
                "client_max_body_size" => {
                    Self::check_unset(&ctx.body_size, &directive, line)?;
                    ctx.body_size = Some(self.parse_body_size()?);
                }
                "return" => {
                    Self::check_unset(&ctx.ret, &directive, line)?;
                    ctx.ret = Some(self.parse_return()?);
                }
                "root" => {
                    Self::check_unset(&ctx.root, &directive, line)?;
                    ctx.root = Some(self.parse_path_directive("root")?);
                }
                "autoindex" => {
                    Self::check_unset(&ctx.autoindex, &directive, line)?;
                    ctx.autoindex = Some(self.parse_autoindex()?);
                }
                "index" => {
                    Self::check_unset(&ctx.index, &directive, line)?;
                    ctx.index = Some(self.parse_index()?);
                }
                "error_page" => self.parse_error_page(&mut ctx.error_pages)?,
                "limit_except" | "cgi_pass" | "alias" => {
                    return Err(ConfigError::new(
                        line,
                        format!("'{}' directive is only allowed in location context", directive),
                    ))
                }
                _ => {
                    return Err(ConfigError::new(
                        line,
                        format!("unknown directive '{}' in server context", directive),
                    ))
                }
            }
        }

        // A server with no listen entry still answers on 0.0.0.0:80.
        if ctx.listens.is_empty() {
            ctx.listens.push(Listen::parse("80", false));
        }

        self.expect_kind(TokenKind::RBrace)?;
        Ok(ctx)
    }

    fn parse_location_context(&mut self) -> ParseResult<LocationContext> {
        self.expect_word("location")?;
        let (path, _) = self.take_value("location")?;

        let mut ctx = LocationContext::new(&path);
        self.expect_kind(TokenKind::LBrace)?;

        loop {
            let (directive, line) = match self.peek() {
                Some(Token { kind: TokenKind::RBrace, .. }) => break,
                Some(Token { kind: TokenKind::Word(w), line }) => (w.clone(), *line),
                Some(t) => {
                    return Err(ConfigError::new(
                        t.line,
                        format!("expected directive but got {}", t.kind.describe()),
                    ))
                }
                None => {
                    return Err(ConfigError::new(self.line(), "unterminated 'location' block"))
                }
            };

            match directive.as_str() {
                "limit_except" => {
                    Self::check_unset(&ctx.limit_except, &directive, line)?;
                    ctx.limit_except = Some(self.parse_limit_except()?);
                }
                "return" => {
                    Self::check_unset(&ctx.ret, &directive, line)?;
                    ctx.ret = Some(self.parse_return()?);
                }
                "root" => {
                    Self::check_unset(&ctx.root, &directive, line)?;
                    ctx.root = Some(self.parse_path_directive("root")?);
                }
                "alias" => {
                    Self::check_unset(&ctx.alias, &directive, line)?;
                    ctx.alias = Some(self.parse_path_directive("alias")?);
                }
                "autoindex" => {
                    Self::check_unset(&ctx.autoindex, &directive, line)?;
                    ctx.autoindex = Some(self.parse_autoindex()?);
                }
                "index" => {
                    Self::check_unset(&ctx.index, &directive, line)?;
                    ctx.index = Some(self.parse_index()?);
                }
                "cgi_pass" => {
                    Self::check_unset(&ctx.cgi_pass, &directive, line)?;
                    ctx.cgi_pass = Some(self.parse_cgi_pass()?);
                }
                "client_max_body_size" => {
                    Self::check_unset(&ctx.body_size, &directive, line)?;
                    ctx.body_size = Some(self.parse_body_size()?);
                }
                "error_page" => self.parse_error_page(&mut ctx.error_pages)?,
                "listen" | "server_name" => {
                    return Err(ConfigError::new(
                        line,
                        format!("'{}' directive is only allowed in server context", directive),
                    ))
                }
                _ => {
                    return Err(ConfigError::new(
                        line,
                        format!("unknown directive '{}' in location context", directive),
                    ))
                }
            }
        }

        if ctx.root.is_some() && ctx.alias.is_some() {
            return Err(ConfigError::new(
                self.line(),
                "'root' and 'alias' cannot both be set in the same location",
            ));
        }

        self.expect_kind(TokenKind::RBrace)?;
        Ok(ctx)
    }

    // ====== Directive Values ======

    fn parse_body_size(&mut self) -> ParseResult<usize> {
        self.expect_word("client_max_body_size")?;
        let (value, line) = self.take_value("client_max_body_size")?;
        self.expect_kind(TokenKind::Semicolon)?;

        let (digits, multiplier) = match value.chars().last() {
            Some('k') | Some('K') => (&value[..value.len() - 1], 1024usize),
            Some('m') | Some('M') => (&value[..value.len() - 1], 1024 * 1024),
            Some('g') | Some('G') => (&value[..value.len() - 1], 1024 * 1024 * 1024),
            Some(c) if c.is_ascii_digit() => (value.as_str(), 1),
            _ => {
                return Err(ConfigError::new(
                    line,
                    format!("invalid body size format: {}", value),
                ))
            }
        };

        let number: usize = digits.parse().map_err(|_| {
            ConfigError::new(line, format!("invalid body size format: {}", value))
        })?;

        Ok(number * multiplier)
    }

    fn parse_listen(&mut self) -> ParseResult<Listen> {
        self.expect_word("listen")?;
        let (address, _) = self.take_value("listen")?;

        let mut default_server = false;
        if self.peek_is_word("default_server") {
            default_server = true;
            self.next_token();
        }

        self.expect_kind(TokenKind::Semicolon)?;
        Ok(Listen::parse(&address, default_server))
    }

    fn parse_server_name(&mut self) -> ParseResult<String> {
        self.expect_word("server_name")?;
        let (name, line) = self.take_value("server_name")?;

        if let Some(Token { kind: TokenKind::Word(extra), .. }) = self.peek() {
            return Err(ConfigError::new(
                line,
                format!("server_name accepts only one value, got: '{}'", extra),
            ));
        }

        self.expect_kind(TokenKind::Semicolon)?;
        Ok(name)
    }

    fn parse_return(&mut self) -> ParseResult<ReturnDirective> {
        self.expect_word("return")?;
        let (code_str, line) = self.take_value("return")?;
        let (url, _) = self.take_value("return")?;
        self.expect_kind(TokenKind::Semicolon)?;

        let code: u16 = code_str.parse().map_err(|_| {
            ConfigError::new(line, format!("invalid HTTP status code: {}", code_str))
        })?;
        if !(100..=599).contains(&code) {
            return Err(ConfigError::new(
                line,
                format!("invalid HTTP status code: {}", code_str),
            ));
        }

        Ok(ReturnDirective { code, url })
    }

    fn parse_path_directive(&mut self, directive: &str) -> ParseResult<String> {
        self.expect_word(directive)?;
        let (path, line) = self.take_value(directive)?;
        self.expect_kind(TokenKind::Semicolon)?;

        if !path.starts_with('/') {
            return Err(ConfigError::new(
                line,
                format!("{} path must be absolute, starting with '/'", directive),
            ));
        }

        Ok(path)
    }

    fn parse_autoindex(&mut self) -> ParseResult<bool> {
        self.expect_word("autoindex")?;
        let (value, line) = self.take_value("autoindex")?;
        self.expect_kind(TokenKind::Semicolon)?;

        match value.as_str() {
            "on" | "true" | "1" => Ok(true),
            "off" | "false" | "0" => Ok(false),
            _ => Err(ConfigError::new(
                line,
                "autoindex accepts only: on, off, true, false, 1, 0",
            )),
        }
    }

    fn parse_index(&mut self) -> ParseResult<String> {
        self.expect_word("index")?;
        let (filename, _) = self.take_value("index")?;
        self.expect_kind(TokenKind::Semicolon)?;
        Ok(filename)
    }

    fn parse_cgi_pass(&mut self) -> ParseResult<String> {
        self.expect_word("cgi_pass")?;
        let (target, _) = self.take_value("cgi_pass")?;
        self.expect_kind(TokenKind::Semicolon)?;
        Ok(target)
    }

    fn parse_error_page(&mut self, pages: &mut BTreeMap<u16, String>) -> ParseResult<()> {
        self.expect_word("error_page")?;

        let mut codes: Vec<u16> = Vec::new();
        let path;
        loop {
            let (value, line) = self.take_value("error_page")?;
            if value.bytes().all(|b| b.is_ascii_digit()) {
                let code: u16 = value.parse().map_err(|_| {
                    ConfigError::new(line, format!("invalid HTTP status code: {}", value))
                })?;
                if !(100..=599).contains(&code) {
                    return Err(ConfigError::new(
                        line,
                        format!("invalid HTTP status code: {} (must be 100-599)", value),
                    ));
                }
                codes.push(code);
            } else {
                if codes.is_empty() {
                    return Err(ConfigError::new(
                        line,
                        "error_page requires at least one status code",
                    ));
                }
                path = value;
                break;
            }
        }

        self.expect_kind(TokenKind::Semicolon)?;

        // Multiple error_page directives merge; the latest wins per code.
        for code in codes {
            pages.insert(code, path.clone());
        }
        Ok(())
    }

    fn parse_limit_except(&mut self) -> ParseResult<LimitExcept> {
        self.expect_word("limit_except")?;

        let mut limit = LimitExcept::default();
        loop {
            let (method, line) = match self.peek() {
                Some(Token { kind: TokenKind::LBrace, .. }) => break,
                Some(Token { kind: TokenKind::Word(w), line }) => (w.clone(), *line),
                Some(t) => {
                    return Err(ConfigError::new(
                        t.line,
                        format!("expected method or '{{' but got {}", t.kind.describe()),
                    ))
                }
                None => {
                    return Err(ConfigError::new(self.line(), "unterminated 'limit_except'"))
                }
            };
            if !VALID_METHODS.contains(&method.as_str()) {
                return Err(ConfigError::new(
                    line,
                    format!("expected '{{' after limit_except methods but got '{}'", method),
                ));
            }
            if !limit.allowed_methods.contains(&method) {
                limit.allowed_methods.push(method);
            }
            self.next_token();
        }

        self.expect_kind(TokenKind::LBrace)?;

        let mut deny_all = false;
        loop {
            let deny_line = match self.peek() {
                Some(Token { kind: TokenKind::RBrace, .. }) => break,
                Some(Token { kind: TokenKind::Word(w), line }) if w == "deny" => *line,
                Some(t) => {
                    return Err(ConfigError::new(
                        t.line,
                        format!("unknown directive {} in limit_except context", t.kind.describe()),
                    ))
                }
                None => {
                    return Err(ConfigError::new(self.line(), "unterminated 'limit_except'"))
                }
            };
            self.next_token();
            self.expect_word("all")
                .map_err(|_| ConfigError::new(deny_line, "expected 'all' after 'deny'"))?;
            self.expect_kind(TokenKind::Semicolon)?;
            deny_all = true;
        }

        self.expect_kind(TokenKind::RBrace)?;

        if !deny_all {
            return Err(ConfigError::new(
                self.line(),
                "limit_except block must contain 'deny all;'",
            ));
        }

        Ok(limit)
    }
}
