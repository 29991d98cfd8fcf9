pub mod cascade;
pub mod lexer;
pub mod parser;

use std::collections::BTreeMap;
use std::path::Path;

use crate::error::Result;

pub const DEFAULT_MAX_BODY_SIZE: usize = 1_048_576; // 1M
pub const DEFAULT_LISTEN_PORT: u16 = 80;

/// One `listen` entry, already split into host and port.
///
/// Split rules: `host:port` on the first colon; a digits-only address is a
/// bare port on `0.0.0.0`; anything else is a host listening on port 80.
/// A port that fails to parse becomes 0 and is rejected at bind time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Listen {
    pub host: String,
    pub port: u16,
    pub default_server: bool,
}

impl Listen {
    pub fn parse(address: &str, default_server: bool) -> Self {
        if let Some((host, port)) = address.split_once(':') {
            Listen {
                host: host.to_string(),
                port: port.parse().unwrap_or(0),
                default_server,
            }
        } else if !address.is_empty() && address.bytes().all(|b| b.is_ascii_digit()) {
            Listen {
                host: "0.0.0.0".to_string(),
                port: address.parse().unwrap_or(0),
                default_server,
            }
        } else {
            Listen {
                host: address.to_string(),
                port: DEFAULT_LISTEN_PORT,
                default_server,
            }
        }
    }

    pub fn bind_host(&self) -> &str {
        if self.host.is_empty() {
            "0.0.0.0"
        } else {
            &self.host
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReturnDirective {
    pub code: u16,
    pub url: String,
}

/// `limit_except` whitelist. Any method outside `allowed_methods` is denied
/// (the block body must be exactly `deny all;`).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LimitExcept {
    pub allowed_methods: Vec<String>,
}

impl LimitExcept {
    pub fn permits(&self, method: &str) -> bool {
        self.allowed_methods.iter().any(|m| m == method)
    }
}

#[derive(Debug, Clone, Default)]
pub struct LocationContext {
    pub path: String,
    pub body_size: Option<usize>,
    pub limit_except: Option<LimitExcept>,
    pub ret: Option<ReturnDirective>,
    pub root: Option<String>,
    pub alias: Option<String>,
    pub autoindex: Option<bool>,
    pub index: Option<String>,
    pub cgi_pass: Option<String>,
    pub error_pages: BTreeMap<u16, String>,
}

impl LocationContext {
    pub fn new(path: &str) -> Self {
        LocationContext {
            path: path.to_string(),
            ..Default::default()
        }
    }

    pub fn max_body_size(&self) -> usize {
        self.body_size.unwrap_or(DEFAULT_MAX_BODY_SIZE)
    }
}

#[derive(Debug, Clone, Default)]
pub struct ServerContext {
    pub listens: Vec<Listen>,
    pub server_name: Option<String>,
    pub body_size: Option<usize>,
    pub ret: Option<ReturnDirective>,
    pub root: Option<String>,
    pub autoindex: Option<bool>,
    pub index: Option<String>,
    pub error_pages: BTreeMap<u16, String>,
    pub locations: Vec<LocationContext>,
}

impl ServerContext {
    pub fn listens_on(&self, port: u16) -> bool {
        self.listens.iter().any(|l| l.port == port)
    }

    pub fn max_body_size(&self) -> usize {
        self.body_size.unwrap_or(DEFAULT_MAX_BODY_SIZE)
    }
}

#[derive(Debug, Clone, Default)]
pub struct HttpContext {
    pub body_size: Option<usize>,
    pub root: Option<String>,
    pub index: Option<String>,
    pub error_pages: BTreeMap<u16, String>,
    pub servers: Vec<ServerContext>,
}

/// The configuration root. Built once at startup, cascaded, then shared
/// immutably behind an `Arc` for the lifetime of the process.
#[derive(Debug, Clone, Default)]
pub struct Config {
    pub http: HttpContext,
}

impl Config {
    pub fn from_str(input: &str) -> std::result::Result<Config, parser::ConfigError> {
        parser::parse_str(input)
    }

    pub fn from_file(path: &Path) -> Result<Config> {
        let content = std::fs::read_to_string(path)?;
        Ok(parser::parse_str(&content)?)
    }

    /// Parse and apply inheritance in one step.
    pub fn load(path: &Path) -> Result<Config> {
        let mut config = Config::from_file(path)?;
        cascade::apply(&mut config);
        Ok(config)
    }
}
