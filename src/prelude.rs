pub use crate::config::{
    Config, HttpContext, Listen, LocationContext, ReturnDirective, ServerContext,
};
pub use crate::error::{Result, ServerError};
pub use crate::http::connection::{ClientState, HeaderPhase, HttpConnection};
pub use crate::http::request::{Body, HttpRequest, Method, ParseError};
pub use crate::http::response::{error_response, generate_autoindex, HeaderMap, HttpResponse};

pub use log::{debug, error, info, trace, warn};
pub use mio::{
    net::{TcpListener, TcpStream},
    Events, Interest, Poll, Token,
};
pub use std::collections::HashMap;
pub use std::io::{ErrorKind, Read, Write};
pub use std::net::SocketAddr;
pub use std::path::{Path, PathBuf};
pub use std::sync::Arc;
pub use std::time::{Duration, Instant};

pub const READ_BUF_SIZE: usize = 4096;
pub const MAX_HEADER_SIZE: usize = 8 * 1024;
pub const MAX_URI_LEN: usize = 2048;
pub const COMPACT_THRESHOLD: usize = 1024 * 1024;

pub const CLIENT_TIMEOUT: Duration = Duration::from_secs(30);
pub const CGI_TIMEOUT: Duration = Duration::from_secs(30);
pub const SESSION_CLEANUP_INTERVAL: Duration = Duration::from_secs(60);

pub const SERVER_SOFTWARE: &str = "webserv/1.0";

// 2xx / 3xx
pub const HTTP_OK: u16 = 200;
pub const HTTP_CREATED: u16 = 201;
pub const HTTP_MOVED_PERMANENTLY: u16 = 301;
pub const HTTP_FOUND: u16 = 302;

// 4xx Client Errors
pub const HTTP_BAD_REQUEST: u16 = 400;
pub const HTTP_FORBIDDEN: u16 = 403;
pub const HTTP_NOT_FOUND: u16 = 404;
pub const HTTP_METHOD_NOT_ALLOWED: u16 = 405;
pub const HTTP_PAYLOAD_TOO_LARGE: u16 = 413;
pub const HTTP_URI_TOO_LONG: u16 = 414;
pub const HTTP_HEADER_FIELDS_TOO_LARGE: u16 = 431;

// 5xx Server Errors
pub const HTTP_INTERNAL_SERVER_ERROR: u16 = 500;
pub const HTTP_NOT_IMPLEMENTED: u16 = 501;
pub const HTTP_BAD_GATEWAY: u16 = 502;
pub const HTTP_GATEWAY_TIMEOUT: u16 = 504;
pub const HTTP_VERSION_NOT_SUPPORTED: u16 = 505;
