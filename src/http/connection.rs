use std::io::{self, Read, Write};
use std::net::SocketAddr;
use std::time::Instant;

use mio::net::TcpStream;

use crate::config::{Config, LocationContext, ServerContext, DEFAULT_MAX_BODY_SIZE};
use crate::handlers::{self, RequestContext};
use crate::http::request::{
    decode_chunked, find_subsequence, Body, ChunkOutcome, HttpRequest, Method,
};
use crate::http::response::{error_response, should_keep_alive, HttpResponse};
use crate::prelude::{
    COMPACT_THRESHOLD, CLIENT_TIMEOUT, HTTP_HEADER_FIELDS_TOO_LARGE,
    HTTP_INTERNAL_SERVER_ERROR, HTTP_METHOD_NOT_ALLOWED, HTTP_PAYLOAD_TOO_LARGE, MAX_HEADER_SIZE,
    READ_BUF_SIZE,
};
use crate::router;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientState {
    Reading,
    Processing,
    Writing,
    Disconnected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderPhase {
    HeaderIncomplete,
    HeaderComplete,
    BodyReceiving,
    RequestComplete,
}

#[derive(Debug, Clone, Copy)]
pub struct Route {
    pub server: usize,
    pub location: Option<usize>,
}

/// One accepted client. Owns its buffers, the current request/response pair
/// and the two state enums driving the exchange.
///
/// The read buffer follows an offset-consume scheme: consumed bytes stay in
/// place behind `read_offset` and the prefix is only erased between
/// exchanges, so a `Body::View` into the buffer stays valid until the
/// response is fully written.
#[derive(Debug)]
pub struct HttpConnection {
    pub stream: TcpStream,
    pub port: u16,
    pub peer: Option<SocketAddr>,
    pub read_buf: Vec<u8>,
    pub read_offset: usize,
    pub write_buf: Vec<u8>,
    pub write_offset: usize,
    pub request: Option<HttpRequest>,
    pub response: Option<HttpResponse>,
    pub state: ClientState,
    pub header_phase: HeaderPhase,
    pub route: Option<Route>,
    pub close_after_write: bool,
    pub peer_closed: bool,
    pub last_activity: Instant,
    body_start: usize,
    body_limit: usize,
}

impl HttpConnection {
    pub fn new(stream: TcpStream, port: u16) -> Self {
        let peer = stream.peer_addr().ok();
        Self {
            stream,
            port,
            peer,
            read_buf: Vec::with_capacity(READ_BUF_SIZE),
            read_offset: 0,
            write_buf: Vec::new(),
            write_offset: 0,
            request: None,
            response: None,
            state: ClientState::Reading,
            header_phase: HeaderPhase::HeaderIncomplete,
            route: None,
            close_after_write: false,
            peer_closed: false,
            last_activity: Instant::now(),
            body_start: 0,
            body_limit: DEFAULT_MAX_BODY_SIZE,
        }
    }

    pub fn touch(&mut self) {
        self.last_activity = Instant::now();
    }

    /// A connection counts as idle only between requests; a body mid-receive
    /// is still making progress.
    pub fn is_idle(&self, now: Instant) -> bool {
        now.duration_since(self.last_activity) > CLIENT_TIMEOUT
            && self.header_phase != HeaderPhase::BodyReceiving
    }

    fn unread(&self) -> &[u8] {
        &self.read_buf[self.read_offset..]
    }

    /// Drain the socket into the read buffer. Returns true on EOF.
    pub fn read_data(&mut self) -> io::Result<bool> {
        let mut buf = [0u8; READ_BUF_SIZE];
        loop {
            match self.stream.read(&mut buf) {
                Ok(0) => return Ok(true),
                Ok(n) => self.read_buf.extend_from_slice(&buf[..n]),
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(false),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
    }

    /// Flush the write buffer. Returns true once everything is on the wire.
    pub fn write_data(&mut self) -> io::Result<bool> {
        while self.write_offset < self.write_buf.len() {
            match self.stream.write(&self.write_buf[self.write_offset..]) {
                Ok(0) => {
                    return Err(io::Error::new(io::ErrorKind::WriteZero, "peer closed"));
                }
                Ok(n) => self.write_offset += n,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(false),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(true)
    }

    /// Advance the request state machine as far as the buffered bytes allow.
    /// Leaves the connection either still Reading (needs more bytes) or
    /// Writing (a response is queued).
    pub fn process(&mut self, config: &Config) {
        if self.state != ClientState::Reading {
            return;
        }
        loop {
            let step = match self.header_phase {
                HeaderPhase::HeaderIncomplete => self.step_headers(),
                HeaderPhase::HeaderComplete => self.step_route(config),
                HeaderPhase::BodyReceiving => self.step_body(),
                HeaderPhase::RequestComplete => {
                    self.state = ClientState::Processing;
                    self.dispatch(config);
                    return;
                }
            };
            match step {
                Ok(true) => continue,
                Ok(false) => return,
                Err(status) => {
                    self.respond_error(status, config);
                    return;
                }
            }
        }
    }

    fn step_headers(&mut self) -> Result<bool, u16> {
        let unread = self.unread();
        match find_subsequence(unread, b"\r\n\r\n", 0) {
            None => {
                if unread.len() > MAX_HEADER_SIZE {
                    return Err(HTTP_HEADER_FIELDS_TOO_LARGE);
                }
                Ok(false)
            }
            Some(pos) => {
                if pos > MAX_HEADER_SIZE {
                    return Err(HTTP_HEADER_FIELDS_TOO_LARGE);
                }
                let request =
                    HttpRequest::parse_head(&unread[..pos]).map_err(|e| e.status())?;
                self.read_offset += pos + 4;
                self.body_start = self.read_offset;
                self.request = Some(request);
                self.header_phase = HeaderPhase::HeaderComplete;
                Ok(true)
            }
        }
    }

    fn step_route(&mut self, config: &Config) -> Result<bool, u16> {
        let Some(request) = self.request.as_ref() else {
            return Err(HTTP_INTERNAL_SERVER_ERROR);
        };

        let Some(server_idx) = router::find_server(config, self.port, request.hostname()) else {
            return Err(HTTP_INTERNAL_SERVER_ERROR);
        };
        let server = &config.http.servers[server_idx];
        let location_idx = router::find_location(server, request.path(), &request.method);
        self.route = Some(Route {
            server: server_idx,
            location: location_idx,
        });

        let location = location_idx.map(|i| &server.locations[i]);
        if let Some(limit) = location.and_then(|loc| loc.limit_except.as_ref()) {
            if !limit.permits(request.method.as_str()) {
                return Err(HTTP_METHOD_NOT_ALLOWED);
            }
        }

        self.body_limit = location
            .map(|loc| loc.max_body_size())
            .unwrap_or_else(|| server.max_body_size());

        // Reject an oversized Content-Length before buffering any of it.
        if !request.chunked && request.content_length > self.body_limit {
            return Err(HTTP_PAYLOAD_TOO_LARGE);
        }

        self.header_phase = if request.content_length == 0 && !request.chunked {
            HeaderPhase::RequestComplete
        } else {
            HeaderPhase::BodyReceiving
        };
        Ok(true)
    }

    fn step_body(&mut self) -> Result<bool, u16> {
        let chunked = match self.request.as_ref() {
            Some(request) => request.chunked,
            None => return Err(HTTP_INTERNAL_SERVER_ERROR),
        };

        if chunked {
            let outcome = decode_chunked(self.unread(), self.body_limit)
                .map_err(|e| e.status())?;
            match outcome {
                ChunkOutcome::Complete { decoded, consumed } => {
                    self.read_offset += consumed;
                    if let Some(request) = self.request.as_mut() {
                        request.body = Body::Owned(decoded);
                    }
                    self.header_phase = HeaderPhase::RequestComplete;
                    Ok(true)
                }
                ChunkOutcome::Incomplete => Ok(false),
            }
        } else {
            let content_length = self
                .request
                .as_ref()
                .map(|r| r.content_length)
                .unwrap_or(0);
            if self.read_buf.len() - self.read_offset >= content_length {
                if let Some(request) = self.request.as_mut() {
                    request.body = Body::View {
                        start: self.body_start,
                        len: content_length,
                    };
                }
                self.read_offset += content_length;
                self.header_phase = HeaderPhase::RequestComplete;
                Ok(true)
            } else {
                Ok(false)
            }
        }
    }

    fn dispatch(&mut self, config: &Config) {
        let response = match (self.request.as_ref(), self.route) {
            (Some(request), Some(route)) => {
                let server = &config.http.servers[route.server];
                let location = route.location.map(|i| &server.locations[i]);
                let ctx = RequestContext {
                    server,
                    location,
                    port: self.port,
                    peer: self.peer,
                };
                let body = request.body(&self.read_buf);
                handlers::dispatch(request, body, &ctx)
            }
            _ => {
                let (server, location) = self.route_refs(config);
                error_response(HTTP_INTERNAL_SERVER_ERROR, server, location)
            }
        };
        self.queue_response(response);
    }

    fn route_refs<'a>(
        &self,
        config: &'a Config,
    ) -> (Option<&'a ServerContext>, Option<&'a LocationContext>) {
        match self.route {
            Some(route) => {
                let server = &config.http.servers[route.server];
                (Some(server), route.location.map(|i| &server.locations[i]))
            }
            None => (None, None),
        }
    }

    fn respond_error(&mut self, status: u16, config: &Config) {
        let (server, location) = self.route_refs(config);
        let response = error_response(status, server, location);
        self.queue_response(response);
    }

    /// Serialize the response into the write buffer and flip to Writing.
    fn queue_response(&mut self, response: HttpResponse) {
        let (version, connection, head_only) = match self.request.as_ref() {
            Some(request) => (
                request.version.clone(),
                request.header("connection").map(str::to_string),
                request.method == Method::HEAD,
            ),
            None => ("HTTP/1.1".to_string(), None, false),
        };

        let keep_alive = should_keep_alive(&version, connection.as_deref(), response.status);
        self.write_buf = response.to_bytes(head_only, keep_alive);
        self.write_offset = 0;
        self.close_after_write = !keep_alive;
        self.response = Some(response);
        self.state = ClientState::Writing;
    }

    /// Keep-alive reset. Trailing bytes that already arrived for the next
    /// request stay in the buffer; the consumed prefix is compacted once it
    /// outgrows the threshold (no request view is alive at this point).
    pub fn reset_for_next(&mut self) {
        self.request = None;
        self.response = None;
        self.route = None;
        self.write_buf.clear();
        self.write_offset = 0;
        self.state = ClientState::Reading;
        self.header_phase = HeaderPhase::HeaderIncomplete;
        self.body_limit = DEFAULT_MAX_BODY_SIZE;
        self.body_start = 0;
        self.close_after_write = false;

        if self.read_offset == self.read_buf.len() {
            self.read_buf.clear();
            self.read_offset = 0;
        } else if self.read_offset > COMPACT_THRESHOLD {
            self.read_buf.drain(..self.read_offset);
            self.read_offset = 0;
        }
        self.touch();
    }

    pub fn response_pending(&self) -> bool {
        self.state == ClientState::Writing && self.write_offset < self.write_buf.len()
    }
}
