//! Classic CGI gateway (RFC 3875 subset). The location's `cgi_pass` names
//! the interpreter; the resolved script path becomes its argument. The
//! exchange is driven to completion inside the dispatch step by a dedicated
//! bounded poll, so the outer event loop never blocks on an unbounded pipe.

use std::collections::HashMap;
use std::io::{ErrorKind, Read, Write};
use std::os::fd::OwnedFd;
use std::os::unix::net::UnixStream;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::time::{Duration, Instant};

use mio::{Events, Interest, Poll, Token};

use crate::config::LocationContext;
use crate::handlers::{path, RequestContext};
use crate::http::request::{find_subsequence, HttpRequest};
use crate::http::response::{error_response, HttpResponse};
use crate::prelude::{
    debug, warn, CGI_TIMEOUT, HTTP_BAD_GATEWAY, HTTP_FORBIDDEN, HTTP_GATEWAY_TIMEOUT,
    HTTP_NOT_FOUND, HTTP_OK,
};
use crate::utils::fs;

const CGI_OUT: Token = Token(0);
const CGI_IN: Token = Token(1);
const KILL_GRACE: Duration = Duration::from_millis(200);

#[derive(Debug)]
pub enum CgiOutcome {
    Complete(Vec<u8>),
    TimedOut(Vec<u8>),
    Failed,
}

pub fn handle(
    request: &HttpRequest,
    body: &[u8],
    ctx: &RequestContext,
    location: &LocationContext,
) -> HttpResponse {
    let Some(interpreter) = location.cgi_pass.as_deref() else {
        return error_response(HTTP_NOT_FOUND, Some(ctx.server), Some(location));
    };

    let uri = request.path();
    if !fs::is_path_secure(uri) {
        return error_response(HTTP_FORBIDDEN, Some(ctx.server), Some(location));
    }

    let Some((script, script_name, path_info)) = locate_script(location, uri) else {
        return error_response(HTTP_NOT_FOUND, Some(ctx.server), Some(location));
    };

    let env = build_cgi_env(request, body.len(), ctx, &script, &script_name, &path_info);

    match run(interpreter, &script, &env, body, CGI_TIMEOUT) {
        Ok(CgiOutcome::Complete(output)) => parse_output(&output).unwrap_or_else(|| {
            warn!("cgi produced unparseable output: {}", script.display());
            error_response(HTTP_BAD_GATEWAY, Some(ctx.server), Some(location))
        }),
        Ok(CgiOutcome::TimedOut(output)) => parse_output(&output).unwrap_or_else(|| {
            warn!("cgi timed out: {}", script.display());
            error_response(HTTP_GATEWAY_TIMEOUT, Some(ctx.server), Some(location))
        }),
        Ok(CgiOutcome::Failed) => {
            error_response(HTTP_BAD_GATEWAY, Some(ctx.server), Some(location))
        }
        Err(e) => {
            warn!("cgi spawn failed for {}: {}", script.display(), e);
            error_response(HTTP_BAD_GATEWAY, Some(ctx.server), Some(location))
        }
    }
}

/// Walk the URI segment by segment until the resolved path names a regular
/// file; that file is the script and the remaining suffix is PATH_INFO.
fn locate_script(location: &LocationContext, uri_path: &str) -> Option<(PathBuf, String, String)> {
    let mut end = 0usize;
    loop {
        let next = uri_path
            .get(end + 1..)
            .and_then(|rest| rest.find('/'))
            .map(|i| end + 1 + i);
        let seg_end = next.unwrap_or(uri_path.len());
        let prefix = &uri_path[..seg_end];

        if let Ok(candidate) = path::resolve(location, prefix) {
            if fs::exists(&candidate) && !fs::is_directory(&candidate) {
                return Some((
                    candidate,
                    prefix.to_string(),
                    uri_path[seg_end..].to_string(),
                ));
            }
        }

        end = next?;
    }
}

pub fn build_cgi_env(
    request: &HttpRequest,
    body_len: usize,
    ctx: &RequestContext,
    script: &Path,
    script_name: &str,
    path_info: &str,
) -> HashMap<String, String> {
    let mut env = HashMap::new();

    env.insert("GATEWAY_INTERFACE".to_string(), "CGI/1.1".to_string());
    env.insert("SERVER_PROTOCOL".to_string(), "HTTP/1.1".to_string());
    env.insert(
        "SERVER_NAME".to_string(),
        ctx.server
            .server_name
            .clone()
            .unwrap_or_else(|| "localhost".to_string()),
    );
    env.insert("SERVER_PORT".to_string(), ctx.port.to_string());
    env.insert("REQUEST_METHOD".to_string(), request.method.to_string());
    env.insert(
        "SCRIPT_FILENAME".to_string(),
        script.to_string_lossy().into_owned(),
    );
    env.insert("SCRIPT_NAME".to_string(), script_name.to_string());
    env.insert("PATH_INFO".to_string(), path_info.to_string());
    env.insert("QUERY_STRING".to_string(), request.query().to_string());
    env.insert("CONTENT_LENGTH".to_string(), body_len.to_string());
    if let Some(content_type) = request.header("content-type") {
        env.insert("CONTENT_TYPE".to_string(), content_type.to_string());
    }
    if let Some(peer) = ctx.peer {
        env.insert("REMOTE_ADDR".to_string(), peer.ip().to_string());
        env.insert("REMOTE_PORT".to_string(), peer.port().to_string());
    }

    for (name, value) in &request.headers {
        let key = format!("HTTP_{}", name.to_uppercase().replace('-', "_"));
        env.insert(key, value.clone());
    }

    env
}

/// Spawn the interpreter and pump the pipes until stdout EOF or the
/// deadline. Stdin is closed as soon as the body is exhausted so the child
/// sees EOF regardless of how it sequences its own reads and writes.
pub fn run(
    interpreter: &str,
    script: &Path,
    env: &HashMap<String, String>,
    body: &[u8],
    timeout: Duration,
) -> std::io::Result<CgiOutcome> {
    let (parent_out, child_out) = UnixStream::pair()?;
    let (parent_in, child_in) = UnixStream::pair()?;
    parent_out.set_nonblocking(true)?;
    parent_in.set_nonblocking(true)?;

    let script_dir = script.parent().unwrap_or_else(|| Path::new("/"));
    let mut child = Command::new(interpreter)
        .arg(script)
        .current_dir(script_dir)
        .envs(env)
        .stdin(Stdio::from(OwnedFd::from(child_in)))
        .stdout(Stdio::from(OwnedFd::from(child_out)))
        .stderr(Stdio::null())
        .spawn()?;

    debug!("cgi child {} running {}", child.id(), script.display());

    let mut out_stream = mio::net::UnixStream::from_std(parent_out);
    let mut in_stream = Some(mio::net::UnixStream::from_std(parent_in));

    let mut poll = Poll::new()?;
    let mut events = Events::with_capacity(8);
    poll.registry()
        .register(&mut out_stream, CGI_OUT, Interest::READABLE)?;

    let mut cursor = 0usize;
    if body.is_empty() {
        // nothing to send; close the write end so the child sees EOF now
        in_stream = None;
    } else if let Some(stream) = in_stream.as_mut() {
        poll.registry().register(stream, CGI_IN, Interest::WRITABLE)?;
    }

    let deadline = Instant::now() + timeout;
    let mut output = Vec::new();
    let mut stdout_open = true;

    while stdout_open {
        let now = Instant::now();
        if now >= deadline {
            return Ok(kill_on_timeout(&mut child, output));
        }
        let wait = (deadline - now).min(Duration::from_millis(250));
        poll.poll(&mut events, Some(wait))?;

        for event in events.iter() {
            match event.token() {
                CGI_OUT => {
                    let mut buf = [0u8; 4096];
                    loop {
                        match out_stream.read(&mut buf) {
                            Ok(0) => {
                                stdout_open = false;
                                break;
                            }
                            Ok(n) => output.extend_from_slice(&buf[..n]),
                            Err(e) if e.kind() == ErrorKind::WouldBlock => break,
                            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                            Err(_) => {
                                stdout_open = false;
                                break;
                            }
                        }
                    }
                }
                CGI_IN => {
                    if let Some(stream) = in_stream.as_mut() {
                        while cursor < body.len() {
                            match stream.write(&body[cursor..]) {
                                Ok(0) => {
                                    cursor = body.len();
                                    break;
                                }
                                Ok(n) => cursor += n,
                                Err(e) if e.kind() == ErrorKind::WouldBlock => break,
                                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                                Err(_) => {
                                    // child closed its stdin; stop feeding it
                                    cursor = body.len();
                                    break;
                                }
                            }
                        }
                    }
                    if cursor >= body.len() {
                        if let Some(mut stream) = in_stream.take() {
                            let _ = poll.registry().deregister(&mut stream);
                        }
                    }
                }
                _ => {}
            }
        }
    }

    // Stdout is drained; reap the child within what remains of the deadline.
    loop {
        match child.try_wait() {
            Ok(Some(status)) => {
                if status.success() {
                    return Ok(CgiOutcome::Complete(output));
                }
                return Ok(CgiOutcome::Failed);
            }
            Ok(None) => {
                if Instant::now() >= deadline {
                    return Ok(kill_on_timeout(&mut child, output));
                }
                std::thread::sleep(Duration::from_millis(10));
            }
            Err(_) => return Ok(CgiOutcome::Failed),
        }
    }
}

/// SIGTERM, a short grace period, then SIGKILL; the child is always reaped.
fn kill_on_timeout(child: &mut Child, output: Vec<u8>) -> CgiOutcome {
    unsafe {
        libc::kill(child.id() as libc::pid_t, libc::SIGTERM);
    }
    std::thread::sleep(KILL_GRACE);
    if !matches!(child.try_wait(), Ok(Some(_))) {
        let _ = child.kill();
    }
    let _ = child.wait();
    CgiOutcome::TimedOut(output)
}

/// Turn the child's output into an HTTP response. `Status:` defaults to 200,
/// `Content-Type` to text/html; everything else passes through.
pub fn parse_output(raw: &[u8]) -> Option<HttpResponse> {
    if raw.is_empty() {
        return None;
    }

    let (header_end, delim_len) = match find_subsequence(raw, b"\r\n\r\n", 0) {
        Some(pos) => (pos, 4),
        None => match find_subsequence(raw, b"\n\n", 0) {
            Some(pos) => (pos, 2),
            None => return None,
        },
    };

    let headers_part = String::from_utf8_lossy(&raw[..header_end]);
    let mut response = HttpResponse::new(HTTP_OK);
    let mut content_type: Option<String> = None;

    for line in headers_part.lines() {
        let Some((name, value)) = line.split_once(':') else {
            continue;
        };
        let name = name.trim();
        let value = value.trim();

        if name.eq_ignore_ascii_case("status") {
            if let Some(code) = value.split_whitespace().next().and_then(|s| s.parse().ok()) {
                response.status = code;
            }
        } else if name.eq_ignore_ascii_case("content-type") {
            content_type = Some(value.to_string());
        } else {
            response.set_header(name, value);
        }
    }

    response.set_header(
        "Content-Type",
        content_type
            .as_deref()
            .unwrap_or("text/html; charset=utf-8"),
    );
    response.body = raw[header_end + delim_len..].to_vec();
    Some(response)
}
