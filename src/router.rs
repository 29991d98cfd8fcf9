//! Request routing: which server block answers on this port for this Host,
//! and which location prefix owns the URI.
//!
//! Indices into the shared config are returned instead of references so a
//! connection can remember its route without borrowing the config tree.

use crate::config::{Config, LocationContext, ServerContext};
use crate::http::request::Method;

/// Server selection among the blocks listening on `port`:
/// exact `server_name` match first, then the first `default_server`,
/// then the first block on the port.
pub fn find_server(config: &Config, port: u16, hostname: Option<&str>) -> Option<usize> {
    let mut default_server = None;
    let mut first_on_port = None;

    for (idx, server) in config.http.servers.iter().enumerate() {
        for listen in &server.listens {
            if listen.port != port {
                continue;
            }
            if let (Some(name), Some(host)) = (server.server_name.as_deref(), hostname) {
                if name == host {
                    return Some(idx);
                }
            }
            if listen.default_server && default_server.is_none() {
                default_server = Some(idx);
            }
            if first_on_port.is_none() {
                first_on_port = Some(idx);
            }
        }
    }

    default_server.or(first_on_port)
}

/// Longest-prefix location match. Among all matches the longest path whose
/// `limit_except` permits the method wins; with no permitted match the
/// longest overall is kept so the handler can answer 405.
pub fn find_location(server: &ServerContext, uri: &str, method: &Method) -> Option<usize> {
    let mut longest: Option<(usize, usize)> = None; // (idx, path len)
    let mut best_permitted: Option<(usize, usize)> = None;

    for (idx, location) in server.locations.iter().enumerate() {
        if !location_matches(&location.path, uri) {
            continue;
        }
        let len = location.path.len();
        if longest.map(|(_, l)| len > l).unwrap_or(true) {
            longest = Some((idx, len));
        }
        if method_allowed(location, method)
            && best_permitted.map(|(_, l)| len > l).unwrap_or(true)
        {
            best_permitted = Some((idx, len));
        }
    }

    best_permitted.or(longest).map(|(idx, _)| idx)
}

/// Prefix match rules: a path ending in `/` matches any URI under it (or the
/// URI that is the path minus its slash); other paths must end at a segment
/// boundary, so `/foo` does not capture `/foobar`.
pub fn location_matches(path: &str, uri: &str) -> bool {
    if path.is_empty() {
        return false;
    }
    if path.ends_with('/') {
        uri.starts_with(path) || format!("{}/", uri) == path
    } else {
        uri.starts_with(path)
            && (uri.len() == path.len() || uri.as_bytes()[path.len()] == b'/')
    }
}

pub fn method_allowed(location: &LocationContext, method: &Method) -> bool {
    match &location.limit_except {
        Some(limit) => limit.permits(method.as_str()),
        None => true,
    }
}
