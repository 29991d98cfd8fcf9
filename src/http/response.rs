use std::path::Path;
use std::time::SystemTime;

use crate::config::{LocationContext, ServerContext};
use crate::prelude::{
    HTTP_BAD_REQUEST, HTTP_METHOD_NOT_ALLOWED, HTTP_OK, SERVER_SOFTWARE,
};
use crate::utils::fs;
use crate::utils::set_cookie::SetCookie;

/// Case-preserving header map with insertion order kept for serialization.
/// Lookups and replacement are case-insensitive.
#[derive(Debug, Clone, Default)]
pub struct HeaderMap {
    entries: Vec<(String, String)>,
}

impl HeaderMap {
    pub fn new() -> Self {
        HeaderMap::default()
    }

    pub fn set(&mut self, name: &str, value: &str) {
        for (k, v) in &mut self.entries {
            if k.eq_ignore_ascii_case(name) {
                *v = value.to_string();
                return;
            }
        }
        self.entries.push((name.to_string(), value.to_string()));
    }

    /// Add without replacing; needed for repeated Set-Cookie headers.
    pub fn append(&mut self, name: &str, value: &str) {
        self.entries.push((name.to_string(), value.to_string()));
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn remove(&mut self, name: &str) {
        self.entries.retain(|(k, _)| !k.eq_ignore_ascii_case(name));
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn new(status: u16) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: Vec::new(),
        }
    }

    pub fn set_status(&mut self, code: u16) -> &mut Self {
        self.status = code;
        self
    }

    pub fn set_header(&mut self, name: &str, value: &str) -> &mut Self {
        self.headers.set(name, value);
        self
    }

    pub fn set_body(&mut self, body: Vec<u8>, content_type: &str) -> &mut Self {
        self.headers.set("Content-Type", content_type);
        self.body = body;
        self
    }

    pub fn set_cookie(&mut self, cookie: &SetCookie) -> &mut Self {
        self.headers.append("Set-Cookie", &cookie.to_header());
        self
    }

    pub fn redirect(code: u16, target_url: &str) -> Self {
        let mut res = HttpResponse::new(code);
        res.set_header("Location", target_url);
        res
    }

    pub fn status_text(code: u16) -> &'static str {
        match code {
            200 => "OK",
            201 => "Created",
            202 => "Accepted",
            204 => "No Content",
            301 => "Moved Permanently",
            302 => "Found",
            303 => "See Other",
            304 => "Not Modified",
            307 => "Temporary Redirect",
            308 => "Permanent Redirect",
            400 => "Bad Request",
            401 => "Unauthorized",
            403 => "Forbidden",
            404 => "Not Found",
            405 => "Method Not Allowed",
            408 => "Request Timeout",
            409 => "Conflict",
            410 => "Gone",
            413 => "Payload Too Large",
            414 => "URI Too Long",
            431 => "Request Header Fields Too Large",
            500 => "Internal Server Error",
            501 => "Not Implemented",
            502 => "Bad Gateway",
            503 => "Service Unavailable",
            504 => "Gateway Timeout",
            505 => "HTTP Version Not Supported",
            _ => "Unknown Status",
        }
    }

    /// Serialize for the wire. `head_only` is set for HEAD requests; headers
    /// (including Content-Length) are emitted either way.
    pub fn to_bytes(&self, head_only: bool, keep_alive: bool) -> Vec<u8> {
        let mut out = format!(
            "HTTP/1.1 {} {}\r\n",
            self.status,
            Self::status_text(self.status)
        )
        .into_bytes();

        if !self.headers.contains("date") {
            let date = httpdate::fmt_http_date(SystemTime::now());
            out.extend_from_slice(format!("Date: {}\r\n", date).as_bytes());
        }
        if !self.headers.contains("server") {
            out.extend_from_slice(format!("Server: {}\r\n", SERVER_SOFTWARE).as_bytes());
        }
        let connection = if keep_alive { "keep-alive" } else { "close" };
        out.extend_from_slice(format!("Connection: {}\r\n", connection).as_bytes());
        if !self.headers.contains("content-length") {
            out.extend_from_slice(format!("Content-Length: {}\r\n", self.body.len()).as_bytes());
        }

        for (name, value) in self.headers.iter() {
            if name.eq_ignore_ascii_case("connection") {
                continue;
            }
            out.extend_from_slice(format!("{}: {}\r\n", name, value).as_bytes());
        }

        out.extend_from_slice(b"\r\n");
        if !head_only {
            out.extend_from_slice(&self.body);
        }
        out
    }
}

/// Keep-alive policy: HTTP/1.1 defaults to keep-alive unless the client sent
/// `Connection: close`; HTTP/1.0 defaults to close unless the client sent
/// `Connection: keep-alive`. 400, 405 and every 5xx always close.
pub fn should_keep_alive(version: &str, connection_header: Option<&str>, status: u16) -> bool {
    if status == HTTP_BAD_REQUEST || status == HTTP_METHOD_NOT_ALLOWED || status >= 500 {
        return false;
    }
    let connection = connection_header.map(|v| v.to_ascii_lowercase());
    if version == "HTTP/1.0" {
        connection.as_deref() == Some("keep-alive")
    } else {
        connection.as_deref() != Some("close")
    }
}

/// Build an error response, preferring a configured error page over the
/// built-in HTML body.
pub fn error_response(
    status: u16,
    server: Option<&ServerContext>,
    location: Option<&LocationContext>,
) -> HttpResponse {
    let mut res = HttpResponse::new(status);

    if let Some(body) = load_error_page(status, server, location) {
        res.set_body(body, "text/html; charset=utf-8");
        return res;
    }

    let body = format!(
        "<html><body><h1>{} {}</h1></body></html>",
        status,
        HttpResponse::status_text(status)
    );
    res.set_body(body.into_bytes(), "text/html; charset=utf-8");
    res
}

fn load_error_page(
    status: u16,
    server: Option<&ServerContext>,
    location: Option<&LocationContext>,
) -> Option<Vec<u8>> {
    let page = location
        .and_then(|loc| loc.error_pages.get(&status))
        .or_else(|| server.and_then(|srv| srv.error_pages.get(&status)))?;

    let root = location
        .and_then(|loc| loc.root.as_deref().or(loc.alias.as_deref()))
        .or_else(|| server.and_then(|srv| srv.root.as_deref()))?;

    let full = Path::new(root).join(page.trim_start_matches('/'));
    fs::read_file(&full).ok()
}

/// HTML listing of a directory's entries, directories suffixed with `/`,
/// links relative to the request URI.
pub fn generate_autoindex(dir: &Path, uri: &str) -> std::io::Result<HttpResponse> {
    let entries = fs::list_directory(dir)?;

    let mut html = String::new();
    html.push_str("<!DOCTYPE html>\n<html>\n<head>\n");
    html.push_str(&format!("<title>Index of {}</title>\n", uri));
    html.push_str("</head>\n<body>\n");
    html.push_str(&format!("<h1>Index of {}</h1>\n<hr>\n<ul>\n", uri));

    if uri != "/" && !uri.is_empty() {
        html.push_str("<li><a href=\"../\">../</a></li>\n");
    }

    for entry in entries {
        let link = if entry.is_dir {
            format!("{}/", entry.name)
        } else {
            entry.name.clone()
        };
        html.push_str(&format!("<li><a href=\"{}\">{}</a>", link, link));
        if !entry.is_dir {
            html.push_str(&format!(" ({} bytes)", entry.size));
        }
        html.push_str("</li>\n");
    }

    html.push_str("</ul>\n<hr>\n");
    html.push_str(&format!("<footer>{}</footer>\n", SERVER_SOFTWARE));
    html.push_str("</body>\n</html>");

    let mut res = HttpResponse::new(HTTP_OK);
    res.set_body(html.into_bytes(), "text/html; charset=utf-8");
    Ok(res)
}
