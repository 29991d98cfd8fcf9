use std::collections::HashMap;
use std::fmt;

use thiserror::Error;

use crate::prelude::{
    HTTP_BAD_REQUEST, HTTP_HEADER_FIELDS_TOO_LARGE, HTTP_PAYLOAD_TOO_LARGE, HTTP_URI_TOO_LONG,
    HTTP_VERSION_NOT_SUPPORTED, MAX_URI_LEN,
};

/// Request method. Parsing is total: an unrecognized verb is carried as
/// `Other` so routing and `limit_except` still run; dispatch answers 501
/// for it when no location denied it first.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Method {
    GET,
    HEAD,
    POST,
    PUT,
    DELETE,
    Other(String),
}

impl Method {
    pub fn parse(s: &str) -> Method {
        let verb = s.to_uppercase();
        match verb.as_str() {
            "GET" => Method::GET,
            "HEAD" => Method::HEAD,
            "POST" => Method::POST,
            "PUT" => Method::PUT,
            "DELETE" => Method::DELETE,
            _ => Method::Other(verb),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Method::GET => "GET",
            Method::HEAD => "HEAD",
            Method::POST => "POST",
            Method::PUT => "PUT",
            Method::DELETE => "DELETE",
            Method::Other(verb) => verb,
        }
    }

    pub fn is_allowed(&self, allowed_methods: &[String]) -> bool {
        allowed_methods.iter().any(|m| m == self.as_str())
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("need more data")]
    Incomplete,
    #[error("malformed request")]
    BadRequest,
    #[error("request target too long")]
    UriTooLong,
    #[error("header section too large")]
    HeadersTooLarge,
    #[error("unsupported HTTP version")]
    VersionNotSupported,
    #[error("payload over configured limit")]
    PayloadTooLarge,
}

impl ParseError {
    pub fn status(&self) -> u16 {
        match self {
            ParseError::Incomplete | ParseError::BadRequest => HTTP_BAD_REQUEST,
            ParseError::UriTooLong => HTTP_URI_TOO_LONG,
            ParseError::HeadersTooLarge => HTTP_HEADER_FIELDS_TOO_LARGE,
            ParseError::VersionNotSupported => HTTP_VERSION_NOT_SUPPORTED,
            ParseError::PayloadTooLarge => HTTP_PAYLOAD_TOO_LARGE,
        }
    }
}

/// Request body representation.
///
/// `View` indexes the connection's read buffer (Content-Length bodies are
/// never copied); `Owned` holds bytes materialized by the chunked decoder.
/// A view stays valid because the buffer is never compacted while a
/// request is in flight.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Body {
    None,
    View { start: usize, len: usize },
    Owned(Vec<u8>),
}

#[derive(Debug)]
pub struct HttpRequest {
    pub method: Method,
    pub target: String,
    pub version: String,
    pub headers: HashMap<String, String>,
    pub content_length: usize,
    pub chunked: bool,
    pub body: Body,
}

impl HttpRequest {
    /// Parse a complete header section (request line + header lines, without
    /// the blank-line terminator).
    pub fn parse_head(head: &[u8]) -> Result<HttpRequest, ParseError> {
        let text = std::str::from_utf8(head).map_err(|_| ParseError::BadRequest)?;
        let mut lines = text.split("\r\n");

        let request_line = lines.next().ok_or(ParseError::BadRequest)?;
        let parts: Vec<&str> = request_line.split_whitespace().collect();
        if parts.len() != 3 {
            return Err(ParseError::BadRequest);
        }

        let method = Method::parse(parts[0]);
        let target = parts[1].to_string();
        if target.len() > MAX_URI_LEN {
            return Err(ParseError::UriTooLong);
        }
        let version = parts[2].to_string();
        if version != "HTTP/1.0" && version != "HTTP/1.1" {
            return Err(ParseError::VersionNotSupported);
        }

        let mut headers = HashMap::new();
        for line in lines {
            if line.is_empty() {
                continue;
            }
            // Lines without a colon are silently skipped.
            if let Some(sep) = line.find(':') {
                let name = line[..sep].trim().to_ascii_lowercase();
                let value = line[sep + 1..].trim().to_string();
                headers.insert(name, value);
            }
        }

        let content_length = match headers.get("content-length") {
            Some(v) => v.parse::<usize>().map_err(|_| ParseError::BadRequest)?,
            None => 0,
        };

        let chunked = headers
            .get("transfer-encoding")
            .map(|v| v.to_ascii_lowercase().contains("chunked"))
            .unwrap_or(false);

        Ok(HttpRequest {
            method,
            target,
            version,
            headers,
            content_length,
            chunked,
            body: Body::None,
        })
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).map(String::as_str)
    }

    /// Request path, without the query string.
    pub fn path(&self) -> &str {
        match self.target.find('?') {
            Some(pos) => &self.target[..pos],
            None => &self.target,
        }
    }

    /// Everything after `?`, or empty.
    pub fn query(&self) -> &str {
        match self.target.find('?') {
            Some(pos) => &self.target[pos + 1..],
            None => "",
        }
    }

    /// Host header with any `:port` suffix stripped.
    pub fn hostname(&self) -> Option<&str> {
        self.header("host").map(|h| h.split(':').next().unwrap_or(h))
    }

    /// Materialize the body against the connection's read buffer.
    pub fn body<'a>(&'a self, read_buf: &'a [u8]) -> &'a [u8] {
        match &self.body {
            Body::None => &[],
            Body::View { start, len } => &read_buf[*start..*start + *len],
            Body::Owned(bytes) => bytes,
        }
    }

    pub fn body_len(&self) -> usize {
        match &self.body {
            Body::None => 0,
            Body::View { len, .. } => *len,
            Body::Owned(bytes) => bytes.len(),
        }
    }
}

/// Outcome of attempting to decode a chunked body from the unread region.
#[derive(Debug, PartialEq, Eq)]
pub enum ChunkOutcome {
    /// All chunks plus the terminator were present; `consumed` counts the
    /// encoded bytes, terminator included.
    Complete { decoded: Vec<u8>, consumed: usize },
    Incomplete,
}

// A chunk-size line has no business being longer than this.
const MAX_CHUNK_SIZE_LINE: usize = 64;

pub fn decode_chunked(input: &[u8], max_size: usize) -> Result<ChunkOutcome, ParseError> {
    let mut decoded = Vec::new();
    let mut pos = 0usize;

    loop {
        let line_end = match find_crlf(input, pos) {
            Some(end) => end,
            None => {
                if input.len() - pos > MAX_CHUNK_SIZE_LINE {
                    return Err(ParseError::BadRequest);
                }
                return Ok(ChunkOutcome::Incomplete);
            }
        };
        if line_end - pos > MAX_CHUNK_SIZE_LINE {
            return Err(ParseError::BadRequest);
        }

        let size_line =
            std::str::from_utf8(&input[pos..line_end]).map_err(|_| ParseError::BadRequest)?;
        // Chunk extensions after ';' are tolerated and ignored.
        let size_str = size_line.split(';').next().unwrap_or("").trim();
        let chunk_size =
            usize::from_str_radix(size_str, 16).map_err(|_| ParseError::BadRequest)?;

        pos = line_end + 2;

        if chunk_size == 0 {
            // Trailer section: header lines until an empty line.
            loop {
                let trailer_end = match find_crlf(input, pos) {
                    Some(end) => end,
                    None => return Ok(ChunkOutcome::Incomplete),
                };
                if trailer_end == pos {
                    return Ok(ChunkOutcome::Complete { decoded, consumed: trailer_end + 2 });
                }
                pos = trailer_end + 2;
            }
        }

        if decoded.len() + chunk_size > max_size {
            return Err(ParseError::PayloadTooLarge);
        }

        if input.len() < pos + chunk_size + 2 {
            return Ok(ChunkOutcome::Incomplete);
        }

        decoded.extend_from_slice(&input[pos..pos + chunk_size]);
        if &input[pos + chunk_size..pos + chunk_size + 2] != b"\r\n" {
            return Err(ParseError::BadRequest);
        }
        pos += chunk_size + 2;
    }
}

/// Encode bytes as a single-chunk chunked body. Used by tests to assert the
/// decoder round-trips.
pub fn encode_chunked(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len() + 16);
    if !data.is_empty() {
        out.extend_from_slice(format!("{:x}\r\n", data.len()).as_bytes());
        out.extend_from_slice(data);
        out.extend_from_slice(b"\r\n");
    }
    out.extend_from_slice(b"0\r\n\r\n");
    out
}

pub fn find_crlf(buffer: &[u8], start_offset: usize) -> Option<usize> {
    let search_area = buffer.get(start_offset..)?;
    let mut current = 0;
    while let Some(r_pos) = search_area[current..].iter().position(|&b| b == b'\r') {
        let abs = current + r_pos;
        if search_area.get(abs + 1) == Some(&b'\n') {
            return Some(start_offset + abs);
        }
        current = abs + 1;
    }
    None
}

pub fn find_subsequence(buffer: &[u8], needle: &[u8], start_offset: usize) -> Option<usize> {
    if needle.is_empty() {
        return None;
    }
    let search_area = buffer.get(start_offset..)?;
    search_area
        .windows(needle.len())
        .position(|w| w == needle)
        .map(|pos| start_offset + pos)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_single_chunk() {
        let input = b"5\r\nhello\r\n0\r\n\r\n";
        match decode_chunked(input, 1024).unwrap() {
            ChunkOutcome::Complete { decoded, consumed } => {
                assert_eq!(decoded, b"hello");
                assert_eq!(consumed, input.len());
            }
            ChunkOutcome::Incomplete => panic!("expected complete"),
        }
    }

    #[test]
    fn test_decode_multiple_chunks() {
        let input = b"7\r\nMozilla\r\n9\r\nDeveloper\r\n7\r\nNetwork\r\n0\r\n\r\n";
        match decode_chunked(input, 1024).unwrap() {
            ChunkOutcome::Complete { decoded, .. } => {
                assert_eq!(decoded, b"MozillaDeveloperNetwork");
                assert_eq!(decoded.len(), 23);
            }
            ChunkOutcome::Incomplete => panic!("expected complete"),
        }
    }

    #[test]
    fn test_decode_waits_for_terminator() {
        assert_eq!(
            decode_chunked(b"5\r\nhello\r\n", 1024).unwrap(),
            ChunkOutcome::Incomplete
        );
        assert_eq!(decode_chunked(b"5\r\nhel", 1024).unwrap(), ChunkOutcome::Incomplete);
        assert_eq!(decode_chunked(b"", 1024).unwrap(), ChunkOutcome::Incomplete);
    }

    #[test]
    fn test_decode_rejects_invalid_hex() {
        assert_eq!(
            decode_chunked(b"xyz\r\ndata\r\n0\r\n\r\n", 1024),
            Err(ParseError::BadRequest)
        );
    }

    #[test]
    fn test_decode_rejects_missing_data_crlf() {
        assert_eq!(
            decode_chunked(b"5\r\nhelloXX0\r\n\r\n", 1024),
            Err(ParseError::BadRequest)
        );
    }

    #[test]
    fn test_decode_enforces_size_cap() {
        assert_eq!(
            decode_chunked(b"5\r\nhello\r\n0\r\n\r\n", 4),
            Err(ParseError::PayloadTooLarge)
        );
    }

    #[test]
    fn test_decode_ignores_chunk_extension() {
        let input = b"5;name=val\r\nhello\r\n0\r\n\r\n";
        match decode_chunked(input, 1024).unwrap() {
            ChunkOutcome::Complete { decoded, .. } => assert_eq!(decoded, b"hello"),
            ChunkOutcome::Incomplete => panic!("expected complete"),
        }
    }

    #[test]
    fn test_roundtrip() {
        let payload = b"The quick brown fox jumps over the lazy dog".to_vec();
        let encoded = encode_chunked(&payload);
        match decode_chunked(&encoded, 1024).unwrap() {
            ChunkOutcome::Complete { decoded, consumed } => {
                assert_eq!(decoded, payload);
                assert_eq!(consumed, encoded.len());
            }
            ChunkOutcome::Incomplete => panic!("expected complete"),
        }
    }

    #[test]
    fn test_parse_head_lowercases_headers() {
        let head = b"GET /index.html HTTP/1.1\r\nHost: example.com\r\nX-Custom: Value";
        let request = HttpRequest::parse_head(head).unwrap();
        assert_eq!(request.method, Method::GET);
        assert_eq!(request.header("host"), Some("example.com"));
        assert_eq!(request.header("x-custom"), Some("Value"));
    }

    #[test]
    fn test_parse_head_rejects_bad_version() {
        let head = b"GET / HTTP/2.0";
        assert_eq!(
            HttpRequest::parse_head(head).unwrap_err(),
            ParseError::VersionNotSupported
        );
    }

    #[test]
    fn test_parse_head_skips_colonless_lines() {
        let head = b"GET / HTTP/1.1\r\nHost: x\r\nthis line has no colon\r\nAccept: */*";
        let request = HttpRequest::parse_head(head).unwrap();
        assert_eq!(request.headers.len(), 2);
    }
}
