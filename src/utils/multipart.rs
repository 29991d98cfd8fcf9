//! Minimal multipart/form-data parsing for upload callers.

use crate::http::request::find_subsequence;

#[derive(Debug, Clone, Default)]
pub struct FilePart {
    pub name: String,
    pub filename: Option<String>,
    pub content_type: String,
    pub data: Vec<u8>,
}

/// Pull the boundary out of a `Content-Type: multipart/form-data; boundary=..`
/// header value, unquoting if needed.
pub fn boundary_from_content_type(content_type: &str) -> Option<String> {
    let raw = content_type.split("boundary=").nth(1)?;
    let raw = raw.split(';').next().unwrap_or(raw).trim();
    Some(raw.trim_matches('"').to_string())
}

pub fn parse(body: &[u8], boundary: &str) -> Vec<FilePart> {
    let mut parts = Vec::new();
    if boundary.is_empty() {
        return parts;
    }

    let dash_boundary = format!("--{}", boundary);
    let delim = dash_boundary.as_bytes();

    let mut pos = match find_subsequence(body, delim, 0) {
        Some(p) => p,
        None => return parts,
    };

    loop {
        let part_start = pos + delim.len();
        // "--" after the boundary marks the end of the stream
        if body.get(part_start..part_start + 2) == Some(b"--".as_slice()) {
            break;
        }
        let next = match find_subsequence(body, delim, part_start) {
            Some(p) => p,
            None => break,
        };

        if let Some(part) = parse_part(&body[part_start..next]) {
            parts.push(part);
        }
        pos = next;
    }

    parts
}

fn parse_part(raw: &[u8]) -> Option<FilePart> {
    // skip the CRLF that follows the boundary line
    let raw = raw.strip_prefix(b"\r\n").unwrap_or(raw);
    let header_end = find_subsequence(raw, b"\r\n\r\n", 0)?;

    let headers = String::from_utf8_lossy(&raw[..header_end]);
    let mut part = FilePart::default();

    for line in headers.lines() {
        if let Some(rest) = line.strip_prefix("Content-Disposition:") {
            for attr in rest.split(';') {
                let attr = attr.trim();
                if let Some(v) = attr.strip_prefix("name=") {
                    part.name = v.trim_matches('"').to_string();
                } else if let Some(v) = attr.strip_prefix("filename=") {
                    part.filename = Some(v.trim_matches('"').to_string());
                }
            }
        } else if let Some(rest) = line.strip_prefix("Content-Type:") {
            part.content_type = rest.trim().to_string();
        }
    }

    let mut data = &raw[header_end + 4..];
    // part data is terminated by the CRLF preceding the next boundary
    if data.ends_with(b"\r\n") {
        data = &data[..data.len() - 2];
    }
    part.data = data.to_vec();
    Some(part)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_boundary_extraction() {
        assert_eq!(
            boundary_from_content_type("multipart/form-data; boundary=XyZ123").as_deref(),
            Some("XyZ123")
        );
        assert_eq!(
            boundary_from_content_type("multipart/form-data; boundary=\"quoted\"").as_deref(),
            Some("quoted")
        );
        assert_eq!(boundary_from_content_type("text/plain"), None);
    }

    #[test]
    fn test_parse_single_file_part() {
        let body = b"--BOUND\r\n\
            Content-Disposition: form-data; name=\"file\"; filename=\"hello.txt\"\r\n\
            Content-Type: text/plain\r\n\r\n\
            hello world\r\n\
            --BOUND--\r\n";
        let parts = parse(body, "BOUND");
        assert_eq!(parts.len(), 1);
        assert_eq!(parts[0].name, "file");
        assert_eq!(parts[0].filename.as_deref(), Some("hello.txt"));
        assert_eq!(parts[0].content_type, "text/plain");
        assert_eq!(parts[0].data, b"hello world");
    }

    #[test]
    fn test_parse_two_parts() {
        let body = b"--B\r\n\
            Content-Disposition: form-data; name=\"a\"\r\n\r\n\
            1\r\n\
            --B\r\n\
            Content-Disposition: form-data; name=\"b\"\r\n\r\n\
            2\r\n\
            --B--\r\n";
        let parts = parse(body, "B");
        assert_eq!(parts.len(), 2);
        assert_eq!(parts[0].name, "a");
        assert_eq!(parts[0].data, b"1");
        assert_eq!(parts[1].name, "b");
        assert_eq!(parts[1].data, b"2");
    }

    #[test]
    fn test_parse_missing_boundary() {
        assert!(parse(b"no boundaries here", "B").is_empty());
        assert!(parse(b"data", "").is_empty());
    }
}
