//! URI-to-filesystem mapping. `alias` swaps the matched location prefix for
//! its own path; `root` is simply prepended to the URI.

use std::path::{Path, PathBuf};

use crate::config::LocationContext;
use crate::prelude::{HTTP_FORBIDDEN, HTTP_NOT_FOUND};
use crate::utils::fs;

/// Map a request path onto the filesystem, or fail with the status code the
/// caller should answer with.
pub fn resolve(location: &LocationContext, uri_path: &str) -> Result<PathBuf, u16> {
    if !fs::is_path_secure(uri_path) {
        return Err(HTTP_FORBIDDEN);
    }

    if let Some(alias) = &location.alias {
        let remainder = uri_path
            .strip_prefix(location.path.as_str())
            .unwrap_or(uri_path);
        let mut resolved = PathBuf::from(alias);
        let remainder = remainder.trim_start_matches('/');
        if !remainder.is_empty() {
            resolved.push(remainder);
        }
        return Ok(resolved);
    }

    if let Some(root) = &location.root {
        let mut resolved = PathBuf::from(root);
        let relative = uri_path.trim_start_matches('/');
        if !relative.is_empty() {
            resolved.push(relative);
        }
        return Ok(resolved);
    }

    Err(HTTP_NOT_FOUND)
}

/// Probe the configured index file inside a directory.
pub fn find_index_file(dir: &Path, location: &LocationContext) -> Option<PathBuf> {
    let index = location.index.as_ref()?;
    let candidate = dir.join(index);
    if fs::exists(&candidate) && !fs::is_directory(&candidate) {
        Some(candidate)
    } else {
        None
    }
}
