use std::time::{SystemTime, UNIX_EPOCH};

use crate::config::LocationContext;
use crate::handlers::{path, RequestContext};
use crate::http::request::HttpRequest;
use crate::http::response::{error_response, HttpResponse};
use crate::prelude::{debug, HTTP_CREATED, HTTP_INTERNAL_SERVER_ERROR, HTTP_OK};
use crate::utils::fs;

/// Write the request body to a fresh `<timestamp>_<random>.upload` file
/// under the resolved target directory.
pub fn handle(
    request: &HttpRequest,
    body: &[u8],
    ctx: &RequestContext,
    location: &LocationContext,
) -> HttpResponse {
    let upload_dir = match path::resolve(location, request.path()) {
        Ok(p) => p,
        Err(status) => return error_response(status, Some(ctx.server), Some(location)),
    };

    if body.is_empty() {
        let mut response = HttpResponse::new(HTTP_OK);
        response.set_body(
            b"<html><body><h1>200 OK</h1><p>Empty POST request</p></body></html>".to_vec(),
            "text/html; charset=utf-8",
        );
        return response;
    }

    if !fs::exists(&upload_dir) {
        if let Err(e) = fs::create_dir(&upload_dir, 0o755) {
            debug!("cannot create upload dir {}: {}", upload_dir.display(), e);
            return error_response(HTTP_INTERNAL_SERVER_ERROR, Some(ctx.server), Some(location));
        }
    }

    let file_path = upload_dir.join(generate_upload_name());
    if fs::save_file(&file_path, body).is_err() {
        return error_response(HTTP_INTERNAL_SERVER_ERROR, Some(ctx.server), Some(location));
    }

    debug!("uploaded {} bytes to {}", body.len(), file_path.display());

    let location_header = file_path.to_string_lossy().into_owned();
    let mut response = HttpResponse::new(HTTP_CREATED);
    response.set_header("Location", &location_header);
    response.set_body(
        format!(
            "<html><body><h1>201 Created</h1><p>File uploaded to {}</p></body></html>",
            location_header
        )
        .into_bytes(),
        "text/html; charset=utf-8",
    );
    response
}

fn generate_upload_name() -> String {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default();
    // timestamp for uniqueness, a xorshift of the nanos against collisions
    let mut x = (now.as_nanos() as u64) | 1;
    x ^= x << 13;
    x ^= x >> 7;
    x ^= x << 17;
    format!("{}_{}.upload", now.as_secs(), x % 1_000_000)
}
