use crate::config::LocationContext;
use crate::handlers::{path, RequestContext};
use crate::http::request::HttpRequest;
use crate::http::response::{error_response, generate_autoindex, HttpResponse};
use crate::prelude::{
    debug, HTTP_INTERNAL_SERVER_ERROR, HTTP_MOVED_PERMANENTLY, HTTP_NOT_FOUND, HTTP_OK,
};
use crate::utils::{fs, mime};

pub fn handle(
    request: &HttpRequest,
    ctx: &RequestContext,
    location: &LocationContext,
) -> HttpResponse {
    let uri = request.path();
    let resource = match path::resolve(location, uri) {
        Ok(p) => p,
        Err(status) => return error_response(status, Some(ctx.server), Some(location)),
    };

    if !fs::exists(&resource) {
        return error_response(HTTP_NOT_FOUND, Some(ctx.server), Some(location));
    }

    if fs::is_directory(&resource) {
        // Directories are addressed with a trailing slash; redirect otherwise.
        if !uri.ends_with('/') {
            let mut response = HttpResponse::redirect(HTTP_MOVED_PERMANENTLY, &format!("{}/", uri));
            response.set_body(
                b"<html><body>Redirecting...</body></html>".to_vec(),
                "text/html; charset=utf-8",
            );
            return response;
        }

        if let Some(index) = path::find_index_file(&resource, location) {
            return serve_static_file(&index, ctx, location);
        }

        if location.autoindex.unwrap_or(false) {
            debug!("autoindex listing for {}", resource.display());
            return match generate_autoindex(&resource, uri) {
                Ok(response) => response,
                Err(_) => {
                    error_response(HTTP_INTERNAL_SERVER_ERROR, Some(ctx.server), Some(location))
                }
            };
        }

        return error_response(HTTP_NOT_FOUND, Some(ctx.server), Some(location));
    }

    serve_static_file(&resource, ctx, location)
}

fn serve_static_file(
    file_path: &std::path::Path,
    ctx: &RequestContext,
    location: &LocationContext,
) -> HttpResponse {
    let content = match fs::read_file(file_path) {
        Ok(content) => content,
        Err(e) => {
            let status = match e.kind() {
                std::io::ErrorKind::NotFound => HTTP_NOT_FOUND,
                _ => HTTP_INTERNAL_SERVER_ERROR,
            };
            return error_response(status, Some(ctx.server), Some(location));
        }
    };

    let mime_type = mime::mime_type_for_path(file_path);
    let mut response = HttpResponse::new(HTTP_OK);
    response.set_body(content, mime_type);

    if mime::is_inline(mime_type) {
        response.set_header("Content-Disposition", "inline");
    } else {
        let filename = file_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        response.set_header(
            "Content-Disposition",
            &format!("attachment; filename=\"{}\"", filename),
        );
    }

    response
}
