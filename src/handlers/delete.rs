use crate::config::LocationContext;
use crate::handlers::{path, RequestContext};
use crate::http::request::HttpRequest;
use crate::http::response::{error_response, HttpResponse};
use crate::prelude::{
    HTTP_FORBIDDEN, HTTP_INTERNAL_SERVER_ERROR, HTTP_NOT_FOUND, HTTP_OK,
};
use crate::utils::fs;

pub fn handle(
    request: &HttpRequest,
    ctx: &RequestContext,
    location: &LocationContext,
) -> HttpResponse {
    let resource = match path::resolve(location, request.path()) {
        Ok(p) => p,
        Err(status) => return error_response(status, Some(ctx.server), Some(location)),
    };

    if !fs::exists(&resource) {
        return error_response(HTTP_NOT_FOUND, Some(ctx.server), Some(location));
    }

    if fs::is_directory(&resource) {
        return error_response(HTTP_FORBIDDEN, Some(ctx.server), Some(location));
    }

    match fs::delete_file(&resource) {
        Ok(()) => {
            let mut response = HttpResponse::new(HTTP_OK);
            response.set_body(
                b"<html><body><h1>200 OK</h1><p>File deleted successfully</p></body></html>"
                    .to_vec(),
                "text/html; charset=utf-8",
            );
            response
        }
        Err(e) => {
            let status = match e.kind() {
                std::io::ErrorKind::PermissionDenied => HTTP_FORBIDDEN,
                _ => HTTP_INTERNAL_SERVER_ERROR,
            };
            error_response(status, Some(ctx.server), Some(location))
        }
    }
}
