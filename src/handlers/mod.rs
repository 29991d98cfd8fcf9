pub mod delete;
pub mod get;
pub mod path;
pub mod post;

use std::net::SocketAddr;

use crate::cgi;
use crate::config::{LocationContext, ServerContext};
use crate::http::request::{HttpRequest, Method};
use crate::http::response::{error_response, HttpResponse};
use crate::prelude::{HTTP_NOT_FOUND, HTTP_NOT_IMPLEMENTED};

/// Everything a handler needs besides the request itself.
pub struct RequestContext<'a> {
    pub server: &'a ServerContext,
    pub location: Option<&'a LocationContext>,
    pub port: u16,
    pub peer: Option<SocketAddr>,
}

/// Translate a routed request into a response: redirects first, then CGI,
/// then the method handlers.
pub fn dispatch(request: &HttpRequest, body: &[u8], ctx: &RequestContext) -> HttpResponse {
    if let Some(ret) = &ctx.server.ret {
        return HttpResponse::redirect(ret.code, &ret.url);
    }

    let Some(location) = ctx.location else {
        return error_response(HTTP_NOT_FOUND, Some(ctx.server), None);
    };

    if let Some(ret) = &location.ret {
        return HttpResponse::redirect(ret.code, &ret.url);
    }

    if location.cgi_pass.is_some() {
        return cgi::handle(request, body, ctx, location);
    }

    match request.method {
        Method::GET | Method::HEAD => get::handle(request, ctx, location),
        Method::POST => post::handle(request, body, ctx, location),
        Method::DELETE => delete::handle(request, ctx, location),
        // no handler exists for PUT or for verbs outside the known set
        Method::PUT | Method::Other(_) => {
            error_response(HTTP_NOT_IMPLEMENTED, Some(ctx.server), Some(location))
        }
    }
}
