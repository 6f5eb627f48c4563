use std::time::Instant;

use axum::{
    body::Body,
    http::{HeaderName, HeaderValue, Method, Request},
    middleware::Next,
    response::Response,
};
use tracing::{debug, error, warn};
use uuid::Uuid;

use crate::application::error::ErrorReport;

pub const REQUEST_ID_HEADER: HeaderName = HeaderName::from_static("x-request-id");

#[derive(Debug, Clone)]
pub struct RequestContext {
    pub request_id: String,
}

/// Tag the request with a fresh id and echo it in `x-request-id`.
pub async fn set_request_context(mut request: Request<Body>, next: Next) -> Response {
    let ctx = RequestContext {
        request_id: Uuid::new_v4().to_string(),
    };
    request.extensions_mut().insert(ctx.clone());

    let mut response = next.run(request).await;
    if let Ok(value) = HeaderValue::from_str(&ctx.request_id) {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }
    response.extensions_mut().insert(ctx);
    response
}

/// Log every response; failures carry the attached [`ErrorReport`] chain.
pub async fn log_responses(request: Request<Body>, next: Next) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let request_id = request
        .extensions()
        .get::<RequestContext>()
        .map(|ctx| ctx.request_id.clone())
        .unwrap_or_default();
    let started_at = Instant::now();

    let mut response = next.run(request).await;
    let status = response.status();
    let elapsed_ms = started_at.elapsed().as_millis() as u64;
    let package = package_from_path(&method, &path).unwrap_or("");

    if !(status.is_client_error() || status.is_server_error()) {
        debug!(
            target: "folio::http::response",
            status = status.as_u16(),
            method = %method,
            path = %path,
            package,
            elapsed_ms,
            request_id = %request_id,
            "request served"
        );
        return response;
    }

    let (source, chain) = match response.extensions_mut().remove::<ErrorReport>() {
        Some(report) => (report.source, report.messages),
        None => ("unknown", Vec::new()),
    };
    let detail = chain.first().map(String::as_str).unwrap_or("no diagnostic available");

    if status.is_server_error() {
        error!(
            target: "folio::http::response",
            status = status.as_u16(),
            method = %method,
            path = %path,
            package,
            elapsed_ms,
            source,
            detail,
            chain = ?chain,
            request_id = %request_id,
            "request failed"
        );
    } else {
        warn!(
            target: "folio::http::response",
            status = status.as_u16(),
            method = %method,
            path = %path,
            package,
            elapsed_ms,
            source,
            detail,
            chain = ?chain,
            request_id = %request_id,
            "client request error"
        );
    }

    response
}

/// Package id addressed by a `GET /{id}[/wait|/status]` request.
fn package_from_path<'a>(method: &Method, path: &'a str) -> Option<&'a str> {
    if *method != Method::GET {
        return None;
    }
    let mut segments = path.trim_start_matches('/').split('/');
    let id = segments.next().filter(|id| !id.is_empty())?;
    match (segments.next(), segments.next()) {
        (None, None) | (Some("wait" | "status"), None) => Some(id),
        _ => None,
    }
}
