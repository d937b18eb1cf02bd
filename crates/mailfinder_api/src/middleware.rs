//! Request correlation middleware
//!
//! Every request carries a request id: taken from `x-request-id` or
//! `x-trace-id` when the caller supplies one, generated otherwise. Handlers
//! read it from the request extensions and it is echoed in the response.

use axum::{
    extract::Request,
    http::{HeaderMap, HeaderValue},
    middleware::Next,
    response::Response,
};
use tracing::{debug, warn};
use uuid::Uuid;

pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Correlation id of the current request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestId(pub String);

/// Attach a [`RequestId`] to the request and echo it on the response
pub async fn request_id(mut request: Request, next: Next) -> Response {
    let id = extract_or_generate_request_id(request.headers());
    debug!("Processing request: {} {} ({})", request.method(), request.uri().path(), id);

    request.extensions_mut().insert(RequestId(id.clone()));
    let mut response = next.run(request).await;

    if response.status().is_client_error() {
        warn!("Client error for request {}: {}", id, response.status());
    }

    if let Ok(value) = HeaderValue::from_str(&id) {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }
    response
}

fn extract_or_generate_request_id(headers: &HeaderMap) -> String {
    ["x-trace-id", REQUEST_ID_HEADER]
        .iter()
        .filter_map(|name| headers.get(*name))
        .filter_map(|value| value.to_str().ok())
        .map(str::trim)
        .find(|id| !id.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| Uuid::new_v4().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_or_generate_request_id() {
        let mut headers = HeaderMap::new();

        headers.insert("x-trace-id", HeaderValue::from_static("trace-123"));
        assert_eq!(extract_or_generate_request_id(&headers), "trace-123");

        headers.clear();
        headers.insert("x-request-id", HeaderValue::from_static("req-456"));
        assert_eq!(extract_or_generate_request_id(&headers), "req-456");

        headers.clear();
        headers.insert("x-request-id", HeaderValue::from_static("   "));
        let generated_id = extract_or_generate_request_id(&headers);
        assert!(Uuid::parse_str(&generated_id).is_ok());
    }
}
