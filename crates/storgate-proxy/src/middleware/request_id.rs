//! Correlation id middleware.

use axum::extract::Request;
use axum::http::HeaderValue;
use axum::middleware::Next;
use axum::response::Response;
use tracing::Instrument;

use storgate_core::CorrelationId;

const REQUEST_ID_HEADER: &str = "x-request-id";

/// Adopts the caller's `x-request-id` or mints one, threads it through the
/// request span, and echoes it on the response.
pub async fn request_id(mut request: Request, next: Next) -> Response {
    let id = request
        .headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|h| h.to_str().ok())
        .map(CorrelationId::from_string)
        .unwrap_or_default();

    request.extensions_mut().insert(id.clone());

    let span = tracing::info_span!("request", correlation_id = %id);
    let mut response = next.run(request).instrument(span).await;

    if let Ok(value) = HeaderValue::from_str(id.as_str()) {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }
    response
}
