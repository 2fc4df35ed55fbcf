//! Request-id propagation.
//!
//! Every request carries an `x-request-id`, either the caller's own or a
//! fresh UUID, and the same id is echoed on the response. Log lines from
//! the handlers can then be stitched back to the request that caused them.

use axum::http::HeaderValue;
use axum::{extract::Request, middleware::Next, response::Response};
use uuid::Uuid;

pub const REQUEST_ID_HEADER: &str = "x-request-id";

pub async fn request_id_middleware(mut req: Request, next: Next) -> Response {
    let request_id = match req.headers().get(REQUEST_ID_HEADER) {
        // A caller-supplied id is kept as-is so ids minted upstream survive
        // the hop. Anything unparsable is replaced, not forwarded.
        Some(value) if value.to_str().is_ok() => value.clone(),
        _ => {
            let minted = HeaderValue::from_str(&Uuid::new_v4().to_string())
                .unwrap_or_else(|_| HeaderValue::from_static("invalid"));
            req.headers_mut().insert(REQUEST_ID_HEADER, minted.clone());
            minted
        }
    };

    let mut response = next.run(req).await;
    response.headers_mut().insert(REQUEST_ID_HEADER, request_id);
    response
}
