//! Request-ID tagging and redacted structured access logging.
//!
//! Grounded on the reference crate's `router::build_router` layering order
//! (`TraceLayer` applied last, outermost), generalized into two pieces: a
//! request-id layer that stamps every request/response with a UUID, and a
//! `TraceLayer` configured to log through `charon_core::logging::redact_headers`
//! instead of the framework's default header dump (spec.md §4.5).

use axum::extract::Request;
use axum::http::{HeaderValue, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Router;
use charon_core::logging::{redact_headers, sanitize_for_log};
use std::time::Duration;
use tower_http::trace::TraceLayer;
use uuid::Uuid;

pub const REQUEST_ID_HEADER: &str = "x-request-id";

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    let message = payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic payload".to_string());
    sanitize_for_log(&message)
}

/// Runs the rest of the stack as its own tokio task so a handler panic can
/// be joined as an `Err` here, where the request's method/path/headers are
/// still in scope to log alongside it (spec.md §4.5). A `tokio::task_local`
/// set around `next.run` would not work for this: its value is dropped
/// while the panic unwinds through the scope, before `CatchPanicLayer`'s
/// separate `catch_unwind` boundary further up the stack ever sees it.
pub async fn request_context_layer(request: Request, next: Next) -> Response {
    let method = request.method().to_string();
    let path = sanitize_for_log(request.uri().path());
    let headers = redact_headers(request.headers());

    match tokio::spawn(next.run(request)).await {
        Ok(response) => response,
        Err(join_err) => {
            let message = match join_err.try_into_panic() {
                Ok(payload) => panic_message(&*payload),
                Err(_) => "task cancelled".to_string(),
            };
            tracing::error!(method, path, ?headers, panic = %message, "request handler panicked");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                axum::Json(serde_json::json!({ "error": "internal server error" })),
            )
                .into_response()
        },
    }
}

pub async fn request_id_layer(mut request: Request, next: Next) -> Response {
    let request_id = Uuid::new_v4().to_string();
    request.extensions_mut().insert(RequestId(request_id.clone()));

    let mut response = next.run(request).await;
    if let Ok(value) = HeaderValue::from_str(&request_id) {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }
    response
}

#[derive(Clone)]
pub struct RequestId(pub String);

/// Attaches a `TraceLayer` whose `on_request`/`on_response` hooks log
/// through the redaction helpers instead of dumping raw headers, satisfying
/// the cross-cutting invariant that no log line carries a sensitive header
/// value in full. A free function rather than a layer value so its
/// generated closures never need naming in a type signature.
pub fn with_redacted_tracing<S>(router: Router<S>) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    router.layer(
        TraceLayer::new_for_http()
            .make_span_with(|request: &Request| {
                let path = sanitize_for_log(request.uri().path());
                tracing::info_span!("http_request", method = %request.method(), path)
            })
            .on_request(|request: &Request, _span: &tracing::Span| {
                let headers = redact_headers(request.headers());
                tracing::debug!(?headers, "request received");
            })
            .on_response(|response: &Response, latency: Duration, _span: &tracing::Span| {
                tracing::info!(
                    status = response.status().as_u16(),
                    latency_ms = latency.as_millis() as u64,
                    "request completed"
                );
            }),
    )
}

/// Backstop for a panic `request_context_layer` did not catch (one
/// originating outside the task it spawns — CORS/body-limit layers sit
/// outside `CatchPanicLayer`, so this cannot happen in `build_router`'s own
/// stack, but any router built without `request_context_layer` still gets a
/// safe response instead of a closed connection). No request context is
/// available here, so the panic value is logged on its own.
pub fn panic_response(err: Box<dyn std::any::Any + Send>) -> Response {
    let message = panic_message(&*err);
    tracing::error!(panic = %message, "request handler panicked");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        axum::Json(serde_json::json!({ "error": "internal server error" })),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request as HttpRequest;
    use axum::routing::get;
    use tower::ServiceExt;

    async fn boom_handler() -> &'static str {
        panic!("kaboom")
    }

    #[tokio::test]
    async fn panicking_handler_returns_internal_server_error_json() {
        let app: Router = Router::new()
            .route("/boom", get(boom_handler))
            .layer(axum::middleware::from_fn(request_context_layer));

        let response = app
            .oneshot(HttpRequest::builder().uri("/boom").body(Body::empty()).unwrap())
            .await
            .expect("router never errors at the service layer");

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["error"], "internal server error");
    }

    #[tokio::test]
    async fn non_panicking_handler_is_unaffected() {
        let app: Router = Router::new()
            .route("/ok", get(|| async { "fine" }))
            .layer(axum::middleware::from_fn(request_context_layer));

        let response = app
            .oneshot(HttpRequest::builder().uri("/ok").body(Body::empty()).unwrap())
            .await
            .expect("router never errors at the service layer");

        assert_eq!(response.status(), StatusCode::OK);
    }
}
