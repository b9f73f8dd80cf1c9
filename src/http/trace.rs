//! Request tracing for served routers.
//!
//! Wraps each request in a tracing span carrying a request ID and, when
//! the router is served over TLS, the serial number of the certificate
//! that was active when the request arrived. Certificates rotate in place
//! while the accept loop runs, so the serial is what ties a logged request
//! to the rotation generation that served it.
//!
//! Hosts opt in by layering the middleware with the provider of the
//! server that serves the router (or `None` for plain HTTP):
//!
//! ```ignore
//! let app = app.layer(middleware::from_fn_with_state(
//!     Some(tls_server.provider().clone()),
//!     trace::request_span,
//! ));
//! ```

use std::sync::Arc;
use std::time::Instant;

use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::Response;
use tracing::Instrument;
use uuid::Uuid;

use crate::tls::provider::SelfSignedProvider;

/// Request extension holding the generated request ID, for handlers that
/// want to echo it (e.g. into a response header).
#[derive(Clone, Debug)]
pub struct RequestId(pub Uuid);

/// Middleware wrapping each request in a span.
///
/// The state is the certificate provider of the serving variant, present
/// when serving TLS. Its active serial is recorded as `tls_serial` so
/// requests straddling a rotation boundary can be told apart; plain HTTP
/// leaves the field empty.
pub async fn request_span(
    State(tls): State<Option<Arc<SelfSignedProvider>>>,
    mut request: Request,
    next: Next,
) -> Response {
    let request_id = Uuid::new_v4();

    let span = tracing::info_span!(
        "http_request",
        request_id = %request_id,
        method = %request.method(),
        path = %request.uri().path(),
        tls_serial = tracing::field::Empty,
        status = tracing::field::Empty,
        duration_ms = tracing::field::Empty,
    );

    if let Some(provider) = &tls {
        span.record("tls_serial", provider.snapshot().serial);
    }

    request.extensions_mut().insert(RequestId(request_id));

    let start = Instant::now();
    async move {
        let response = next.run(request).await;

        let span = tracing::Span::current();
        span.record("status", response.status().as_u16());
        span.record("duration_ms", start.elapsed().as_millis() as u64);
        tracing::info!("Request completed");

        response
    }
    .instrument(span)
    .await
}
