use super::credentials;
use super::error::GatewayError;
use super::guard::{Outcome, ResponseGate, TimeoutGuard};
use super::normalize::normalize;
use super::provider::ConnectionProvider;
use super::target::{self, RequestContext, RoutePlan};
use axum::Json;
use axum::Router;
use axum::body::{Body, to_bytes};
use axum::extract::{DefaultBodyLimit, State};
use axum::http::{HeaderMap, HeaderValue, Method, StatusCode, Uri, header};
use axum::response::{IntoResponse, Response};
use serde_json::Value;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tower_http::trace::TraceLayer;
use tracing::{debug, warn};

/// Largest request body read by default (16 MiB)
pub const DEFAULT_MAX_BODY_BYTES: usize = 16 * 1024 * 1024;

/// Shared by every request
#[derive(Debug, Clone)]
pub struct GatewayState {
    provider: Arc<ConnectionProvider>,
    request_timeout: Duration,
    max_body_bytes: usize,
    next_request_id: Arc<AtomicU64>,
}

impl GatewayState {
    pub fn new(provider: ConnectionProvider, request_timeout: Duration) -> Self {
        Self {
            provider: Arc::new(provider),
            request_timeout,
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
            next_request_id: Arc::new(AtomicU64::new(1)),
        }
    }

    pub fn with_body_limit(mut self, max_body_bytes: usize) -> Self {
        self.max_body_bytes = max_body_bytes;
        self
    }

    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    pub fn max_body_bytes(&self) -> usize {
        self.max_body_bytes
    }
}

/// Every path and method lands in the same handler; routing happens on the
/// path segments. The body limit is enforced by the handler itself, after the
/// method check, so oversized requests still get an error envelope.
pub fn gateway_router(state: GatewayState) -> Router {
    Router::new()
        .fallback(handle_request)
        .with_state(state)
        .layer(DefaultBodyLimit::disable())
        .layer(TraceLayer::new_for_http())
}

async fn handle_request(
    State(state): State<GatewayState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Body,
) -> Response {
    let request_id = state.next_request_id.fetch_add(1, Ordering::Relaxed);
    let timeout_ms = u64::try_from(state.request_timeout.as_millis()).unwrap_or(u64::MAX);

    let (gate, receiver) = ResponseGate::new();
    let guard = TimeoutGuard::arm(Arc::clone(&gate), state.request_timeout, request_id);

    let authorization = headers.get(header::AUTHORIZATION).cloned();
    let path = uri.path().to_string();
    tokio::spawn(async move {
        let outcome = dispatch(&state, request_id, method, &path, authorization, body).await;
        if !gate.publish(outcome) {
            warn!(request_id, path = %path, "discarding result completed after the deadline");
        }
    });

    // a dispatch task that dies without publishing leaves the deadline to answer
    let outcome = receiver
        .await
        .unwrap_or(Err(GatewayError::Timeout { timeout_ms }));
    guard.disarm();

    match outcome {
        Ok(value) => (StatusCode::OK, Json(value)).into_response(),
        Err(err) => err.into_response(),
    }
}

async fn dispatch(
    state: &GatewayState,
    request_id: u64,
    method: Method,
    path: &str,
    authorization: Option<HeaderValue>,
    body: Body,
) -> Outcome {
    if method != Method::POST {
        return Err(GatewayError::MethodNotAllowed {
            method: method.to_string(),
        });
    }

    let body = to_bytes(body, state.max_body_bytes).await.map_err(|err| {
        GatewayError::invalid_body(format!(
            "request body unreadable or larger than {} bytes: {}",
            state.max_body_bytes, err
        ))
    })?;
    let args = parse_arguments(&body)?;
    let plan = RoutePlan::parse(path).ok_or_else(|| GatewayError::unknown_route(path))?;
    let credential = credentials::extract(authorization.as_ref());
    let context = RequestContext::new(request_id, plan, args, credential);

    let lease = state
        .provider
        .acquire(context.credential.as_ref(), request_id)
        .await?;
    let target = target::resolve(&lease, &context);
    debug!(request_id, level = target.level(), action = %context.action, "dispatching");

    let raw = target
        .invoke(&context.action, &context.args)
        .await
        .map_err(|err| GatewayError::action_failed(&context.action, &err))?;
    normalize(raw)
        .await
        .map_err(|err| GatewayError::action_failed(&context.action, &err))
}

/// The body is the argument list: a JSON array, or nothing at all
fn parse_arguments(body: &[u8]) -> Result<Vec<Value>, GatewayError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(Vec::new());
    }

    match serde_json::from_slice(body) {
        Ok(Value::Array(args)) => Ok(args),
        Ok(other) => Err(GatewayError::invalid_body(format!(
            "expected a JSON array of arguments, got {}",
            crate::core::value::type_name(&other)
        ))),
        Err(err) => Err(GatewayError::invalid_body(err.to_string())),
    }
}
