use crate::core::StoreError;
use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::{Map, Value, json};
use thiserror::Error;

/// Every failure the gateway reports, rendered as
/// `{"error": {"reason", "status", ...context}}`
#[derive(Debug, Clone, PartialEq, Error)]
pub enum GatewayError {
    #[error("invalid request body: {message}")]
    InvalidBody { message: String },

    #[error("connection failed: {message}")]
    ConnectionFailed { message: String, code: Option<i32> },

    #[error("not found: {message}")]
    NotFound {
        action: Option<String>,
        path: Option<String>,
        message: String,
    },

    #[error("no response within {timeout_ms} ms")]
    Timeout { timeout_ms: u64 },

    #[error("method {method} not allowed")]
    MethodNotAllowed { method: String },
}

impl GatewayError {
    pub fn invalid_body(message: impl Into<String>) -> Self {
        Self::InvalidBody {
            message: message.into(),
        }
    }

    /// A path that does not match any route shape
    pub fn unknown_route(path: &str) -> Self {
        Self::NotFound {
            action: None,
            path: Some(path.to_string()),
            message: format!("no route for {}", path),
        }
    }

    /// Unknown actions and actions the driver rejected look the same to callers
    pub fn action_failed(action: &str, err: &StoreError) -> Self {
        Self::NotFound {
            action: Some(action.to_string()),
            path: None,
            message: err.to_string(),
        }
    }

    pub fn reason(&self) -> &'static str {
        match self {
            Self::InvalidBody { .. } => "invalid_body",
            Self::ConnectionFailed { .. } => "connection_failed",
            Self::NotFound { .. } => "not_found",
            Self::Timeout { .. } => "timeout",
            Self::MethodNotAllowed { .. } => "method_not_allowed",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::InvalidBody { .. } | Self::ConnectionFailed { .. } => StatusCode::BAD_REQUEST,
            Self::NotFound { .. } => StatusCode::NOT_FOUND,
            Self::Timeout { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            Self::MethodNotAllowed { .. } => StatusCode::METHOD_NOT_ALLOWED,
        }
    }

    pub fn envelope(&self) -> Value {
        let mut error = Map::new();
        error.insert("reason".into(), Value::from(self.reason()));
        error.insert("status".into(), Value::from(self.status().as_u16()));

        match self {
            Self::InvalidBody { message } => {
                error.insert("message".into(), Value::from(message.as_str()));
            }
            Self::ConnectionFailed { message, code } => {
                error.insert("message".into(), Value::from(message.as_str()));
                if let Some(code) = code {
                    error.insert("code".into(), Value::from(*code));
                }
            }
            Self::NotFound {
                action,
                path,
                message,
            } => {
                if let Some(action) = action {
                    error.insert("action".into(), Value::from(action.as_str()));
                }
                if let Some(path) = path {
                    error.insert("path".into(), Value::from(path.as_str()));
                }
                error.insert("message".into(), Value::from(message.as_str()));
            }
            Self::Timeout { timeout_ms } => {
                error.insert("timeout_ms".into(), Value::from(*timeout_ms));
            }
            Self::MethodNotAllowed { method } => {
                error.insert("method".into(), Value::from(method.as_str()));
            }
        }

        json!({ "error": error })
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        (self.status(), Json(self.envelope())).into_response()
    }
}

pub type Result<T> = std::result::Result<T, GatewayError>;
