//! Diagnostic envelope for failed broker requests.
//!
//! Any fatal error (missing behavior, update of an unknown instance,
//! malformed input) becomes a 500 with a JSON body describing what went
//! wrong. The process keeps serving.

use axum::http::header::CONTENT_TYPE;
use axum::http::{StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use broker_state::BrokerError;
use tracing::error;

/// Envelope rendered for fatal request errors.
#[derive(Debug, serde::Serialize)]
pub struct ErrorEnvelope {
    pub error: bool,
    pub message: String,
    pub path: String,
    pub timestamp: String,
    #[serde(rename = "type")]
    pub kind: String,
    /// The error and each of its sources, outermost first.
    pub backtrace: Vec<String>,
}

/// A broker error tied to the request that caused it.
#[derive(Debug)]
pub struct ApiError {
    pub error: BrokerError,
    pub path: String,
}

impl ApiError {
    pub fn new(error: BrokerError, uri: &Uri) -> Self {
        Self {
            error,
            path: uri.to_string(),
        }
    }

    pub fn envelope(&self) -> ErrorEnvelope {
        let mut backtrace = Vec::new();
        let mut source: Option<&dyn std::error::Error> = Some(&self.error);
        while let Some(err) = source {
            backtrace.push(err.to_string());
            source = err.source();
        }

        ErrorEnvelope {
            error: true,
            message: self.error.to_string(),
            path: self.path.clone(),
            timestamp: chrono::Utc::now().to_rfc3339(),
            kind: StatusCode::INTERNAL_SERVER_ERROR.as_u16().to_string(),
            backtrace,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        error!(path = %self.path, error = %self.error, "broker request failed");
        let body = serde_json::to_string_pretty(&self.envelope())
            .unwrap_or_else(|_| r#"{"error": true}"#.to_string());
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            [(CONTENT_TYPE, "application/json")],
            body,
        )
            .into_response()
    }
}
