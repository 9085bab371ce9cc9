use crate::Error;
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;

/// Failure of a web request, rendered as `{"success": false, "error": ...}`.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("Authentication required")]
    Unauthorized,

    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("{0}")]
    Forbidden(&'static str),

    #[error("{0}")]
    NotFound(String),

    #[error(transparent)]
    Operation(#[from] Error),

    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized | Self::InvalidCredentials => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Operation(Error::InvalidInput { .. } | Error::Precondition(_) | Error::Cancelled) => {
                StatusCode::BAD_REQUEST
            }
            Self::Operation(Error::Timeout { .. }) => StatusCode::GATEWAY_TIMEOUT,
            Self::Operation(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<tokio::task::JoinError> for ApiError {
    fn from(err: tokio::task::JoinError) -> Self {
        Self::Internal(format!("operation task failed: {err}"))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }
        let body = match &self {
            Self::Operation(err) if !err.excerpt().is_empty() => json!({
                "success": false,
                "error": self.to_string(),
                "output": err.excerpt().join("\n"),
            }),
            _ => json!({ "success": false, "error": self.to_string() }),
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            ApiError::from(Error::invalid("PDB name", "1X", "must start with a letter")).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::from(Error::Timeout {
                tool: "bash".to_string(),
                after: Duration::from_secs(120),
            })
            .status(),
            StatusCode::GATEWAY_TIMEOUT
        );
        assert_eq!(
            ApiError::from(Error::ToolFailed {
                tool: "sqlplus".to_string(),
                exit_code: 1,
                excerpt: Vec::new(),
                log: None,
            })
            .status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(ApiError::Unauthorized.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            ApiError::NotFound("Job not found".to_string()).status(),
            StatusCode::NOT_FOUND
        );
    }

    #[tokio::test]
    async fn test_body_carries_excerpt() {
        let err = ApiError::from(Error::ToolFailed {
            tool: "sqlplus".to_string(),
            exit_code: 1,
            excerpt: vec!["ORA-01109: database not open".to_string()],
            log: None,
        });
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let value: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(value.get("success"), Some(&json!(false)));
        assert_eq!(value.get("error"), Some(&json!("sqlplus failed (exit code 1)")));
        assert_eq!(value.get("output"), Some(&json!("ORA-01109: database not open")));
    }
}
