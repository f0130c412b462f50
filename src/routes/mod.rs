//! HTTP route handlers
//!
//! Each submodule owns one URL prefix and exposes a `handle_*_request`
//! dispatcher that the server calls with the full path. Shared response
//! helpers live here.

pub mod auth_routes;
pub mod bookmarks;
pub mod guards;
pub mod health;
pub mod posts;
pub mod users;
pub mod verification;

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::{Request, Response, StatusCode};
use serde::{Deserialize, Serialize};

use crate::types::AgoraError;

pub type BoxBody = http_body_util::combinators::BoxBody<Bytes, hyper::Error>;

/// Maximum accepted request body size in bytes
const MAX_BODY_BYTES: usize = 65536;

/// Standard error payload
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

/// Standard success payload for operations with no other output
#[derive(Debug, Serialize)]
pub struct SuccessResponse {
    pub success: bool,
    pub message: String,
}

pub fn json_response<T: Serialize>(status: StatusCode, body: &T) -> Response<BoxBody> {
    let json = serde_json::to_string(body).unwrap_or_else(|_| "{}".to_string());

    Response::builder()
        .status(status)
        .header("Content-Type", "application/json")
        .header("Access-Control-Allow-Origin", "*")
        .header("Access-Control-Allow-Methods", "GET, POST, PUT, DELETE, OPTIONS")
        .header("Access-Control-Allow-Headers", "Content-Type, Authorization")
        .body(full_body(json))
        .unwrap()
}

pub fn error_response(status: StatusCode, error: &str, code: Option<&str>) -> Response<BoxBody> {
    json_response(
        status,
        &ErrorResponse {
            error: error.to_string(),
            code: code.map(|c| c.to_string()),
        },
    )
}

/// Render an [`AgoraError`] as the standard error payload.
///
/// Driver and infrastructure errors are logged here and replaced with a
/// generic body; clients never see storage-engine detail.
pub fn fail(err: AgoraError) -> Response<BoxBody> {
    let status = err.status_code();
    let message = match &err {
        AgoraError::Database(detail) => {
            tracing::error!("Database error: {}", detail);
            "A storage error occurred".to_string()
        }
        AgoraError::Internal(detail) => {
            tracing::error!("Internal error: {}", detail);
            "An internal error occurred".to_string()
        }
        AgoraError::Config(detail) => {
            tracing::error!("Configuration error: {}", detail);
            "An internal error occurred".to_string()
        }
        _ => err.to_string(),
    };
    error_response(status, &message, None)
}

pub fn cors_preflight() -> Response<BoxBody> {
    Response::builder()
        .status(StatusCode::NO_CONTENT)
        .header("Access-Control-Allow-Origin", "*")
        .header("Access-Control-Allow-Methods", "GET, POST, PUT, DELETE, OPTIONS")
        .header("Access-Control-Allow-Headers", "Content-Type, Authorization")
        .header("Access-Control-Max-Age", "86400")
        .body(empty_body())
        .unwrap()
}

pub fn not_found() -> Response<BoxBody> {
    error_response(StatusCode::NOT_FOUND, "Not found", None)
}

pub fn full_body(data: impl Into<Bytes>) -> BoxBody {
    Full::new(data.into())
        .map_err(|never| match never {})
        .boxed()
}

pub fn empty_body() -> BoxBody {
    Full::new(Bytes::new())
        .map_err(|never| match never {})
        .boxed()
}

pub async fn parse_json_body<T: for<'de> Deserialize<'de>>(
    req: Request<Incoming>,
) -> Result<T, AgoraError> {
    let body = req
        .collect()
        .await
        .map_err(|e| AgoraError::Http(format!("Failed to read body: {}", e)))?;

    let bytes = body.to_bytes();
    if bytes.len() > MAX_BODY_BYTES {
        return Err(AgoraError::Http("Request body too large".into()));
    }

    serde_json::from_slice(&bytes).map_err(|e| AgoraError::Http(format!("Invalid JSON: {}", e)))
}

pub fn get_auth_header(req: &Request<Incoming>) -> Option<&str> {
    req.headers()
        .get(hyper::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn body_string(response: Response<BoxBody>) -> String {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn test_fail_hides_storage_detail() {
        let response = fail(AgoraError::Database(
            "E11000 duplicate key on cluster-internal-host:27017".into(),
        ));
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

        let body = body_string(response).await;
        assert!(body.contains("storage error"));
        assert!(!body.contains("E11000"));
        assert!(!body.contains("27017"));
    }

    #[tokio::test]
    async fn test_fail_hides_internal_detail() {
        let response = fail(AgoraError::Internal("secret path /etc/agora".into()));
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(!body_string(response).await.contains("/etc/agora"));
    }

    #[tokio::test]
    async fn test_fail_keeps_client_error_messages() {
        let response = fail(AgoraError::BadRequest("Post content cannot be empty".into()));
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(body_string(response).await.contains("Post content cannot be empty"));
    }
}
