use axum::{
    Json,
    http::{HeaderValue, StatusCode, header::RETRY_AFTER},
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;
use tracing::error;

use crate::{store::StoreError, validate::ValidationError};

#[derive(Error, Debug)]
pub enum AppError {
    #[error("malformed payload")]
    MalformedPayload,

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("rate limited")]
    RateLimited { retry_after: u64 },

    #[error("method not allowed")]
    MethodNotAllowed,

    #[error("failed to store submission")]
    Storage(#[from] StoreError),

    #[error("internal server error")]
    Internal,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match self {
            AppError::MalformedPayload | AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            AppError::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            AppError::Storage(_) | AppError::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        };

        // causes stay in the logs, clients only see the display text
        if let AppError::Storage(cause) = &self {
            error!("Store write failed: {cause}");
        }

        match self {
            AppError::RateLimited { retry_after } => {
                let mut response = (
                    status,
                    Json(json!({ "error": self.to_string(), "retryAfter": retry_after })),
                )
                    .into_response();
                response
                    .headers_mut()
                    .insert(RETRY_AFTER, HeaderValue::from(retry_after));

                response
            }
            _ => (status, Json(json!({ "error": self.to_string() }))).into_response(),
        }
    }
}

#[cfg(test)]
mod tests {
    use axum::body::to_bytes;
    use serde_json::Value;

    use super::*;
    use crate::validate::Field;

    async fn body_json(response: Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn missing_field_is_bad_request() {
        let response = AppError::from(ValidationError::MissingField(Field::Phone)).into_response();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await["error"], "phone is required");
    }

    #[tokio::test]
    async fn rate_limited_carries_retry_hint() {
        let response = AppError::RateLimited { retry_after: 3600 }.into_response();

        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers()[RETRY_AFTER], "3600");

        let body = body_json(response).await;
        assert_eq!(body["error"], "rate limited");
        assert_eq!(body["retryAfter"], 3600);
    }

    #[tokio::test]
    async fn storage_cause_is_not_leaked() {
        let cause = StoreError::Rejected {
            status: 401,
            body: "invalid api key sk-secret".to_string(),
        };
        let response = AppError::from(cause).into_response();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let body = body_json(response).await;
        assert_eq!(body["error"], "failed to store submission");
        assert!(!body.to_string().contains("sk-secret"));
    }
}
