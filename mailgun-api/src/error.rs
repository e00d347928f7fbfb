//! Maps the error taxonomy of §7 onto HTTP responses. Validation and
//! authentication errors are reported directly; anything unexpected
//! becomes a 500.

use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("unknown client_id")]
    UnauthorizedClient,
    #[error("{0}")]
    Validation(String),
    #[error("unsupported media type")]
    UnsupportedMediaType,
    #[error("not found")]
    NotFound,
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        match rejection {
            JsonRejection::MissingJsonContentType(_) => Self::UnsupportedMediaType,
            other => Self::Validation(other.body_text()),
        }
    }
}

impl From<mailgun_submission::ValidationError> for ApiError {
    fn from(err: mailgun_submission::ValidationError) -> Self {
        Self::Validation(err.to_string())
    }
}

impl From<mailgun_submission::SubmissionError> for ApiError {
    fn from(err: mailgun_submission::SubmissionError) -> Self {
        match err {
            mailgun_submission::SubmissionError::Validation(e) => Self::Validation(e.to_string()),
            mailgun_submission::SubmissionError::Proxy(e) => Self::Internal(e.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            Self::UnauthorizedClient => (StatusCode::UNAUTHORIZED, self.to_string()),
            Self::Validation(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            Self::UnsupportedMediaType => (StatusCode::UNSUPPORTED_MEDIA_TYPE, self.to_string()),
            Self::NotFound => (StatusCode::NOT_FOUND, self.to_string()),
            Self::Internal(msg) => {
                tracing::error!(error = %msg, "internal error serving request");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal error".to_string())
            }
        };
        (status, Json(json!({ "result": "error", "message": message }))).into_response()
    }
}

/// `Json<T>` with rejections mapped onto `ApiError` (so a non-JSON body
/// yields 415, per §6, instead of axum's default 415-as-plain-text).
pub struct ValidatedJson<T>(pub T);

impl<T, S> axum::extract::FromRequest<S> for ValidatedJson<T>
where
    T: serde::de::DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(
        req: axum::extract::Request,
        state: &S,
    ) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state).await?;
        Ok(Self(value))
    }
}
