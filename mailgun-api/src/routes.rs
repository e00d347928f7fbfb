//! `POST /send` and `POST /status` (§6).

use std::sync::Arc;

use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};
use mailgun_submission::{StatusAggregator, SubmissionAdapter, SubmissionRequest};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::auth::ClientRegistry;
use crate::error::{ApiError, ValidatedJson};

#[derive(Clone)]
pub struct AppState {
    pub submission: SubmissionAdapter,
    pub aggregator: StatusAggregator,
    pub clients: Arc<ClientRegistry>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/send", post(send))
        .route("/status", post(status))
        .fallback(not_found)
        .with_state(state)
}

async fn not_found() -> ApiError {
    ApiError::NotFound
}

#[derive(Debug, Deserialize)]
struct SendBody {
    #[serde(default)]
    client_id: String,
    #[serde(default)]
    sender: String,
    #[serde(default)]
    recipients: Vec<String>,
    #[serde(default)]
    subject: String,
    #[serde(default)]
    body: String,
}

async fn send(
    State(state): State<AppState>,
    ValidatedJson(body): ValidatedJson<SendBody>,
) -> Result<Json<Value>, ApiError> {
    if !state.clients.is_known(&body.client_id) {
        return Err(ApiError::UnauthorizedClient);
    }

    let submission_id = state
        .submission
        .submit(SubmissionRequest {
            client_id: body.client_id,
            sender: body.sender,
            recipients: body.recipients,
            subject: body.subject,
            body: body.body,
        })
        .await?;

    Ok(Json(json!({ "result": "queued", "submission_id": submission_id })))
}

#[derive(Debug, Deserialize)]
struct StatusBody {
    #[serde(default)]
    client_id: String,
    #[serde(default)]
    submission_id: String,
}

/// Unlike `/send`, an unknown submission id is reported in a 200 body
/// (`{result: "error", message: ...}`), not an HTTP error status -- only
/// client authentication produces a non-200 here (§6).
async fn status(
    State(state): State<AppState>,
    ValidatedJson(body): ValidatedJson<StatusBody>,
) -> Result<Json<Value>, ApiError> {
    if !state.clients.is_known(&body.client_id) {
        return Err(ApiError::UnauthorizedClient);
    }

    match state
        .aggregator
        .status_of(&body.client_id, &body.submission_id)
        .await
    {
        Ok(status) => Ok(Json(
            json!({ "result": "success", "status": status.as_str() }),
        )),
        Err(mailgun_submission::StatusError::UnknownSubmission { submission_id, .. }) => {
            Ok(Json(json!({
                "result": "error",
                "message": format!("unknown submission id {submission_id:?}"),
            })))
        }
        Err(mailgun_submission::StatusError::Proxy(e)) => Err(ApiError::Internal(e.to_string())),
    }
}
