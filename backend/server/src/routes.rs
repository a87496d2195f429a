//! # Intake
//!
//! One handler per form endpoint, every method routed to it.
//!
//! ## Flow
//!
//! 1. Rate limit on client identity, denied requests stop here (429)
//! 2. Decode and validate, bad bodies stop here (400)
//! 3. Notify the owner, outcome kept as a flag
//! 4. Store the record, failures stop here (500)
//! 5. Respond with the id and the notification flag
//!
//! Nothing is written or sent before steps 1 and 2 pass.
use std::sync::Arc;

use axum::{
    Json,
    body::to_bytes,
    extract::{Request, State as AxumState},
    http::{Method, StatusCode},
    response::{IntoResponse, Response},
};
use serde::Serialize;
use tracing::{info, warn};

use crate::{
    error::AppError,
    limiter::{Admission, retry_after_secs},
    notify::format_summary,
    state::State,
    store::SubmissionRecord,
    utils::RequestMeta,
    validate::{ContactForm, validate},
};

pub const MAX_BODY_BYTES: usize = 64 * 1024;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitResponse {
    pub success: bool,
    pub stored: bool,
    pub notification_sent: bool,
    pub id: String,
}

pub async fn contact_handler(AxumState(state): AxumState<Arc<State>>, request: Request) -> Response {
    let method = request.method().clone();

    match method {
        Method::OPTIONS => StatusCode::OK.into_response(),
        Method::POST => match submit_contact(state, request).await {
            Ok(submitted) => (StatusCode::OK, Json(submitted)).into_response(),
            Err(e) => e.into_response(),
        },
        _ => AppError::MethodNotAllowed.into_response(),
    }
}

async fn submit_contact(state: Arc<State>, request: Request) -> Result<SubmitResponse, AppError> {
    let (parts, body) = request.into_parts();
    let meta = RequestMeta::from_parts(&parts.headers, &parts.extensions);

    if let Admission::Denied { retry_after } = state.limiter.check(&meta.ip_address) {
        warn!("Rate limited {}", meta.ip_address);
        return Err(AppError::RateLimited {
            retry_after: retry_after_secs(retry_after),
        });
    }

    let bytes = to_bytes(body, MAX_BODY_BYTES)
        .await
        .map_err(|_| AppError::MalformedPayload)?;
    let form: ContactForm =
        serde_json::from_slice(&bytes).map_err(|_| AppError::MalformedPayload)?;
    let submission = validate(form)?;

    let delivery = state.notifier.send(&format_summary(&submission)).await;
    let notification_sent = delivery.is_sent();

    let record = SubmissionRecord::new(submission, meta, &delivery);
    let id = state.store.write(&record).await?;

    info!("Stored submission {id} (notification sent: {notification_sent})");

    Ok(SubmitResponse {
        success: true,
        stored: true,
        notification_sent,
        id,
    })
}
