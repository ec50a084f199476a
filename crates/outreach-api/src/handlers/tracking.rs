//! Open pixel, click redirect, unsubscribe page and inbound webhooks
//!
//! The public endpoints answer the same way whether or not the token resolves;
//! ingestion failures are logged and never surface to the recipient.

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{Html, IntoResponse, Response},
    Json,
};
use chrono::Utc;
use outreach_core::tracking::verify_webhook_signature;
use outreach_core::BounceEvent;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, warn};

use crate::state::AppState;

/// 1x1 transparent GIF
pub const TRACKING_PIXEL: &[u8] = &[
    0x47, 0x49, 0x46, 0x38, 0x39, 0x61, 0x01, 0x00, 0x01, 0x00, 0x80, 0x00, 0x00, 0x00, 0x00,
    0x00, 0xff, 0xff, 0xff, 0x21, 0xf9, 0x04, 0x01, 0x00, 0x00, 0x00, 0x00, 0x2c, 0x00, 0x00,
    0x00, 0x00, 0x01, 0x00, 0x01, 0x00, 0x00, 0x02, 0x01, 0x44, 0x00, 0x3b,
];

/// Header carrying the hex HMAC-SHA256 of a webhook body
pub const SIGNATURE_HEADER: &str = "x-outreach-signature";

const UNSUBSCRIBE_PAGE: &str = "<!DOCTYPE html>\n<html>\n<head><meta charset=\"utf-8\"><title>Unsubscribed</title></head>\n<body>\n<h1>You have been unsubscribed</h1>\n<p>You will not receive any further emails from us.</p>\n</body>\n</html>\n";

/// Error response
#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

fn error_response(status: StatusCode, error: &str, message: impl Into<String>) -> Response {
    (
        status,
        Json(ErrorResponse {
            error: error.to_string(),
            message: message.into(),
        }),
    )
        .into_response()
}

/// Webhook acknowledgement
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuccessResponse {
    pub success: bool,
}

/// `GET /c/:id` query
#[derive(Debug, Deserialize)]
pub struct ClickQuery {
    pub url: Option<String>,
}

/// `POST /reply` body
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplyRequest {
    pub tracking_id: String,
}

/// `GET /o/:id`: always the pixel
pub async fn open(State(state): State<Arc<AppState>>, Path(tracking_id): Path<String>) -> Response {
    if let Err(e) = state.ingester.record_open(&tracking_id, Utc::now()).await {
        error!(tracking_id = %tracking_id, "Failed to record open: {}", e);
    }

    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "image/gif"),
            (
                header::CACHE_CONTROL,
                "no-store, no-cache, must-revalidate, proxy-revalidate",
            ),
            (header::PRAGMA, "no-cache"),
            (header::EXPIRES, "0"),
        ],
        TRACKING_PIXEL,
    )
        .into_response()
}

/// `GET /c/:id?url=`: record, then 302 to the target
pub async fn click(
    State(state): State<Arc<AppState>>,
    Path(tracking_id): Path<String>,
    Query(query): Query<ClickQuery>,
) -> Response {
    let Some(url) = query.url.filter(|u| !u.is_empty()) else {
        return error_response(StatusCode::BAD_REQUEST, "bad_request", "Missing url parameter");
    };
    let Ok(location) = HeaderValue::from_str(&url) else {
        return error_response(StatusCode::BAD_REQUEST, "bad_request", "Invalid url parameter");
    };

    if let Err(e) = state.ingester.record_click(&tracking_id, &url, Utc::now()).await {
        error!(tracking_id = %tracking_id, "Failed to record click: {}", e);
    }

    (StatusCode::FOUND, [(header::LOCATION, location)]).into_response()
}

/// `GET /u/:id`: record, then a confirmation page
pub async fn unsubscribe(
    State(state): State<Arc<AppState>>,
    Path(tracking_id): Path<String>,
) -> Html<&'static str> {
    if let Err(e) = state.ingester.record_unsubscribe(&tracking_id).await {
        error!(tracking_id = %tracking_id, "Failed to record unsubscribe: {}", e);
    }
    Html(UNSUBSCRIBE_PAGE)
}

fn signature_valid(state: &AppState, headers: &HeaderMap, body: &[u8]) -> bool {
    let Some(secret) = state.bounce_webhook_secret.as_deref() else {
        return true;
    };
    headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .map_or(false, |signature| verify_webhook_signature(secret, body, signature))
}

/// `POST /bounce`
pub async fn bounce(State(state): State<Arc<AppState>>, headers: HeaderMap, body: Bytes) -> Response {
    if !signature_valid(&state, &headers, &body) {
        warn!("Rejected bounce webhook with bad signature");
        return error_response(StatusCode::UNAUTHORIZED, "unauthorized", "Invalid signature");
    }
    let event: BounceEvent = match serde_json::from_slice(&body) {
        Ok(event) => event,
        Err(e) => {
            return error_response(StatusCode::BAD_REQUEST, "bad_request", e.to_string());
        }
    };
    if event.message_id.is_none() && event.email.is_none() {
        return error_response(
            StatusCode::BAD_REQUEST,
            "bad_request",
            "messageId or email is required",
        );
    }

    if let Err(e) = state.ingester.record_bounce(&event, Utc::now()).await {
        error!("Failed to record bounce: {}", e);
        return error_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            e.code(),
            "Failed to record bounce",
        );
    }
    Json(SuccessResponse { success: true }).into_response()
}

/// `POST /reply`
pub async fn reply(State(state): State<Arc<AppState>>, headers: HeaderMap, body: Bytes) -> Response {
    if !signature_valid(&state, &headers, &body) {
        warn!("Rejected reply webhook with bad signature");
        return error_response(StatusCode::UNAUTHORIZED, "unauthorized", "Invalid signature");
    }
    let request: ReplyRequest = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(e) => {
            return error_response(StatusCode::BAD_REQUEST, "bad_request", e.to_string());
        }
    };

    if let Err(e) = state.ingester.record_reply(&request.tracking_id, Utc::now()).await {
        error!(tracking_id = %request.tracking_id, "Failed to record reply: {}", e);
        return error_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            e.code(),
            "Failed to record reply",
        );
    }
    Json(SuccessResponse { success: true }).into_response()
}
