//! HTTP trigger for dispatch runs.
use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use std::net::SocketAddr;
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info};

use crate::dispatch::{self, CampaignScope, DispatchError, DispatchSettings};
use crate::mailer::EmailSender;

#[derive(Clone)]
pub struct AppState {
    pub pool: SqlitePool,
    pub sender: Arc<dyn EmailSender>,
    pub settings: Arc<DispatchSettings>,
}

#[derive(Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct SendEmailsRequest {
    #[serde(default)]
    pub campaign_id: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
    /// `null` and absent both mean "respect the schedule".
    #[serde(default)]
    pub immediate: Option<bool>,
}

impl SendEmailsRequest {
    /// An empty body means "all active campaigns, on schedule".
    pub fn parse(body: &[u8]) -> Result<Self, ApiError> {
        if body.iter().all(u8::is_ascii_whitespace) {
            return Ok(Self::default());
        }
        let req: Self = serde_json::from_slice(body)
            .map_err(|e| ApiError::BadRequest(format!("invalid request body: {e}")))?;
        for (field, value) in [("campaignId", &req.campaign_id), ("userId", &req.user_id)] {
            if value.as_deref().is_some_and(|v| v.trim().is_empty()) {
                return Err(ApiError::BadRequest(format!("{field} must be non-empty")));
            }
        }
        Ok(req)
    }
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SendEmailsResponse {
    pub success: bool,
    pub emails_sent: u64,
    pub emails_failed: u64,
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: String,
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),
    #[error(transparent)]
    Dispatch(#[from] DispatchError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Dispatch(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = ErrorResponse {
            success: false,
            error: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/send-emails", post(send_emails))
        .route("/health", get(health))
        .with_state(state)
}

async fn health() -> &'static str {
    "ok"
}

async fn send_emails(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<SendEmailsResponse>, ApiError> {
    let req = SendEmailsRequest::parse(&body)?;
    let immediate = req.immediate.unwrap_or(false);
    let scope = CampaignScope::from_ids(req.campaign_id, req.user_id);
    info!(?scope, immediate, "dispatch requested");

    let report = dispatch::run(
        &state.pool,
        state.sender.as_ref(),
        &state.settings,
        &scope,
        immediate,
        Utc::now(),
    )
    .await
    .map_err(|err| {
        error!(%err, "dispatch failed");
        ApiError::from(err)
    })?;

    Ok(Json(SendEmailsResponse {
        success: true,
        emails_sent: report.summary.sent,
        emails_failed: report.summary.failed,
        message: format!(
            "Processed {} campaign(s): {} sent, {} failed",
            report.campaigns, report.summary.sent, report.summary.failed
        ),
    }))
}

/// Serve until Ctrl-C.
pub async fn serve(addr: SocketAddr, state: AppState) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "listening");
    axum::serve(listener, router(state))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutting down");
        })
        .await?;
    Ok(())
}
