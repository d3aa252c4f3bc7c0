//! HTTP routes: health, slash command, event challenge, report download.

use std::sync::Arc;

use axum::{
    Json, Router,
    body::Bytes,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{error, info, warn};

use keywordkit_core::BatchRequest;
use keywordkit_shared::{BatchId, Requester};

use crate::AppState;
use crate::dispatch::Job;
use crate::download::{self, DownloadError};
use crate::notify::Destination;
use crate::summary::{ACK_TEXT, BUSY_TEXT, USAGE_TEXT, ephemeral};
use crate::verify::{self, VerifyError};

type AppStateArc = Arc<AppState>;

pub fn health_routes() -> Router<AppStateArc> {
    Router::new().route("/", get(health))
}

pub fn slack_routes() -> Router<AppStateArc> {
    Router::new()
        .route("/slack/commands", post(slash_command))
        .route("/slack/events", post(slack_events))
}

pub fn download_routes() -> Router<AppStateArc> {
    Router::new().route("/download/:id", get(download_report))
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

/// Slash-command form payload. Unknown fields are ignored.
#[derive(Debug, Default, Deserialize)]
pub struct SlashCommand {
    #[serde(default)]
    pub command: String,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub channel_id: Option<String>,
    #[serde(default)]
    pub response_url: Option<String>,
}

/// Reject requests that are not signed with the configured secret.
fn check_signature(
    state: &AppState,
    headers: &HeaderMap,
    body: &[u8],
) -> Result<(), VerifyError> {
    verify::verify(
        &state.settings.signing_secret,
        headers,
        body,
        chrono::Utc::now().timestamp(),
        state.settings.max_request_age,
    )
    .inspect_err(|e| warn!(error = %e, "rejected unsigned or stale request"))
}

async fn slash_command(
    State(state): State<AppStateArc>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    if let Err(e) = check_signature(&state, &headers, &body) {
        return e.into_response();
    }
    let cmd: SlashCommand = match serde_urlencoded::from_bytes(&body) {
        Ok(cmd) => cmd,
        Err(e) => {
            warn!(error = %e, "malformed slash command payload");
            return StatusCode::BAD_REQUEST.into_response();
        }
    };

    let text = cmd.text.trim();
    if text.is_empty() {
        return Json(ephemeral(USAGE_TEXT)).into_response();
    }

    let response_url = match cmd.response_url {
        Some(url) if state.settings.accepts_response_url(&url) => Some(url),
        Some(url) => {
            warn!(response_url = %url, "ignoring response_url on a disallowed host");
            None
        }
        None => None,
    };

    let job = Job {
        request: BatchRequest {
            id: BatchId::new(),
            raw: text.to_string(),
            requester: Requester {
                user_id: cmd.user_id.clone(),
                channel_id: cmd.channel_id.clone(),
            },
            output_dir: state.settings.output_dir.clone(),
        },
        destination: Destination {
            response_url,
            channel_id: cmd.channel_id,
        },
    };

    match state.queue.submit(job) {
        Ok(ticket) => {
            info!(
                batch_id = %ticket.batch_id(),
                command = %cmd.command,
                user = cmd.user_id.as_deref().unwrap_or("-"),
                "keyword batch accepted"
            );
            Json(ephemeral(ACK_TEXT)).into_response()
        }
        Err(e) => {
            warn!(error = %e, "keyword batch rejected");
            Json(ephemeral(BUSY_TEXT)).into_response()
        }
    }
}

/// Answers the platform's URL verification challenge; other events are
/// acknowledged and ignored.
async fn slack_events(
    State(state): State<AppStateArc>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    if let Err(e) = check_signature(&state, &headers, &body) {
        return e.into_response();
    }
    let Ok(event) = serde_json::from_slice::<Value>(&body) else {
        return StatusCode::BAD_REQUEST.into_response();
    };
    match event.get("challenge") {
        Some(challenge) => Json(json!({ "challenge": challenge })).into_response(),
        None => StatusCode::OK.into_response(),
    }
}

#[derive(Debug, Deserialize)]
pub struct DownloadQuery {
    pub token: Option<String>,
}

async fn download_report(
    State(state): State<AppStateArc>,
    Path(id): Path<String>,
    Query(query): Query<DownloadQuery>,
) -> Result<Response, DownloadError> {
    let path = download::resolve(
        state.store.as_ref(),
        &state.settings.download_token,
        query.token.as_deref(),
        &id,
    )?;

    let bytes = tokio::fs::read(&path).await.map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            DownloadError::NotFound
        } else {
            error!(error = %e, path = %path.display(), "failed to read report");
            DownloadError::Internal
        }
    })?;

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "report.pdf".into());
    let disposition = format!("attachment; filename=\"{file_name}\"");
    Ok((
        [
            (header::CONTENT_TYPE, "application/pdf".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        bytes,
    )
        .into_response())
}
