//! Shared-secret guarded lookup of rendered reports.

use std::path::PathBuf;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use tracing::error;

use keywordkit_shared::BatchId;
use keywordkit_storage::BatchStore;

/// Why a download was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum DownloadError {
    /// Missing or wrong token.
    #[error("unauthorized")]
    Unauthorized,
    /// Unknown batch, or the artifact is gone.
    #[error("not found")]
    NotFound,
    /// The store could not be read.
    #[error("internal error")]
    Internal,
}

impl IntoResponse for DownloadError {
    fn into_response(self) -> Response {
        let status = match self {
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, self.to_string()).into_response()
    }
}

/// Check `provided` against the configured secret.
pub fn authorize(expected: &str, provided: Option<&str>) -> Result<(), DownloadError> {
    match provided {
        Some(token) if constant_time_eq(expected.as_bytes(), token.as_bytes()) => Ok(()),
        _ => Err(DownloadError::Unauthorized),
    }
}

/// Authorize, then resolve `id` to the artifact path on disk.
///
/// The token is checked first, so an unauthorized caller learns nothing
/// about which batches exist.
pub fn resolve(
    store: &dyn BatchStore,
    expected_token: &str,
    provided_token: Option<&str>,
    id: &str,
) -> Result<PathBuf, DownloadError> {
    authorize(expected_token, provided_token)?;

    let batch_id: BatchId = id.parse().map_err(|_| DownloadError::NotFound)?;
    let record = store
        .get(&batch_id)
        .map_err(|e| {
            error!(error = %e, %batch_id, "batch store read failed");
            DownloadError::Internal
        })?
        .ok_or(DownloadError::NotFound)?;

    if !record.artifact.path.is_file() {
        return Err(DownloadError::NotFound);
    }
    Ok(record.artifact.path.clone())
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
