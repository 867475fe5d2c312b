use axum::{
    Json,
    extract::{FromRef, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::error::IngestError;
use crate::health::Readiness;
use crate::ingest::{IngestRequest, Orchestrator, SourceFetcher};
use crate::storage::{Database, VulnerabilityQuery};

/// Application state shared across handlers
pub struct AppState<F: SourceFetcher> {
    pub db: Database,
    pub orchestrator: Arc<Orchestrator<F>>,
    pub readiness: Readiness,
}

impl<F: SourceFetcher> Clone for AppState<F> {
    fn clone(&self) -> Self {
        Self {
            db: self.db.clone(),
            orchestrator: Arc::clone(&self.orchestrator),
            readiness: self.readiness.clone(),
        }
    }
}

impl<F: SourceFetcher> FromRef<AppState<F>> for Readiness {
    fn from_ref(state: &AppState<F>) -> Self {
        state.readiness.clone()
    }
}

/// Body of a query request
#[derive(Debug, Deserialize)]
pub struct QueryRequest {
    #[serde(default)]
    pub filters: HashMap<String, String>,
}

/// Error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// Scan response
#[derive(Debug, Serialize)]
pub struct ScanResponse {
    pub status: String,
}

fn error_response(status: StatusCode, message: &str) -> Response {
    (
        status,
        Json(ErrorResponse {
            error: message.to_string(),
        }),
    )
        .into_response()
}

// ============================================
// Handlers
// ============================================

/// Run a full ingestion for the requested repository.
///
/// The run is detached from the request, so a client that disconnects
/// mid-run does not leave the store half reset.
pub async fn scan<F: SourceFetcher + 'static>(
    State(state): State<AppState<F>>,
    Json(request): Json<IngestRequest>,
) -> Response {
    debug!(repo = %request.repo, files = ?request.files, "Received scan request");

    let orchestrator = Arc::clone(&state.orchestrator);
    match orchestrator.run_detached(request.clone()).await {
        Ok(report) => {
            info!(
                repo = %request.repo,
                scans_inserted = report.summary.scans_inserted,
                duration_ms = report.duration_ms,
                "Scan request completed"
            );
            (
                StatusCode::OK,
                Json(ScanResponse {
                    status: "Scan completed".to_string(),
                }),
            )
                .into_response()
        }
        Err(IngestError::EmptySelection) => {
            warn!(repo = %request.repo, "Scan request selected no files");
            error_response(
                StatusCode::BAD_REQUEST,
                &IngestError::EmptySelection.to_string(),
            )
        }
        Err(e) => {
            error!(repo = %request.repo, error = %e, "Scan request failed");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Scan failed")
        }
    }
}

/// Filtered vulnerability read
pub async fn query<F: SourceFetcher>(
    State(state): State<AppState<F>>,
    Json(request): Json<QueryRequest>,
) -> Response {
    let query = match VulnerabilityQuery::from_map(&request.filters) {
        Ok(query) => query,
        Err(e) => {
            warn!(error = %e, "Rejected query filter");
            return error_response(StatusCode::BAD_REQUEST, "Unsupported query filter");
        }
    };

    match state.db.query_vulnerabilities(&query) {
        Ok(rows) => (StatusCode::OK, Json(rows)).into_response(),
        Err(e) => {
            error!(error = %e, "Failed to query vulnerabilities");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Query failed")
        }
    }
}

/// Store statistics
pub async fn get_stats<F: SourceFetcher>(State(state): State<AppState<F>>) -> Response {
    match state.db.get_stats() {
        Ok(stats) => (StatusCode::OK, Json(stats)).into_response(),
        Err(e) => {
            error!(error = %e, "Failed to get stats");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Failed to get stats")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::IngestSettings;
    use crate::ingest::GitFetcher;
    use crate::model::{NormalizedRecord, ScanReport};
    use tempfile::TempDir;

    fn state(dir: &TempDir) -> AppState<GitFetcher> {
        let db = Database::new(":memory:").unwrap();
        let settings = IngestSettings {
            workspace_path: dir.path().join("workspace").to_string_lossy().into_owned(),
            max_concurrent_files: 3,
            file_timeout: None,
        };
        let orchestrator = Orchestrator::new(db.clone(), GitFetcher::new(1, 0), &settings);
        AppState {
            db,
            orchestrator: Arc::new(orchestrator),
            readiness: Readiness::new(),
        }
    }

    #[tokio::test]
    async fn test_scan_with_git_fetch_failure_is_server_error() {
        let dir = TempDir::new().unwrap();
        let state = state(&dir);
        let missing = dir.path().join("no-such-repo").to_string_lossy().into_owned();

        let response = scan(
            State(state),
            Json(IngestRequest {
                repo: missing,
                files: vec![],
            }),
        )
        .await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn test_stats_endpoint() {
        let dir = TempDir::new().unwrap();
        let state = state(&dir);
        state
            .db
            .save_records(vec![NormalizedRecord {
                scan: ScanReport {
                    scan_id: "scan123".to_string(),
                    ..ScanReport::default()
                },
                vulnerabilities: vec![],
            }])
            .unwrap();

        let response = get_stats(State(state)).await;
        assert_eq!(response.status(), StatusCode::OK);
    }
}
