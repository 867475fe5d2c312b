pub mod api;

use anyhow::Result;
use axum::{
    Router,
    http::{Method, header},
    routing::{get, post},
};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use crate::config::Config;
use crate::health::{self, Readiness};
use crate::ingest::{GitFetcher, Orchestrator, SourceFetcher};
use crate::storage::Database;
use api::AppState;

/// Build the HTTP router
pub fn router<F: SourceFetcher + 'static>(state: AppState<F>) -> Router {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST])
        .allow_origin(Any)
        .allow_headers([header::CONTENT_TYPE]);

    Router::new()
        .route("/healthz", get(health::healthz))
        .route("/readyz", get(health::readyz))
        .route("/scan", post(api::scan::<F>))
        .route("/query", post(api::query::<F>))
        .route("/api/v1/stats", get(api::get_stats::<F>))
        .layer(cors)
        .with_state(state)
}

pub async fn run(
    config: Config,
    readiness: Readiness,
    mut shutdown: tokio::sync::watch::Receiver<bool>,
) -> Result<()> {
    info!(
        port = config.server_port,
        storage_path = %config.storage_path,
        workspace_path = %config.workspace_path,
        "Starting server mode"
    );

    let db = Database::new(&config.get_db_path())?;
    let fetcher = GitFetcher::new(config.fetch_retry_attempts, config.fetch_retry_delay_secs);
    let orchestrator = Arc::new(Orchestrator::new(
        db.clone(),
        fetcher,
        &config.ingest_settings(),
    ));

    let state = AppState {
        db,
        orchestrator,
        readiness: readiness.clone(),
    };

    let app = router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server_port));
    let listener = tokio::net::TcpListener::bind(addr).await?;

    info!(addr = %addr, "Server listening");

    readiness.set_ready(true);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown.changed().await;
            info!("Server shutting down");
        })
        .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::IngestSettings;
    use crate::error::IngestError;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use http_body_util::BodyExt;
    use serde_json::{Value, json};
    use std::path::Path;
    use tempfile::TempDir;
    use tower::ServiceExt;

    const REPORT: &str = r#"[{"scanResults": {
        "scan_id": "scan123",
        "scan_status": "completed",
        "vulnerabilities": [
            {"id": "CVE-2024-0001", "severity": "HIGH", "cvss": 8.1,
             "package_name": "openssl", "risk_factors": ["Remote Code Execution"]}
        ]
    }}]"#;

    /// Writes `report.json` into the workspace unless the locator is `unreachable`
    struct ReportFetcher;

    impl SourceFetcher for ReportFetcher {
        async fn fetch(&self, locator: &str, dest: &Path) -> Result<(), IngestError> {
            if locator == "unreachable" {
                return Err(IngestError::Fetch {
                    locator: locator.to_string(),
                    attempts: 1,
                    reason: "connection refused".to_string(),
                });
            }
            let path = dest.join("report.json");
            tokio::fs::write(&path, REPORT)
                .await
                .map_err(|e| IngestError::io(&path, e))
        }
    }

    fn app(dir: &TempDir) -> (Router, Readiness) {
        let db = Database::new(":memory:").unwrap();
        let settings = IngestSettings {
            workspace_path: dir.path().join("workspace").to_string_lossy().into_owned(),
            max_concurrent_files: 3,
            file_timeout: None,
        };
        let readiness = Readiness::new();
        let state = AppState {
            db: db.clone(),
            orchestrator: Arc::new(Orchestrator::new(db, ReportFetcher, &settings)),
            readiness: readiness.clone(),
        };
        (router(state), readiness)
    }

    async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    async fn post(app: &Router, uri: &str, body: Value) -> (StatusCode, Value) {
        let request = Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        send(app, request).await
    }

    async fn get(app: &Router, uri: &str) -> (StatusCode, Value) {
        let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
        send(app, request).await
    }

    #[tokio::test]
    async fn test_scan_then_query() {
        let dir = TempDir::new().unwrap();
        let (app, _) = app(&dir);

        let (status, body) = post(&app, "/scan", json!({"repo": "fixture", "files": []})).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"status": "Scan completed"}));

        let (status, body) = post(&app, "/query", json!({"filters": {"severity": "HIGH"}})).await;
        assert_eq!(status, StatusCode::OK);
        let rows = body.as_array().expect("rows");
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["id"], "CVE-2024-0001");
        assert_eq!(rows[0]["status"], "completed");
        assert_eq!(rows[0]["risk_factors"], "[Remote Code Execution]");

        let (status, body) = post(&app, "/query", json!({"filters": {"severity": "LOW"}})).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!([]));

        let (status, body) = get(&app, "/api/v1/stats").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["total_scans"], 1);
    }

    #[tokio::test]
    async fn test_query_with_unsupported_filter_is_bad_request() {
        let dir = TempDir::new().unwrap();
        let (app, _) = app(&dir);

        let (status, body) = post(&app, "/query", json!({"filters": {"cvss": "9.8"}})).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body, json!({"error": "Unsupported query filter"}));
    }

    #[tokio::test]
    async fn test_scan_with_no_matching_files_is_bad_request() {
        let dir = TempDir::new().unwrap();
        let (app, _) = app(&dir);

        let (status, body) = post(
            &app,
            "/scan",
            json!({"repo": "fixture", "files": ["missing.json"]}),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body, json!({"error": "No valid files to scan"}));
    }

    #[tokio::test]
    async fn test_scan_fetch_failure_is_server_error() {
        let dir = TempDir::new().unwrap();
        let (app, _) = app(&dir);

        let (status, body) = post(&app, "/scan", json!({"repo": "unreachable"})).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body, json!({"error": "Scan failed"}));
    }

    #[tokio::test]
    async fn test_health_endpoints() {
        let dir = TempDir::new().unwrap();
        let (app, readiness) = app(&dir);

        let (status, body) = get(&app, "/healthz").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"status": "ok"}));

        let (status, _) = get(&app, "/readyz").await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

        readiness.set_ready(true);
        let (status, _) = get(&app, "/readyz").await;
        assert_eq!(status, StatusCode::OK);
    }
}
