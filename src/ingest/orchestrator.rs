//! One ingestion run: reset, fetch, discover, select, read, normalize, persist

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

use super::discovery::discover;
use super::normalizer::normalize_batch;
use super::pool::{IngestionPool, select_files};
use super::source::{SourceFetcher, reset_directory};
use crate::config::IngestSettings;
use crate::error::IngestError;
use crate::storage::{Database, SaveSummary};

/// What to ingest
#[derive(Debug, Clone, Deserialize)]
pub struct IngestRequest {
    /// Repository locator handed to the fetcher
    pub repo: String,
    /// Basenames to ingest; empty means every discovered report
    #[serde(default)]
    pub files: Vec<String>,
}

/// Outcome of a successful run
#[derive(Debug, Clone, Serialize)]
pub struct IngestReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub files_discovered: usize,
    pub files_selected: usize,
    pub files_failed: usize,
    pub records_normalized: usize,
    pub peak_in_flight: usize,
    pub summary: SaveSummary,
}

/// Runs the ingestion pipeline against a store.
///
/// Runs are serialized: each one wipes the store and the shared workspace
/// before fetching.
pub struct Orchestrator<F: SourceFetcher> {
    db: Database,
    fetcher: F,
    workspace: PathBuf,
    pool: IngestionPool,
    run_lock: Mutex<()>,
}

impl<F: SourceFetcher> Orchestrator<F> {
    pub fn new(db: Database, fetcher: F, settings: &IngestSettings) -> Self {
        Self {
            db,
            fetcher,
            workspace: PathBuf::from(&settings.workspace_path),
            pool: IngestionPool::new(settings.max_concurrent_files, settings.file_timeout),
            run_lock: Mutex::new(()),
        }
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    /// Execute one full run.
    ///
    /// Store reset, workspace, fetch, discovery and empty-selection failures
    /// abort the run. Unreadable files and rejected rows are logged and
    /// skipped; a run that persisted anything at all is a success.
    pub async fn run(&self, request: &IngestRequest) -> Result<IngestReport, IngestError> {
        let _guard = self.run_lock.lock().await;

        let started_at = Utc::now();
        let start = Instant::now();

        info!(
            repo = %request.repo,
            files = ?request.files,
            workspace = %self.workspace.display(),
            "Starting ingestion run"
        );

        self.db.delete_all().inspect_err(|e| {
            error!(error = %e, "Failed to reset store");
        })?;

        reset_directory(&self.workspace).await?;

        self.fetcher
            .fetch(&request.repo, &self.workspace)
            .await
            .inspect_err(|e| {
                error!(repo = %request.repo, error = %e, "Failed to fetch source");
            })?;

        let discovered = discover(&self.workspace)?;
        let files_discovered = discovered.len();

        let selected = select_files(discovered, &request.files).inspect_err(|_| {
            warn!(
                discovered = files_discovered,
                requested = ?request.files,
                "No requested file was found"
            );
        })?;
        let files_selected = selected.len();

        let outcome = self.pool.run(selected).await;
        let records = normalize_batch(&outcome.batch);
        let records_normalized = records.len();

        let summary = self.db.save_records(records)?;

        let finished_at = Utc::now();
        let duration_ms = start.elapsed().as_millis() as u64;

        info!(
            repo = %request.repo,
            files_discovered = files_discovered,
            files_selected = files_selected,
            files_failed = outcome.files_failed,
            records = records_normalized,
            scans_inserted = summary.scans_inserted,
            scans_skipped = summary.scans_skipped,
            vulnerabilities_inserted = summary.vulnerabilities_inserted,
            duration_ms = duration_ms,
            "Ingestion run completed"
        );

        Ok(IngestReport {
            started_at,
            finished_at,
            duration_ms,
            files_discovered,
            files_selected,
            files_failed: outcome.files_failed,
            records_normalized,
            peak_in_flight: outcome.peak_in_flight,
            summary,
        })
    }
}

impl<F: SourceFetcher + 'static> Orchestrator<F> {
    /// Execute one run on its own task and wait for it.
    ///
    /// Dropping the returned future does not cancel the run: once the store
    /// has been reset the run always goes on to persist what it fetched.
    pub async fn run_detached(
        self: Arc<Self>,
        request: IngestRequest,
    ) -> Result<IngestReport, IngestError> {
        let task = tokio::spawn(async move { self.run(&request).await });

        task.await.map_err(|e| {
            error!(error = %e, "Ingestion task did not complete");
            IngestError::Interrupted(e.to_string())
        })?
    }
}
