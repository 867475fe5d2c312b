//! Bounded-concurrency report reader

use serde_json::Value;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use super::document::type_name;
use crate::error::IngestError;
use crate::model::IngestionBatch;

/// Pool size used when none is configured
pub const DEFAULT_MAX_CONCURRENT_FILES: usize = 3;

/// Restrict discovered files to an allow-list of basenames.
///
/// An empty allow-list keeps every file. Requested names that were not
/// discovered are ignored; only an empty result is an error.
pub fn select_files(
    discovered: Vec<PathBuf>,
    allow_list: &[String],
) -> Result<Vec<PathBuf>, IngestError> {
    let selected: Vec<PathBuf> = if allow_list.is_empty() {
        discovered
    } else {
        let wanted: HashSet<&str> = allow_list.iter().map(String::as_str).collect();
        discovered
            .into_iter()
            .filter(|path| {
                path.file_name()
                    .and_then(|name| name.to_str())
                    .is_some_and(|name| wanted.contains(name))
            })
            .collect()
    };

    debug!(
        requested = allow_list.len(),
        selected = selected.len(),
        "Files selected for ingestion"
    );

    if selected.is_empty() {
        return Err(IngestError::EmptySelection);
    }
    Ok(selected)
}

/// Result of one pool run
#[derive(Debug, Default)]
pub struct PoolOutcome {
    pub batch: IngestionBatch,
    /// Files dropped because they could not be read or decoded
    pub files_failed: usize,
    /// Highest number of files observed in flight at once
    pub peak_in_flight: usize,
}

#[derive(Default)]
struct Accumulator {
    batch: IngestionBatch,
    files_failed: usize,
}

/// Reads and decodes report files on parallel tasks, at most
/// `max_concurrent` at a time.
#[derive(Debug, Clone)]
pub struct IngestionPool {
    max_concurrent: usize,
    file_timeout: Option<Duration>,
}

impl IngestionPool {
    pub fn new(max_concurrent: usize, file_timeout: Option<Duration>) -> Self {
        Self {
            max_concurrent: max_concurrent.max(1),
            file_timeout,
        }
    }

    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }

    /// Read every file and wait for all workers to finish.
    ///
    /// Per-file failures are logged and counted, never returned.
    pub async fn run(&self, files: Vec<PathBuf>) -> PoolOutcome {
        let total = files.len();
        let start = Instant::now();

        let semaphore = Arc::new(Semaphore::new(self.max_concurrent));
        let accumulator = Arc::new(Mutex::new(Accumulator::default()));
        let in_flight = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let mut tasks = Vec::with_capacity(total);

        for path in files {
            let semaphore = Arc::clone(&semaphore);
            let accumulator = Arc::clone(&accumulator);
            let in_flight = Arc::clone(&in_flight);
            let peak = Arc::clone(&peak);
            let timeout = self.file_timeout;

            let task = tokio::spawn(async move {
                let Ok(_permit) = semaphore.acquire_owned().await else {
                    warn!(path = %path.display(), "Worker pool closed, skipping file");
                    return;
                };

                let current = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(current, Ordering::SeqCst);

                let file_start = Instant::now();
                let result = read_with_timeout(&path, timeout).await;

                in_flight.fetch_sub(1, Ordering::SeqCst);

                match result {
                    Ok(documents) => {
                        debug!(
                            path = %path.display(),
                            documents = documents.len(),
                            elapsed_ms = file_start.elapsed().as_millis() as u64,
                            "Processed file"
                        );
                        let mut acc = accumulator.lock().unwrap_or_else(PoisonError::into_inner);
                        acc.batch.insert(path, documents);
                    }
                    Err(e) => {
                        warn!(path = %path.display(), error = %e, "Failed to process file, skipping");
                        let mut acc = accumulator.lock().unwrap_or_else(PoisonError::into_inner);
                        acc.files_failed += 1;
                    }
                }
            });

            tasks.push(task);
        }

        let mut join_failures = 0;
        for task in tasks {
            if let Err(e) = task.await {
                warn!(error = %e, "Worker task join error");
                join_failures += 1;
            }
        }

        let acc = std::mem::take(&mut *accumulator.lock().unwrap_or_else(PoisonError::into_inner));
        let outcome = PoolOutcome {
            files_failed: acc.files_failed + join_failures,
            batch: acc.batch,
            peak_in_flight: peak.load(Ordering::SeqCst),
        };

        info!(
            files = total,
            parsed = outcome.batch.file_count(),
            failed = outcome.files_failed,
            documents = outcome.batch.document_count(),
            peak_in_flight = outcome.peak_in_flight,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "File processing finished"
        );

        outcome
    }
}

impl Default for IngestionPool {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_CONCURRENT_FILES, None)
    }
}

async fn read_with_timeout(
    path: &Path,
    timeout: Option<Duration>,
) -> Result<Vec<Value>, IngestError> {
    match timeout {
        Some(limit) => tokio::time::timeout(limit, read_report_file(path))
            .await
            .unwrap_or_else(|_| {
                Err(IngestError::io(
                    path,
                    std::io::Error::new(
                        std::io::ErrorKind::TimedOut,
                        format!("read timed out after {}s", limit.as_secs()),
                    ),
                ))
            }),
        None => read_report_file(path).await,
    }
}

/// Read one file and split it into report documents.
///
/// A file holds either an array of reports or a single report object.
pub async fn read_report_file(path: &Path) -> Result<Vec<Value>, IngestError> {
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|e| IngestError::io(path, e))?;

    let value: Value = serde_json::from_slice(&bytes).map_err(|e| IngestError::Decode {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;

    match value {
        Value::Array(documents) => Ok(documents),
        Value::Object(_) => Ok(vec![value]),
        other => Err(IngestError::Decode {
            path: path.to_path_buf(),
            reason: format!("expected array or object, found {}", type_name(&other)),
        }),
    }
}
