//! Source acquisition: populate a local directory with report files

use std::future::Future;
use std::path::Path;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::error::IngestError;

/// Populates `dest` with the contents named by `locator`.
///
/// `dest` exists and is empty when `fetch` is called.
pub trait SourceFetcher: Send + Sync {
    fn fetch(
        &self,
        locator: &str,
        dest: &Path,
    ) -> impl Future<Output = Result<(), IngestError>> + Send;
}

/// Clones a git repository with the `git` CLI, retrying on failure
#[derive(Debug, Clone)]
pub struct GitFetcher {
    retry_attempts: u32,
    retry_delay: Duration,
}

impl GitFetcher {
    pub fn new(retry_attempts: u32, retry_delay_secs: u64) -> Self {
        Self {
            retry_attempts: retry_attempts.max(1),
            retry_delay: Duration::from_secs(retry_delay_secs),
        }
    }

    async fn clone_once(&self, locator: &str, dest: &Path) -> Result<(), String> {
        debug!(repo = %locator, dest = %dest.display(), "Running git clone");

        let output = Command::new("git")
            .arg("clone")
            .arg("--quiet")
            .arg(locator)
            .arg(dest)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| format!("failed to run git: {}", e))?;

        if output.status.success() {
            return Ok(());
        }

        let stderr = String::from_utf8_lossy(&output.stderr);
        Err(format!("{}: {}", output.status, stderr.trim()))
    }
}

impl SourceFetcher for GitFetcher {
    async fn fetch(&self, locator: &str, dest: &Path) -> Result<(), IngestError> {
        let mut last_error = String::new();

        for attempt in 1..=self.retry_attempts {
            info!(attempt = attempt, repo = %locator, "Cloning repository");

            match self.clone_once(locator, dest).await {
                Ok(()) => {
                    if attempt > 1 {
                        info!(attempt = attempt, repo = %locator, "Cloned repository after retry");
                    }
                    return Ok(());
                }
                Err(e) => {
                    warn!(
                        attempt = attempt,
                        max_attempts = self.retry_attempts,
                        repo = %locator,
                        error = %e,
                        "Clone attempt failed"
                    );
                    last_error = e;
                    if attempt < self.retry_attempts {
                        reset_directory(dest).await?;
                        tokio::time::sleep(self.retry_delay).await;
                    }
                }
            }
        }

        Err(IngestError::Fetch {
            locator: locator.to_string(),
            attempts: self.retry_attempts,
            reason: last_error,
        })
    }
}

/// Remove `dir` with all its contents and recreate it empty
pub async fn reset_directory(dir: &Path) -> Result<(), IngestError> {
    match tokio::fs::remove_dir_all(dir).await {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(IngestError::io(dir, e)),
    }

    tokio::fs::create_dir_all(dir)
        .await
        .map_err(|e| IngestError::io(dir, e))?;

    debug!(path = %dir.display(), "Workspace directory reset");
    Ok(())
}
