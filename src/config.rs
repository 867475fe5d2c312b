use clap::{Parser, Subcommand, ValueEnum};
use serde::{Deserialize, Serialize};
use std::time::Duration;

// ============================================
// Environment variable name constants
// ============================================
pub mod env {
    pub const MODE: &str = "MODE";
    pub const LOG_FORMAT: &str = "LOG_FORMAT";
    pub const LOG_LEVEL: &str = "LOG_LEVEL";
    pub const SERVER_PORT: &str = "SERVER_PORT";
    pub const STORAGE_PATH: &str = "STORAGE_PATH";
    pub const WORKSPACE_PATH: &str = "WORKSPACE_PATH";
    pub const REPO_URL: &str = "REPO_URL";
    pub const FILES: &str = "FILES";
    pub const MAX_CONCURRENT_FILES: &str = "MAX_CONCURRENT_FILES";
    pub const FILE_TIMEOUT_SECS: &str = "FILE_TIMEOUT_SECS";
    pub const FETCH_RETRY_ATTEMPTS: &str = "FETCH_RETRY_ATTEMPTS";
    pub const FETCH_RETRY_DELAY_SECS: &str = "FETCH_RETRY_DELAY_SECS";
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Server mode: Serve the scan and query API
    Server,
    /// Ingest mode: Run a single ingestion from REPO_URL and exit
    Ingest,
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Mode::Server => write!(f, "server"),
            Mode::Ingest => write!(f, "ingest"),
        }
    }
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Show version information
    Version,
}

#[derive(Parser, Debug, Clone)]
#[command(
    name = "vuln-ingestor",
    version,
    about = "Vulnerability scan report ingestor",
    long_about = "Fetches a repository of vendor vulnerability scan reports, normalizes them into a single schema, stores them in SQLite and serves severity queries over the stored findings."
)]
pub struct Config {
    #[command(subcommand)]
    pub command: Option<Command>,
    /// Run mode
    #[arg(long, env = env::MODE, value_enum, default_value = "server")]
    pub mode: Mode,

    /// Log format: json or pretty
    #[arg(long, env = env::LOG_FORMAT, default_value = "json")]
    pub log_format: String,

    /// Log level: trace, debug, info, warn, error
    #[arg(long, env = env::LOG_LEVEL, default_value = "info")]
    pub log_level: String,

    /// API server port (server mode only)
    #[arg(long, env = env::SERVER_PORT, default_value = "8080")]
    pub server_port: u16,

    /// Storage path for SQLite database
    #[arg(long, env = env::STORAGE_PATH, default_value = "./data")]
    pub storage_path: String,

    /// Directory the report repository is fetched into (wiped on every run)
    #[arg(long, env = env::WORKSPACE_PATH, default_value = "./cloned_repo")]
    pub workspace_path: String,

    // ============================================
    // Ingest mode settings
    // ============================================
    /// Repository to ingest (ingest mode only)
    #[arg(long, env = env::REPO_URL)]
    pub repo_url: Option<String>,

    /// File basenames to ingest, comma-separated (empty = all JSON files)
    #[arg(long, env = env::FILES, value_delimiter = ',')]
    pub files: Vec<String>,

    // ============================================
    // Pipeline tuning
    // ============================================
    /// Maximum number of files read concurrently
    #[arg(long, env = env::MAX_CONCURRENT_FILES, default_value = "3")]
    pub max_concurrent_files: usize,

    /// Per-file read timeout in seconds (0 to disable)
    #[arg(long, env = env::FILE_TIMEOUT_SECS, default_value = "30")]
    pub file_timeout_secs: u64,

    /// Source fetch attempts
    #[arg(long, env = env::FETCH_RETRY_ATTEMPTS, default_value = "2")]
    pub fetch_retry_attempts: u32,

    /// Delay between fetch attempts in seconds
    #[arg(long, env = env::FETCH_RETRY_DELAY_SECS, default_value = "5")]
    pub fetch_retry_delay_secs: u64,
}

/// Pipeline settings shared by every ingestion run
#[derive(Debug, Clone)]
pub struct IngestSettings {
    pub workspace_path: String,
    pub max_concurrent_files: usize,
    pub file_timeout: Option<Duration>,
}

impl Config {
    pub fn from_args() -> Self {
        Config::parse()
    }

    /// Validate configuration based on mode
    pub fn validate(&self) -> Result<(), String> {
        if self.max_concurrent_files == 0 {
            return Err("MAX_CONCURRENT_FILES must be at least 1".to_string());
        }
        if self.fetch_retry_attempts == 0 {
            return Err("FETCH_RETRY_ATTEMPTS must be at least 1".to_string());
        }
        match self.mode {
            Mode::Ingest => {
                if self.get_repo_url().is_empty() {
                    return Err("REPO_URL is required in ingest mode".to_string());
                }
            }
            Mode::Server => {
                // Repository comes with each scan request
            }
        }
        Ok(())
    }

    /// Get repository URL (ingest mode)
    pub fn get_repo_url(&self) -> &str {
        self.repo_url.as_deref().unwrap_or("")
    }

    /// Get SQLite database path
    pub fn get_db_path(&self) -> String {
        format!("{}/scans.db", self.storage_path)
    }

    pub fn ingest_settings(&self) -> IngestSettings {
        IngestSettings {
            workspace_path: self.workspace_path.clone(),
            max_concurrent_files: self.max_concurrent_files,
            file_timeout: match self.file_timeout_secs {
                0 => None,
                secs => Some(Duration::from_secs(secs)),
            },
        }
    }
}
