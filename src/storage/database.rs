//! Database handle and connection locking

use anyhow::{Context, Result};
use rusqlite::Connection;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, error, info};

use super::schema::init_schema;
use crate::error::IngestError;

/// Shared SQLite handle.
///
/// Every read and write sequence holds the single connection lock for its
/// whole duration, so readers never observe a half-written batch.
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
    db_path: String,
}

impl Database {
    /// Open (or create) the database at `db_path`. `":memory:"` opens a private in-memory store.
    pub fn new(db_path: &str) -> Result<Self> {
        info!(path = %db_path, "Initializing database");

        let in_memory = db_path == ":memory:";

        if !in_memory {
            if Path::new(db_path).exists() {
                let size = std::fs::metadata(db_path)
                    .map(|m| Self::format_bytes(m.len()))
                    .unwrap_or_else(|_| "unknown".to_string());
                info!(path = %db_path, size = %size, "Found existing database file");
            } else {
                info!(path = %db_path, "Creating new database file");
            }

            if let Some(parent) = Path::new(db_path).parent()
                && !parent.as_os_str().is_empty()
                && !parent.exists()
            {
                info!(directory = %parent.display(), "Creating database directory");
                std::fs::create_dir_all(parent).context("Failed to create database directory")?;
            }
        }

        debug!(path = %db_path, "Opening SQLite connection");
        let conn = Connection::open(db_path)
            .map_err(|e| {
                error!(path = %db_path, error = %e, "Failed to open SQLite database");
                e
            })
            .context("Failed to open SQLite database")?;

        init_schema(&conn).context("Failed to initialize database schema")?;

        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
            db_path: db_path.to_string(),
        };

        let (size_bytes, size_human) = db.get_db_size();
        info!(
            path = %db_path,
            size = %size_human,
            size_bytes = size_bytes,
            "Database initialized successfully"
        );

        Ok(db)
    }

    /// Acquire the connection lock
    pub(super) fn lock(&self) -> Result<MutexGuard<'_, Connection>, IngestError> {
        self.conn
            .lock()
            .map_err(|_| IngestError::persistence("lock", "database lock poisoned"))
    }

    /// On-disk size of the database file; zero for in-memory stores
    pub fn get_db_size(&self) -> (u64, String) {
        match std::fs::metadata(&self.db_path) {
            Ok(metadata) => {
                let size = metadata.len();
                (size, Self::format_bytes(size))
            }
            Err(_) => (0, "0 B".to_string()),
        }
    }

    /// Human-readable size, e.g. `1.50 KB`
    pub(super) fn format_bytes(bytes: u64) -> String {
        const UNITS: [&str; 3] = ["KB", "MB", "GB"];

        if bytes < 1024 {
            return format!("{} B", bytes);
        }

        let mut value = bytes as f64 / 1024.0;
        let mut unit = 0;
        while value >= 1024.0 && unit < UNITS.len() - 1 {
            value /= 1024.0;
            unit += 1;
        }
        format!("{:.2} {}", value, UNITS[unit])
    }
}
