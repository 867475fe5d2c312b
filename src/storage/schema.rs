//! Database schema initialization

use rusqlite::Connection;
use tracing::{debug, info};

use crate::error::IngestError;

/// Create the scans, vulnerabilities and risk_factors tables if missing
pub fn init_schema(conn: &Connection) -> Result<(), IngestError> {
    let table_exists: bool = conn
        .query_row(
            "SELECT COUNT(*) > 0 FROM sqlite_master WHERE type='table' AND name='scans'",
            [],
            |row| row.get(0),
        )
        .unwrap_or(false);

    if table_exists {
        debug!("Scans table already exists");
    } else {
        info!("Creating new database schema");
    }

    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS scans (
            scan_id TEXT PRIMARY KEY,
            timestamp TEXT,
            scan_status TEXT,
            resource_type TEXT,
            resource_name TEXT,
            total_vulnerabilities INTEGER,
            severity_counts TEXT,
            fixable_count INTEGER,
            compliant BOOLEAN
        );

        CREATE TABLE IF NOT EXISTS vulnerabilities (
            id TEXT PRIMARY KEY,
            scan_id TEXT,
            severity TEXT,
            cvss REAL,
            status TEXT,
            package_name TEXT,
            current_version TEXT,
            fixed_version TEXT,
            description TEXT,
            published_date TEXT,
            link TEXT,
            FOREIGN KEY (scan_id) REFERENCES scans(scan_id)
        );

        CREATE TABLE IF NOT EXISTS risk_factors (
            vuln_id TEXT,
            risk_factor TEXT,
            PRIMARY KEY (vuln_id, risk_factor),
            FOREIGN KEY (vuln_id) REFERENCES vulnerabilities(id)
        );

        CREATE INDEX IF NOT EXISTS idx_vulnerabilities_severity ON vulnerabilities(severity);
        CREATE INDEX IF NOT EXISTS idx_vulnerabilities_scan_id ON vulnerabilities(scan_id);
        "#,
    )
    .map_err(|e| IngestError::persistence("init_schema", e))?;

    debug!(
        tables = "scans, vulnerabilities, risk_factors",
        "Database schema initialized"
    );

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table_names(conn: &Connection) -> Vec<String> {
        let mut stmt = conn
            .prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
            .unwrap();
        stmt.query_map([], |row| row.get::<_, String>(0))
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap()
    }

    #[test]
    fn test_init_schema_creates_tables() {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        assert_eq!(
            table_names(&conn),
            vec!["risk_factors", "scans", "vulnerabilities"]
        );
    }

    #[test]
    fn test_init_schema_is_repeatable() {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        init_schema(&conn).unwrap();
        assert_eq!(table_names(&conn).len(), 3);
    }
}
