//! Batch writes, reset and statistics

use rusqlite::{Connection, params};
use tracing::{debug, error, info, warn};

use super::database::Database;
use super::models::{SaveSummary, Stats};
use crate::error::IngestError;
use crate::model::{NormalizedRecord, ScanReport, VulnerabilityRecord};

/// Reset statements in dependency order: children before parents
const RESET_STATEMENTS: [(&str, &str); 3] = [
    ("risk_factors", "DELETE FROM risk_factors"),
    ("vulnerabilities", "DELETE FROM vulnerabilities"),
    ("scans", "DELETE FROM scans"),
];

impl Database {
    /// Persist a run's records, skipping any scan that is already stored.
    ///
    /// The whole batch runs under the connection lock. Row-level failures
    /// are logged and skipped without undoing earlier rows; only a failure
    /// to take the lock is returned.
    pub fn save_records(
        &self,
        records: Vec<NormalizedRecord>,
    ) -> Result<SaveSummary, IngestError> {
        let conn = self.lock()?;
        let mut summary = SaveSummary::default();

        for record in records {
            let scan_id = record.scan.scan_id.clone();

            match scan_exists(&conn, &scan_id) {
                Ok(true) => {
                    info!(scan_id = %scan_id, "Scan already exists, skipping insert");
                    summary.scans_skipped += 1;
                    continue;
                }
                Ok(false) => {}
                Err(e) => {
                    warn!(scan_id = %scan_id, error = %e, "Error checking scan existence, skipping");
                    summary.scans_failed += 1;
                    continue;
                }
            }

            if let Err(e) = insert_scan(&conn, &record.scan) {
                warn!(scan_id = %scan_id, error = %e, "Failed to insert scan");
                summary.scans_failed += 1;
                continue;
            }
            summary.scans_inserted += 1;

            for vuln in &record.vulnerabilities {
                if let Err(e) = insert_vulnerability(&conn, vuln) {
                    warn!(
                        scan_id = %scan_id,
                        vuln_id = %vuln.id,
                        error = %e,
                        "Failed to insert vulnerability"
                    );
                    summary.vulnerabilities_failed += 1;
                    continue;
                }
                summary.vulnerabilities_inserted += 1;

                for factor in &vuln.risk_factors {
                    match insert_risk_factor(&conn, &vuln.id, factor) {
                        Ok(true) => summary.risk_factors_inserted += 1,
                        Ok(false) => {
                            debug!(vuln_id = %vuln.id, risk_factor = %factor, "Risk factor already stored");
                        }
                        Err(e) => warn!(
                            vuln_id = %vuln.id,
                            risk_factor = %factor,
                            error = %e,
                            "Failed to insert risk factor"
                        ),
                    }
                }
            }

            debug!(
                scan_id = %scan_id,
                vulnerabilities = record.vulnerabilities.len(),
                "Scan stored"
            );
        }

        info!(
            scans_inserted = summary.scans_inserted,
            scans_skipped = summary.scans_skipped,
            scans_failed = summary.scans_failed,
            vulnerabilities_inserted = summary.vulnerabilities_inserted,
            vulnerabilities_failed = summary.vulnerabilities_failed,
            risk_factors_inserted = summary.risk_factors_inserted,
            "Scan data saved"
        );

        Ok(summary)
    }

    /// Delete every stored row in one transaction.
    ///
    /// Any failing statement aborts and rolls back the whole reset.
    pub fn delete_all(&self) -> Result<(), IngestError> {
        let mut conn = self.lock()?;

        let tx = conn
            .transaction()
            .map_err(|e| IngestError::persistence("delete_all", e))?;

        for (table, statement) in RESET_STATEMENTS {
            let deleted = tx.execute(statement, []).map_err(|e| {
                error!(table = table, error = %e, "Failed to delete stored rows");
                IngestError::persistence("delete_all", e)
            })?;
            debug!(table = table, deleted = deleted, "Table cleared");
        }

        tx.commit()
            .map_err(|e| IngestError::persistence("delete_all", e))?;

        info!("All previous scan data deleted");
        Ok(())
    }

    /// Whether a scan with this identifier is stored
    pub fn scan_exists(&self, scan_id: &str) -> Result<bool, IngestError> {
        let conn = self.lock()?;
        scan_exists(&conn, scan_id).map_err(|e| IngestError::persistence("scan_exists", e))
    }

    /// Get overall statistics
    pub fn get_stats(&self) -> Result<Stats, IngestError> {
        let conn = self.lock()?;

        let (db_size_bytes, db_size_human) = self.get_db_size();

        let sqlite_version: String = conn
            .query_row("SELECT sqlite_version()", [], |row| row.get(0))
            .unwrap_or_else(|_| "unknown".to_string());

        let stats = conn
            .query_row(
                r#"
                SELECT
                    (SELECT COUNT(*) FROM scans),
                    (SELECT COUNT(*) FROM vulnerabilities),
                    (SELECT COUNT(*) FROM risk_factors)
                "#,
                [],
                |row| {
                    Ok(Stats {
                        total_scans: row.get(0)?,
                        total_vulnerabilities: row.get(1)?,
                        total_risk_factors: row.get(2)?,
                        db_size_bytes,
                        db_size_human,
                        sqlite_version,
                    })
                },
            )
            .map_err(|e| IngestError::persistence("get_stats", e))?;

        Ok(stats)
    }
}

fn scan_exists(conn: &Connection, scan_id: &str) -> rusqlite::Result<bool> {
    conn.query_row(
        "SELECT COUNT(*) > 0 FROM scans WHERE scan_id = ?1",
        [scan_id],
        |row| row.get(0),
    )
}

fn insert_scan(conn: &Connection, scan: &ScanReport) -> rusqlite::Result<usize> {
    conn.execute(
        r#"
        INSERT INTO scans (
            scan_id, timestamp, scan_status, resource_type, resource_name,
            total_vulnerabilities, severity_counts, fixable_count, compliant
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
        "#,
        params![
            scan.scan_id,
            scan.timestamp,
            scan.status,
            scan.resource_type,
            scan.resource_name,
            scan.total_vulnerabilities,
            scan.severity_counts,
            scan.fixable_count,
            scan.compliant,
        ],
    )
}

fn insert_vulnerability(conn: &Connection, vuln: &VulnerabilityRecord) -> rusqlite::Result<usize> {
    conn.execute(
        r#"
        INSERT INTO vulnerabilities (
            id, scan_id, severity, cvss, status, package_name, current_version,
            fixed_version, description, published_date, link
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
        "#,
        params![
            vuln.id,
            vuln.scan_id,
            vuln.severity,
            vuln.cvss,
            vuln.status,
            vuln.package_name,
            vuln.current_version,
            vuln.fixed_version,
            vuln.description,
            vuln.published_date,
            vuln.link,
        ],
    )
}

/// Returns false when the pair was already stored
fn insert_risk_factor(conn: &Connection, vuln_id: &str, factor: &str) -> rusqlite::Result<bool> {
    let affected = conn.execute(
        "INSERT OR IGNORE INTO risk_factors (vuln_id, risk_factor) VALUES (?1, ?2)",
        params![vuln_id, factor],
    )?;
    Ok(affected > 0)
}
