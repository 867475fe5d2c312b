//! Data models for the storage layer

use serde::Serialize;

/// Counts produced by one batch write
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SaveSummary {
    pub scans_inserted: usize,
    /// Reports skipped because their scan_id was already stored
    pub scans_skipped: usize,
    pub scans_failed: usize,
    pub vulnerabilities_inserted: usize,
    pub vulnerabilities_failed: usize,
    pub risk_factors_inserted: usize,
}

/// A stored vulnerability with its risk factors folded into one text blob
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VulnerabilityRow {
    pub id: String,
    pub severity: String,
    pub cvss: f64,
    pub status: String,
    pub package_name: String,
    pub current_version: String,
    pub fixed_version: String,
    pub description: String,
    pub published_date: String,
    pub link: String,
    /// `"[factor, factor]"`, or empty when the vulnerability has none
    pub risk_factors: String,
}

/// Overall statistics
#[derive(Debug, Clone, Serialize)]
pub struct Stats {
    pub total_scans: i64,
    pub total_vulnerabilities: i64,
    pub total_risk_factors: i64,
    pub db_size_bytes: u64,
    pub db_size_human: String,
    pub sqlite_version: String,
}
