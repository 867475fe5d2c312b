//! Filtered vulnerability reads
//!
//! Filter names are parsed into [`QueryFilter`] before any SQL is built.
//! Each variant maps to a fixed column fragment and values are always bound
//! as parameters, so caller input never reaches the statement text.

use std::collections::HashMap;
use std::str::FromStr;

use rusqlite::ToSql;
use tracing::debug;

use super::database::Database;
use super::models::VulnerabilityRow;
use crate::error::IngestError;

const SELECT_VULNERABILITIES: &str = r#"
    SELECT
        v.id,
        COALESCE(v.severity, ''),
        COALESCE(v.cvss, 0.0),
        COALESCE(v.status, ''),
        COALESCE(v.package_name, ''),
        COALESCE(v.current_version, ''),
        COALESCE(v.fixed_version, ''),
        COALESCE(v.description, ''),
        COALESCE(v.published_date, ''),
        COALESCE(v.link, ''),
        COALESCE('[' || GROUP_CONCAT(r.risk_factor, ', ') || ']', '')
    FROM vulnerabilities v
    LEFT JOIN risk_factors r ON v.id = r.vuln_id
    WHERE 1 = 1"#;

const GROUP_AND_ORDER: &str = " GROUP BY v.id ORDER BY v.id";

/// Columns a query may filter on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueryFilter {
    Severity,
}

impl QueryFilter {
    /// Fixed SQL condition for this filter, with one bound parameter
    fn condition(self) -> &'static str {
        match self {
            QueryFilter::Severity => " AND v.severity = ?",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            QueryFilter::Severity => "severity",
        }
    }
}

impl FromStr for QueryFilter {
    type Err = IngestError;

    fn from_str(key: &str) -> Result<Self, Self::Err> {
        match key {
            "severity" => Ok(QueryFilter::Severity),
            other => Err(IngestError::InvalidFilter(other.to_string())),
        }
    }
}

impl std::fmt::Display for QueryFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Validated set of filters. All filters must match.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VulnerabilityQuery {
    filters: Vec<(QueryFilter, String)>,
}

impl VulnerabilityQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, filter: QueryFilter, value: impl Into<String>) -> Self {
        self.filters.push((filter, value.into()));
        self
    }

    /// Validate a caller-supplied name → value mapping.
    ///
    /// Fails with [`IngestError::InvalidFilter`] on the first unknown name.
    pub fn from_map(filters: &HashMap<String, String>) -> Result<Self, IngestError> {
        let mut parsed = filters
            .iter()
            .map(|(key, value)| Ok((key.parse::<QueryFilter>()?, value.clone())))
            .collect::<Result<Vec<_>, IngestError>>()?;
        parsed.sort_by(|a, b| a.0.as_str().cmp(b.0.as_str()));
        Ok(Self { filters: parsed })
    }

    pub fn filters(&self) -> &[(QueryFilter, String)] {
        &self.filters
    }

    fn to_sql(&self) -> String {
        let mut sql = String::from(SELECT_VULNERABILITIES);
        for (filter, _) in &self.filters {
            sql.push_str(filter.condition());
        }
        sql.push_str(GROUP_AND_ORDER);
        sql
    }
}

impl Database {
    /// Vulnerabilities matching every filter, with aggregated risk factors
    pub fn query_vulnerabilities(
        &self,
        query: &VulnerabilityQuery,
    ) -> Result<Vec<VulnerabilityRow>, IngestError> {
        let conn = self.lock()?;

        let sql = query.to_sql();
        let params: Vec<&dyn ToSql> = query
            .filters
            .iter()
            .map(|(_, value)| value as &dyn ToSql)
            .collect();

        let mut stmt = conn
            .prepare(&sql)
            .map_err(|e| IngestError::persistence("query_vulnerabilities", e))?;

        let rows = stmt
            .query_map(params.as_slice(), |row| {
                Ok(VulnerabilityRow {
                    id: row.get(0)?,
                    severity: row.get(1)?,
                    cvss: row.get(2)?,
                    status: row.get(3)?,
                    package_name: row.get(4)?,
                    current_version: row.get(5)?,
                    fixed_version: row.get(6)?,
                    description: row.get(7)?,
                    published_date: row.get(8)?,
                    link: row.get(9)?,
                    risk_factors: row.get(10)?,
                })
            })
            .map_err(|e| IngestError::persistence("query_vulnerabilities", e))?;

        let results = rows
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| IngestError::persistence("query_vulnerabilities", e))?;

        debug!(
            filters = ?query.filters,
            results = results.len(),
            "Vulnerability query executed"
        );

        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{NormalizedRecord, ScanReport, VulnerabilityRecord};

    fn seeded_db() -> Database {
        let db = Database::new(":memory:").unwrap();
        let vuln = |id: &str, severity: &str, factors: &[&str]| VulnerabilityRecord {
            id: id.to_string(),
            scan_id: "scan123".to_string(),
            severity: severity.to_string(),
            cvss: 7.5,
            package_name: "libssl".to_string(),
            risk_factors: factors.iter().map(|f| f.to_string()).collect(),
            ..VulnerabilityRecord::default()
        };
        db.save_records(vec![NormalizedRecord {
            scan: ScanReport {
                scan_id: "scan123".to_string(),
                ..ScanReport::default()
            },
            vulnerabilities: vec![
                vuln("CVE-2", "HIGH", &["Exploit Available"]),
                vuln("CVE-1", "HIGH", &[]),
                vuln("CVE-3", "LOW", &["In The Wild"]),
            ],
        }])
        .unwrap();
        db
    }

    #[test]
    fn test_query_filter_parse() {
        assert_eq!("severity".parse::<QueryFilter>().unwrap(), QueryFilter::Severity);
        assert!(matches!(
            "package_name".parse::<QueryFilter>(),
            Err(IngestError::InvalidFilter(key)) if key == "package_name"
        ));
        assert!("severity = 'x' OR 1=1 --".parse::<QueryFilter>().is_err());
    }

    #[test]
    fn test_from_map_rejects_unknown_key() {
        let mut filters = HashMap::new();
        filters.insert("severity".to_string(), "HIGH".to_string());
        filters.insert("id; DROP TABLE scans".to_string(), "x".to_string());
        assert!(matches!(
            VulnerabilityQuery::from_map(&filters),
            Err(IngestError::InvalidFilter(_))
        ));
    }

    #[test]
    fn test_query_by_severity() {
        let db = seeded_db();
        let rows = db
            .query_vulnerabilities(&VulnerabilityQuery::new().with(QueryFilter::Severity, "HIGH"))
            .unwrap();

        let ids: Vec<_> = rows.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["CVE-1", "CVE-2"]);
        assert_eq!(rows[0].risk_factors, "");
        assert_eq!(rows[1].risk_factors, "[Exploit Available]");
        assert_eq!(rows[1].package_name, "libssl");
    }

    #[test]
    fn test_query_without_matches_is_empty() {
        let db = seeded_db();
        let rows = db
            .query_vulnerabilities(&VulnerabilityQuery::new().with(QueryFilter::Severity, "CRITICAL"))
            .unwrap();
        assert!(rows.is_empty());
    }

    #[test]
    fn test_query_value_is_bound_not_interpolated() {
        let db = seeded_db();
        let rows = db
            .query_vulnerabilities(
                &VulnerabilityQuery::new().with(QueryFilter::Severity, "HIGH' OR '1'='1"),
            )
            .unwrap();
        assert!(rows.is_empty());
    }

    #[test]
    fn test_query_without_filters_returns_all() {
        let db = seeded_db();
        let rows = db.query_vulnerabilities(&VulnerabilityQuery::new()).unwrap();
        assert_eq!(rows.len(), 3);
    }

    #[test]
    fn test_risk_factors_aggregated_per_vulnerability() {
        let db = Database::new(":memory:").unwrap();
        db.save_records(vec![NormalizedRecord {
            scan: ScanReport {
                scan_id: "A".to_string(),
                ..ScanReport::default()
            },
            vulnerabilities: vec![VulnerabilityRecord {
                id: "V1".to_string(),
                scan_id: "A".to_string(),
                severity: "HIGH".to_string(),
                risk_factors: vec!["RCE".to_string(), "DoS".to_string()],
                ..VulnerabilityRecord::default()
            }],
        }])
        .unwrap();

        let rows = db
            .query_vulnerabilities(&VulnerabilityQuery::new().with(QueryFilter::Severity, "HIGH"))
            .unwrap();
        assert_eq!(rows.len(), 1);
        let blob = &rows[0].risk_factors;
        assert!(blob == "[RCE, DoS]" || blob == "[DoS, RCE]", "unexpected blob {}", blob);
    }
}
