//! Canonical in-memory shapes for normalized scan reports

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One vendor scan result in canonical form
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScanReport {
    pub scan_id: String,
    pub timestamp: String,
    pub status: String,
    pub resource_type: String,
    pub resource_name: String,
    pub total_vulnerabilities: i64,
    pub fixable_count: i64,
    /// Severity to count mapping, kept as the JSON text the vendor sent
    pub severity_counts: String,
    pub compliant: bool,
}

/// One finding belonging to a scan report
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VulnerabilityRecord {
    pub id: String,
    pub scan_id: String,
    pub severity: String,
    pub cvss: f64,
    pub status: String,
    pub package_name: String,
    pub current_version: String,
    pub fixed_version: String,
    pub description: String,
    pub published_date: String,
    pub link: String,
    /// Distinct risk factors in source order
    pub risk_factors: Vec<String>,
}

/// A scan report together with its findings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NormalizedRecord {
    pub scan: ScanReport,
    pub vulnerabilities: Vec<VulnerabilityRecord>,
}

/// Raw documents parsed during one ingestion run, keyed by source file.
///
/// Iteration follows path order regardless of which worker finished first.
#[derive(Debug, Default)]
pub struct IngestionBatch {
    documents: BTreeMap<PathBuf, Vec<Value>>,
}

impl IngestionBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, path: PathBuf, documents: Vec<Value>) {
        self.documents.insert(path, documents);
    }

    /// Number of files that contributed documents
    pub fn file_count(&self) -> usize {
        self.documents.len()
    }

    /// Total number of raw documents across all files
    pub fn document_count(&self) -> usize {
        self.documents.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&PathBuf, &Vec<Value>)> {
        self.documents.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_batch_counts() {
        let mut batch = IngestionBatch::new();
        assert!(batch.is_empty());

        batch.insert(PathBuf::from("b.json"), vec![json!({}), json!({})]);
        batch.insert(PathBuf::from("a.json"), vec![json!({})]);

        assert_eq!(batch.file_count(), 2);
        assert_eq!(batch.document_count(), 3);
    }

    #[test]
    fn test_batch_iterates_in_path_order() {
        let mut batch = IngestionBatch::new();
        batch.insert(PathBuf::from("z.json"), vec![]);
        batch.insert(PathBuf::from("a.json"), vec![]);
        batch.insert(PathBuf::from("m.json"), vec![]);

        let paths: Vec<_> = batch.iter().map(|(p, _)| p.to_string_lossy().to_string()).collect();
        assert_eq!(paths, vec!["a.json", "m.json", "z.json"]);
    }
}
