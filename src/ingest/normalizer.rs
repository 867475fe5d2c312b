//! Vendor report normalization
//!
//! Maps each raw document onto [`NormalizedRecord`] using ordered alias
//! chains. Missing fields take their zero value; wrong-typed fields are
//! logged and defaulted.

use serde_json::Value;
use tracing::{debug, info_span, warn};

use super::document::{Extracted, Fields};
use crate::model::{IngestionBatch, NormalizedRecord, ScanReport, VulnerabilityRecord};

const SCAN_RESULTS: &[&str] = &["scanResults"];
const SCAN_ID: &[&str] = &["scan_id", "scanId"];
const TIMESTAMP: &[&str] = &["timestamp", "scanTime"];
const SCAN_STATUS: &[&str] = &["scan_status", "status"];
const RESOURCE_TYPE: &[&str] = &["resource_type"];
const RESOURCE_NAME: &[&str] = &["resource_name"];
const RESOURCE_DETAILS: &[&str] = &["resourceDetails"];
const SUMMARY: &[&str] = &["summary"];
const TOTAL_VULNERABILITIES: &[&str] = &["total_vulnerabilities", "totalIssues"];
const FIXABLE_COUNT: &[&str] = &["fixable_count", "fixableIssues"];
const SEVERITY_COUNTS: &[&str] = &["severity_counts", "severityBreakdown"];
const COMPLIANT: &[&str] = &["compliant"];
const VULNERABILITIES: &[&str] = &["vulnerabilities", "findings"];

const VULN_ID: &[&str] = &["id", "cveId"];
const SEVERITY: &[&str] = &["severity"];
const CVSS: &[&str] = &["cvss", "score"];
const PACKAGE_NAME: &[&str] = &["package_name"];
const CURRENT_VERSION: &[&str] = &["current_version"];
const FIXED_VERSION: &[&str] = &["fixed_version"];
const PACKAGE: &[&str] = &["package"];
const DESCRIPTION: &[&str] = &["description"];
const PUBLISHED_DATE: &[&str] = &["published_date", "firstDetected"];
const LINK: &[&str] = &["link"];
const RISK_FACTORS: &[&str] = &["risk_factors"];
const THREAT_CONTEXT: &[&str] = &["threatContext"];

/// Normalize every document of a batch, in path order
pub fn normalize_batch(batch: &IngestionBatch) -> Vec<NormalizedRecord> {
    let mut records = Vec::with_capacity(batch.document_count());

    for (path, documents) in batch.iter() {
        let span = info_span!("normalize", path = %path.display());
        let _guard = span.enter();

        for (index, document) in documents.iter().enumerate() {
            match normalize_document(document) {
                Some(record) => records.push(record),
                None => warn!(index = index, "Document has no scanResults object, skipping"),
            }
        }
    }

    records
}

/// Normalize one raw report document.
///
/// Returns `None` when the document carries no `scanResults` object.
pub fn normalize_document(document: &Value) -> Option<NormalizedRecord> {
    let scan_results = Fields::from_value(document)?
        .object(SCAN_RESULTS)
        .present()?;

    let scan = extract_scan(&scan_results);

    let vulnerabilities: Vec<VulnerabilityRecord> = scan_results
        .array(VULNERABILITIES)
        .map(Vec::as_slice)
        .or_zero()
        .iter()
        .filter_map(|entry| match Fields::from_value(entry) {
            Some(fields) => Some(extract_vulnerability(&fields, &scan)),
            None => {
                warn!(scan_id = %scan.scan_id, "Invalid vulnerability format, skipping");
                None
            }
        })
        .collect();

    debug!(
        scan_id = %scan.scan_id,
        vulnerabilities = vulnerabilities.len(),
        "Document normalized"
    );

    Some(NormalizedRecord {
        scan,
        vulnerabilities,
    })
}

fn extract_scan(scan: &Fields<'_>) -> ScanReport {
    let details = || scan.object(RESOURCE_DETAILS);

    let resource_type = scan
        .string(RESOURCE_TYPE)
        .or_if_absent(|| details().and_then(|d| d.string(&["type"])))
        .or_zero();
    let resource_name = scan
        .string(RESOURCE_NAME)
        .or_if_absent(|| details().and_then(|d| d.string(&["name"])))
        .or_zero();

    let mut report = ScanReport {
        scan_id: scan.string(SCAN_ID).or_zero(),
        timestamp: scan.string(TIMESTAMP).or_zero(),
        status: scan.string(SCAN_STATUS).or_zero(),
        resource_type,
        resource_name,
        ..ScanReport::default()
    };

    if let Some(summary) = scan.object(SUMMARY).present() {
        report.total_vulnerabilities = summary.count(TOTAL_VULNERABILITIES).or_zero();
        report.fixable_count = summary.count(FIXABLE_COUNT).or_zero();
        report.severity_counts = summary
            .raw(SEVERITY_COUNTS)
            .present()
            .map(Value::to_string)
            .unwrap_or_default();
        report.compliant = summary.boolean(COMPLIANT).or_zero();
    }

    report
}

fn extract_vulnerability(vuln: &Fields<'_>, scan: &ScanReport) -> VulnerabilityRecord {
    let (package_name, current_version, fixed_version) =
        if vuln.lookup(PACKAGE_NAME).is_some() {
            (
                vuln.string(PACKAGE_NAME).or_zero(),
                vuln.string(CURRENT_VERSION).or_zero(),
                vuln.string(FIXED_VERSION).or_zero(),
            )
        } else if let Some(package) = vuln.object(PACKAGE).present() {
            (
                package.string(&["name"]).or_zero(),
                package.string(&["version"]).or_zero(),
                package.string(&["fixedVersion"]).or_zero(),
            )
        } else {
            Default::default()
        };

    VulnerabilityRecord {
        id: vuln.string(VULN_ID).or_zero(),
        scan_id: scan.scan_id.clone(),
        severity: vuln.string(SEVERITY).or_zero(),
        cvss: vuln.float(CVSS).or_zero(),
        status: scan.status.clone(),
        package_name,
        current_version,
        fixed_version,
        description: vuln.string(DESCRIPTION).or_zero(),
        published_date: vuln.string(PUBLISHED_DATE).or_zero(),
        link: vuln.string(LINK).or_zero(),
        risk_factors: extract_risk_factors(vuln),
    }
}

/// Explicit risk factors, or factors derived from the threat context
fn extract_risk_factors(vuln: &Fields<'_>) -> Vec<String> {
    let factors: Vec<String> = match vuln.array(RISK_FACTORS) {
        Extracted::Present(entries) => entries
            .iter()
            .filter_map(|entry| entry.as_str().map(str::to_string))
            .collect(),
        Extracted::WrongType { key, found } => {
            warn!(key = key, found = found, "Risk factors are not a list, ignoring");
            Vec::new()
        }
        Extracted::Absent => match vuln.object(THREAT_CONTEXT).present() {
            Some(threat) => derive_threat_factors(&threat),
            None => Vec::new(),
        },
    };

    let mut distinct: Vec<String> = Vec::with_capacity(factors.len());
    for factor in factors {
        if !distinct.contains(&factor) {
            distinct.push(factor);
        }
    }
    distinct
}

fn derive_threat_factors(threat: &Fields<'_>) -> Vec<String> {
    let mut factors = Vec::new();

    if threat.boolean(&["inTheWild"]).present() == Some(true) {
        factors.push("In The Wild".to_string());
    }
    if threat.boolean(&["hasExploit"]).present() == Some(true) {
        factors.push("Exploit Available".to_string());
    }
    if let Some(maturity) = threat.string(&["exploitMaturity"]).present() {
        factors.push(format!("Exploit Maturity: {}", maturity));
    }

    factors
}
