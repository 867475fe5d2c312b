//! Storage layer for scan reports
//!
//! SQLite persistence for scans, their vulnerabilities and risk factors.
//!
//! # Module Structure
//! - `database`: Database handle and connection locking
//! - `models`: Row and summary types
//! - `schema`: Table creation
//! - `operations`: Idempotent batch writes, reset and statistics
//! - `query`: Severity-filtered vulnerability reads

mod database;
mod models;
mod operations;
mod query;
mod schema;

// Re-export public types
pub use database::Database;
pub use models::{SaveSummary, Stats, VulnerabilityRow};
pub use query::{QueryFilter, VulnerabilityQuery};
