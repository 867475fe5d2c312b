//! Ingestion pipeline
//!
//! # Module Structure
//! - `source`: Fetches the report repository into the workspace
//! - `discovery`: Finds report files under the workspace
//! - `pool`: Selection and bounded-concurrency file reads
//! - `document`: Typed field accessors over raw JSON documents
//! - `normalizer`: Vendor field variants to canonical records
//! - `orchestrator`: One full run from reset to persistence

pub mod discovery;
pub mod document;
pub mod normalizer;
pub mod orchestrator;
pub mod pool;
pub mod source;

pub use orchestrator::{IngestReport, IngestRequest, Orchestrator};
pub use source::{GitFetcher, SourceFetcher};
