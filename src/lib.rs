pub mod config;
pub mod error;
pub mod health;
pub mod ingest;
pub mod logging;
pub mod model;
pub mod server;
pub mod storage;
