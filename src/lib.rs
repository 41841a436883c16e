//! VIGIL — Candidate Lifecycle Engine for Newly Listed Tokens
//!
//! Library crate exposing all modules for use by integration tests
//! and the binary entry point.

pub mod cache;
pub mod config;
pub mod engine;
pub mod filters;
pub mod ingest;
pub mod notify;
pub mod oracle;
pub mod types;
