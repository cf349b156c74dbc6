//! Unit tests - configuration loading, metadata resolution and query documents
//!
//! These tests exercise one component at a time through the public API.

mod config_tests;
mod query_document_tests;
