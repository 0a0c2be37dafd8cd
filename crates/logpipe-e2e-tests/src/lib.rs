//! End-to-end integration tests for the log pipeline.
//!
//! These tests exercise the full path over a loopback socket:
//! - Log client buffering and batching
//! - HTTP transport delivery and API key checks
//! - Ingest service partitioning and live fan-out
//! - Archive reads, paginated queries and retention

#![cfg(test)]
