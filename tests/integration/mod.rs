//! Integration tests module
//!
//! Engine-level tests over the in-memory backend, organized by scenario.

pub mod scenarios;
pub mod sessions;
