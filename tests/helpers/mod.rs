//! Test helpers module
//!
//! Engine contexts over the in-memory stores, a Postgres container helper,
//! and request builders shared by the integration tests.

#![allow(dead_code)]
#![allow(unused_imports)]

pub mod database_helper;
pub mod test_context;
pub mod test_data;

pub use database_helper::*;
pub use test_context::*;
pub use test_data::*;
