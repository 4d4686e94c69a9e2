//! Session lifecycle: abandonment, failures, replicas and restarts

pub mod lifecycle_test;
pub mod replica_test;
