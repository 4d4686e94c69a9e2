//! Helper functions and utilities
//!
//! Parameter checks shared by the coordinator and the stores.

use crate::models::group::{MAX_CAPACITY, MIN_CAPACITY, MIN_CREDENTIAL_LENGTH};
use crate::utils::errors::{Result, SwovieError};

/// Validate group capacity (2..=10)
pub fn validate_capacity(capacity: i32) -> Result<()> {
    if !(MIN_CAPACITY..=MAX_CAPACITY).contains(&capacity) {
        return Err(SwovieError::InvalidParameters(format!(
            "capacity must be between {} and {}, got {}",
            MIN_CAPACITY, MAX_CAPACITY, capacity
        )));
    }
    Ok(())
}

/// Validate the shape of a shared credential. Length counts characters, not bytes.
pub fn validate_credential(credential: &str) -> Result<()> {
    let length = credential.chars().count();
    if length < MIN_CREDENTIAL_LENGTH {
        return Err(SwovieError::InvalidParameters(format!(
            "credential must be at least {} characters, got {}",
            MIN_CREDENTIAL_LENGTH, length
        )));
    }
    Ok(())
}

/// Compare two credentials without short-circuiting on the first differing byte
pub fn credentials_match(expected: &str, provided: &str) -> bool {
    let a = expected.as_bytes();
    let b = provided.as_bytes();
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

/// Validate a member identifier handed in by the identity provider
pub fn validate_member_id(member_id: &str) -> Result<()> {
    if member_id.trim().is_empty() {
        return Err(SwovieError::InvalidParameters(
            "member id must not be empty".to_string(),
        ));
    }
    Ok(())
}
