//! Utility modules
//! 
//! This module contains common utilities used throughout the engine,
//! including error handling, logging setup, retries and helper functions.

pub mod errors;
pub mod logging;
pub mod helpers;
pub mod retry;

pub use errors::{SwovieError, Result};
pub use retry::RetryPolicy;
