//! Session state module
//!
//! Match detection, the per-group session actor, and the registry that
//! routes engine calls to it.

pub mod detector;
pub mod registry;
pub mod session;

pub use detector::{Candidate, Evaluation, MatchDetector};
pub use registry::{Engine, SessionStream, HISTORY_LIMIT};
pub use session::{SessionActor, SessionCommand, SessionContext, SessionHandle};
