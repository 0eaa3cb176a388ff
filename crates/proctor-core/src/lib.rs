//! proctor-core — Enrollment/verification request lifecycle.
//!
//! Validates uploads, relays them as multipart transfers to an external
//! recognition backend, and normalizes the backend's replies into one
//! stable outcome per request. Face matching itself happens in the backend.

pub mod normalizer;
pub mod orchestrator;
pub mod relay;
mod retry;
pub mod types;
pub mod validator;

pub use orchestrator::Orchestrator;
pub use relay::{HttpRelay, Relay, RelayConfig, RelayError};
pub use types::{IdentityKey, ImagePayload, MatchOutcome, OperationMode, RequestOutcome};
pub use validator::RejectionReason;
