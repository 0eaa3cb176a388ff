//! Upload validation — runs before any network call.

use thiserror::Error;

use crate::types::{IdentityKey, ImagePayload, OperationMode, ValidatedRequest};

/// Why an upload was refused. The `Display` text is the reason shown to the caller.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectionReason {
    #[error("No file provided")]
    MissingPayload,
    #[error("Missing required field: employeeId")]
    MissingIdentityKey,
}

impl RejectionReason {
    /// Stable machine-readable code.
    pub fn code(self) -> &'static str {
        match self {
            Self::MissingPayload => "MissingPayload",
            Self::MissingIdentityKey => "MissingIdentityKey",
        }
    }
}

/// Check that an upload carries what its mode requires.
///
/// An empty payload counts as missing. For `Verify` the identity key is
/// ignored whether or not it is present.
pub fn validate(
    mode: OperationMode,
    payload: Option<ImagePayload>,
    identity_key: Option<&str>,
) -> Result<ValidatedRequest, RejectionReason> {
    let payload = payload
        .filter(|p| !p.is_empty())
        .ok_or(RejectionReason::MissingPayload)?;

    match mode {
        OperationMode::Enroll => {
            let identity_key = identity_key
                .and_then(IdentityKey::parse)
                .ok_or(RejectionReason::MissingIdentityKey)?;
            Ok(ValidatedRequest::Enroll {
                payload,
                identity_key,
            })
        }
        OperationMode::Verify => Ok(ValidatedRequest::Verify { payload }),
    }
}
