//! Response normalization — backend replies to caller outcomes.
//!
//! Every expected field is checked against a typed shape before it is
//! trusted. Anything that deviates fails closed as
//! [`NormalizeError::MalformedBackendResponse`], which the caller sees as
//! [`RequestOutcome::BackendUnavailable`].

use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

use crate::relay::{BackendResponse, RelayError};
use crate::types::{IdentityKey, MatchOutcome, OperationMode, RequestOutcome};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NormalizeError {
    #[error("malformed backend response: {0}")]
    MalformedBackendResponse(String),
}

/// Expected enrollment reply: `{"message": string?, "success": bool?}`.
#[derive(Debug, Deserialize)]
struct EnrollReply {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    success: Option<bool>,
}

/// Expected verification reply: `{"matched": bool, "employeeId": string?}`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VerifyReply {
    matched: bool,
    #[serde(default)]
    employee_id: Option<String>,
}

fn decode<T: for<'de> Deserialize<'de>>(body: &Value) -> Result<T, NormalizeError> {
    // serde accepts a JSON array for a struct; only objects are valid replies.
    if !body.is_object() {
        return Err(NormalizeError::MalformedBackendResponse(
            "body is not a JSON object".into(),
        ));
    }
    T::deserialize(body).map_err(|e| NormalizeError::MalformedBackendResponse(e.to_string()))
}

/// Prefix the backend puts on messages from its unhandled-exception path.
const BACKEND_FAULT_PREFIX: &str = "Error:";

/// Extract the enrollment message, verbatim. An absent message is `""`.
///
/// A declined enrollment (`success: false`) keeps its message, except when
/// the message is backend fault text, which must not reach the caller.
pub fn decode_enroll(body: &Value) -> Result<String, NormalizeError> {
    let reply: EnrollReply = decode(body)?;
    let message = reply.message.unwrap_or_default();
    if reply.success == Some(false) {
        if message.starts_with(BACKEND_FAULT_PREFIX) {
            tracing::error!(%message, "backend failed enrollment internally");
            return Err(NormalizeError::MalformedBackendResponse(
                "enrollment failed inside the backend".into(),
            ));
        }
        tracing::warn!(%message, "backend declined enrollment");
    }
    Ok(message)
}

/// Extract the match decision. A positive match must name a non-empty identity.
pub fn decode_verify(body: &Value) -> Result<MatchOutcome, NormalizeError> {
    let reply: VerifyReply = decode(body)?;
    if !reply.matched {
        return Ok(MatchOutcome::NoMatch);
    }
    let identity_key = reply
        .employee_id
        .and_then(IdentityKey::parse)
        .ok_or_else(|| {
            NormalizeError::MalformedBackendResponse("match without employeeId".into())
        })?;
    Ok(MatchOutcome::Matched { identity_key })
}

/// Collapse a relay result into the caller-facing outcome.
///
/// Relay error kinds and decode failures are logged here and never surface
/// beyond [`RequestOutcome::BackendUnavailable`].
pub fn normalize(
    mode: OperationMode,
    result: Result<BackendResponse, RelayError>,
) -> RequestOutcome {
    let response = match result {
        Ok(response) => response,
        Err(err) => {
            tracing::error!(%mode, kind = %err, "backend unavailable");
            return RequestOutcome::BackendUnavailable;
        }
    };

    let decoded = match mode {
        OperationMode::Enroll => decode_enroll(&response.body).map(RequestOutcome::Accepted),
        OperationMode::Verify => decode_verify(&response.body).map(RequestOutcome::from),
    };

    decoded.unwrap_or_else(|err| {
        tracing::error!(%mode, status = response.status, error = %err, "backend reply rejected");
        RequestOutcome::BackendUnavailable
    })
}
