use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::validator::RejectionReason;

/// Media type used when the caller declares none and the bytes are not a known image format.
pub const OCTET_STREAM: &str = "application/octet-stream";

/// File name stem used when the caller supplies no file name.
const DEFAULT_FILE_STEM: &str = "capture";

/// Multipart field carrying the image, inbound and outbound.
pub const FILE_FIELD: &str = "file";
/// Multipart field carrying the identity key, inbound and outbound.
pub const IDENTITY_FIELD: &str = "employeeId";

/// Workflow requested for a single upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationMode {
    /// Register a reference image under an identity key.
    Enroll,
    /// Compare an unlabeled image against enrolled identities.
    Verify,
}

impl OperationMode {
    /// Path of this operation, identical on the gateway and on the backend.
    pub fn path(self) -> &'static str {
        match self {
            Self::Enroll => "/api/enroll",
            Self::Verify => "/api/verify",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Enroll => "enroll",
            Self::Verify => "verify",
        }
    }
}

impl fmt::Display for OperationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Uploaded still image, held only for the duration of one request.
#[derive(Debug, Clone)]
pub struct ImagePayload {
    data: Bytes,
    media_type: String,
    file_name: String,
}

impl ImagePayload {
    /// Wrap uploaded bytes.
    ///
    /// A missing or blank media type is sniffed from the magic bytes, falling
    /// back to `application/octet-stream`. A missing file name becomes
    /// `capture.<ext>` (or plain `capture` for unknown formats).
    pub fn new(data: impl Into<Bytes>, media_type: Option<&str>, file_name: Option<&str>) -> Self {
        let data = data.into();
        let sniffed = image::guess_format(&data).ok();

        let media_type = match media_type.map(str::trim).filter(|m| !m.is_empty()) {
            Some(declared) => declared.to_string(),
            None => sniffed
                .map(|f| f.to_mime_type())
                .unwrap_or(OCTET_STREAM)
                .to_string(),
        };

        let file_name = match file_name.map(str::trim).filter(|n| !n.is_empty()) {
            Some(name) => name.to_string(),
            None => match sniffed.and_then(|f| f.extensions_str().first()) {
                Some(ext) => format!("{DEFAULT_FILE_STEM}.{ext}"),
                None => DEFAULT_FILE_STEM.to_string(),
            },
        };

        Self {
            data,
            media_type,
            file_name,
        }
    }

    pub fn data(&self) -> &Bytes {
        &self.data
    }

    pub fn media_type(&self) -> &str {
        &self.media_type
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Opaque caller-assigned identifier of an enrollment subject (e.g. an employee id).
///
/// Uniqueness and overwrite policy belong to the recognition backend.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IdentityKey(String);

impl IdentityKey {
    /// Returns `None` for empty or whitespace-only input. The key is otherwise kept verbatim.
    pub fn parse(raw: impl Into<String>) -> Option<Self> {
        let raw = raw.into();
        if raw.trim().is_empty() {
            None
        } else {
            Some(Self(raw))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for IdentityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A request that passed upload validation. Each variant carries exactly the
/// fields valid for its mode.
#[derive(Debug, Clone)]
pub enum ValidatedRequest {
    Enroll {
        payload: ImagePayload,
        identity_key: IdentityKey,
    },
    Verify {
        payload: ImagePayload,
    },
}

impl ValidatedRequest {
    pub fn mode(&self) -> OperationMode {
        match self {
            Self::Enroll { .. } => OperationMode::Enroll,
            Self::Verify { .. } => OperationMode::Verify,
        }
    }

    pub fn payload(&self) -> &ImagePayload {
        match self {
            Self::Enroll { payload, .. } | Self::Verify { payload } => payload,
        }
    }

    pub fn identity_key(&self) -> Option<&IdentityKey> {
        match self {
            Self::Enroll { identity_key, .. } => Some(identity_key),
            Self::Verify { .. } => None,
        }
    }
}

/// Result of a verification, as decided by the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatchOutcome {
    Matched { identity_key: IdentityKey },
    NoMatch,
}

/// The single caller-visible result of a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestOutcome {
    /// Enrollment relayed; carries the backend's message verbatim.
    Accepted(String),
    Matched(IdentityKey),
    NotMatched,
    Rejected(RejectionReason),
    /// Any relay or backend failure. Carries no backend detail.
    BackendUnavailable,
}

impl RequestOutcome {
    /// Short label for logs.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Accepted(_) => "accepted",
            Self::Matched(_) => "matched",
            Self::NotMatched => "not_matched",
            Self::Rejected(_) => "rejected",
            Self::BackendUnavailable => "backend_unavailable",
        }
    }
}

impl From<MatchOutcome> for RequestOutcome {
    fn from(outcome: MatchOutcome) -> Self {
        match outcome {
            MatchOutcome::Matched { identity_key } => Self::Matched(identity_key),
            MatchOutcome::NoMatch => Self::NotMatched,
        }
    }
}
