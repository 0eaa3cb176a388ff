//! Backend relay — forwards validated uploads to the recognition backend.
//!
//! Each upload becomes one multipart POST to `{base}/api/enroll` or
//! `{base}/api/verify`. Every failure (transport, non-2xx status, body that
//! is not JSON) is folded into a [`RelayError`] kind; callers never see a raw
//! transport error.

use reqwest::multipart::{Form, Part};
use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use url::Url;

use crate::retry;
use crate::types::{
    IdentityKey, ImagePayload, OperationMode, ValidatedRequest, FILE_FIELD, IDENTITY_FIELD,
};

/// Total time allowed for one backend exchange, body included.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Longest backend error body echoed into logs.
const LOGGED_BODY_LIMIT: usize = 256;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayError {
    #[error("backend timed out")]
    Timeout,
    #[error("backend connection failed")]
    ConnectionFailed,
    #[error("backend response was not valid JSON")]
    InvalidResponse,
    #[error("backend returned status {0}")]
    BackendError(u16),
}

impl RelayError {
    fn from_transport(err: &reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else {
            Self::ConnectionFailed
        }
    }

    /// Whether a retry could plausibly succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Timeout | Self::ConnectionFailed)
    }
}

/// A 2xx backend reply whose body parsed as JSON. Field checks happen in the normalizer.
#[derive(Debug, Clone, PartialEq)]
pub struct BackendResponse {
    pub status: u16,
    pub body: serde_json::Value,
}

/// Fields forwarded alongside the image.
#[derive(Debug, Clone, Copy)]
pub struct RelayFields<'a> {
    pub payload: &'a ImagePayload,
    pub identity_key: Option<&'a IdentityKey>,
}

impl ValidatedRequest {
    pub fn fields(&self) -> RelayFields<'_> {
        RelayFields {
            payload: self.payload(),
            identity_key: self.identity_key(),
        }
    }
}

/// Transport to the recognition backend.
pub trait Relay: Send + Sync {
    fn relay(
        &self,
        target: OperationMode,
        fields: RelayFields<'_>,
    ) -> impl Future<Output = Result<BackendResponse, RelayError>> + Send;
}

/// Connection settings for [`HttpRelay`].
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Backend base address, e.g. `http://127.0.0.1:8000`. A path prefix is kept.
    pub base_url: Url,
    pub timeout: Duration,
    pub connect_timeout: Duration,
    /// Extra attempts for `Verify` on transport failure. `Enroll` is never retried.
    pub verify_retries: u32,
}

impl RelayConfig {
    pub fn new(base_url: Url) -> Self {
        Self {
            base_url,
            timeout: DEFAULT_TIMEOUT,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            verify_retries: 0,
        }
    }
}

/// Build the multipart body shared by the gateway relay and the CLI.
pub fn multipart_form(payload: &ImagePayload, identity_key: Option<&IdentityKey>) -> Form {
    let form = Form::new().part(FILE_FIELD, file_part(payload));
    match identity_key {
        Some(key) => form.text(IDENTITY_FIELD, key.as_str().to_string()),
        None => form,
    }
}

fn file_part(payload: &ImagePayload) -> Part {
    // `Bytes` clones share the buffer, so retries never copy the image.
    let part = || {
        let body = reqwest::Body::from(payload.data().clone());
        Part::stream_with_length(body, payload.len() as u64)
            .file_name(payload.file_name().to_string())
    };
    match part().mime_str(payload.media_type()) {
        Ok(part) => part,
        Err(err) => {
            tracing::debug!(
                media_type = payload.media_type(),
                error = %err,
                "declared media type rejected; sending without one"
            );
            part()
        }
    }
}

/// [`Relay`] over HTTP with `reqwest`.
#[derive(Debug, Clone)]
pub struct HttpRelay {
    http: reqwest::Client,
    base_url: Url,
    enroll_url: String,
    verify_url: String,
    probe_timeout: Duration,
    verify_retries: u32,
}

impl HttpRelay {
    pub fn new(config: RelayConfig) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .connect_timeout(config.connect_timeout)
            .build()?;

        Ok(Self {
            http,
            enroll_url: endpoint(&config.base_url, OperationMode::Enroll),
            verify_url: endpoint(&config.base_url, OperationMode::Verify),
            base_url: config.base_url,
            probe_timeout: config.connect_timeout,
            verify_retries: config.verify_retries,
        })
    }

    fn url_for(&self, target: OperationMode) -> &str {
        match target {
            OperationMode::Enroll => &self.enroll_url,
            OperationMode::Verify => &self.verify_url,
        }
    }

    /// Whether the backend answers at all. Any HTTP status counts as reachable.
    pub async fn probe(&self) -> bool {
        match self
            .http
            .get(self.base_url.clone())
            .timeout(self.probe_timeout)
            .send()
            .await
        {
            Ok(resp) => {
                tracing::debug!(status = resp.status().as_u16(), "backend probe answered");
                true
            }
            Err(err) => {
                tracing::warn!(backend = %self.base_url, error = %err, "backend probe failed");
                false
            }
        }
    }

    async fn send_once(
        &self,
        target: OperationMode,
        fields: RelayFields<'_>,
    ) -> Result<BackendResponse, RelayError> {
        let url = self.url_for(target);
        tracing::debug!(
            %target,
            url,
            bytes = fields.payload.len(),
            media_type = fields.payload.media_type(),
            "relaying upload"
        );

        let form = multipart_form(fields.payload, fields.identity_key);
        let resp = self
            .http
            .post(url)
            .multipart(form)
            .send()
            .await
            .map_err(|err| {
                let kind = RelayError::from_transport(&err);
                tracing::warn!(%target, kind = %kind, error = %err, "backend request failed");
                kind
            })?;

        let status = resp.status();
        let body = resp.bytes().await.map_err(|err| {
            let kind = RelayError::from_transport(&err);
            tracing::warn!(%target, kind = %kind, error = %err, "reading backend body failed");
            kind
        })?;

        if !status.is_success() {
            let text = String::from_utf8_lossy(&body);
            let excerpt: String = text.chars().take(LOGGED_BODY_LIMIT).collect();
            tracing::warn!(%target, status = status.as_u16(), body = %excerpt, "backend returned error status");
            return Err(RelayError::BackendError(status.as_u16()));
        }

        let body = serde_json::from_slice(&body).map_err(|err| {
            tracing::warn!(%target, error = %err, "backend body is not JSON");
            RelayError::InvalidResponse
        })?;

        Ok(BackendResponse {
            status: status.as_u16(),
            body,
        })
    }
}

impl Relay for HttpRelay {
    async fn relay(
        &self,
        target: OperationMode,
        fields: RelayFields<'_>,
    ) -> Result<BackendResponse, RelayError> {
        let retries = match target {
            OperationMode::Verify => self.verify_retries,
            OperationMode::Enroll => 0,
        };
        retry::retry_transient(retries, move || self.send_once(target, fields)).await
    }
}

fn endpoint(base: &Url, target: OperationMode) -> String {
    format!("{}{}", base.as_str().trim_end_matches('/'), target.path())
}
