//! Request orchestration — one outcome per enroll/verify upload.
//!
//! Validation runs before any backend traffic; a rejected upload never
//! reaches the relay.

use crate::normalizer;
use crate::relay::Relay;
use crate::types::{ImagePayload, OperationMode, RequestOutcome, ValidatedRequest};
use crate::validator;

/// Ties validation, relay and normalization into the enroll/verify operations.
///
/// Holds no per-request state; one instance serves concurrent requests.
/// Makes a single relay call per request and never retries itself.
#[derive(Debug, Clone)]
pub struct Orchestrator<R> {
    relay: R,
}

impl<R: Relay> Orchestrator<R> {
    pub fn new(relay: R) -> Self {
        Self { relay }
    }

    pub fn relay(&self) -> &R {
        &self.relay
    }

    /// Relay a validated request and normalize the backend's answer.
    pub async fn handle(&self, request: ValidatedRequest) -> RequestOutcome {
        let mode = request.mode();
        let result = self.relay.relay(mode, request.fields()).await;
        let outcome = normalizer::normalize(mode, result);
        tracing::info!(%mode, outcome = outcome.label(), "request handled");
        outcome
    }

    /// Validate a raw upload, then [`handle`](Self::handle) it.
    ///
    /// Rejected uploads return immediately without touching the relay.
    pub async fn submit(
        &self,
        mode: OperationMode,
        payload: Option<ImagePayload>,
        identity_key: Option<&str>,
    ) -> RequestOutcome {
        match validator::validate(mode, payload, identity_key) {
            Ok(request) => self.handle(request).await,
            Err(reason) => {
                tracing::info!(%mode, reason = reason.code(), "request rejected");
                RequestOutcome::Rejected(reason)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relay::{BackendResponse, RelayError, RelayFields};
    use crate::types::IdentityKey;
    use crate::validator::RejectionReason;
    use serde_json::{json, Value};
    use std::sync::Mutex;

    /// Relay double that records every call and replays a fixed answer.
    struct ScriptedRelay {
        reply: Result<Value, RelayError>,
        calls: Mutex<Vec<(OperationMode, Option<String>, usize)>>,
    }

    impl ScriptedRelay {
        fn answering(body: Value) -> Self {
            Self {
                reply: Ok(body),
                calls: Mutex::new(Vec::new()),
            }
        }

        fn failing(err: RelayError) -> Self {
            Self {
                reply: Err(err),
                calls: Mutex::new(Vec::new()),
            }
        }

        fn calls(&self) -> Vec<(OperationMode, Option<String>, usize)> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl Relay for ScriptedRelay {
        async fn relay(
            &self,
            target: OperationMode,
            fields: RelayFields<'_>,
        ) -> Result<BackendResponse, RelayError> {
            self.calls.lock().unwrap().push((
                target,
                fields.identity_key.map(|k| k.as_str().to_string()),
                fields.payload.len(),
            ));
            self.reply.clone().map(|body| BackendResponse { status: 200, body })
        }
    }

    fn jpeg() -> Option<ImagePayload> {
        Some(ImagePayload::new(
            vec![0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10],
            Some("image/jpeg"),
            Some("face.jpg"),
        ))
    }

    #[tokio::test]
    async fn test_enroll_scenario_passes_message_through() {
        let orch = Orchestrator::new(ScriptedRelay::answering(json!({"message": "Enrolled E42"})));
        let outcome = orch.submit(OperationMode::Enroll, jpeg(), Some("E42")).await;

        assert_eq!(outcome, RequestOutcome::Accepted("Enrolled E42".into()));
        assert_eq!(
            orch.relay().calls(),
            vec![(OperationMode::Enroll, Some("E42".to_string()), 6)]
        );
    }

    #[tokio::test]
    async fn test_verify_scenario_no_match() {
        let orch = Orchestrator::new(ScriptedRelay::answering(json!({"matched": false})));
        let outcome = orch.submit(OperationMode::Verify, jpeg(), None).await;
        assert_eq!(outcome, RequestOutcome::NotMatched);
    }

    #[tokio::test]
    async fn test_verify_match_uses_backend_identity() {
        let orch = Orchestrator::new(ScriptedRelay::answering(
            json!({"matched": true, "employeeId": "E1", "message": "Match found: Employee E1"}),
        ));
        let outcome = orch.submit(OperationMode::Verify, jpeg(), Some("ignored")).await;

        assert_eq!(outcome, RequestOutcome::Matched(IdentityKey::parse("E1").unwrap()));
        // The caller's identity key is never forwarded on verify.
        assert_eq!(orch.relay().calls(), vec![(OperationMode::Verify, None, 6)]);
    }

    #[tokio::test]
    async fn test_empty_verify_upload_makes_no_relay_call() {
        let orch = Orchestrator::new(ScriptedRelay::answering(json!({"matched": true})));
        let empty = Some(ImagePayload::new(Vec::new(), None, None));
        let outcome = orch.submit(OperationMode::Verify, empty, None).await;

        assert_eq!(outcome, RequestOutcome::Rejected(RejectionReason::MissingPayload));
        assert!(orch.relay().calls().is_empty());
    }

    #[tokio::test]
    async fn test_rejections_make_no_relay_call() {
        let orch = Orchestrator::new(ScriptedRelay::answering(json!({"message": "ok"})));

        let outcome = orch.submit(OperationMode::Enroll, None, Some("E1")).await;
        assert_eq!(outcome, RequestOutcome::Rejected(RejectionReason::MissingPayload));

        let outcome = orch.submit(OperationMode::Enroll, jpeg(), Some("")).await;
        assert_eq!(outcome, RequestOutcome::Rejected(RejectionReason::MissingIdentityKey));

        assert!(orch.relay().calls().is_empty());
    }

    #[tokio::test]
    async fn test_relay_failures_are_backend_unavailable() {
        for err in [RelayError::Timeout, RelayError::ConnectionFailed] {
            for (mode, key) in [(OperationMode::Enroll, Some("E1")), (OperationMode::Verify, None)] {
                let orch = Orchestrator::new(ScriptedRelay::failing(err));
                let outcome = orch.submit(mode, jpeg(), key).await;
                assert_eq!(outcome, RequestOutcome::BackendUnavailable);
                assert_eq!(orch.relay().calls().len(), 1);
            }
        }
    }

    #[tokio::test]
    async fn test_handle_accepts_prevalidated_request() {
        let orch = Orchestrator::new(ScriptedRelay::answering(json!({})));
        let request = ValidatedRequest::Enroll {
            payload: ImagePayload::new(vec![1], None, None),
            identity_key: IdentityKey::parse("E7").unwrap(),
        };
        assert_eq!(orch.handle(request).await, RequestOutcome::Accepted(String::new()));
    }
}
