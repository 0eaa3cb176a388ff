use axum::extract::multipart::{Multipart, MultipartError, MultipartRejection};
use axum::extract::{DefaultBodyLimit, State};
use axum::http::{HeaderValue, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use proctor_core::types::{FILE_FIELD, IDENTITY_FIELD};
use proctor_core::{HttpRelay, ImagePayload, OperationMode, Orchestrator, RequestOutcome};
use serde::Serialize;
use std::any::Any;
use std::sync::Arc;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::{self, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::Instrument;
use uuid::Uuid;

/// Body of every 500 response. Backend detail never reaches the caller.
const PROCESSING_ERROR: &str = "Error processing request";

/// HTTP gateway for the proctor service.
///
/// Routes:
///   POST /api/enroll  multipart `file` + `employeeId` -> `{message}`
///   POST /api/verify  multipart `file`                -> `{matched, employeeId?}`
///   GET  /api/health                                  -> `{status, version, backend}`
pub struct AppState {
    orchestrator: Orchestrator<HttpRelay>,
}

impl AppState {
    pub fn new(orchestrator: Orchestrator<HttpRelay>) -> Self {
        Self { orchestrator }
    }
}

/// Transport-level settings for the router.
#[derive(Debug, Clone)]
pub struct RouterOptions {
    pub max_upload_bytes: usize,
    pub cors_origin: Option<HeaderValue>,
}

pub fn router(state: Arc<AppState>, options: RouterOptions) -> Router {
    let cors_layer = match options.cors_origin {
        // A list only echoes a matching request origin back.
        Some(origin) => CorsLayer::new()
            .allow_origin(cors::AllowOrigin::list([origin]))
            .allow_methods([Method::GET, Method::POST])
            .allow_headers(cors::Any),
        None => CorsLayer::permissive(),
    };

    Router::new()
        .route("/api/enroll", post(enroll))
        .route("/api/verify", post(verify))
        .route("/api/health", get(health))
        .layer(DefaultBodyLimit::max(options.max_upload_bytes))
        .layer(cors_layer)
        .layer(TraceLayer::new_for_http())
        .layer(CatchPanicLayer::custom(panic_response))
        .with_state(state)
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

#[derive(Debug, Serialize)]
struct EnrollBody {
    message: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct VerifyBody {
    matched: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    employee_id: Option<String>,
}

#[derive(Debug, Serialize)]
struct HealthBody {
    status: &'static str,
    version: &'static str,
    backend: &'static str,
}

fn error_response(status: StatusCode, error: impl Into<String>) -> Response {
    (status, Json(ErrorBody { error: error.into() })).into_response()
}

fn outcome_response(outcome: RequestOutcome) -> Response {
    match outcome {
        RequestOutcome::Accepted(message) => Json(EnrollBody { message }).into_response(),
        RequestOutcome::Matched(identity_key) => Json(VerifyBody {
            matched: true,
            employee_id: Some(identity_key.as_str().to_string()),
        })
        .into_response(),
        RequestOutcome::NotMatched => Json(VerifyBody {
            matched: false,
            employee_id: None,
        })
        .into_response(),
        RequestOutcome::Rejected(reason) => error_response(StatusCode::BAD_REQUEST, reason.to_string()),
        RequestOutcome::BackendUnavailable => {
            error_response(StatusCode::INTERNAL_SERVER_ERROR, PROCESSING_ERROR)
        }
    }
}

fn panic_response(panic: Box<dyn Any + Send + 'static>) -> Response {
    let detail = panic
        .downcast_ref::<String>()
        .map(String::as_str)
        .or_else(|| panic.downcast_ref::<&str>().copied())
        .unwrap_or("unknown panic");
    tracing::error!(panic = detail, "request handler panicked");
    error_response(StatusCode::INTERNAL_SERVER_ERROR, PROCESSING_ERROR)
}

/// Fields collected from an inbound multipart upload. Unknown fields are skipped.
#[derive(Debug, Default)]
struct UploadForm {
    file: Option<ImagePayload>,
    employee_id: Option<String>,
}

impl UploadForm {
    async fn read(mut multipart: Multipart) -> Result<Self, MultipartError> {
        let mut form = Self::default();
        while let Some(field) = multipart.next_field().await? {
            let name = field.name().map(str::to_owned);
            match name.as_deref() {
                Some(FILE_FIELD) => {
                    let media_type = field.content_type().map(str::to_owned);
                    let file_name = field.file_name().map(str::to_owned);
                    let data = field.bytes().await?;
                    form.file = Some(ImagePayload::new(
                        data,
                        media_type.as_deref(),
                        file_name.as_deref(),
                    ));
                }
                Some(IDENTITY_FIELD) => form.employee_id = Some(field.text().await?),
                other => tracing::debug!(field = ?other, "ignoring multipart field"),
            }
        }
        Ok(form)
    }
}

async fn enroll(
    State(state): State<Arc<AppState>>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Response {
    submit(&state, OperationMode::Enroll, multipart).await
}

async fn verify(
    State(state): State<Arc<AppState>>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Response {
    submit(&state, OperationMode::Verify, multipart).await
}

async fn submit(
    state: &AppState,
    mode: OperationMode,
    multipart: Result<Multipart, MultipartRejection>,
) -> Response {
    let request_id = Uuid::new_v4();
    let span = tracing::info_span!("upload", %request_id, %mode);

    async move {
        let multipart = match multipart {
            Ok(multipart) => multipart,
            Err(rejection) => {
                tracing::info!(status = rejection.status().as_u16(), "upload is not multipart");
                return error_response(rejection.status(), rejection.body_text());
            }
        };

        let form = match UploadForm::read(multipart).await {
            Ok(form) => form,
            Err(err) => {
                tracing::info!(status = err.status().as_u16(), error = %err, "malformed upload");
                return error_response(err.status(), err.body_text());
            }
        };

        tracing::info!(
            bytes = form.file.as_ref().map_or(0, ImagePayload::len),
            "upload received"
        );

        let outcome = state
            .orchestrator
            .submit(mode, form.file, form.employee_id.as_deref())
            .await;
        outcome_response(outcome)
    }
    .instrument(span)
    .await
}

async fn health(State(state): State<Arc<AppState>>) -> Json<HealthBody> {
    let reachable = state.orchestrator.relay().probe().await;
    Json(HealthBody {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        backend: if reachable { "reachable" } else { "unreachable" },
    })
}
