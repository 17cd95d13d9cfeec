//! Main axum router and HTTP request handlers.
//!
//! Routes:
//! - `POST /api/process-github`   - fetch a GitHub file and copy it to the VM
//! - `POST /api/clone-and-deploy` - not implemented (501)
//! - `GET  /healthz`              - health check
//! - `GET  /metrics`              - Prometheus metrics

use std::sync::Arc;
use std::time::Instant;

use axum::extract::rejection::JsonRejection;
use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tracing::{error, info, instrument, warn};

use crate::delivery::{self, DeliveryError, DeliveryReport};
use crate::fetch::FetchError;
use crate::github::{self, ParseError};
use crate::metrics::Outcome;
use crate::AppState;

/// Shown to callers who send a malformed request or URL.
const EXAMPLE_FILE_URL: &str = "https://github.com/username/repo/blob/main/path/to/file.txt";

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

/// Build the axum [`Router`] with all HTTP routes and shared state.
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/process-github", post(handle_process_github))
        .route("/api/clone-and-deploy", post(handle_clone_and_deploy))
        .route("/healthz", get(handle_health))
        .route("/metrics", get(handle_metrics))
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Request / response bodies
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct ProcessGithubRequest {
    github_url: String,
}

#[derive(Debug, Serialize)]
struct MessageBody {
    message: String,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    example: Option<&'static str>,
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// `POST /api/process-github`
///
/// Parses the submitted GitHub URL, downloads the raw content, and writes it
/// to the configured VM over a single SFTP session.
#[instrument(skip_all)]
async fn handle_process_github(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<ProcessGithubRequest>, JsonRejection>,
) -> Result<Response, AppError> {
    let Json(req) = payload.map_err(|e| {
        warn!(error = %e, "malformed process-github request body");
        AppError::BadRequest {
            error: "GitHub URL is required".into(),
            example: Some(EXAMPLE_FILE_URL),
        }
    })?;

    info!(github_url = %req.github_url, "processing GitHub URL");

    // Rejected before any fetch or transfer: count it, but keep it out of
    // the delivery-latency histogram.
    let reference = match github::parse(&req.github_url) {
        Ok(reference) => reference,
        Err(e) => {
            state
                .metrics
                .metrics
                .observe_rejection(Outcome::ParseRejected);
            return Err(e.into());
        }
    };

    let started = Instant::now();

    let target = state.config.vm.to_target();
    let result = delivery::deliver(
        &state.http_client,
        state.writer.as_ref(),
        &reference,
        &target,
    )
    .await;

    let elapsed = started.elapsed().as_secs_f64();

    match result {
        Ok(report) => {
            state
                .metrics
                .metrics
                .observe_delivery(Outcome::Success, elapsed);
            Ok((
                StatusCode::OK,
                Json(MessageBody {
                    message: success_message(&report),
                }),
            )
                .into_response())
        }
        Err(e) => {
            let outcome = match e {
                DeliveryError::Fetch(_) => Outcome::FetchFailed,
                DeliveryError::Transfer(_) => Outcome::TransferFailed,
            };
            state.metrics.metrics.observe_delivery(outcome, elapsed);
            Err(e.into())
        }
    }
}

/// Render the 200 confirmation for a finished delivery.
fn success_message(report: &DeliveryReport) -> String {
    format!(
        "Successfully copied {} to VM at {}",
        report.file_name, report.vm_host
    )
}

/// `POST /api/clone-and-deploy`
///
/// The bundled frontend references this second contract, but its semantics
/// were never pinned down; answer 501 so the caller gets a proper JSON error.
async fn handle_clone_and_deploy() -> Response {
    warn!("rejected clone-and-deploy request (not implemented)");
    (
        StatusCode::NOT_IMPLEMENTED,
        Json(ErrorBody {
            error: "clone-and-deploy is not available on this server; \
                    use /api/process-github to copy a single file"
                .into(),
            example: None,
        }),
    )
        .into_response()
}

/// `GET /healthz`
async fn handle_health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let health_state = crate::health::HealthState {
        vm_host: state.config.vm.host.clone(),
        http_client: state.http_client.clone(),
    };
    crate::health::health_handler(axum::extract::State(health_state)).await
}

/// `GET /metrics`
async fn handle_metrics(State(state): State<Arc<AppState>>) -> Result<Response, AppError> {
    let mut buf = String::new();
    prometheus_client::encoding::text::encode(&mut buf, &state.metrics.registry)
        .map_err(|e| AppError::Internal(anyhow::anyhow!("metrics encoding failed: {e}")))?;

    Ok((
        StatusCode::OK,
        [(
            header::CONTENT_TYPE,
            "application/openmetrics-text; version=1.0.0; charset=utf-8",
        )],
        buf,
    )
        .into_response())
}

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Application-level error type that maps cleanly to HTTP responses.
#[derive(Debug)]
pub enum AppError {
    /// Malformed request body or GitHub URL.
    BadRequest {
        error: String,
        example: Option<&'static str>,
    },
    /// The GitHub file does not exist (or the repository is private).
    NotFound(String),
    /// GitHub or the VM could not be reached, or the transfer failed.
    BadGateway(String),
    /// An unexpected internal error.
    Internal(anyhow::Error),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            AppError::BadRequest { error, example } => {
                (StatusCode::BAD_REQUEST, ErrorBody { error, example })
            }
            AppError::NotFound(error) => (
                StatusCode::NOT_FOUND,
                ErrorBody {
                    error,
                    example: None,
                },
            ),
            AppError::BadGateway(error) => (
                StatusCode::BAD_GATEWAY,
                ErrorBody {
                    error,
                    example: None,
                },
            ),
            AppError::Internal(err) => {
                error!(error = %err, "internal server error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorBody {
                        error: format!("Internal server error: {err:#}"),
                        example: None,
                    },
                )
            }
        };
        (status, Json(body)).into_response()
    }
}

impl From<ParseError> for AppError {
    fn from(err: ParseError) -> Self {
        AppError::BadRequest {
            error: err.to_string(),
            example: Some(EXAMPLE_FILE_URL),
        }
    }
}

impl From<DeliveryError> for AppError {
    fn from(err: DeliveryError) -> Self {
        match err {
            DeliveryError::Fetch(FetchError::NotFound { .. }) => AppError::NotFound(err.to_string()),
            DeliveryError::Fetch(FetchError::HtmlContent) => AppError::BadRequest {
                error: err.to_string(),
                example: Some(EXAMPLE_FILE_URL),
            },
            DeliveryError::Fetch(FetchError::NetworkError(_)) => {
                AppError::BadGateway(err.to_string())
            }
            DeliveryError::Transfer(_) => AppError::BadGateway(err.to_string()),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
