//! Health checks for the two external collaborators: GitHub's raw-content
//! host and the transfer target VM.

use std::time::Duration;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::Serialize;
use tokio::time::timeout;

const RAW_CONTENT_HOST_URL: &str = "https://raw.githubusercontent.com/";
const VM_CHECK_TIMEOUT: Duration = Duration::from_secs(5);
const SSH_PORT: u16 = 22;

// ---------------------------------------------------------------------------
// Response types
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: HealthStatus,
    pub checks: HealthChecks,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Ok,
    Degraded,
    Unhealthy,
}

#[derive(Debug, Serialize)]
pub struct HealthChecks {
    pub github: CheckResult,
    pub vm: CheckResult,
}

#[derive(Debug, Serialize)]
pub struct CheckResult {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl CheckResult {
    fn healthy() -> Self {
        Self {
            ok: true,
            detail: None,
        }
    }

    fn unhealthy(detail: impl Into<String>) -> Self {
        Self {
            ok: false,
            detail: Some(detail.into()),
        }
    }
}

// ---------------------------------------------------------------------------
// Shared state expected by the handler
// ---------------------------------------------------------------------------

/// Minimal subset of `AppState` required by the health-check handler.
#[derive(Clone)]
pub struct HealthState {
    pub vm_host: String,
    pub http_client: reqwest::Client,
}

// ---------------------------------------------------------------------------
// Individual checks
// ---------------------------------------------------------------------------

/// Any HTTP response at all proves the raw-content host is reachable; only a
/// transport failure counts against it.
async fn check_github(client: &reqwest::Client) -> CheckResult {
    match client.head(RAW_CONTENT_HOST_URL).send().await {
        Ok(_) => CheckResult::healthy(),
        Err(e) => CheckResult::unhealthy(format!("HEAD {RAW_CONTENT_HOST_URL} failed: {e}")),
    }
}

/// TCP reachability of the VM's SSH port.  No authentication is attempted.
async fn check_vm(host: &str) -> CheckResult {
    match timeout(
        VM_CHECK_TIMEOUT,
        tokio::net::TcpStream::connect((host, SSH_PORT)),
    )
    .await
    {
        Ok(Ok(_)) => CheckResult::healthy(),
        Ok(Err(e)) => CheckResult::unhealthy(format!("connect to {host}:{SSH_PORT} failed: {e}")),
        Err(_) => CheckResult::unhealthy(format!(
            "connect to {host}:{SSH_PORT} timed out after {VM_CHECK_TIMEOUT:?}"
        )),
    }
}

// ---------------------------------------------------------------------------
// Aggregate status
// ---------------------------------------------------------------------------

fn aggregate_status(checks: &HealthChecks) -> HealthStatus {
    let all_ok = checks.github.ok && checks.vm.ok;
    let any_critical = !checks.vm.ok; // deliveries are impossible without the VM

    if all_ok {
        HealthStatus::Ok
    } else if any_critical {
        HealthStatus::Unhealthy
    } else {
        HealthStatus::Degraded
    }
}

// ---------------------------------------------------------------------------
// Axum handler
// ---------------------------------------------------------------------------

/// `GET /healthz` handler.  Returns 200 on Ok/Degraded, 503 on Unhealthy.
pub async fn health_handler(State(state): State<HealthState>) -> impl IntoResponse {
    let (github, vm) = tokio::join!(check_github(&state.http_client), check_vm(&state.vm_host));

    let checks = HealthChecks { github, vm };
    let status = aggregate_status(&checks);
    let body = HealthResponse { status, checks };

    let http_status = match status {
        HealthStatus::Ok | HealthStatus::Degraded => StatusCode::OK,
        HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };

    (http_status, Json(body))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
