use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use axum::Json;
use axum::extract::State;
use axum::response::{IntoResponse, Response};
use http::StatusCode;
use serde::Serialize;

/// Upper bound for a `claude --version` probe
const PROBE_LIMIT: Duration = Duration::from_secs(5);

/// Health check handler
pub async fn health_handler() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

/// Executable probed by [`cli_health_handler`]
#[derive(Clone)]
pub struct CliHealth {
    path: Arc<PathBuf>,
}

impl CliHealth {
    pub fn new(path: PathBuf) -> Self {
        Self { path: Arc::new(path) }
    }
}

#[derive(Serialize)]
struct CliHealthBody {
    status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    cli_version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

/// Health check that also confirms the CLI answers `--version`
pub async fn cli_health_handler(State(health): State<CliHealth>) -> Response {
    match bridge_cli::probe_version(&health.path, PROBE_LIMIT).await {
        Ok(version) => (
            StatusCode::OK,
            Json(CliHealthBody {
                status: "ok",
                cli_version: Some(version),
                error: None,
            }),
        )
            .into_response(),
        Err(e) => {
            tracing::warn!(error = %e, path = %health.path.display(), "claude CLI health probe failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(CliHealthBody {
                    status: "unavailable",
                    cli_version: None,
                    error: Some(e.to_string()),
                }),
            )
                .into_response()
        }
    }
}
