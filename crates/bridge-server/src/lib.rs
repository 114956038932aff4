mod cors;
mod health;

use std::net::SocketAddr;

use axum::{Router, routing};
use bridge_config::Config;
use bridge_messages::MessagesState;
use tower_http::trace::TraceLayer;

/// Assembled server with all routes and middleware
pub struct Server {
    router: Router,
    listen_address: SocketAddr,
}

impl Server {
    /// Build the server from configuration
    ///
    /// # Errors
    ///
    /// Returns an error if the permission policy cannot be built from the
    /// configured directories
    pub fn new(config: Config) -> anyhow::Result<Self> {
        let listen_address = config.server.listen_address();
        let messages_state = MessagesState::from_config(&config)?;

        let mut app = Router::new();

        let health = &config.server.health;
        if health.enabled {
            app = if health.check_cli {
                app.route(
                    &health.path,
                    routing::get(health::cli_health_handler)
                        .with_state(health::CliHealth::new(config.cli.path.clone())),
                )
            } else {
                app.route(&health.path, routing::get(health::health_handler))
            };
        }

        app = app.merge(bridge_messages::messages_router(messages_state));

        app = app.layer(TraceLayer::new_for_http());

        if let Some(ref cors_config) = config.server.cors {
            app = app.layer(cors::cors_layer(cors_config));
        }

        tracing::debug!(
            cli = %config.cli.path.display(),
            permission_mode = %config.permissions.mode,
            allowed_tools = ?config.permissions.allowed_tools,
            allowed_directories = ?config.permissions.allowed_directories,
            "server assembled"
        );

        Ok(Self {
            router: app,
            listen_address,
        })
    }

    /// Get the configured listen address
    #[must_use]
    pub const fn listen_address(&self) -> SocketAddr {
        self.listen_address
    }

    /// Consume the server and return the inner router
    ///
    /// Useful for testing when the caller manages the listener
    pub fn into_router(self) -> Router {
        self.router
    }

    /// Start serving requests
    ///
    /// Blocks until the cancellation token is triggered. In-flight requests
    /// are allowed to finish; their CLI processes are cancelled only if the
    /// client goes away.
    ///
    /// # Errors
    ///
    /// Returns an error if binding the TCP listener or serving fails
    pub async fn serve(self, shutdown: tokio_util::sync::CancellationToken) -> anyhow::Result<()> {
        let listener = tokio::net::TcpListener::bind(self.listen_address).await?;
        let local_addr = listener.local_addr()?;
        tracing::info!(%local_addr, "server listening");

        axum::serve(listener, self.router)
            .with_graceful_shutdown(async move {
                shutdown.cancelled().await;
                tracing::info!("graceful shutdown initiated");
            })
            .await?;

        Ok(())
    }
}

#[cfg(all(test, unix))]
mod tests {
    use std::os::unix::fs::PermissionsExt;
    use std::path::{Path, PathBuf};

    use axum::body::{Body, to_bytes};
    use http::{Method, Request, StatusCode, header};
    use serde_json::Value;
    use tower::ServiceExt;

    use super::*;

    fn fake_cli(dir: &Path, body: &str) -> PathBuf {
        let path = dir.join("claude");
        std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    fn config(toml: &str, cli: &Path) -> Config {
        let mut config = Config::from_toml(toml).unwrap();
        config.cli.path = cli.to_path_buf();
        config
    }

    async fn get(router: Router, path: &str) -> (StatusCode, Vec<u8>) {
        let response = router
            .oneshot(Request::get(path).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        (status, to_bytes(response.into_body(), usize::MAX).await.unwrap().to_vec())
    }

    #[tokio::test]
    async fn plain_health_check() {
        let dir = tempfile::tempdir().unwrap();
        let cli = fake_cli(dir.path(), "exit 1");
        let router = Server::new(config("", &cli)).unwrap().into_router();

        let (status, body) = get(router, "/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, b"ok");
    }

    #[tokio::test]
    async fn health_check_can_be_moved_or_disabled() {
        let dir = tempfile::tempdir().unwrap();
        let cli = fake_cli(dir.path(), "exit 1");

        let moved = Server::new(config("[server.health]\npath = \"/healthz\"", &cli))
            .unwrap()
            .into_router();
        assert_eq!(get(moved, "/healthz").await.0, StatusCode::OK);

        let disabled = Server::new(config("[server.health]\nenabled = false", &cli))
            .unwrap()
            .into_router();
        assert_eq!(get(disabled, "/health").await.0, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn cli_health_check_reports_version() {
        let dir = tempfile::tempdir().unwrap();
        let cli = fake_cli(dir.path(), "echo '2.0.14 (Claude Code)'");
        let router = Server::new(config("[server.health]\ncheck_cli = true", &cli))
            .unwrap()
            .into_router();

        let (status, body) = get(router, "/health").await;
        assert_eq!(status, StatusCode::OK);
        let body: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(body["status"], "ok");
        assert_eq!(body["cli_version"], "2.0.14 (Claude Code)");
    }

    #[tokio::test]
    async fn cli_health_check_fails_without_cli() {
        let mut config = Config::from_toml("[server.health]\ncheck_cli = true").unwrap();
        config.cli.path = PathBuf::from("/nonexistent/claude");
        let router = Server::new(config).unwrap().into_router();

        let (status, body) = get(router, "/health").await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        let body: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(body["status"], "unavailable");
        assert!(body["error"].as_str().unwrap().contains("/nonexistent/claude"));
    }

    #[tokio::test]
    async fn cors_preflight_is_answered() {
        let dir = tempfile::tempdir().unwrap();
        let cli = fake_cli(dir.path(), "exit 1");
        let router = Server::new(config(
            "[server.cors]\norigins = [\"https://app.example.com\"]\nmax_age = 600",
            &cli,
        ))
        .unwrap()
        .into_router();

        let response = router
            .oneshot(
                Request::builder()
                    .method(Method::OPTIONS)
                    .uri(bridge_messages::MESSAGES_PATH)
                    .header(header::ORIGIN, "https://app.example.com")
                    .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN],
            "https://app.example.com"
        );
        assert_eq!(response.headers()[header::ACCESS_CONTROL_MAX_AGE], "600");
    }
}
