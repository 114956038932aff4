use bridge_cli::{CliError, UnknownModel};
use bridge_core::HttpError;
use http::StatusCode;
use thiserror::Error;

/// Longest CLI diagnostic forwarded to clients
const MAX_CLIENT_DETAIL: usize = 2000;

/// Errors surfaced by the messages endpoint
#[derive(Debug, Error)]
pub enum MessagesError {
    /// Body does not conform to the wire protocol
    #[error("invalid request: {0}")]
    Validation(String),

    /// Model id is neither an alias nor a well-formed vendor id, or the CLI
    /// rejected it
    #[error("{0}")]
    UnknownModel(String),

    /// The request cannot be turned into a CLI invocation
    #[error("{0}")]
    InvocationBuild(String),

    /// Image or document block is unusable
    #[error("invalid attachment: {0}")]
    InvalidAttachment(String),

    /// The permission policy refused a tool or directory
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// The CLI has no usable credentials
    #[error("authentication required: {0}")]
    AuthenticationRequired(String),

    /// The executable could not be started
    #[error("claude CLI not found: {0}")]
    CliNotFound(String),

    /// Wall-clock or idle limit exceeded
    #[error("{0}")]
    Timeout(String),

    /// The CLI exited with an error
    #[error("{0}")]
    CliExecution(String),

    /// Output was received but none of it could be parsed
    #[error("claude CLI produced no usable output")]
    EmptyResponse,

    /// Unexpected internal error
    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl From<UnknownModel> for MessagesError {
    fn from(err: UnknownModel) -> Self {
        Self::UnknownModel(err.to_string())
    }
}

impl From<CliError> for MessagesError {
    fn from(err: CliError) -> Self {
        match err {
            CliError::NotFound { path } => Self::CliNotFound(path),
            CliError::AuthenticationRequired { message } => Self::AuthenticationRequired(message),
            CliError::ToolNotPermitted { message } => Self::PermissionDenied(message),
            CliError::ModelUnavailable { message } => Self::UnknownModel(message),
            err @ CliError::Timeout { .. } => Self::Timeout(err.to_string()),
            err @ (CliError::Execution { .. } | CliError::Io(_)) => Self::CliExecution(err.to_string()),
        }
    }
}

impl HttpError for MessagesError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::Validation(_) | Self::UnknownModel(_) | Self::InvocationBuild(_) | Self::InvalidAttachment(_) => {
                StatusCode::BAD_REQUEST
            }
            Self::PermissionDenied(_) => StatusCode::FORBIDDEN,
            Self::AuthenticationRequired(_) => StatusCode::UNAUTHORIZED,
            Self::CliNotFound(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            Self::CliExecution(_) | Self::EmptyResponse => StatusCode::BAD_GATEWAY,
        }
    }

    fn error_type(&self) -> &str {
        match self {
            Self::Validation(_) | Self::UnknownModel(_) | Self::InvocationBuild(_) | Self::InvalidAttachment(_) => {
                "invalid_request_error"
            }
            Self::PermissionDenied(_) => "permission_error",
            Self::AuthenticationRequired(_) => "authentication_error",
            Self::Timeout(_) => "timeout_error",
            Self::CliNotFound(_) | Self::CliExecution(_) | Self::EmptyResponse | Self::Internal(_) => "api_error",
        }
    }

    fn client_message(&self) -> String {
        match self {
            Self::Internal(_) => "an internal error occurred".to_owned(),
            Self::CliNotFound(_) => "claude CLI is not available on this server".to_owned(),
            Self::CliExecution(message) => truncate(message, MAX_CLIENT_DETAIL),
            other => other.to_string(),
        }
    }
}

fn truncate(message: &str, limit: usize) -> String {
    match message.char_indices().nth(limit) {
        Some((end, _)) => format!("{}...", &message[..end]),
        None => message.to_owned(),
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use bridge_cli::TimeoutKind;

    use super::*;

    #[test]
    fn status_and_type_table() {
        let cases = [
            (MessagesError::Validation("x".into()), 400, "invalid_request_error"),
            (MessagesError::UnknownModel("x".into()), 400, "invalid_request_error"),
            (MessagesError::InvocationBuild("x".into()), 400, "invalid_request_error"),
            (MessagesError::InvalidAttachment("x".into()), 400, "invalid_request_error"),
            (MessagesError::PermissionDenied("x".into()), 403, "permission_error"),
            (MessagesError::AuthenticationRequired("x".into()), 401, "authentication_error"),
            (MessagesError::CliNotFound("x".into()), 500, "api_error"),
            (MessagesError::Timeout("x".into()), 504, "timeout_error"),
            (MessagesError::CliExecution("x".into()), 502, "api_error"),
            (MessagesError::EmptyResponse, 502, "api_error"),
            (MessagesError::Internal(anyhow::anyhow!("boom")), 500, "api_error"),
        ];

        for (err, status, kind) in cases {
            assert_eq!(err.status_code().as_u16(), status, "{err:?}");
            assert_eq!(err.error_type(), kind, "{err:?}");
        }
    }

    #[test]
    fn internal_details_are_hidden() {
        let err = MessagesError::Internal(anyhow::anyhow!("db password is hunter2"));
        assert_eq!(err.client_message(), "an internal error occurred");

        let err = MessagesError::CliNotFound("/opt/secret/bin/claude".into());
        assert!(!err.client_message().contains("/opt/secret"));
    }

    #[test]
    fn cli_errors_map_onto_wire_errors() {
        let err: MessagesError = CliError::AuthenticationRequired {
            message: "Please run /login".into(),
        }
        .into();
        assert!(matches!(err, MessagesError::AuthenticationRequired(_)));

        let err: MessagesError = CliError::Timeout {
            kind: TimeoutKind::Deadline,
            limit: Duration::from_secs(2),
        }
        .into();
        assert_eq!(err.status_code(), StatusCode::GATEWAY_TIMEOUT);
        assert_eq!(err.client_message(), "claude CLI timed out after 2s");

        let err: MessagesError = CliError::ToolNotPermitted { message: "Bash".into() }.into();
        assert_eq!(err.status_code(), StatusCode::FORBIDDEN);

        let err: MessagesError = CliError::Execution {
            code: Some(2),
            message: "boom".into(),
        }
        .into();
        assert_eq!(err.client_message(), "claude CLI failed (exit 2): boom");
    }

    #[test]
    fn long_cli_output_is_truncated() {
        let err = MessagesError::CliExecution("é".repeat(MAX_CLIENT_DETAIL + 10));
        let message = err.client_message();
        assert!(message.ends_with("..."));
        assert_eq!(message.chars().count(), MAX_CLIENT_DETAIL + 3);
    }
}
