//! Axum route handler for the Messages API endpoint

use axum::{
    Json, Router,
    body::Bytes,
    extract::State,
    response::{
        IntoResponse, Response,
        sse::{Event, KeepAlive, Sse},
    },
    routing,
};
use bridge_core::{ErrorBody, HttpError};
use futures_util::{Stream, StreamExt};

use crate::{
    MessagesError,
    protocol::{MessagesRequest, StreamEvent},
    state::{EventStream, MessagesState},
};

/// Route serving the Messages API
pub const MESSAGES_PATH: &str = "/anthropic/v1/messages";

/// Build the messages router
pub fn messages_router(state: MessagesState) -> Router {
    Router::new()
        .route(MESSAGES_PATH, routing::post(create_message))
        .with_state(state)
}

/// Handle `POST /anthropic/v1/messages`
///
/// The body is parsed by hand so that malformed JSON gets the vendor error
/// envelope rather than axum's plain-text rejection.
async fn create_message(State(state): State<MessagesState>, body: Bytes) -> Response {
    let request: MessagesRequest = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(e) => return error_response(&MessagesError::Validation(e.to_string())),
    };

    if request.stream.unwrap_or(false) {
        match state.stream_message(request).await {
            Ok(events) => stream_response(events).into_response(),
            Err(e) => error_response(&e),
        }
    } else {
        match state.create_message(request).await {
            Ok(message) => Json(message).into_response(),
            Err(e) => error_response(&e),
        }
    }
}

/// SSE response; an error item becomes an `error` event and ends the stream
fn stream_response(events: EventStream) -> Sse<impl Stream<Item = Result<Event, axum::Error>>> {
    let event_stream = events.map(|result| {
        let event = match result {
            Ok(event) => event,
            Err(e) => StreamEvent::Error {
                error: ErrorBody::from_error(&e).error,
            },
        };
        let data = serde_json::to_string(&event).unwrap_or_default();
        Ok(Event::default().event(event.event_name()).data(data))
    });

    Sse::new(event_stream).keep_alive(KeepAlive::default())
}

/// Convert an error into a vendor-style JSON error response
fn error_response(error: &MessagesError) -> Response {
    let status = error.status_code();
    if status.is_server_error() {
        tracing::error!(error = %error, "messages request failed");
    } else {
        tracing::debug!(error = %error, "messages request rejected");
    }

    (status, Json(ErrorBody::from_error(error))).into_response()
}
