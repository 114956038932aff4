//! Messages API surface backed by the `claude` CLI
//!
//! Accepts Messages API requests, runs each one as a supervised CLI process
//! and answers with either a complete message or the equivalent SSE event
//! stream.

#![allow(clippy::must_use_candidate, clippy::missing_errors_doc)]

pub mod aggregate;
pub mod attachment;
pub mod error;
pub mod invocation;
pub mod normalize;
pub mod protocol;
#[cfg(feature = "http")]
pub mod router;
pub mod state;
pub mod translate;

pub use error::MessagesError;
#[cfg(feature = "http")]
pub use router::{MESSAGES_PATH, messages_router};
pub use state::{EventStream, MessagesState};
