//! Shared primitives for the bridge crates

mod error;

pub use error::{ErrorBody, ErrorDetail, HttpError};
