//! Assetgate API Library
//!
//! The HTTP surface of the broker: handlers, the JSON error envelope, the
//! OpenAPI document and application setup.

mod api_doc;
mod handlers;
mod telemetry;

pub mod error;
pub mod setup;
pub mod state;

pub use api_doc::ApiDoc;
pub use error::{ErrorResponse, HttpAppError};
