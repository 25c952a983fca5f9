//! Background cleanup of superseded objects.
//!
//! When an upload replaces an existing object, the old object is deleted off
//! the request path. Jobs go onto a bounded in-process queue and are handled
//! by a small worker pool with exponential backoff between attempts.

pub mod handler;
pub mod queue;

pub use handler::{CleanupFailure, CleanupHandler, CleanupJob};
pub use queue::{CleanupQueue, CleanupQueueConfig, CleanupStats};
