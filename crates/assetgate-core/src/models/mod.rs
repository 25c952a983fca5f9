//! Data models for the broker
//!
//! Each sub-module covers one feature area: scopes and providers, provider
//! capabilities, object-level types, path definitions, tracked uploads and
//! the request/response bodies of the HTTP surface.

mod capabilities;
mod definition;
mod object;
mod provider;
mod resource;
mod scope;
mod upload;

pub mod requests;

pub use capabilities::*;
pub use definition::*;
pub use object::*;
pub use provider::*;
pub use resource::*;
pub use scope::*;
pub use upload::*;
