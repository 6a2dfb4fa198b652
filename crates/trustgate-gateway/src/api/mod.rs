//! HTTP API of the score store, decision point and bundled provider roles.

pub mod auth;
mod error;
pub mod provider;
pub mod scores;

pub use error::ApiError;
