//! trustGate core: transport-agnostic protocol primitives and error types.
//!
//! This crate defines the wire-level contracts shared by the gateway roles
//! (score store, decision point, enforcement proxy) and their HTTP clients.
//! It carries no transport or runtime dependencies so it can be reused by
//! providers and test tooling.
//!
//! # Defensive guarantees
//! Panics, `unwrap`, and `expect` are compile-denied here. Every fallible path
//! surfaces as `TrustGateError`/`Result`; hostile client frames must decode to
//! an error, never to a crash.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

pub mod error;
pub mod protocol;

/// Shared result type.
pub use error::{Result, TrustGateError};
