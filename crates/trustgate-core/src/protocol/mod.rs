//! Protocol modules.
//!
//! - `wire`: ws-wire application frames seen by the enforcement proxy.
//! - `api`: JSON bodies of the score store and decision point HTTP APIs.
//!
//! The wire decoder is strict and panic-free: anything outside the enumerated
//! frame shapes is reported as `TrustGateError::Malformed`, which the proxy
//! turns into a denial.

pub mod api;
pub mod wire;
