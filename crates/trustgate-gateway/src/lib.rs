//! trustGate gateway library entry.
//!
//! Hosts the four roles of the authorization pipeline behind one axum
//! router: the trust score store, the policy decision point, the wire
//! enforcement proxy and a bundled file-backed score provider. Consumed by
//! the binary (`main.rs`) and by integration tests.

pub mod api;
pub mod app_state;
pub mod config;
pub mod lifecycle;
pub mod obs;
pub mod ops;
pub mod policy;
pub mod provider;
pub mod router;
pub mod scores;
pub mod script;
pub mod transport;
