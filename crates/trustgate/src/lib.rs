//! Top-level facade crate for trustGate.
//!
//! Re-exports the core contracts and the gateway library so users can depend
//! on a single crate, plus the handful of types most embedders reach for.

pub mod core {
    pub use trustgate_core::*;
}

pub mod gateway {
    pub use trustgate_gateway::*;
}

pub use trustgate_core::{Result, TrustGateError};
pub use trustgate_gateway::app_state::AppState;
pub use trustgate_gateway::config::GatewayConfig;
pub use trustgate_gateway::policy::{Decision, DecisionPoint};
pub use trustgate_gateway::scores::{ScoreSink, ScoreSource, ScoreStore};
pub use trustgate_gateway::transport::Authorizer;
