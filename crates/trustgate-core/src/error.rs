//! Shared error type across trustGate crates.

use thiserror::Error;

/// Client-facing error codes (stable API).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientCode {
    /// Invalid request body or parameters.
    BadRequest,
    /// Policy or gateway configuration rejected.
    Config,
    /// Script failed to compile or run.
    Script,
    /// A collaborator (score store, decision point, upstream) is unreachable.
    Unavailable,
    /// Wire frame does not match any known message shape.
    Malformed,
    /// No caller identity attached by the perimeter.
    IdentityMissing,
    /// Denied by policy.
    Forbidden,
    /// Internal server error.
    Internal,
}

impl ClientCode {
    /// String representation used in JSON responses and error frames.
    pub fn as_str(self) -> &'static str {
        match self {
            ClientCode::BadRequest => "BAD_REQUEST",
            ClientCode::Config => "CONFIG",
            ClientCode::Script => "SCRIPT",
            ClientCode::Unavailable => "UNAVAILABLE",
            ClientCode::Malformed => "MALFORMED",
            ClientCode::IdentityMissing => "IDENTITY_MISSING",
            ClientCode::Forbidden => "FORBIDDEN",
            ClientCode::Internal => "INTERNAL",
        }
    }
}

/// Shared result type.
pub type Result<T> = std::result::Result<T, TrustGateError>;

/// Unified error type used by core and gateway.
#[derive(Debug, Error)]
pub enum TrustGateError {
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("config: {0}")]
    Config(String),
    #[error("script: {0}")]
    Script(String),
    #[error("collaborator unavailable: {0}")]
    Unavailable(String),
    #[error("malformed message: {0}")]
    Malformed(String),
    #[error("caller identity missing")]
    IdentityMissing,
    #[error("not allowed: {0}")]
    NotAllowed(String),
    #[error("internal: {0}")]
    Internal(String),
}

impl TrustGateError {
    /// Map internal error to a stable client-facing code.
    pub fn client_code(&self) -> ClientCode {
        match self {
            TrustGateError::BadRequest(_) => ClientCode::BadRequest,
            TrustGateError::Config(_) => ClientCode::Config,
            TrustGateError::Script(_) => ClientCode::Script,
            TrustGateError::Unavailable(_) => ClientCode::Unavailable,
            TrustGateError::Malformed(_) => ClientCode::Malformed,
            TrustGateError::IdentityMissing => ClientCode::IdentityMissing,
            TrustGateError::NotAllowed(_) => ClientCode::Forbidden,
            TrustGateError::Internal(_) => ClientCode::Internal,
        }
    }
}
