//! Wire enforcement proxy.
//!
//! Accepts client WebSockets carrying a perimeter-attached identity, opens a
//! matching upstream connection, and authorizes every client frame before it
//! is relayed. Upstream frames pass through untouched.

pub mod authorize;
pub mod codec;
pub mod inspect;
pub mod ws;

pub use authorize::{Authorizer, HttpAuthorizer};
pub use inspect::{inspect, Verdict};
