//! Sandboxed Lua evaluation shared by score normalization and policy
//! predicates.
//!
//! Every execution runs in a freshly created Lua state holding only the
//! variables passed in the `ScriptEnv`, so no binding ever survives from one
//! evaluation to the next. Compiled scripts are syntax-checked up front and are
//! cheap to clone and share between threads.

mod env;
mod runtime;

pub use env::{is_identifier, ScriptEnv, ScriptValue};
pub use runtime::{decode_script_text, CompiledScript, ScriptLimits, ScriptRuntime};
