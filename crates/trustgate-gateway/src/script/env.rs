use std::collections::BTreeMap;

use serde_json::Value;

use trustgate_core::error::{Result, TrustGateError};

/// `[A-Za-z][A-Za-z0-9_]*`, the only names accepted from untrusted input.
pub fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Variables visible to one script execution.
///
/// Trusted bindings are chosen by the gateway (`scores`, `raw`). Untrusted
/// bindings come from provider payloads: they are filtered to identifiers on
/// insert, and at execution time they never shadow a runtime built-in.
#[derive(Debug, Clone, Default)]
pub struct ScriptEnv {
    trusted: BTreeMap<String, Value>,
    untrusted: BTreeMap<String, Value>,
}

impl ScriptEnv {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bind(mut self, name: impl Into<String>, value: Value) -> Self {
        self.trusted.insert(name.into(), value);
        self
    }

    /// Returns false when the name was rejected.
    pub fn bind_untrusted(&mut self, name: &str, value: Value) -> bool {
        if !is_identifier(name) || self.trusted.contains_key(name) {
            return false;
        }
        self.untrusted.insert(name.to_string(), value);
        true
    }

    pub fn trusted(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.trusted.iter()
    }

    pub fn untrusted(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.untrusted.iter()
    }

    pub fn len(&self) -> usize {
        self.trusted.len() + self.untrusted.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Host-side copy of a script's return value.
#[derive(Debug, Clone, PartialEq)]
pub enum ScriptValue {
    Nil,
    Boolean(bool),
    Integer(i64),
    Number(f64),
    String(String),
    /// Tables, functions and other values that only exist inside Lua.
    Opaque(&'static str),
}

impl ScriptValue {
    /// Decision truthiness: nil, false, zero and "" are false.
    pub fn truthy(&self) -> bool {
        match self {
            ScriptValue::Nil => false,
            ScriptValue::Boolean(b) => *b,
            ScriptValue::Integer(i) => *i != 0,
            ScriptValue::Number(n) => *n != 0.0,
            ScriptValue::String(s) => !s.is_empty(),
            ScriptValue::Opaque(_) => true,
        }
    }

    pub fn is_nil(&self) -> bool {
        matches!(self, ScriptValue::Nil)
    }

    /// Canonical score conversion.
    pub fn to_f64(&self) -> Result<f64> {
        match self {
            ScriptValue::Integer(i) => Ok(*i as f64),
            ScriptValue::Number(n) => Ok(*n),
            ScriptValue::Boolean(b) => Ok(if *b { 1.0 } else { 0.0 }),
            ScriptValue::String(s) => s.trim().parse::<f64>().map_err(|_| {
                TrustGateError::Script(format!("string {s:?} is not convertible to a float"))
            }),
            ScriptValue::Nil => Err(TrustGateError::Script("nil is not a float".into())),
            ScriptValue::Opaque(kind) => Err(TrustGateError::Script(format!(
                "{kind} is not convertible to a float"
            ))),
        }
    }
}
