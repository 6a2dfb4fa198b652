//! ws-wire client frame classification (panic-free).
//!
//! A ws-wire frame is a JSON array whose first element (`head`) selects the
//! message kind:
//!
//! | head                   | kind          | authorized as                |
//! |------------------------|---------------|------------------------------|
//! | integer                | response      | never checked                |
//! | `"#evt"`               | event publish | `wsw-event` / element 2      |
//! | `"#sub"`               | subscription  | `wsw-sub` / element 2        |
//! | `"#subs"`, `"#error"`  | structural    | never checked                |
//! | any other string       | rpc call      | `wsw-rpc` / head             |
//!
//! Parsing rules:
//! - Never index (`arr[2]`), always `get()`.
//! - Anything else (not JSON, not an array, empty array, non-string topic,
//!   boolean/float/object head) is `Malformed`.

use serde_json::{json, Value};

use crate::error::{Result, TrustGateError};

/// Resource group for `#evt` frames.
pub const RG_EVENT: &str = "wsw-event";
/// Resource group for `#sub` frames.
pub const RG_SUBSCRIBE: &str = "wsw-sub";
/// Resource group for rpc calls.
pub const RG_RPC: &str = "wsw-rpc";

/// Error kind carried by synthesized denial frames.
pub const ERROR_KIND_FORBIDDEN: &str = "FORBIDDEN";

const HEAD_EVENT: &str = "#evt";
const HEAD_SUBSCRIBE: &str = "#sub";
const HEAD_SUBSCRIPTIONS: &str = "#subs";
const HEAD_ERROR: &str = "#error";

/// Decoded client frame.
#[derive(Debug, Clone, PartialEq)]
pub enum WireFrame {
    /// Reply to a server-initiated request (`[id, ...]`).
    Response { id: serde_json::Number },
    /// `["#evt", reply_id, topic, ...]`
    Event { reply_id: Value, topic: String },
    /// `["#sub", reply_id, topic, ...]`
    Subscribe { reply_id: Value, topic: String },
    /// `["#subs", ...]`
    Subscriptions,
    /// `["#error", ...]`
    Error,
    /// `[method, reply_id, args...]`
    Rpc { method: String, reply_id: Value },
}

/// What the proxy must authorize before forwarding a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResourceRef<'a> {
    pub resource_group: &'static str,
    pub resource: &'a str,
}

impl WireFrame {
    /// `None` means the frame is protocol structure and always passes.
    pub fn resource(&self) -> Option<ResourceRef<'_>> {
        match self {
            WireFrame::Response { .. } | WireFrame::Subscriptions | WireFrame::Error => None,
            WireFrame::Event { topic, .. } => Some(ResourceRef {
                resource_group: RG_EVENT,
                resource: topic,
            }),
            WireFrame::Subscribe { topic, .. } => Some(ResourceRef {
                resource_group: RG_SUBSCRIBE,
                resource: topic,
            }),
            WireFrame::Rpc { method, .. } => Some(ResourceRef {
                resource_group: RG_RPC,
                resource: method,
            }),
        }
    }

    /// Reply id (element 1), `Null` when the frame has none.
    pub fn reply_id(&self) -> Value {
        match self {
            WireFrame::Event { reply_id, .. }
            | WireFrame::Subscribe { reply_id, .. }
            | WireFrame::Rpc { reply_id, .. } => reply_id.clone(),
            _ => Value::Null,
        }
    }
}

/// Decode one client text frame.
pub fn decode_client_frame(text: &str) -> Result<WireFrame> {
    let value: Value = serde_json::from_str(text)
        .map_err(|e| TrustGateError::Malformed(format!("invalid json: {e}")))?;
    decode_value(&value)
}

/// Classify an already parsed JSON value.
pub fn decode_value(value: &Value) -> Result<WireFrame> {
    let arr = value
        .as_array()
        .ok_or_else(|| TrustGateError::Malformed("frame is not an array".into()))?;
    let head = arr
        .first()
        .ok_or_else(|| TrustGateError::Malformed("empty frame".into()))?;

    match head {
        Value::Number(n) if n.is_i64() || n.is_u64() => Ok(WireFrame::Response { id: n.clone() }),
        Value::String(s) => {
            let reply_id = arr.get(1).cloned().unwrap_or(Value::Null);
            match s.as_str() {
                HEAD_EVENT => Ok(WireFrame::Event {
                    reply_id,
                    topic: topic_at(arr, HEAD_EVENT)?,
                }),
                HEAD_SUBSCRIBE => Ok(WireFrame::Subscribe {
                    reply_id,
                    topic: topic_at(arr, HEAD_SUBSCRIBE)?,
                }),
                HEAD_SUBSCRIPTIONS => Ok(WireFrame::Subscriptions),
                HEAD_ERROR => Ok(WireFrame::Error),
                method => Ok(WireFrame::Rpc {
                    method: method.to_string(),
                    reply_id,
                }),
            }
        }
        other => Err(TrustGateError::Malformed(format!(
            "unsupported frame head: {}",
            kind_name(other)
        ))),
    }
}

fn topic_at(arr: &[Value], head: &str) -> Result<String> {
    match arr.get(2) {
        Some(Value::String(topic)) => Ok(topic.clone()),
        Some(other) => Err(TrustGateError::Malformed(format!(
            "{head} topic must be a string, got {}",
            kind_name(other)
        ))),
        None => Err(TrustGateError::Malformed(format!("{head} frame has no topic"))),
    }
}

fn kind_name(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "non-integer number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Best-effort reply id of a frame that may not decode (element 1 of a JSON
/// array, `Null` otherwise).
pub fn reply_id_of(text: &str) -> Value {
    serde_json::from_str::<Value>(text)
        .ok()
        .and_then(|v| v.as_array().and_then(|a| a.get(1).cloned()))
        .unwrap_or(Value::Null)
}

/// Structural error frame: `["#error", null, reply_id, kind]`.
pub fn error_frame(reply_id: &Value, kind: &str) -> String {
    json!([HEAD_ERROR, Value::Null, reply_id, kind]).to_string()
}
