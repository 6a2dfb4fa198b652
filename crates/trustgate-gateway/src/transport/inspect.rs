use serde_json::Value;

use trustgate_core::protocol::wire::{
    decode_client_frame, error_frame, reply_id_of, ERROR_KIND_FORBIDDEN,
};

use super::authorize::Authorizer;

/// What to do with one client frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    /// Forward the original bytes.
    Forward,
    /// Drop the frame; the payload is the error frame to emit instead.
    Reject(String),
}

impl Verdict {
    pub fn label(&self) -> &'static str {
        match self {
            Verdict::Forward => "forward",
            Verdict::Reject(_) => "reject",
        }
    }
}

/// Classify a client frame and authorize it when it names a resource.
/// Malformed frames are rejected without asking `authorizer`.
pub async fn inspect(user: &str, text: &str, authorizer: &dyn Authorizer) -> Verdict {
    let frame = match decode_client_frame(text) {
        Ok(frame) => frame,
        Err(e) => {
            tracing::warn!(user = %user, error = %e, "malformed frame dropped");
            return reject(&reply_id_of(text));
        }
    };

    let Some(target) = frame.resource() else {
        return Verdict::Forward;
    };

    if authorizer
        .authorize(user, target.resource_group, target.resource)
        .await
    {
        Verdict::Forward
    } else {
        tracing::debug!(user = %user, resource_group = %target.resource_group, resource = %target.resource, "frame denied");
        reject(&frame.reply_id())
    }
}

/// Frames that are not text at all still get a reply.
pub fn reject_unreadable() -> Verdict {
    reject(&Value::Null)
}

fn reject(reply_id: &Value) -> Verdict {
    Verdict::Reject(error_frame(reply_id, ERROR_KIND_FORBIDDEN))
}
