//! Frame conversion between the client socket (axum) and the upstream
//! socket (tungstenite).
//!
//! Text and binary payloads cross unchanged. Ping/pong are answered by each
//! socket on its own and are not relayed.

use std::borrow::Cow;

use axum::extract::ws::{CloseFrame as ClientClose, Message as ClientMessage};
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame as UpstreamClose;
use tokio_tungstenite::tungstenite::Message as UpstreamMessage;

/// Client frame as seen by the enforcement loop.
#[derive(Debug)]
pub enum Inbound {
    Text(String),
    Binary(Vec<u8>),
    Control,
    Close(Option<ClientClose<'static>>),
}

impl Inbound {
    /// Text the frame carries, if it is readable as ws-wire.
    pub fn wire_text(&self) -> Option<&str> {
        match self {
            Inbound::Text(s) => Some(s),
            Inbound::Binary(b) => std::str::from_utf8(b).ok(),
            _ => None,
        }
    }
}

pub fn decode(msg: ClientMessage) -> Inbound {
    match msg {
        ClientMessage::Text(s) => Inbound::Text(s),
        ClientMessage::Binary(b) => Inbound::Binary(b),
        ClientMessage::Ping(_) | ClientMessage::Pong(_) => Inbound::Control,
        ClientMessage::Close(frame) => Inbound::Close(frame),
    }
}

/// Re-encode an allowed client frame for the upstream socket.
pub fn to_upstream(frame: Inbound) -> Option<UpstreamMessage> {
    match frame {
        Inbound::Text(s) => Some(UpstreamMessage::Text(s)),
        Inbound::Binary(b) => Some(UpstreamMessage::Binary(b)),
        Inbound::Control => None,
        Inbound::Close(frame) => Some(UpstreamMessage::Close(frame.map(|f| UpstreamClose {
            code: CloseCode::from(f.code),
            reason: f.reason,
        }))),
    }
}

/// Re-encode an upstream frame for the client socket.
pub fn to_client(msg: UpstreamMessage) -> Option<ClientMessage> {
    match msg {
        UpstreamMessage::Text(s) => Some(ClientMessage::Text(s)),
        UpstreamMessage::Binary(b) => Some(ClientMessage::Binary(b)),
        UpstreamMessage::Close(frame) => Some(ClientMessage::Close(frame.map(|f| ClientClose {
            code: u16::from(f.code),
            reason: Cow::Owned(f.reason.into_owned()),
        }))),
        UpstreamMessage::Ping(_) | UpstreamMessage::Pong(_) | UpstreamMessage::Frame(_) => None,
    }
}
