//! `GET /ws`: identity check, upstream dial, and the two linked relay loops.

use std::sync::Arc;

use axum::{
    extract::ws::{rejection::WebSocketUpgradeRejection, Message, WebSocket, WebSocketUpgrade},
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use futures_util::{Sink, SinkExt, Stream, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::{Error as UpstreamError, Message as UpstreamMessage};

use trustgate_core::error::{Result, TrustGateError};

use crate::app_state::AppState;
use crate::config::DenyReply;
use crate::obs::metrics::GatewayMetrics;

use super::authorize::Authorizer;
use super::codec::{decode, to_client, to_upstream, Inbound};
use super::inspect::{inspect, reject_unreadable, Verdict};

const OUTBOUND_CAPACITY: usize = 1024;

struct ProxySession {
    user: String,
    authorizer: Arc<dyn Authorizer>,
    deny_reply: DenyReply,
    metrics: Arc<GatewayMetrics>,
}

fn identity(headers: &HeaderMap, header: &str) -> Option<String> {
    headers
        .get(header)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

pub async fn ws_proxy(
    State(app): State<AppState>,
    headers: HeaderMap,
    ws: std::result::Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Response {
    let (Some(proxy), Some(authorizer)) = (app.cfg().proxy.as_ref(), app.authorizer()) else {
        return StatusCode::NOT_FOUND.into_response();
    };

    let Some(user) = identity(&headers, &proxy.identity_header) else {
        app.metrics()
            .proxy_rejections
            .inc(&[("reason", TrustGateError::IdentityMissing.client_code().as_str())]);
        tracing::warn!(header = %proxy.identity_header, "connection without caller identity refused");
        return StatusCode::FORBIDDEN.into_response();
    };

    let ws = match ws {
        Ok(ws) => ws,
        Err(rejection) => return rejection.into_response(),
    };

    let session = ProxySession {
        user,
        authorizer,
        deny_reply: proxy.deny_reply,
        metrics: app.metrics(),
    };
    let upstream = proxy.upstream.clone();

    ws.on_upgrade(move |socket| async move {
        let user = session.user.clone();
        if let Err(e) = run_session(session, &upstream, socket).await {
            tracing::warn!(user = %user, error = %e, "proxy session ended with error");
        }
    })
}

async fn run_session(session: ProxySession, upstream_url: &str, socket: WebSocket) -> Result<()> {
    let (upstream, _) = tokio_tungstenite::connect_async(upstream_url)
        .await
        .map_err(|e| TrustGateError::Unavailable(format!("upstream {upstream_url}: {e}")))?;

    session.metrics.proxy_sessions.inc(&[]);
    tracing::info!(user = %session.user, upstream = %upstream_url, "proxy session open");

    let (mut client_tx, mut client_rx) = socket.split();
    let (mut up_tx, mut up_rx) = upstream.split();
    let (out_tx, mut out_rx) = mpsc::channel::<Message>(OUTBOUND_CAPACITY);

    let ended = {
        let head = head_loop(&session, &mut client_rx, &mut up_tx, &out_tx);
        let tail = tail_loop(&session, &mut up_rx, &out_tx);
        let writer = async {
            while let Some(m) = out_rx.recv().await {
                let closing = matches!(m, Message::Close(_));
                if client_tx.send(m).await.is_err() || closing {
                    break;
                }
            }
        };

        // whichever side finishes first cancels the other; the client side
        // is done once its close frame was written
        tokio::select! {
            _ = head => "client",
            _ = async { tokio::join!(tail, writer) } => "upstream",
        }
    };

    let _ = up_tx.close().await;
    let _ = client_tx.close().await;

    session.metrics.proxy_sessions.dec(&[]);
    tracing::info!(user = %session.user, ended, "proxy session closed");
    Ok(())
}

/// client -> upstream, every frame authorized.
async fn head_loop<R, U>(
    session: &ProxySession,
    client_rx: &mut R,
    up_tx: &mut U,
    to_client_tx: &mpsc::Sender<Message>,
) where
    R: Stream<Item = std::result::Result<Message, axum::Error>> + Unpin,
    U: Sink<UpstreamMessage, Error = UpstreamError> + Unpin,
{
    while let Some(Ok(msg)) = client_rx.next().await {
        let inbound = decode(msg);
        match inbound {
            Inbound::Control => continue,
            Inbound::Close(_) => {
                if let Some(close) = to_upstream(inbound) {
                    let _ = up_tx.send(close).await;
                }
                return;
            }
            Inbound::Text(_) | Inbound::Binary(_) => {}
        }
        let verdict = match inbound.wire_text() {
            Some(text) => inspect(&session.user, text, session.authorizer.as_ref()).await,
            None => reject_unreadable(),
        };
        session
            .metrics
            .proxy_frames
            .inc(&[("direction", "client"), ("verdict", verdict.label())]);

        match verdict {
            Verdict::Forward => {
                if let Some(out) = to_upstream(inbound) {
                    if up_tx.send(out).await.is_err() {
                        return;
                    }
                }
            }
            Verdict::Reject(reply) => match session.deny_reply {
                DenyReply::Upstream => {
                    if up_tx.send(UpstreamMessage::Text(reply)).await.is_err() {
                        return;
                    }
                }
                DenyReply::Client => {
                    if to_client_tx.send(Message::Text(reply)).await.is_err() {
                        return;
                    }
                }
            },
        }
    }
}

/// upstream -> client, unconditional. Always ends by queueing a close frame.
async fn tail_loop<R>(session: &ProxySession, up_rx: &mut R, to_client_tx: &mpsc::Sender<Message>)
where
    R: Stream<Item = std::result::Result<UpstreamMessage, UpstreamError>> + Unpin,
{
    while let Some(Ok(msg)) = up_rx.next().await {
        let closing = matches!(msg, UpstreamMessage::Close(_));
        if let Some(out) = to_client(msg) {
            session
                .metrics
                .proxy_frames
                .inc(&[("direction", "upstream"), ("verdict", "forward")]);
            if to_client_tx.send(out).await.is_err() {
                return;
            }
        }
        if closing {
            return;
        }
    }
    let _ = to_client_tx.send(Message::Close(None)).await;
}
