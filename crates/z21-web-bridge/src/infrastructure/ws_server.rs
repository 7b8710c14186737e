//! WebSocket server: accept loop and per-session tasks.
//!
//! This module is responsible for:
//!
//! 1. Binding a TCP listener on the configured address.
//! 2. Accepting incoming TCP connections from browsers.
//! 3. Upgrading each connection to a WebSocket session.
//! 4. Registering the session with the gateway task and running two
//!    forwarding loops per session:
//!    - **Browser → Gateway**: JSON text frames → [`ClientMsg`] →
//!      [`GatewayInput::Message`].
//!    - **Gateway → Browser**: the session's outbox of [`ServerMsg`] → JSON
//!      text frames.
//! 5. Stopping the accept loop when the `running` flag is cleared.
//!
//! Unlike the wire session, WebSocket sessions are independent of each other:
//! each one runs in its own task, and the gateway task is the only place they
//! meet.

use std::net::SocketAddr;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;

use anyhow::Context;
use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_tungstenite::{
    accept_async,
    tungstenite::{Error as WsError, Message as WsMessage},
};
use tracing::{debug, error, info, warn};

use crate::domain::{ClientId, ClientIdAllocator, ClientMsg, ServerMsg};
use crate::infrastructure::gateway_task::{GatewayHandle, GatewayInput};

/// How often the accept loop wakes up to check the `running` flag.
const ACCEPT_POLL: Duration = Duration::from_millis(200);

// ── Public API ────────────────────────────────────────────────────────────────

/// Binds the WebSocket listener.
///
/// Split from [`run_server`] so a bind failure is reported before anything
/// else starts, and so tests can bind port 0 and read the real address.
///
/// # Errors
///
/// Returns an error if the port is already in use or the process lacks
/// permission to bind it.
pub async fn bind(addr: SocketAddr) -> anyhow::Result<TcpListener> {
    TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind WebSocket listener on {addr}"))
}

/// Runs the accept loop until `running` is set to `false`.
///
/// Each accepted connection is handed to its own task so one slow browser
/// never blocks the others.
pub async fn run_server(
    listener: TcpListener,
    gateway: GatewayHandle,
    running: Arc<AtomicBool>,
) -> anyhow::Result<()> {
    if let Ok(addr) = listener.local_addr() {
        info!("WebSocket bridge listening on {addr}");
    }
    let ids = Arc::new(ClientIdAllocator::new());

    loop {
        if !running.load(Ordering::Relaxed) {
            info!("shutdown flag set; stopping accept loop");
            break;
        }

        // A short timeout lets the loop notice the flag even when nobody
        // connects.
        match timeout(ACCEPT_POLL, listener.accept()).await {
            Ok(Ok((stream, peer_addr))) => {
                let client = ids.next();
                info!(%client, "new browser connection from {peer_addr}");
                let gateway = gateway.clone();
                tokio::spawn(async move {
                    handle_browser_session(stream, peer_addr, client, gateway).await;
                });
            }
            Ok(Err(e)) => {
                // Transient (e.g. too many open files); keep serving.
                error!("accept error: {e}");
            }
            Err(_) => {}
        }
    }

    Ok(())
}

// ── Per-session handler ───────────────────────────────────────────────────────

async fn handle_browser_session(
    raw_stream: TcpStream,
    peer_addr: SocketAddr,
    client: ClientId,
    gateway: GatewayHandle,
) {
    match run_session(raw_stream, peer_addr, client, &gateway).await {
        Ok(()) => info!(%client, "session {peer_addr} closed normally"),
        Err(e) => warn!(%client, "session {peer_addr} closed with error: {e:#}"),
    }
}

/// Runs one browser session from handshake to close.
///
/// The gateway hears about the session only after the handshake succeeded,
/// and always hears about its end.
async fn run_session(
    raw_stream: TcpStream,
    peer_addr: SocketAddr,
    client: ClientId,
    gateway: &GatewayHandle,
) -> anyhow::Result<()> {
    let ws_stream = accept_async(raw_stream)
        .await
        .with_context(|| format!("WebSocket handshake failed with {peer_addr}"))?;

    let (mut ws_tx, mut ws_rx) = ws_stream.split();
    let (outbox, mut inbox) = mpsc::unbounded_channel::<ServerMsg>();

    if !gateway.send(GatewayInput::Connected { client, outbox: outbox.clone() }) {
        anyhow::bail!("gateway is not running");
    }

    // ── Gateway → Browser ─────────────────────────────────────────────────────
    let writer = tokio::spawn(async move {
        while let Some(msg) = inbox.recv().await {
            let json = match serde_json::to_string(&msg) {
                Ok(json) => json,
                Err(e) => {
                    error!(%client, "JSON serialization error: {e}");
                    continue;
                }
            };
            if ws_tx.send(WsMessage::Text(json)).await.is_err() {
                debug!(%client, "WebSocket send failed (browser disconnected)");
                break;
            }
        }
        // Best effort; the peer may already be gone.
        let _ = ws_tx.close().await;
    });

    // ── Browser → Gateway ─────────────────────────────────────────────────────
    loop {
        let ws_msg = match ws_rx.next().await {
            Some(Ok(msg)) => msg,
            Some(Err(WsError::ConnectionClosed | WsError::Protocol(_))) => {
                debug!(%client, "browser WebSocket closed");
                break;
            }
            Some(Err(e)) => {
                warn!(%client, "browser WebSocket error: {e}");
                break;
            }
            None => break,
        };

        match ws_msg {
            WsMessage::Text(text) => match serde_json::from_str::<ClientMsg>(&text) {
                Ok(msg) => {
                    debug!(%client, ?msg, "browser → gateway");
                    if !gateway.send(GatewayInput::Message { client, msg }) {
                        break;
                    }
                }
                Err(e) => {
                    // One bad message does not end the session.
                    warn!(%client, "invalid JSON from browser: {e}");
                    let _ = outbox.send(ServerMsg::Error { message: format!("invalid message: {e}") });
                }
            },
            WsMessage::Binary(_) => warn!(%client, "unexpected binary WebSocket frame (ignored)"),
            WsMessage::Close(_) => {
                debug!(%client, "WebSocket Close frame received");
                break;
            }
            // tungstenite answers pings itself.
            WsMessage::Ping(_) | WsMessage::Pong(_) | WsMessage::Frame(_) => {}
        }
    }

    gateway.send(GatewayInput::Disconnected(client));
    drop(outbox);
    // The gateway drops its copy of the outbox on disconnect, which ends the
    // writer once it has flushed what was queued.
    if timeout(Duration::from_secs(1), writer).await.is_err() {
        debug!(%client, "writer did not finish in time");
    }
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────
