//! Terminal WebSocket bridge.
//!
//! One bridge runs one WebSocket and one PTY session together. The bridge
//! task is the only writer on the socket, so outbound frames are totally
//! ordered: `ready` first, raw PTY bytes as binary frames, and `exit` as the
//! last non-error frame. Inbound binary frames feed the PTY in arrival
//! order; text frames carry control messages.

use std::net::SocketAddr;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{ConnectInfo, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use portable_pty::{MasterPty, PtySize};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::time::{interval_at, sleep_until, timeout, Instant};

use crate::api::AppState;
use crate::fs_handlers::TokenQuery;
use crate::terminal::{is_process_exit_error, TerminalSession};

const WRITE_TIMEOUT: Duration = Duration::from_secs(5);
const PING_INTERVAL: Duration = Duration::from_secs(20);
const PONG_WAIT: Duration = Duration::from_secs(60);
const EXIT_CODE_WAIT: Duration = Duration::from_secs(5);
const MAX_INBOUND_MESSAGE_BYTES: usize = 1024 * 1024;

/// Client -> server control message; only `resize` is defined.
#[derive(Debug, Deserialize)]
struct TerminalControlMessage {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    cols: u16,
    #[serde(default)]
    rows: u16,
}

/// Server -> client events, sent as JSON text frames.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum TerminalEvent {
    Ready { shell: String },
    Error { message: String },
    Exit { code: i32 },
}

/// `GET /v1/terminals/auth` — 204 iff the access gate passes. Lets the
/// renderer probe its credentials before opening a socket.
pub(crate) async fn terminal_auth(
    State(state): State<AppState>,
    ConnectInfo(remote): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Query(query): Query<TokenQuery>,
) -> Response {
    if let Err(denied) = state.policy.require_access(
        remote.ip(),
        &headers,
        query.token.as_deref(),
        "terminal auth",
    ) {
        return denied.into_response();
    }
    StatusCode::NO_CONTENT.into_response()
}

/// `GET /v1/terminals/ws` — gate, then upgrade and run the bridge until the
/// session ends. Browsers cannot set headers on upgrade requests, so the
/// token arrives as a query parameter here.
pub(crate) async fn terminal_ws(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    ConnectInfo(remote): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Query(query): Query<TokenQuery>,
) -> Response {
    if let Err(denied) = state.policy.require_access(
        remote.ip(),
        &headers,
        query.token.as_deref(),
        "terminal websocket",
    ) {
        return denied.into_response();
    }

    if cfg!(windows) {
        return (
            StatusCode::NOT_IMPLEMENTED,
            "terminal websocket is not supported on windows",
        )
            .into_response();
    }

    ws.max_message_size(MAX_INBOUND_MESSAGE_BYTES)
        .on_upgrade(run_session)
}

/// Why the bridge loop stopped; decides the final frame.
enum SessionEnd {
    /// Peer closed, keepalive expired, or the socket is already unusable.
    Silent,
    /// PTY reported EOF/EIO: the shell is gone, report its exit code.
    ProcessExit,
    /// Child wait delivered before the PTY noticed.
    Exited(i32),
    /// Fatal bridge-side failure worth telling the client about.
    Error(String),
}

async fn run_session(socket: WebSocket) {
    let (mut ws_tx, mut ws_rx) = socket.split();

    let session = match TerminalSession::spawn() {
        Ok(session) => session,
        Err(err) => {
            let message = format!("failed to start terminal shell: {err:#}");
            tracing::error!(error = %err, "terminal spawn failed");
            let _ = send_event(&mut ws_tx, &TerminalEvent::Error { message }).await;
            return;
        }
    };

    let TerminalSession {
        shell,
        master,
        mut killer,
        input_tx,
        mut output_rx,
        mut pty_err_rx,
        mut exit_rx,
    } = session;

    tracing::info!(shell = %shell, "terminal session started");

    if send_event(&mut ws_tx, &TerminalEvent::Ready { shell }).await.is_err() {
        let _ = killer.kill();
        return;
    }

    let mut ping = interval_at(Instant::now() + PING_INTERVAL, PING_INTERVAL);
    let mut pong_deadline = Instant::now() + PONG_WAIT;
    let mut output_open = true;

    let outcome = loop {
        tokio::select! {
            // Read-deadline analogue. Enforced on its own timer so expiry
            // lands at the 60s bound, not at the next ping tick after it.
            () = sleep_until(pong_deadline) => {
                tracing::warn!("terminal keepalive expired");
                break SessionEnd::Silent;
            }

            _ = ping.tick() => {
                if send_frame(&mut ws_tx, Message::Ping(Vec::new())).await.is_err() {
                    break SessionEnd::Silent;
                }
            }

            inbound = ws_rx.next() => match inbound {
                Some(Ok(Message::Binary(data))) => {
                    if data.is_empty() {
                        continue;
                    }
                    if input_tx.send(data).await.is_err() {
                        break SessionEnd::Error("terminal input closed".to_string());
                    }
                }
                Some(Ok(Message::Text(text))) => {
                    if let Err(message) = apply_control_message(master.as_ref(), &text) {
                        let _ = send_event(&mut ws_tx, &TerminalEvent::Error { message }).await;
                    }
                }
                Some(Ok(Message::Pong(_))) => {
                    pong_deadline = Instant::now() + PONG_WAIT;
                }
                Some(Ok(Message::Ping(_))) => {
                    // axum replies to pings itself
                }
                Some(Ok(Message::Close(_))) | None => break SessionEnd::Silent,
                Some(Err(err)) => break SessionEnd::Error(err.to_string()),
            },

            chunk = output_rx.recv(), if output_open => match chunk {
                Some(data) => {
                    if send_frame(&mut ws_tx, Message::Binary(data)).await.is_err() {
                        break SessionEnd::Silent;
                    }
                }
                None => output_open = false,
            },

            err = pty_err_rx.recv() => match err {
                Some(err) if is_process_exit_error(&err) => break SessionEnd::ProcessExit,
                Some(err) => break SessionEnd::Error(err.to_string()),
                None => break SessionEnd::Silent,
            },

            code = exit_rx.recv() => break SessionEnd::Exited(code.unwrap_or(-1)),
        }
    };

    match outcome {
        SessionEnd::ProcessExit => {
            drain_output(&mut ws_tx, &mut output_rx).await;
            if let Ok(Some(code)) = timeout(EXIT_CODE_WAIT, exit_rx.recv()).await {
                let _ = send_event(&mut ws_tx, &TerminalEvent::Exit { code }).await;
            }
        }
        SessionEnd::Exited(code) => {
            drain_output(&mut ws_tx, &mut output_rx).await;
            let _ = send_event(&mut ws_tx, &TerminalEvent::Exit { code }).await;
        }
        SessionEnd::Error(message) => {
            tracing::warn!(message = %message, "terminal session failed");
            let _ = send_event(&mut ws_tx, &TerminalEvent::Error { message }).await;
        }
        SessionEnd::Silent => {}
    }

    // Kill-then-wait: never block on a shell that refuses to exit. Dropping
    // the master closes the PTY file and unblocks the reader thread.
    let _ = killer.kill();
    let _ = exit_rx.try_recv();
    drop(master);
    let _ = timeout(WRITE_TIMEOUT, ws_tx.send(Message::Close(None))).await;

    tracing::info!("terminal session closed");
}

/// Forward any PTY output still queued so `exit` stays the last data the
/// client sees.
async fn drain_output(
    ws_tx: &mut SplitSink<WebSocket, Message>,
    output_rx: &mut mpsc::Receiver<Vec<u8>>,
) {
    while let Ok(data) = output_rx.try_recv() {
        if data.is_empty() {
            continue;
        }
        if send_frame(ws_tx, Message::Binary(data)).await.is_err() {
            return;
        }
    }
}

fn apply_control_message(master: &dyn MasterPty, payload: &str) -> Result<(), String> {
    let message: TerminalControlMessage = serde_json::from_str(payload)
        .map_err(|err| format!("invalid terminal control payload: {err}"))?;

    match message.kind.as_str() {
        "resize" => {
            if message.cols == 0 || message.rows == 0 {
                return Err("terminal resize requires cols and rows".to_string());
            }
            master
                .resize(PtySize {
                    rows: message.rows,
                    cols: message.cols,
                    pixel_width: 0,
                    pixel_height: 0,
                })
                .map_err(|err| err.to_string())
        }
        other => Err(format!("unsupported terminal control message: {other}")),
    }
}

async fn send_event(
    ws_tx: &mut SplitSink<WebSocket, Message>,
    event: &TerminalEvent,
) -> Result<(), ()> {
    let payload = serde_json::to_string(event).map_err(|_| ())?;
    send_frame(ws_tx, Message::Text(payload)).await
}

/// All outbound writes share a 5s deadline; a stuck peer ends the session
/// rather than wedging the bridge.
async fn send_frame(
    ws_tx: &mut SplitSink<WebSocket, Message>,
    message: Message,
) -> Result<(), ()> {
    match timeout(WRITE_TIMEOUT, ws_tx.send(message)).await {
        Ok(Ok(())) => Ok(()),
        _ => Err(()),
    }
}
