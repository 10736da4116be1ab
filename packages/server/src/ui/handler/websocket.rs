//! WebSocket connection handlers.

use std::{net::SocketAddr, sync::Arc, time::Duration};

use axum::{
    extract::{
        ConnectInfo, Query, State,
        ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade},
    },
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use futures_util::{
    sink::SinkExt,
    stream::{SplitSink, SplitStream, StreamExt},
};
use serde::Deserialize;
use tokio::{sync::mpsc, task::JoinHandle};
use tokio_util::sync::CancellationToken;

use crate::{
    domain::{ActiveUser, Connection, ConnectionId, ConnectionKey},
    infrastructure::dto::websocket::{Envelope, PixelRequest},
    ui::state::AppState,
    usecase::{ConnectError, PlaceOutcome, RequestInfo, ResolvedSession, connection_key},
};

/// 書き込みタスクが Close フレームを送り終えるのを待つ上限
const CLOSE_TIMEOUT: Duration = Duration::from_secs(1);

/// Query parameters for WebSocket connection
#[derive(Debug, Deserialize)]
pub struct ConnectQuery {
    /// Cookie を使えないクライアント向け
    pub token: Option<String>,
}

pub async fn websocket_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Query(query): Query<ConnectQuery>,
) -> Response {
    let request = RequestInfo {
        token: cookie_value(&headers, &state.token_cookie).or(query.token),
        ip: addr.ip().to_string(),
        user_agent: headers
            .get(header::USER_AGENT)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string(),
    };

    // Use ResolveSessionUseCase to attach an identity
    let resolved = match state.resolve_session_usecase.execute(&request).await {
        Ok(resolved) => resolved,
        Err(e) => {
            tracing::warn!(
                "Failed to resolve session for {}: {}. Continuing unauthenticated.",
                request.ip,
                e
            );
            ResolvedSession {
                user: None,
                issued_token: None,
            }
        }
    };
    let key = connection_key(
        state.connection_key_mode,
        resolved.token(&request),
        &request.ip,
    );

    // Create a channel for this connection to receive messages
    let (tx, rx) = mpsc::unbounded_channel();
    let cancel = state.shutdown.child_token();
    let connection = Connection::new(tx, cancel.clone());
    let connection_id = connection.id;

    // Use ConnectClientUseCase to register the connection
    match state
        .connect_client_usecase
        .execute(key.clone(), connection)
        .await
    {
        Ok(()) => {}
        Err(ConnectError::DuplicateKey(_)) => {
            tracing::warn!("'{}' is already connected. Rejecting connection.", key);
            return StatusCode::CONFLICT.into_response();
        }
        Err(e) => {
            tracing::error!("Failed to register '{}': {}", key, e);
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    }

    let state_cookie = state.token_cookie.clone();
    let failed_state = state.clone();
    let failed_key = key.clone();
    let user = resolved.user;
    let mut response = ws
        .on_failed_upgrade(move |e| {
            tracing::warn!("WebSocket upgrade for '{}' failed: {}", failed_key, e);
            tokio::spawn(async move {
                failed_state
                    .disconnect_client_usecase
                    .execute(&failed_key, connection_id)
                    .await;
            });
        })
        .on_upgrade(move |socket| {
            handle_socket(socket, state, key, connection_id, user, rx, cancel)
        });

    if let Some(token) = resolved.issued_token {
        set_token_cookie(&mut response, &state_cookie, &token);
    }
    response
}

/// Cookie ヘッダーから `name` の値を取り出す
pub(crate) fn cookie_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, value)| *key == name && !value.is_empty())
        .map(|(_, value)| value.to_string())
}

fn set_token_cookie(response: &mut Response, name: &str, token: &str) {
    let cookie = format!(
        "{}={}; Path=/; HttpOnly; SameSite=Lax; Max-Age=31536000",
        name, token
    );
    match HeaderValue::from_str(&cookie) {
        Ok(value) => {
            response.headers_mut().append(header::SET_COOKIE, value);
        }
        Err(e) => tracing::warn!("Session token is not a valid cookie value: {}", e),
    }
}

/// Spawns a task that receives messages from the rx channel and pushes them to the WebSocket sender.
///
/// Ends when the connection is cancelled (after sending a Close frame), when every
/// sender of the channel is gone, or on a write error.
fn pusher_loop(
    mut rx: mpsc::UnboundedReceiver<Arc<str>>,
    mut sender: SplitSink<WebSocket, Message>,
    key: ConnectionKey,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let message = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    let _ = sender.send(Message::Close(None)).await;
                    break;
                }
                message = rx.recv() => message,
            };
            let Some(message) = message else {
                break;
            };
            if let Err(e) = sender.send(Message::Text(message.to_string().into())).await {
                if !closure::is_expected(&e) {
                    tracing::warn!("Failed to write to '{}': {}", key, e);
                }
                break;
            }
        }
    })
}

/// この接続の受信メッセージを処理し続けるか
enum Flow {
    Continue,
    Close,
}

async fn handle_socket(
    socket: WebSocket,
    state: Arc<AppState>,
    key: ConnectionKey,
    connection_id: ConnectionId,
    user: Option<Arc<ActiveUser>>,
    rx: mpsc::UnboundedReceiver<Arc<str>>,
    cancel: CancellationToken,
) {
    let (sender, receiver) = socket.split();

    // Spawn a task to drain this connection's queue into the socket
    let mut send_task = pusher_loop(rx, sender, key.clone(), cancel.clone());

    let forwarder = match &user {
        Some(active) => {
            let forwarder = state.connect_client_usecase.attach_stack_events(
                active.clone(),
                key.clone(),
                cancel.clone(),
            );
            if let Err(e) = state.connect_client_usecase.greet(active, &key).await {
                tracing::warn!("Failed to greet '{}': {}", key, e);
            }
            tracing::info!("Client '{}' connected as user {}", key, active.id());
            Some(forwarder)
        }
        None => {
            tracing::info!("Client '{}' connected without identity", key);
            None
        }
    };

    // Spawn a task to receive messages from this client
    let mut recv_task = tokio::spawn(recv_loop(
        receiver,
        state.clone(),
        key.clone(),
        user,
        cancel.clone(),
    ));

    // If any one of the tasks completes, stop the other
    let recv_finished = tokio::select! {
        _ = &mut recv_task => true,
        _ = &mut send_task => false,
    };
    cancel.cancel();
    if recv_finished {
        if tokio::time::timeout(CLOSE_TIMEOUT, &mut send_task)
            .await
            .is_err()
        {
            send_task.abort();
        }
    } else {
        // recv_loop checks `cancel` between messages; a placement in progress runs to the end
        let _ = recv_task.await;
    }
    if let Some(forwarder) = forwarder {
        let _ = forwarder.await;
    }

    // Use DisconnectClientUseCase to handle disconnection
    let online = state
        .disconnect_client_usecase
        .execute(&key, connection_id)
        .await;
    tracing::info!("Client '{}' disconnected ({} online)", key, online);
}

async fn recv_loop(
    mut receiver: SplitStream<WebSocket>,
    state: Arc<AppState>,
    key: ConnectionKey,
    user: Option<Arc<ActiveUser>>,
    cancel: CancellationToken,
) {
    loop {
        let message = tokio::select! {
            _ = cancel.cancelled() => break,
            message = receiver.next() => message,
        };
        let Some(message) = message else {
            break;
        };
        let message = match message {
            Ok(message) => message,
            Err(e) => {
                if !closure::is_expected(&e) {
                    tracing::warn!("WebSocket error on '{}': {}", key, e);
                }
                break;
            }
        };

        match message {
            Message::Text(text) => {
                tracing::debug!("Received from '{}': {}", key, text.as_str());
                if let Flow::Close = handle_text(&state, &key, user.as_ref(), text.as_str()).await {
                    break;
                }
            }
            Message::Close(frame) => {
                log_close(&key, frame.as_ref());
                break;
            }
            Message::Binary(_) => {
                tracing::debug!("Ignoring binary message from '{}'", key);
            }
            // Ping/pong is handled automatically by the WebSocket protocol
            Message::Ping(_) | Message::Pong(_) => {}
        }
    }
}

/// 1 つのテキストメッセージを処理する
///
/// エンベロープ（`type`）が読めなければ接続を閉じる。
/// ペイロードが不正なら、そのメッセージだけ捨てて読み続ける。
async fn handle_text(
    state: &AppState,
    key: &ConnectionKey,
    user: Option<&Arc<ActiveUser>>,
    text: &str,
) -> Flow {
    let envelope = match serde_json::from_str::<Envelope>(text) {
        Ok(envelope) => envelope,
        Err(e) => {
            tracing::warn!("Malformed message from '{}', closing: {}", key, e);
            return Flow::Close;
        }
    };

    if !envelope.is_pixel() {
        tracing::debug!(
            "Ignoring message of type '{}' from '{}'",
            envelope.r#type,
            key
        );
        return Flow::Continue;
    }

    let request = match serde_json::from_str::<PixelRequest>(text) {
        Ok(request) => request,
        Err(e) => {
            tracing::debug!("Dropped invalid pixel message from '{}': {}", key, e);
            return Flow::Continue;
        }
    };

    let placement = state
        .place_pixel_usecase
        .execute_detached(user.cloned(), key.clone(), request.into());
    match placement.await {
        Ok(Ok(PlaceOutcome::Placed)) => {}
        Ok(Ok(PlaceOutcome::Rejected(reason))) => {
            tracing::debug!("Placement from '{}' rejected: {:?}", key, reason);
        }
        Ok(Err(e)) => {
            tracing::debug!("Dropped placement from '{}': {}", key, e);
        }
        Err(e) => {
            tracing::error!("Placement task for '{}' failed: {}", key, e);
        }
    }
    Flow::Continue
}

fn log_close(key: &ConnectionKey, frame: Option<&CloseFrame>) {
    match frame {
        Some(frame) if !closure::is_expected_code(frame.code) => {
            tracing::info!(
                "Client '{}' closed with code {} ({})",
                key,
                frame.code,
                frame.reason.as_str()
            );
        }
        _ => tracing::debug!("Client '{}' requested close", key),
    }
}

/// 想定内の切断（相手が去った、ハンドシェイクなしで切れた等）の判定
mod closure {
    use std::io;

    use tokio_tungstenite::tungstenite::{self, error::ProtocolError};

    /// normal (1000), going away (1001), no status (1005), abnormal (1006)
    pub fn is_expected_code(code: u16) -> bool {
        matches!(code, 1000 | 1001 | 1005 | 1006)
    }

    pub fn is_expected(err: &(dyn std::error::Error + 'static)) -> bool {
        let mut current: Option<&(dyn std::error::Error + 'static)> = Some(err);
        while let Some(err) = current {
            if let Some(ws) = err.downcast_ref::<tungstenite::Error>() {
                return match ws {
                    tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed => {
                        true
                    }
                    tungstenite::Error::Protocol(
                        ProtocolError::ResetWithoutClosingHandshake,
                    ) => true,
                    tungstenite::Error::Io(io) => is_expected_io(io),
                    _ => false,
                };
            }
            if let Some(io) = err.downcast_ref::<io::Error>() {
                return is_expected_io(io);
            }
            current = err.source();
        }
        false
    }

    fn is_expected_io(err: &io::Error) -> bool {
        matches!(
            err.kind(),
            io::ErrorKind::ConnectionReset
                | io::ErrorKind::ConnectionAborted
                | io::ErrorKind::BrokenPipe
                | io::ErrorKind::UnexpectedEof
        )
    }
}
