use axum::{
    extract::{
        ws::{close_code, CloseFrame, Message, WebSocket, WebSocketUpgrade},
        State as AxumState,
    },
    response::IntoResponse,
};
use futures::{stream::SplitStream, SinkExt, StreamExt};
use raspa_types::api::{ClientMessage, Notification};
use raspa_types::casino::AccountId;
use std::sync::Arc;
use tokio::time::{timeout, Duration};

use crate::connections::{outbound_channel, OutboundSender};
use crate::Server;

fn ws_send_timeout() -> Duration {
    let raw = std::env::var("WS_SEND_TIMEOUT_MS").ok();
    let parsed = raw
        .as_deref()
        .and_then(|value| value.parse::<u64>().ok())
        .filter(|value| *value > 0);
    Duration::from_millis(parsed.unwrap_or(2_000))
}

enum OutboundSendError {
    Closed,
    Full,
}

pub(super) async fn balance_ws(
    AxumState(server): AxumState<Arc<Server>>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_balance_ws(socket, server))
}

/// Token carried by an `auth` frame, if the frame is one.
fn parse_auth(text: &str) -> Option<String> {
    match serde_json::from_str::<ClientMessage>(text) {
        Ok(ClientMessage::Auth { token }) => Some(token),
        Err(_) => None,
    }
}

/// Wait for the first meaningful frame and resolve it to an account.
async fn authenticate(
    receiver: &mut SplitStream<WebSocket>,
    server: &Server,
) -> Option<AccountId> {
    while let Some(msg) = receiver.next().await {
        match msg {
            Ok(Message::Text(text)) => {
                let token = parse_auth(&text)?;
                return match server.sessions().resolve(&token).await {
                    Ok(account) => account,
                    Err(err) => {
                        tracing::warn!(%err, "WebSocket session lookup failed");
                        None
                    }
                };
            }
            Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => continue,
            Ok(_) | Err(_) => return None,
        }
    }
    None
}

async fn handle_balance_ws(socket: WebSocket, server: Arc<Server>) {
    let (mut sender, mut receiver) = socket.split();

    let account = match timeout(
        server.config.ws_auth_timeout,
        authenticate(&mut receiver, &server),
    )
    .await
    {
        Ok(Some(account)) => account,
        Ok(None) => {
            server.ws_metrics().inc_auth_failure();
            tracing::warn!("WebSocket auth rejected");
            let _ = sender
                .send(Message::Close(Some(CloseFrame {
                    code: close_code::POLICY,
                    reason: "unauthorized".into(),
                })))
                .await;
            return;
        }
        Err(_) => {
            server.ws_metrics().inc_auth_failure();
            tracing::warn!("WebSocket auth timed out");
            let _ = sender
                .send(Message::Close(Some(CloseFrame {
                    code: close_code::POLICY,
                    reason: "auth timeout".into(),
                })))
                .await;
            return;
        }
    };
    server.ws_metrics().inc_connection();
    tracing::info!(account_id = %account, "balance WebSocket authenticated");

    let (out_tx, mut out_rx) = outbound_channel(server.config.ws_outbound_buffer);
    let writer_server = server.clone();
    let writer_handle = tokio::spawn(async move {
        while let Some(msg) = out_rx.recv().await {
            match timeout(ws_send_timeout(), sender.send(msg)).await {
                Ok(Ok(())) => {}
                Ok(Err(_)) => {
                    writer_server.ws_metrics().inc_send_error();
                    tracing::warn!("Failed to send notification, client disconnected");
                    break;
                }
                Err(_) => {
                    writer_server.ws_metrics().inc_send_timeout();
                    tracing::warn!("WebSocket send timed out, closing connection");
                    break;
                }
            }
        }
        let _ = sender.close().await;
    });

    let connection = server.connections().register(account, out_tx.clone());
    let greeting = Notification::Authenticated { account_id: account };
    if server.connections().push(account, &greeting) {
        // Start the client from the committed balances. Reading under the account lock keeps
        // this snapshot from overtaking a newer commit's push.
        match server.casino().locks().acquire(account).await {
            Ok(_guard) => match server.casino().account(account).await {
                Ok(Some(current)) => {
                    server
                        .connections()
                        .push(account, &Notification::Balance(current.snapshot()));
                }
                Ok(None) => {
                    tracing::warn!(account_id = %account, "session points at missing account")
                }
                Err(err) => tracing::warn!(account_id = %account, %err, "failed to load balances"),
            },
            Err(_) => tracing::warn!(account_id = %account, "account busy; skipping initial balance"),
        }
    }

    while let Some(msg) = receiver.next().await {
        match msg {
            Ok(Message::Close(_)) => {
                tracing::info!(account_id = %account, "Client closed WebSocket connection");
                break;
            }
            Ok(Message::Ping(data)) => {
                if enqueue_message(&out_tx, Message::Pong(data), &server).is_err() {
                    tracing::warn!("Failed to enqueue pong, closing connection");
                    break;
                }
            }
            Err(e) => {
                tracing::warn!("WebSocket error: {:?}", e);
                break;
            }
            _ => {} // Ignore other message types
        }
    }

    server.connections().unregister(account, connection);
    tracing::info!(account_id = %account, connection, "balance WebSocket handler exiting");
    drop(out_tx);
    let _ = writer_handle.await;
}

fn enqueue_message(
    sender: &OutboundSender,
    message: Message,
    server: &Server,
) -> Result<(), OutboundSendError> {
    match sender.try_send(message) {
        Ok(()) => Ok(()),
        Err(tokio::sync::mpsc::error::TrySendError::Full(_)) => {
            server.ws_metrics().inc_queue_full();
            Err(OutboundSendError::Full)
        }
        Err(tokio::sync::mpsc::error::TrySendError::Closed(_)) => Err(OutboundSendError::Closed),
    }
}
