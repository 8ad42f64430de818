//! WebSocket upgrade and per-connection socket tasks

use super::error::ApiError;
use super::extract::{ApiPath, ApiQuery};
use super::state::AppState;
use crate::hub::{ClientId, ConnState, Connection, Hub, HubError};
use axum::{
    extract::{
        ws::{close_code, CloseFrame, Message, Utf8Bytes, WebSocket, WebSocketUpgrade},
        ws::rejection::WebSocketUpgradeRejection,
        State,
    },
    response::{IntoResponse, Response},
};
use futures::{future, stream::SplitSink, SinkExt, Stream, StreamExt};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use uuid::Uuid;

/// How long the writer gets to flush after the read side finished
const WRITER_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Query parameters for the upgrade request
#[derive(Debug, Default, Deserialize)]
pub struct WsQuery {
    /// Resume recording into an existing session
    #[serde(default)]
    pub session_id: Option<Uuid>,
}

/// `GET /ws/{client_id}` - upgrade to a relay connection.
///
/// An id that is already live is rejected before anything else about the
/// request is looked at. An invalid id or a non-upgrade request is a
/// handshake error.
pub async fn ws_handler(
    upgrade: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
    ApiPath(raw_id): ApiPath<String>,
    ApiQuery(query): ApiQuery<WsQuery>,
    State(state): State<AppState>,
) -> Result<Response, ApiError> {
    let client_id = ClientId::parse(&raw_id)?;
    if state.hub.registry().contains(&client_id).await {
        return Err(HubError::DuplicateIdentifier(client_id).into());
    }
    let upgrade = upgrade.map_err(|e| HubError::Handshake(e.body_text()))?;

    tracing::debug!(%client_id, "Upgrade requested");
    let hub = Arc::clone(&state.hub);
    Ok(upgrade
        .max_message_size(state.max_message_bytes)
        .on_failed_upgrade(|e| tracing::warn!(error = %e, "WebSocket handshake failed"))
        .on_upgrade(move |socket| handle_socket(socket, client_id, query.session_id, hub))
        .into_response())
}

/// Run one upgraded socket: join, pump frames both ways, leave
async fn handle_socket(socket: WebSocket, client_id: ClientId, resume: Option<Uuid>, hub: Arc<Hub>) {
    let (mut sink, stream) = socket.split();

    let (connection, outbound) = match hub.join(client_id.clone(), resume).await {
        Ok(joined) => joined,
        Err(e) => {
            tracing::warn!(%client_id, error = %e, "Join rejected after upgrade");
            // A duplicate here means another join under the same id won a race
            let code = match e {
                HubError::DuplicateIdentifier(_) => close_code::POLICY,
                _ => close_code::AWAY,
            };
            let frame = CloseFrame {
                code,
                reason: Utf8Bytes::from(e.to_string()),
            };
            let _ = sink.send(Message::Close(Some(frame))).await;
            return;
        }
    };

    let mut writer = tokio::spawn(client_writer_task(sink, outbound, Arc::clone(&connection)));

    let state = hub.receive_loop(Arc::clone(&connection), text_frames(stream)).await;
    tracing::debug!(%client_id, ?state, "Receive loop finished");

    if tokio::time::timeout(WRITER_DRAIN_TIMEOUT, &mut writer)
        .await
        .is_err()
    {
        writer.abort();
    }
}

/// Drain a connection's outbound queue into the socket.
///
/// Once the connection closes, frames already queued are flushed and, for a
/// server-side close, a close frame is sent.
pub async fn client_writer_task(
    mut sink: SplitSink<WebSocket, Message>,
    mut outbound: mpsc::Receiver<String>,
    connection: Arc<Connection>,
) {
    loop {
        tokio::select! {
            frame = outbound.recv() => match frame {
                Some(text) => {
                    if let Err(e) = sink.send(Message::Text(text.into())).await {
                        tracing::debug!(client_id = %connection.client_id(), error = %e, "Socket write failed");
                        break;
                    }
                }
                None => break,
            },
            _ = connection.closed() => {
                while let Ok(text) = outbound.try_recv() {
                    if sink.send(Message::Text(text.into())).await.is_err() {
                        break;
                    }
                }
                if connection.state() == ConnState::ClosedByServer {
                    let frame = CloseFrame {
                        code: close_code::NORMAL,
                        reason: Utf8Bytes::from_static("closed by server"),
                    };
                    let _ = sink.send(Message::Close(Some(frame))).await;
                }
                break;
            }
        }
    }

    let _ = sink.close().await;
    tracing::debug!(client_id = %connection.client_id(), "Client writer task finished");
}

/// Text payloads of a WebSocket stream.
///
/// Ends at the first close frame. Binary frames are accepted when they are
/// valid UTF-8; control frames are skipped.
pub fn text_frames<S>(frames: S) -> impl Stream<Item = Result<String, axum::Error>> + Unpin
where
    S: Stream<Item = Result<Message, axum::Error>> + Unpin,
{
    frames
        .take_while(|frame| future::ready(!matches!(frame, Ok(Message::Close(_)))))
        .filter_map(|frame| {
            future::ready(match frame {
                Ok(Message::Text(text)) => Some(Ok(text.as_str().to_owned())),
                Ok(Message::Binary(bytes)) => match String::from_utf8(bytes.to_vec()) {
                    Ok(text) => Some(Ok(text)),
                    Err(_) => {
                        tracing::warn!("Dropping binary frame that is not UTF-8");
                        None
                    }
                },
                Ok(_) => None,
                Err(e) => Some(Err(e)),
            })
        })
}
