//! WebSocket upgrade, per-connection loops, and command dispatch.
//!
//! Each socket gets one engine-side connection handle. The write loop
//! drains the handle's queue into the socket; the read loop parses inbound
//! frames into [`ClientCommand`]s and dispatches them to the coordinator.
//! Operation failures go back to the issuing connection only, as
//! `room:error` frames. On socket close the connection is torn down through
//! the coordinator exactly once.

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::Response;
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tracing::{debug, info, warn};

use parley_core::events::RoomEvent;
use parley_core::ids::{ConnectionId, RoomId, UserId};
use parley_core::profile::ProfileProvider;
use parley_rooms::RoomPatch;
use parley_rooms::RoomSpec;

use crate::state::AppState;

/// Inbound frame from a client.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ClientCommand {
    /// Join a room (and subscribe this connection to it).
    Join {
        /// Target room.
        #[serde(rename = "roomId")]
        room_id: RoomId,
    },
    /// Leave every room the user belongs to.
    Leave,
    /// Send a chat message to a room.
    Message {
        /// Target room.
        #[serde(rename = "roomId")]
        room_id: RoomId,
        /// Message text.
        body: String,
    },
    /// Create a room owned by this user.
    CreateRoom {
        /// Display name.
        name: String,
        /// Visibility.
        #[serde(rename = "isPublic", default)]
        is_public: bool,
    },
    /// Patch room metadata (owner only).
    UpdateRoom {
        /// Target room.
        #[serde(rename = "roomId")]
        room_id: RoomId,
        /// New name, if changing.
        name: Option<String>,
        /// New visibility, if changing.
        #[serde(rename = "isPublic")]
        is_public: Option<bool>,
    },
    /// Delete a room (owner only).
    DeleteRoom {
        /// Target room.
        #[serde(rename = "roomId")]
        room_id: RoomId,
    },
}

/// Connection query parameters.
///
/// Credential validation and token exchange are the identity collaborator's
/// job; this surface accepts an already-established user identity, or
/// registers a fresh demo profile under the given display name.
#[derive(Debug, Deserialize)]
pub struct WsQuery {
    /// Existing user identity, if reconnecting.
    pub user: Option<UserId>,
    /// Display name for a fresh profile.
    pub name: Option<String>,
}

/// Upgrade handler for `GET /ws`.
pub async fn ws_handler(
    State(state): State<AppState>,
    Query(query): Query<WsQuery>,
    ws: WebSocketUpgrade,
) -> Response {
    let user = resolve_user(&state, query).await;
    ws.on_upgrade(move |socket| handle_socket(state, user, socket))
}

async fn resolve_user(state: &AppState, query: WsQuery) -> UserId {
    if let Some(user) = query.user {
        if state.profiles.public_profile(user).await.is_ok() {
            return user;
        }
        debug!(%user, "unknown user id on connect, issuing a fresh profile");
    }
    state
        .profiles
        .add(query.name.unwrap_or_else(|| "guest".to_string()))
}

async fn handle_socket(state: AppState, user: UserId, socket: WebSocket) {
    let buffer = state.config.outbound_buffer;
    let (handle, mut rx) = state.coordinator.connect(user, buffer).await;
    let conn = handle.id;
    info!(%conn, %user, "websocket connected");

    let (mut sink, mut stream) = socket.split();
    let write_task = tokio::spawn(async move {
        while let Some(payload) = rx.recv().await {
            if sink
                .send(Message::Text(payload.as_str().to_owned().into()))
                .await
                .is_err()
            {
                break;
            }
        }
    });

    while let Some(Ok(frame)) = stream.next().await {
        match frame {
            Message::Text(text) => handle_frame(&state, user, conn, text.as_str()).await,
            Message::Close(_) => break,
            // Pings are answered by axum; binary frames are not part of
            // the protocol.
            _ => {}
        }
    }

    write_task.abort();
    state.coordinator.disconnect(conn).await;
    info!(%conn, %user, "websocket disconnected");
}

async fn handle_frame(state: &AppState, user: UserId, conn: ConnectionId, text: &str) {
    let command: ClientCommand = match serde_json::from_str(text) {
        Ok(command) => command,
        Err(e) => {
            warn!(%conn, error = %e, "unparseable client frame");
            state
                .engine
                .send_to(
                    conn,
                    &RoomEvent::Error {
                        code: "validation".into(),
                        message: format!("unparseable frame: {e}"),
                    },
                )
                .await;
            return;
        }
    };
    dispatch(state, user, conn, command).await;
}

async fn dispatch(state: &AppState, user: UserId, conn: ConnectionId, command: ClientCommand) {
    let outcome = match command {
        ClientCommand::Join { room_id } => state
            .coordinator
            .join(user, room_id, conn)
            .await
            .map(|room| Some(RoomEvent::Updated { room })),
        ClientCommand::Leave => {
            state.coordinator.leave_all(user).await;
            Ok(None)
        }
        ClientCommand::Message { room_id, body } => state
            .coordinator
            .send_message(user, conn, room_id, body)
            .await
            .map(|()| None),
        ClientCommand::CreateRoom { name, is_public } => state
            .coordinator
            .create_room(user, RoomSpec { name, is_public })
            .await
            .map(|room| Some(RoomEvent::Updated { room })),
        ClientCommand::UpdateRoom {
            room_id,
            name,
            is_public,
        } => state
            .coordinator
            .update_room(room_id, user, RoomPatch { name, is_public })
            .await
            .map(|_| None),
        ClientCommand::DeleteRoom { room_id } => {
            state.coordinator.delete_room(room_id, user).await.map(|()| None)
        }
    };
    match outcome {
        // Direct acknowledgment to the issuing connection.
        Ok(Some(ack)) => state.engine.send_to(conn, &ack).await,
        Ok(None) => {}
        Err(e) => {
            state
                .engine
                .send_to(
                    conn,
                    &RoomEvent::Error {
                        code: e.code().into(),
                        message: e.to_string(),
                    },
                )
                .await;
        }
    }
}
