//! Realtime WebSocket connections for visitor widgets and admin consoles.

use std::sync::Arc;

use {
    axum::extract::ws::{Message, WebSocket},
    futures::{SinkExt, stream::StreamExt},
    serde::Deserialize,
    serde_json::json,
    tracing::{debug, info, warn},
};

use crate::{
    hub::{Audience, event},
    state::GatewayState,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Role {
    Visitor { session_id: String },
    Admin,
}

impl Role {
    fn audience(&self) -> Audience {
        match self {
            Self::Visitor { session_id } => Audience::Session(session_id.clone()),
            Self::Admin => Audience::Admins,
        }
    }
}

/// Frames a client may send. Unknown types are ignored.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ClientFrame {
    #[serde(rename_all = "camelCase")]
    Typing {
        #[serde(default)]
        status: String,
        #[serde(default)]
        session_id: Option<String>,
    },
    PageChange {
        #[serde(default)]
        url: String,
        #[serde(default)]
        title: String,
    },
    #[serde(other)]
    Unknown,
}

/// Run one connection until the peer leaves, a deadline passes, or a write
/// fails.
pub async fn handle_connection(socket: WebSocket, state: Arc<GatewayState>, role: Role) {
    let subscription = state.hub.register(role.audience());
    let conn_id = subscription.conn_id.clone();
    let mut outbound = subscription.receiver;
    info!(conn_id = %conn_id, role = ?role, "ws: connection opened");

    let (mut ws_tx, mut ws_rx) = socket.split();
    let ping_interval = state.hub_config.ping_interval();
    let write_timeout = state.hub_config.write_timeout();
    let read_timeout = state.hub_config.read_timeout();

    let write_conn_id = conn_id.clone();
    let mut write_handle = tokio::spawn(async move {
        let mut ping = tokio::time::interval(ping_interval);
        ping.tick().await;
        loop {
            let message = tokio::select! {
                frame = outbound.recv() => match frame {
                    Some(frame) => Message::Text(frame.into()),
                    None => Message::Close(None),
                },
                _ = ping.tick() => Message::Ping(Vec::new().into()),
            };
            let closing = matches!(message, Message::Close(_));
            match tokio::time::timeout(write_timeout, ws_tx.send(message)).await {
                Ok(Ok(())) if !closing => {},
                Ok(Ok(())) => break,
                Ok(Err(e)) => {
                    debug!(conn_id = %write_conn_id, error = %e, "ws: write failed");
                    break;
                },
                Err(_) => {
                    warn!(conn_id = %write_conn_id, "ws: write deadline exceeded");
                    break;
                },
            }
        }
    });

    let mut writer_done = false;
    loop {
        let next = tokio::select! {
            _ = &mut write_handle => {
                writer_done = true;
                debug!(conn_id = %conn_id, "ws: writer stopped");
                break;
            },
            next = tokio::time::timeout(read_timeout, ws_rx.next()) => match next {
                Ok(next) => next,
                Err(_) => {
                    info!(conn_id = %conn_id, "ws: read deadline exceeded");
                    break;
                },
            },
        };
        let msg = match next {
            Some(Ok(msg)) => msg,
            Some(Err(e)) => {
                debug!(conn_id = %conn_id, error = %e, "ws: read error");
                break;
            },
            None => break,
        };
        match msg {
            Message::Text(text) => match serde_json::from_str::<ClientFrame>(&text) {
                Ok(frame) => route_frame(&state, &role, frame).await,
                Err(e) => debug!(conn_id = %conn_id, error = %e, "ws: invalid client frame"),
            },
            Message::Close(_) => break,
            Message::Binary(_) | Message::Ping(_) | Message::Pong(_) => {},
        }
    }

    state.hub.unregister(&conn_id);
    if !writer_done {
        write_handle.abort();
    }
    info!(conn_id = %conn_id, "ws: connection closed");
}

/// Relay a client frame to the opposite audience.
pub async fn route_frame(state: &GatewayState, role: &Role, frame: ClientFrame) {
    match (role, frame) {
        (Role::Visitor { session_id }, ClientFrame::Typing { status, .. }) => {
            state.hub.to_admins(
                event::TYPING,
                json!({ "sessionId": session_id, "sender": "visitor", "status": status }),
            );
        },
        (Role::Admin, ClientFrame::Typing { status, session_id }) => {
            let Some(session_id) = session_id.filter(|s| !s.is_empty()) else {
                debug!("ws: admin typing frame without sessionId");
                return;
            };
            state.hub.to_session(
                &session_id,
                event::TYPING,
                json!({ "sessionId": session_id, "sender": "admin", "status": status }),
            );
        },
        (Role::Visitor { session_id }, ClientFrame::PageChange { url, title }) => {
            state.hub.to_admins(
                event::PAGE_CHANGE,
                json!({ "sessionId": session_id, "url": url, "title": title }),
            );
            if !url.is_empty()
                && let Err(e) = state.sessions.update_current_page(session_id, &url).await
            {
                warn!(session_id = %session_id, error = %e, "failed to record current page");
            }
            debug!(session_id = %session_id, url = %url, "visitor changed page");
        },
        (Role::Admin, ClientFrame::PageChange { .. }) | (_, ClientFrame::Unknown) => {},
    }
}
