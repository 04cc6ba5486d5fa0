//! HTTP handlers for the visitor widget and the admin dashboard.

use std::sync::Arc;

use {
    axum::{
        extract::{Path, Query, State, WebSocketUpgrade, rejection::JsonRejection},
        http::HeaderMap,
        response::{IntoResponse, Json, Response},
    },
    chrono::Utc,
    relaydesk_identity::{
        Resolution,
        jid::{is_canonical, split_jid},
    },
    relaydesk_sessions::{
        ChatMessage, Claimant, NewSession, Sender, Session, SessionStatus, WhatsAppSettings,
    },
    serde::Deserialize,
    serde_json::{Value, json},
    tracing::{info, warn},
};

use crate::{
    error::{Error, Result},
    hub::event,
    notify::handover_text,
    presence::PresenceStatus,
    server::AppState,
    state::GatewayState,
    ws::{Role, handle_connection},
};

pub const ADMIN_ID_HEADER: &str = "x-admin-id";
pub const ADMIN_NAME_HEADER: &str = "x-admin-name";
pub const DEFAULT_ADMIN_ID: &str = "admin_default";
pub const DEFAULT_ADMIN_NAME: &str = "Admin";

fn body<T>(payload: std::result::Result<Json<T>, JsonRejection>) -> Result<T> {
    payload
        .map(|Json(v)| v)
        .map_err(|e| Error::invalid_input(e.body_text()))
}

fn required(field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(Error::invalid_input(format!("{field} is required")));
    }
    Ok(())
}

fn ok() -> Json<Value> {
    Json(json!({ "success": true }))
}

/// Admin identity from the dashboard headers.
pub fn admin_from_headers(headers: &HeaderMap) -> Claimant {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(String::from)
    };
    match header(ADMIN_ID_HEADER) {
        Some(id) => {
            let name = header(ADMIN_NAME_HEADER).unwrap_or_else(|| DEFAULT_ADMIN_NAME.to_string());
            Claimant::new(id, name)
        },
        None => Claimant::new(DEFAULT_ADMIN_ID, DEFAULT_ADMIN_NAME),
    }
}

// ── Visitor ─────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartChatRequest {
    pub visitor_id: String,
    #[serde(default)]
    pub visitor_name: String,
    pub visitor_email: Option<String>,
    pub visitor_phone: Option<String>,
    pub visitor_location: Option<String>,
    pub current_page: Option<String>,
}

pub async fn start_chat(
    State(state): State<AppState>,
    payload: std::result::Result<Json<StartChatRequest>, JsonRejection>,
) -> Result<Json<Value>> {
    let req = body(payload)?;
    required("visitorId", &req.visitor_id)?;
    let outcome = state
        .gateway
        .sessions
        .create_session(NewSession {
            visitor_id: req.visitor_id,
            visitor_name: req.visitor_name,
            visitor_email: req.visitor_email,
            visitor_phone: req.visitor_phone,
            current_page: req.current_page,
            location: req.visitor_location,
        })
        .await?;

    let mut response = json!({
        "success": true,
        "sessionId": outcome.session.id,
        "status": outcome.session.status,
    });
    if outcome.resumed {
        response["resumed"] = json!(true);
    }
    Ok(Json(response))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionMessage {
    pub session_id: String,
    pub content: String,
}

pub async fn send_visitor_message(
    State(state): State<AppState>,
    payload: std::result::Result<Json<SessionMessage>, JsonRejection>,
) -> Result<Json<Value>> {
    let req = body(payload)?;
    required("sessionId", &req.session_id)?;
    required("content", &req.content)?;
    let gw = &state.gateway;
    let session = gw.sessions.open_session(&req.session_id).await?;

    let now = Utc::now();
    let message = match gw
        .sessions
        .save_message(&session.id, Sender::Visitor, &req.content, now)
        .await
    {
        Ok(message) => message,
        Err(e @ Error::SessionNotFound { .. }) => return Err(e),
        Err(e) => {
            warn!(session_id = %session.id, error = %e, "failed to store visitor message");
            ChatMessage::new(&session.id, Sender::Visitor, &req.content, now)
        },
    };

    if session.status != SessionStatus::Bot {
        relay_to_agents(gw, &session, &message);
        return Ok(ok());
    }
    bot_turn(gw, &session, &message).await
}

/// Visitor text for a session agents own: shown on the dashboard and forwarded.
fn relay_to_agents(gw: &GatewayState, session: &Session, message: &ChatMessage) {
    gw.hub.to_admins(
        event::CHAT_MESSAGE,
        json!({
            "id": message.id,
            "sessionId": session.id,
            "content": message.content,
            "sender": "visitor",
            "timestamp": message.timestamp,
        }),
    );
    gw.notifier.spawn_forward(session, &message.content);
}

/// Answer a stored visitor message from the bot.
///
/// `session` is the snapshot taken before the message was stored. When a
/// handover lands in between, the message is already kept and goes to the
/// agents instead.
async fn bot_turn(
    gw: &GatewayState,
    session: &Session,
    message: &ChatMessage,
) -> Result<Json<Value>> {
    let reply = match gw.sessions.process_message(&session.id, &message.content).await {
        Ok(reply) => reply,
        Err(Error::InvalidTransition { status, .. }) => {
            info!(session_id = %session.id, status = %status, "session left bot mode during the turn");
            if status != SessionStatus::Closed {
                let current = gw.sessions.get_session(&session.id).await?;
                relay_to_agents(gw, &current, message);
            }
            return Ok(Json(json!({ "success": true, "status": status })));
        },
        Err(e) => return Err(e),
    };
    gw.hub.to_session(
        &session.id,
        event::CHAT_MESSAGE,
        json!({
            "sessionId": session.id,
            "content": reply.reply,
            "sender": "bot",
            "timestamp": Utc::now(),
        }),
    );
    Ok(Json(json!({
        "success": true,
        "reply": reply.reply,
        "suggestHandover": reply.suggest_handover,
        "sentiment": reply.sentiment,
    })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRef {
    pub session_id: String,
}

pub async fn request_handover(
    State(state): State<AppState>,
    payload: std::result::Result<Json<SessionRef>, JsonRejection>,
) -> Result<Json<Value>> {
    let req = body(payload)?;
    required("sessionId", &req.session_id)?;
    let gw = &state.gateway;
    let outcome = gw.sessions.request_handover(&req.session_id).await?;

    if outcome.queued_now {
        gw.hub.to_admins(
            event::QUEUE_UPDATE,
            json!({ "type": "new", "session": outcome.session }),
        );
        spawn_handover_notification(Arc::clone(gw), outcome.session);
    }
    Ok(Json(json!({ "success": true, "adminOnline": outcome.admin_online })))
}

fn spawn_handover_notification(gw: Arc<GatewayState>, session: Session) {
    if !gw.notifier.is_ready() {
        info!(session_id = %session.id, "handover notification skipped, messaging client not ready");
        return;
    }
    tokio::spawn(async move {
        let summary = gw.sessions.summary(&session.id).await;
        gw.notifier
            .notify(&session.id, &handover_text(&session, &summary))
            .await;
    });
}

pub async fn visitor_return_to_bot(
    State(state): State<AppState>,
    payload: std::result::Result<Json<SessionRef>, JsonRejection>,
) -> Result<Json<Value>> {
    let req = body(payload)?;
    required("sessionId", &req.session_id)?;
    let gw = &state.gateway;
    gw.sessions.return_to_bot(&req.session_id).await?;
    gw.hub
        .to_session(&req.session_id, event::STATUS_CHANGE, json!({ "status": "bot" }));
    Ok(ok())
}

pub async fn visitor_end_session(
    State(state): State<AppState>,
    payload: std::result::Result<Json<SessionRef>, JsonRejection>,
) -> Result<Json<Value>> {
    let req = body(payload)?;
    required("sessionId", &req.session_id)?;
    let gw = &state.gateway;
    let id = req.session_id;
    gw.sessions.close_session(&id).await?;
    gw.hub
        .to_session(&id, event::STATUS_CHANGE, json!({ "status": "closed" }));
    gw.hub.to_admins(
        event::SESSION_CLOSED,
        json!({ "sessionId": id, "closedBy": "visitor" }),
    );
    gw.hub
        .to_admins(event::QUEUE_UPDATE, json!({ "type": "removed", "sessionId": id }));
    Ok(ok())
}

#[derive(Debug, Default, Deserialize)]
pub struct HistoryQuery {
    pub limit: Option<u32>,
}

pub async fn history(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<Value>> {
    let gw = &state.gateway;
    gw.sessions.get_session(&session_id).await?;
    let messages = gw.sessions.messages(&session_id, query.limit).await?;
    Ok(Json(json!({ "success": true, "messages": messages })))
}

pub async fn visitor_ws(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    ws: WebSocketUpgrade,
) -> Response {
    let gw = Arc::clone(&state.gateway);
    ws.max_message_size(gw.hub_config.max_message_bytes)
        .on_upgrade(move |socket| handle_connection(socket, gw, Role::Visitor { session_id }))
}

// ── Admin ───────────────────────────────────────────────────────────────────

pub async fn queue(State(state): State<AppState>) -> Result<Json<Value>> {
    let sessions = state.gateway.sessions.queued_sessions().await?;
    Ok(Json(json!({
        "success": true,
        "count": sessions.len(),
        "sessions": sessions,
    })))
}

pub async fn claim(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<Value>> {
    let gw = &state.gateway;
    let claimant = admin_from_headers(&headers);
    let outcome = gw.sessions.claim_session(&session_id, claimant.clone()).await?;

    gw.hub.to_session(
        &session_id,
        event::ADMIN_JOINED,
        json!({ "adminName": claimant.admin_name }),
    );
    gw.hub.to_admins(
        event::QUEUE_UPDATE,
        json!({ "type": "claimed", "sessionId": session_id, "adminId": claimant.admin_id }),
    );

    let summary = gw.sessions.summary(&session_id).await;
    let mut response = json!({ "success": true, "summary": summary });
    if let Some(previous) = outcome.previous {
        response["previousAdminId"] = json!(previous.admin_id);
    }
    Ok(Json(response))
}

pub async fn admin_close(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Json<Value>> {
    let gw = &state.gateway;
    gw.sessions.close_session(&session_id).await?;
    gw.hub
        .to_session(&session_id, event::STATUS_CHANGE, json!({ "status": "closed" }));
    Ok(ok())
}

pub async fn admin_return_to_bot(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Json<Value>> {
    let gw = &state.gateway;
    gw.sessions.return_to_bot(&session_id).await?;
    gw.hub
        .to_session(&session_id, event::STATUS_CHANGE, json!({ "status": "bot" }));
    Ok(ok())
}

pub async fn admin_message(
    State(state): State<AppState>,
    payload: std::result::Result<Json<SessionMessage>, JsonRejection>,
) -> Result<Json<Value>> {
    let req = body(payload)?;
    required("sessionId", &req.session_id)?;
    required("content", &req.content)?;
    let gw = &state.gateway;
    let message = gw
        .sessions
        .save_message(&req.session_id, Sender::Admin, &req.content, Utc::now())
        .await?;
    gw.hub.to_session(
        &req.session_id,
        event::CHAT_MESSAGE,
        json!({
            "sessionId": req.session_id,
            "content": message.content,
            "sender": "admin",
            "timestamp": message.timestamp,
        }),
    );
    Ok(ok())
}

pub async fn admin_ws(State(state): State<AppState>, ws: WebSocketUpgrade) -> Response {
    let gw = Arc::clone(&state.gateway);
    ws.max_message_size(gw.hub_config.max_message_bytes)
        .on_upgrade(move |socket| handle_connection(socket, gw, Role::Admin))
}

pub async fn labels(State(state): State<AppState>) -> Json<Value> {
    Json(json!({ "success": true, "labels": state.gateway.labels.summaries() }))
}

/// Contacts tagged with a label, with opaque ids resolved to phone ids.
pub async fn label_contacts(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Json<Value> {
    let gw = &state.gateway;
    let jids = gw.labels.jids_for_label_name(&name);
    let resolutions = match &gw.resolver {
        Some(resolver) => resolver.resolve_all(&jids).await,
        None => jids
            .iter()
            .map(|jid| {
                if is_canonical(jid) {
                    Resolution::Resolved(split_jid(jid).0.to_string())
                } else {
                    Resolution::Unresolved(jid.clone())
                }
            })
            .collect(),
    };
    let contacts: Vec<Value> = jids
        .iter()
        .zip(&resolutions)
        .map(|(jid, resolution)| {
            let (user, _) = split_jid(jid);
            let phone = resolution.canonical().unwrap_or(user);
            json!({
                "jid": jid,
                "id": phone,
                "phone": phone,
                "resolved": resolution.canonical().is_some(),
            })
        })
        .collect();
    let resolved = resolutions.iter().filter(|r| r.canonical().is_some()).count();
    info!(label = %name, count = contacts.len(), resolved, "label contacts listed");
    Json(json!({
        "success": true,
        "label": name,
        "count": contacts.len(),
        "resolved": resolved,
        "contacts": contacts,
        "labelsInStore": gw.labels.summaries().len(),
    }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PresenceUpdate {
    pub admin_id: String,
    #[serde(default)]
    pub admin_name: String,
    pub status: String,
}

pub async fn update_admin_status(
    State(state): State<AppState>,
    payload: std::result::Result<Json<PresenceUpdate>, JsonRejection>,
) -> Result<Json<Value>> {
    let req = body(payload)?;
    required("adminId", &req.admin_id)?;
    let status: PresenceStatus = req.status.parse()?;
    state
        .gateway
        .sessions
        .update_admin_status(&req.admin_id, &req.admin_name, status);
    Ok(ok())
}

pub async fn online_admins(State(state): State<AppState>) -> Json<Value> {
    Json(json!({ "success": true, "admins": state.gateway.sessions.online_admins() }))
}

pub async fn get_whatsapp_settings(State(state): State<AppState>) -> Result<Json<Value>> {
    let Some(store) = &state.gateway.settings else {
        return Err(Error::Message {
            message: "settings store unavailable".into(),
        });
    };
    let settings = store.whatsapp_settings().await?;
    Ok(Json(json!({ "success": true, "settings": settings })))
}

pub async fn save_whatsapp_settings(
    State(state): State<AppState>,
    payload: std::result::Result<Json<WhatsAppSettings>, JsonRejection>,
) -> Result<Json<Value>> {
    let req = body(payload)?;
    let Some(store) = &state.gateway.settings else {
        return Err(Error::Message {
            message: "settings store unavailable".into(),
        });
    };
    let clean = |n: Option<String>| {
        n.map(|n| n.trim().to_string()).filter(|n| !n.is_empty())
    };
    let settings = WhatsAppSettings {
        agent_phone: clean(req.agent_phone),
        main_number: clean(req.main_number),
        secondary_number: clean(req.secondary_number),
    };
    store.save_whatsapp_settings(&settings).await?;
    info!(numbers = settings.numbers().count(), "whatsapp settings updated");
    Ok(Json(json!({ "success": true, "settings": settings })))
}

// ── Public ──────────────────────────────────────────────────────────────────

pub async fn status(State(state): State<AppState>) -> impl IntoResponse {
    let gw = &state.gateway;
    Json(json!({
        "success": true,
        "version": gw.version,
        "uptimeSecs": gw.started_at.elapsed().as_secs(),
        "hub": gw.hub.stats().await,
        "messaging": gw.registry.snapshot(),
        "monitor": gw.monitor.snapshot(),
    }))
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use std::time::Duration;

    use {
        relaydesk_identity::{IdentityCache, IdentityResolver, ResolverSettings},
        relaydesk_sessions::NewSession,
    };

    use {
        super::*,
        crate::{
            hub::Audience,
            test_support::{test_state, test_state_with},
        },
    };

    #[test]
    fn admin_headers_default() {
        let claimant = admin_from_headers(&HeaderMap::new());
        assert_eq!(claimant.admin_id, DEFAULT_ADMIN_ID);
        assert_eq!(claimant.admin_name, DEFAULT_ADMIN_NAME);

        let mut headers = HeaderMap::new();
        headers.insert(ADMIN_ID_HEADER, "a7".parse().unwrap());
        headers.insert(ADMIN_NAME_HEADER, "Angga".parse().unwrap());
        let claimant = admin_from_headers(&headers);
        assert_eq!(claimant.admin_id, "a7");
        assert_eq!(claimant.admin_name, "Angga");
    }

    fn tag_leads(state: &GatewayState) {
        state.labels.set_label("7", "Leads for Web");
        for jid in [
            "99887766554433@lid",
            "6281234567890@s.whatsapp.net",
            "11223344556677@lid",
        ] {
            state.labels.add_association("7", jid);
        }
    }

    #[tokio::test]
    async fn label_contacts_resolve_opaque_ids() {
        let dir = tempfile::tempdir().unwrap();
        let cache = Arc::new(IdentityCache::load(dir.path().join("lid.json")).unwrap());
        cache.set("99887766554433", "6281399710085").await.unwrap();
        let resolver = Arc::new(IdentityResolver::new(cache, None, ResolverSettings {
            initial_batch_size: 10,
            success_delay: Duration::ZERO,
            failure_delay: Duration::ZERO,
        }));
        let gateway = test_state_with(Some(resolver)).await;
        tag_leads(&gateway);

        let Json(body) = label_contacts(
            State(AppState { gateway }),
            Path("leads for web".to_string()),
        )
        .await;
        assert_eq!(body["count"], 3);
        assert_eq!(body["resolved"], 2);
        let phones: Vec<&str> = body["contacts"]
            .as_array()
            .unwrap()
            .iter()
            .map(|c| c["phone"].as_str().unwrap())
            .collect();
        assert_eq!(phones, ["11223344556677", "6281234567890", "6281399710085"]);
        assert_eq!(body["contacts"][0]["resolved"], false);
        assert_eq!(body["contacts"][2]["jid"], "99887766554433@lid");
    }

    #[tokio::test]
    async fn label_contacts_without_resolver_or_label() {
        let gateway = test_state().await;
        tag_leads(&gateway);
        let state = AppState { gateway };

        let Json(body) = label_contacts(State(state.clone()), Path("Leads for Web".to_string())).await;
        assert_eq!(body["resolved"], 1);
        assert_eq!(body["contacts"][2]["phone"], "99887766554433");

        let Json(body) = label_contacts(State(state), Path("VIP".to_string())).await;
        assert_eq!(body["count"], 0);
        assert_eq!(body["labelsInStore"], 1);
    }

    #[tokio::test]
    async fn handover_during_bot_turn_keeps_the_message_with_agents() {
        let gw = test_state().await;
        let created = gw
            .sessions
            .create_session(NewSession {
                visitor_id: "v1".into(),
                visitor_name: "Budi".into(),
                ..Default::default()
            })
            .await
            .unwrap();
        let snapshot = created.session;
        let message = gw
            .sessions
            .save_message(&snapshot.id, Sender::Visitor, "mau bicara dengan admin", Utc::now())
            .await
            .unwrap();
        gw.sessions.request_handover(&snapshot.id).await.unwrap();
        let mut admin = gw.hub.register(Audience::Admins);

        let Json(body) = bot_turn(&gw, &snapshot, &message).await.unwrap();
        assert_eq!(body["success"], true);
        assert_eq!(body["status"], "queued");
        assert!(body.get("reply").is_none());

        gw.hub.stats().await;
        let relayed: Value = serde_json::from_str(&admin.receiver.recv().await.unwrap()).unwrap();
        assert_eq!(relayed["event"], "chat-message");
        assert_eq!(relayed["data"]["content"], "mau bicara dengan admin");

        let history = gw.sessions.messages(&snapshot.id, None).await.unwrap();
        let last = history.last().unwrap();
        assert_eq!(last.sender, Sender::Visitor);
        assert_eq!(last.content, "mau bicara dengan admin");
    }
}
