use std::{net::SocketAddr, str::FromStr, sync::Arc, time::Duration};

use {
    anyhow::Context as _,
    axum::{
        Router,
        http::{HeaderName, HeaderValue, Method, header},
        routing::{get, post},
    },
    relaydesk_channels::{ConnectionRegistry, MessagingOutbound},
    relaydesk_chat::{ChatEngine, OpenAiEngine, ScriptedEngine},
    relaydesk_config::RelaydeskConfig,
    relaydesk_identity::{ContactLookup, IdentityCache, IdentityResolver, ResolverSettings},
    relaydesk_sessions::{SettingsStore, SqliteSessionStore, SqliteSettingsStore},
    relaydesk_whatsapp::WhatsAppClient,
    serde_json::json,
    sqlx::{
        SqlitePool,
        sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    },
    tokio_util::sync::CancellationToken,
    tower_http::{
        cors::{AllowOrigin, Any, CorsLayer},
        trace::TraceLayer,
    },
    tracing::{info, warn},
};

use crate::{
    auth_middleware::{API_KEY_HEADER, require_api_key},
    channel_events::GatewayEventSink,
    hub::event,
    routes,
    state::{GatewayDeps, GatewayState, OfflineOutbound},
};

// ── Shared app state ─────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct AppState {
    pub gateway: Arc<GatewayState>,
}

// ── Router ───────────────────────────────────────────────────────────────────

fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let origin = if allowed_origins.iter().any(|o| o.trim() == "*") {
        AllowOrigin::from(Any)
    } else {
        let origins: Vec<HeaderValue> = allowed_origins
            .iter()
            .filter_map(|o| match HeaderValue::from_str(o.trim()) {
                Ok(v) => Some(v),
                Err(_) => {
                    warn!(origin = %o, "ignoring invalid CORS origin");
                    None
                },
            })
            .collect();
        AllowOrigin::list(origins)
    };
    CorsLayer::new()
        .allow_origin(origin)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([
            header::CONTENT_TYPE,
            header::AUTHORIZATION,
            HeaderName::from_static(API_KEY_HEADER),
            HeaderName::from_static(routes::ADMIN_ID_HEADER),
            HeaderName::from_static(routes::ADMIN_NAME_HEADER),
        ])
}

/// Build the gateway router (shared between production startup and tests).
pub fn build_gateway_app(state: Arc<GatewayState>, allowed_origins: &[String]) -> Router {
    let app_state = AppState { gateway: state };

    let visitor = Router::new()
        .route("/chat/start", post(routes::start_chat))
        .route("/chat/message", post(routes::send_visitor_message))
        .route("/chat/handover", post(routes::request_handover))
        .route("/chat/return-to-bot", post(routes::visitor_return_to_bot))
        .route("/chat/end-session", post(routes::visitor_end_session))
        .route("/chat/history/{session_id}", get(routes::history))
        .route("/chat/ws/{session_id}", get(routes::visitor_ws));

    let admin = Router::new()
        .route("/admin-chat/queue", get(routes::queue))
        .route("/admin-chat/claim/{session_id}", post(routes::claim))
        .route("/admin-chat/close/{session_id}", post(routes::admin_close))
        .route(
            "/admin-chat/return-to-bot/{session_id}",
            post(routes::admin_return_to_bot),
        )
        .route("/admin-chat/message", post(routes::admin_message))
        .route("/admin-chat/ws", get(routes::admin_ws))
        .route("/admin-chat/labels", get(routes::labels))
        .route(
            "/admin-chat/labels/{name}/contacts",
            get(routes::label_contacts),
        )
        .route("/admin-status/update", post(routes::update_admin_status))
        .route("/admin-status/online", get(routes::online_admins))
        .route(
            "/settings/whatsapp",
            get(routes::get_whatsapp_settings).post(routes::save_whatsapp_settings),
        )
        .layer(axum::middleware::from_fn_with_state(
            app_state.clone(),
            require_api_key,
        ));

    Router::new()
        .route("/status", get(routes::status))
        .merge(visitor)
        .merge(admin)
        .layer(cors_layer(allowed_origins))
        .layer(TraceLayer::new_for_http())
        .with_state(app_state)
}

// ── Background work ──────────────────────────────────────────────────────────

/// Close idle sessions once and tell both sides. Returns how many closed.
pub async fn cleanup_once(state: &GatewayState, max_idle: Duration) -> usize {
    let closed = match state.sessions.cleanup_inactive_sessions(max_idle).await {
        Ok(closed) => closed,
        Err(e) => {
            warn!(error = %e, "inactive session cleanup failed");
            return 0;
        },
    };
    for id in &closed {
        state
            .hub
            .to_session(id, event::STATUS_CHANGE, json!({ "status": "closed" }));
        state.hub.to_admins(
            event::SESSION_CLOSED,
            json!({ "sessionId": id, "closedBy": "inactivity" }),
        );
        state
            .hub
            .to_admins(event::QUEUE_UPDATE, json!({ "type": "removed", "sessionId": id }));
    }
    closed.len()
}

pub fn spawn_cleanup(
    state: Arc<GatewayState>,
    interval: Duration,
    max_idle: Duration,
    cancel: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.tick().await;
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    cleanup_once(&state, max_idle).await;
                }
            }
        }
    })
}

// ── Server startup ───────────────────────────────────────────────────────────

/// Open (creating if needed) the SQLite database and apply migrations.
pub async fn connect_database(config: &RelaydeskConfig) -> anyhow::Result<SqlitePool> {
    let url = match config.database.url.as_deref().filter(|u| !u.trim().is_empty()) {
        Some(url) => url.to_string(),
        None => {
            let dir = relaydesk_config::data_dir();
            std::fs::create_dir_all(&dir)
                .with_context(|| format!("creating data dir {}", dir.display()))?;
            format!("sqlite://{}", dir.join("relaydesk.db").display())
        },
    };
    let options = SqliteConnectOptions::from_str(&url)
        .with_context(|| format!("invalid database url {url}"))?
        .create_if_missing(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await
        .with_context(|| format!("connecting to {url}"))?;
    relaydesk_sessions::run_migrations(&pool).await?;
    info!(url = %url, "database ready");
    Ok(pool)
}

fn chat_engine(config: &RelaydeskConfig) -> anyhow::Result<Arc<dyn ChatEngine>> {
    let engine: Arc<dyn ChatEngine> = match OpenAiEngine::from_config(&config.ai)? {
        Some(engine) => {
            info!(model = %config.ai.model, "chat engine ready");
            Arc::new(engine)
        },
        None => {
            warn!("no AI api key configured, using scripted replies");
            Arc::new(ScriptedEngine::new())
        },
    };
    Ok(engine)
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("shutdown requested");
}

pub async fn start_gateway(config: RelaydeskConfig) -> anyhow::Result<()> {
    let pool = connect_database(&config).await?;
    let store = Arc::new(SqliteSessionStore::new(pool.clone()));
    let settings: Arc<dyn SettingsStore> = Arc::new(SqliteSettingsStore::new(pool));
    let registry = Arc::new(ConnectionRegistry::new());

    let client = config.messaging.sidecar_url.as_deref().map(|url| {
        WhatsAppClient::new(
            url,
            config.messaging.request_timeout(),
            Arc::clone(&registry),
            config.messaging.bot_client_id.clone(),
        )
    });
    let (outbound, lookup): (Arc<dyn MessagingOutbound>, Option<Arc<dyn ContactLookup>>) =
        match &client {
            Some(client) => {
                let outbound = client.outbound();
                let lookup: Arc<dyn ContactLookup> = outbound.clone();
                (outbound as Arc<dyn MessagingOutbound>, Some(lookup))
            },
            None => {
                warn!("no messaging sidecar configured, agent notifications are disabled");
                (Arc::new(OfflineOutbound) as Arc<dyn MessagingOutbound>, None)
            },
        };

    let cache = Arc::new(
        IdentityCache::load(&config.identity.cache_path)
            .with_context(|| format!("loading {}", config.identity.cache_path.display()))?,
    );
    info!(path = %cache.path().display(), entries = cache.len(), "identity cache loaded");
    let resolver = Arc::new(IdentityResolver::new(
        cache,
        lookup,
        ResolverSettings::from(&config.identity),
    ));

    let state = GatewayState::new(&config, GatewayDeps {
        store,
        settings: Some(settings),
        engine: chat_engine(&config)?,
        outbound,
        registry,
        resolver: Some(resolver),
    });

    let cancel = CancellationToken::new();
    if let Some(client) = client {
        let sink = Arc::new(GatewayEventSink::new(Arc::clone(&state)));
        tokio::spawn(client.run(sink, cancel.clone()));
    }
    spawn_cleanup(
        Arc::clone(&state),
        config.sessions.cleanup_interval(),
        config.sessions.max_idle(),
        cancel.clone(),
    );
    if state.monitor.is_active() {
        Arc::clone(&state.monitor).spawn(config.monitor.interval(), cancel.clone());
    } else {
        info!("health monitor has nothing to watch");
    }

    let app = build_gateway_app(Arc::clone(&state), &config.server.allowed_origins);
    let addr: SocketAddr = format!("{}:{}", config.server.bind, config.server.port)
        .parse()
        .with_context(|| format!("invalid bind address {}", config.server.bind))?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(
        addr = %addr,
        version = %state.version,
        api_key = state.api_key.is_some(),
        origins = config.server.allowed_origins.len(),
        "relaydesk gateway listening"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    cancel.cancel();
    Ok(())
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use {
        relaydesk_sessions::{NewSession, SessionStatus},
        serde_json::Value,
    };

    use super::*;
    use crate::{hub::Audience, test_support::test_state};

    #[tokio::test]
    async fn cleanup_closes_idle_sessions_and_notifies() {
        let state = test_state().await;
        let created = state
            .sessions
            .create_session(NewSession {
                visitor_id: "v1".into(),
                visitor_name: "Budi".into(),
                ..Default::default()
            })
            .await
            .unwrap();
        let id = created.session.id;
        let mut visitor = state.hub.register(Audience::Session(id.clone()));
        let mut admin = state.hub.register(Audience::Admins);

        assert_eq!(cleanup_once(&state, Duration::from_secs(3600)).await, 0);
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(cleanup_once(&state, Duration::from_millis(10)).await, 1);
        state.hub.stats().await;

        let to_visitor: Value =
            serde_json::from_str(&visitor.receiver.recv().await.unwrap()).unwrap();
        assert_eq!(to_visitor["event"], "status-change");
        assert_eq!(to_visitor["data"]["status"], "closed");

        let closed: Value = serde_json::from_str(&admin.receiver.recv().await.unwrap()).unwrap();
        assert_eq!(closed["event"], "session-closed");
        assert_eq!(closed["data"]["sessionId"], id.as_str());
        assert_eq!(closed["data"]["closedBy"], "inactivity");
        let removed: Value = serde_json::from_str(&admin.receiver.recv().await.unwrap()).unwrap();
        assert_eq!(removed["event"], "queue-update");
        assert_eq!(removed["data"]["type"], "removed");

        assert_eq!(
            state.sessions.get_session(&id).await.unwrap().status,
            SessionStatus::Closed
        );
    }

    #[test]
    fn wildcard_origin_is_accepted() {
        cors_layer(&["*".to_string()]);
        cors_layer(&["https://valprointertech.com".to_string(), "bad\norigin".to_string()]);
    }
}
