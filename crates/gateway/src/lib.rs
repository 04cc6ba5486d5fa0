//! Gateway: HTTP/WebSocket server for the chat widget and admin console, the
//! session lifecycle, and the bridge between web sessions and the messaging
//! network.
//!
//! Lifecycle:
//! 1. Load config, open the database and run migrations
//! 2. Build the chat engine, messaging client and identity resolver
//! 3. Start the realtime hub, the idle-session cleanup ticker and the health
//!    monitor
//! 4. Serve visitor routes, key-protected admin routes and WebSockets
//!
//! Inbound network messages flow through [`channel_events`] into the reply
//! bridge and the auto-responder.

pub mod auth;
pub mod auth_middleware;
pub mod bridge;
pub mod channel_events;
pub mod error;
pub mod hub;
pub mod monitor;
pub mod notify;
pub mod presence;
pub mod routes;
pub mod server;
pub mod session;
pub mod state;
pub mod ws;

pub use {
    error::{Error, Result},
    hub::{Audience, Hub, HubStats},
    server::{build_gateway_app, start_gateway},
    session::SessionManager,
    state::{GatewayDeps, GatewayState, OfflineOutbound},
};

#[cfg(test)]
pub(crate) mod test_support {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use std::sync::Arc;

    use {
        relaydesk_channels::ConnectionRegistry,
        relaydesk_chat::ScriptedEngine,
        relaydesk_config::{RelaydeskConfig, SessionsConfig},
        relaydesk_identity::IdentityResolver,
        relaydesk_sessions::{SqliteSessionStore, SqliteSettingsStore},
        sqlx::sqlite::SqlitePoolOptions,
    };

    use crate::{
        presence::PresenceRoster,
        session::SessionManager,
        state::{GatewayDeps, GatewayState, OfflineOutbound},
    };

    async fn pool() -> sqlx::SqlitePool {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        relaydesk_sessions::run_migrations(&pool).await.unwrap();
        pool
    }

    pub async fn test_manager() -> Arc<SessionManager> {
        Arc::new(SessionManager::new(
            Arc::new(SqliteSessionStore::new(pool().await)),
            Arc::new(ScriptedEngine::new()),
            Arc::new(PresenceRoster::new()),
            &SessionsConfig::default(),
        ))
    }

    pub async fn test_state() -> Arc<GatewayState> {
        test_state_with(None).await
    }

    pub async fn test_state_for(config: &RelaydeskConfig) -> Arc<GatewayState> {
        build(config, None).await
    }

    pub async fn test_state_with(resolver: Option<Arc<IdentityResolver>>) -> Arc<GatewayState> {
        build(&RelaydeskConfig::default(), resolver).await
    }

    async fn build(
        config: &RelaydeskConfig,
        resolver: Option<Arc<IdentityResolver>>,
    ) -> Arc<GatewayState> {
        let pool = pool().await;
        GatewayState::new(config, GatewayDeps {
            store: Arc::new(SqliteSessionStore::new(pool.clone())),
            settings: Some(Arc::new(SqliteSettingsStore::new(pool))),
            engine: Arc::new(ScriptedEngine::new()),
            outbound: Arc::new(OfflineOutbound),
            registry: Arc::new(ConnectionRegistry::new()),
            resolver,
        })
    }
}
