use std::{sync::Arc, time::Instant};

use {
    async_trait::async_trait,
    relaydesk_auto_reply::AutoResponder,
    relaydesk_channels::{ConnectionRegistry, MessagingOutbound},
    relaydesk_chat::ChatEngine,
    relaydesk_config::{HubConfig, MessagingConfig, RelaydeskConfig},
    relaydesk_identity::{IdentityResolver, LabelStore},
    relaydesk_sessions::{SessionStore, SettingsStore},
    secrecy::Secret,
};

use crate::{
    auth::AdminAuthorizer,
    bridge::ReplyBridge,
    hub::Hub,
    monitor::HealthMonitor,
    notify::AgentNotifier,
    presence::PresenceRoster,
    session::SessionManager,
};

/// Outbound used when no messaging sidecar is configured: never ready.
pub struct OfflineOutbound;

#[async_trait]
impl MessagingOutbound for OfflineOutbound {
    async fn send_text(&self, client_id: &str, _to: &str, _text: &str) -> relaydesk_channels::Result<()> {
        Err(relaydesk_channels::Error::unavailable(format!(
            "messaging client {client_id} is not configured"
        )))
    }

    fn is_ready(&self, _client_id: &str) -> bool {
        false
    }
}

/// Collaborators the gateway is assembled from.
pub struct GatewayDeps {
    pub store: Arc<dyn SessionStore>,
    pub settings: Option<Arc<dyn SettingsStore>>,
    pub engine: Arc<dyn ChatEngine>,
    pub outbound: Arc<dyn MessagingOutbound>,
    pub registry: Arc<ConnectionRegistry>,
    pub resolver: Option<Arc<IdentityResolver>>,
}

/// Shared gateway runtime state. Must be built inside a tokio runtime.
pub struct GatewayState {
    pub version: String,
    pub started_at: Instant,
    pub api_key: Option<Secret<String>>,
    pub hub_config: HubConfig,
    pub messaging: MessagingConfig,

    pub sessions: Arc<SessionManager>,
    pub hub: Hub,
    pub registry: Arc<ConnectionRegistry>,
    pub labels: Arc<LabelStore>,
    pub resolver: Option<Arc<IdentityResolver>>,
    pub settings: Option<Arc<dyn SettingsStore>>,
    pub notifier: Arc<AgentNotifier>,
    pub monitor: Arc<HealthMonitor>,
    pub bridge: ReplyBridge,
    pub auto_reply: AutoResponder,
}

impl GatewayState {
    pub fn new(config: &RelaydeskConfig, deps: GatewayDeps) -> Arc<Self> {
        let sessions = Arc::new(SessionManager::new(
            deps.store,
            deps.engine,
            Arc::new(PresenceRoster::new()),
            &config.sessions,
        ));
        let hub = Hub::spawn(config.hub.send_buffer);
        let admins = Arc::new(AdminAuthorizer::new(
            config,
            deps.resolver.clone(),
            deps.settings.clone(),
        ));
        let auto_reply =
            AutoResponder::new(&config.auto_reply, admins, Arc::clone(&deps.outbound));
        let notifier = Arc::new(AgentNotifier::new(
            config,
            deps.outbound,
            deps.settings.clone(),
        ));
        let monitor = Arc::new(HealthMonitor::new(
            config,
            Arc::clone(&notifier),
            Arc::clone(&deps.registry),
        ));

        Arc::new(Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
            started_at: Instant::now(),
            api_key: config.server.api_key.clone(),
            hub_config: config.hub.clone(),
            messaging: config.messaging.clone(),
            bridge: ReplyBridge::new(Arc::clone(&sessions), hub.clone()),
            sessions,
            hub,
            registry: deps.registry,
            labels: Arc::new(LabelStore::new()),
            resolver: deps.resolver,
            settings: deps.settings,
            notifier,
            monitor,
            auto_reply,
        })
    }
}
