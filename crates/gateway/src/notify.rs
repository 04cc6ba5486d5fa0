//! Messages to the on-duty agent's phone.

use std::{sync::Arc, time::Duration};

use {
    relaydesk_channels::MessagingOutbound,
    relaydesk_common::{RetryPolicy, with_retry},
    relaydesk_config::RelaydeskConfig,
    relaydesk_identity::jid::{sanitize_phone, to_user_jid},
    relaydesk_sessions::{Session, SettingsStore},
    tracing::{debug, info, warn},
};

use crate::auth::fetch_settings;

/// `Nama:` line plus whichever contact details the session carries.
pub fn visitor_info(session: &Session) -> String {
    let mut info = format!("Nama: {}", session.visitor_name);
    if let Some(phone) = session.visitor_phone.as_deref().filter(|p| !p.is_empty()) {
        info.push_str(&format!("\nWA: {phone}"));
    }
    if !session.location.is_empty() {
        info.push_str(&format!("\nLokasi: {}", session.location));
    }
    if let Some(page) = session.current_page.as_deref().filter(|p| !p.is_empty()) {
        info.push_str(&format!("\nHalaman: {page}"));
    }
    info
}

/// A visitor message relayed to the agent. The trailing token lets a quoted
/// reply find its way back to the session.
pub fn forward_text(session: &Session, content: &str) -> String {
    format!("{}\n\n{content}\n\nID: #{}", visitor_info(session), session.id)
}

pub fn handover_text(session: &Session, summary: &str) -> String {
    format!(
        "*Permintaan Chat Baru (#{})*\n\n{}\n\n*Ringkasan AI:*\n{summary}\n\nBalas pesan ini untuk terhubung.",
        session.id,
        visitor_info(session)
    )
}

pub struct AgentNotifier {
    outbound: Arc<dyn MessagingOutbound>,
    client_id: String,
    settings: Option<Arc<dyn SettingsStore>>,
    settings_timeout: Duration,
    agent_phone: Option<String>,
    retry: RetryPolicy,
}

impl AgentNotifier {
    pub fn new(
        config: &RelaydeskConfig,
        outbound: Arc<dyn MessagingOutbound>,
        settings: Option<Arc<dyn SettingsStore>>,
    ) -> Self {
        Self {
            outbound,
            client_id: config.messaging.bot_client_id.clone(),
            settings,
            settings_timeout: config.admins.settings_timeout(),
            agent_phone: config
                .messaging
                .agent_phone
                .clone()
                .filter(|p| !p.trim().is_empty()),
            retry: RetryPolicy::default(),
        }
    }

    #[must_use]
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Whether notifications can currently go out.
    pub fn is_ready(&self) -> bool {
        self.outbound.is_ready(&self.client_id)
    }

    /// Agent address: the settings number when set, else the config one.
    pub async fn agent_jid(&self) -> Option<String> {
        let from_settings = fetch_settings(self.settings.as_ref(), self.settings_timeout)
            .await
            .and_then(|s| s.agent_phone)
            .filter(|p| !p.trim().is_empty());
        from_settings
            .or_else(|| self.agent_phone.clone())
            .map(|p| to_user_jid(&sanitize_phone(p.trim())))
    }

    /// Send `text` to the agent. Returns `false` when skipped.
    ///
    /// `context` names what the message is about in logs: a session id, or
    /// the watched target for health alerts.
    pub async fn notify(&self, context: &str, text: &str) -> bool {
        if !self.is_ready() {
            debug!(context, client_id = %self.client_id, "agent notification skipped, client not ready");
            return false;
        }
        let Some(to) = self.agent_jid().await else {
            debug!(context, "agent notification skipped, no agent phone configured");
            return false;
        };
        match with_retry(self.retry, "agent_notify", || {
            self.outbound.send_text(&self.client_id, &to, text)
        })
        .await
        {
            Ok(()) => {
                info!(context, to = %to, "agent notified");
                true
            },
            Err(e) => {
                warn!(context, to = %to, error = %e.into_inner(), "agent notification failed");
                false
            },
        }
    }

    /// Forward a visitor message in the background.
    pub fn spawn_forward(self: &Arc<Self>, session: &Session, content: &str) {
        if !self.is_ready() {
            return;
        }
        let notifier = Arc::clone(self);
        let text = forward_text(session, content);
        let session_id = session.id.clone();
        tokio::spawn(async move {
            notifier.notify(&session_id, &text).await;
        });
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use std::sync::Mutex;

    use {
        async_trait::async_trait,
        chrono::Utc,
        relaydesk_sessions::{SessionStatus, WhatsAppSettings},
    };

    use super::*;

    #[derive(Default)]
    struct Recorder {
        sent: Mutex<Vec<(String, String)>>,
        ready: bool,
    }

    #[async_trait]
    impl MessagingOutbound for Recorder {
        async fn send_text(&self, _: &str, to: &str, text: &str) -> relaydesk_channels::Result<()> {
            self.sent.lock().unwrap().push((to.into(), text.into()));
            Ok(())
        }

        fn is_ready(&self, _: &str) -> bool {
            self.ready
        }
    }

    struct Settings(WhatsAppSettings);

    #[async_trait]
    impl SettingsStore for Settings {
        async fn whatsapp_settings(&self) -> relaydesk_sessions::Result<WhatsAppSettings> {
            Ok(self.0.clone())
        }

        async fn save_whatsapp_settings(&self, _: &WhatsAppSettings) -> relaydesk_sessions::Result<()> {
            Ok(())
        }
    }

    fn session() -> Session {
        let now = Utc::now();
        Session {
            id: "abcd1234efgh5678ijkl".into(),
            visitor_id: "v1".into(),
            visitor_name: "Budi".into(),
            visitor_email: None,
            visitor_phone: Some("08123456789".into()),
            current_page: Some("/pricing".into()),
            location: "Jakarta".into(),
            status: SessionStatus::Queued,
            claimed_by: None,
            claimed_by_name: None,
            created_at: now,
            updated_at: now,
            last_activity_at: now,
        }
    }

    fn config(agent: Option<&str>) -> RelaydeskConfig {
        let mut cfg = RelaydeskConfig::default();
        cfg.messaging.agent_phone = agent.map(Into::into);
        cfg
    }

    #[test]
    fn message_formats() {
        let s = session();
        assert_eq!(
            visitor_info(&s),
            "Nama: Budi\nWA: 08123456789\nLokasi: Jakarta\nHalaman: /pricing"
        );
        assert_eq!(
            forward_text(&s, "halo"),
            "Nama: Budi\nWA: 08123456789\nLokasi: Jakarta\nHalaman: /pricing\n\nhalo\n\nID: #abcd1234efgh5678ijkl"
        );
        let handover = handover_text(&s, "Visitor asks about pricing.");
        assert!(handover.starts_with("*Permintaan Chat Baru (#abcd1234efgh5678ijkl)*\n\nNama: Budi"));
        assert!(handover.ends_with("*Ringkasan AI:*\nVisitor asks about pricing.\n\nBalas pesan ini untuk terhubung."));
        assert_eq!(
            relaydesk_sessions::extract_session_id(&forward_text(&s, "x")).as_deref(),
            Some("abcd1234efgh5678ijkl")
        );
    }

    #[test]
    fn info_omits_missing_details() {
        let mut s = session();
        s.visitor_phone = None;
        s.current_page = None;
        assert_eq!(visitor_info(&s), "Nama: Budi\nLokasi: Jakarta");
    }

    #[tokio::test]
    async fn settings_phone_overrides_config() {
        let outbound = Arc::new(Recorder {
            ready: true,
            ..Default::default()
        });
        let settings: Arc<dyn SettingsStore> = Arc::new(Settings(WhatsAppSettings {
            agent_phone: Some("0895 1853 0306".into()),
            ..Default::default()
        }));
        let notifier = AgentNotifier::new(&config(Some("6281399710085")), outbound.clone(), Some(settings));
        assert_eq!(
            notifier.agent_jid().await.as_deref(),
            Some("6289518530306@s.whatsapp.net")
        );

        assert!(notifier.notify("s1", "hello").await);
        assert_eq!(outbound.sent.lock().unwrap()[0].0, "6289518530306@s.whatsapp.net");
    }

    #[tokio::test]
    async fn skipped_when_not_ready_or_unconfigured() {
        let offline = Arc::new(Recorder::default());
        let notifier = AgentNotifier::new(&config(Some("6281399710085")), offline.clone(), None);
        assert!(!notifier.notify("s1", "hello").await);
        assert!(offline.sent.lock().unwrap().is_empty());

        let ready = Arc::new(Recorder {
            ready: true,
            ..Default::default()
        });
        let notifier = AgentNotifier::new(&config(None), ready.clone(), None);
        assert_eq!(notifier.agent_jid().await, None);
        assert!(!notifier.notify("s1", "hello").await);
    }
}
