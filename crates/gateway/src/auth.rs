//! Is a messaging identifier one of our admins?

use std::{collections::BTreeSet, sync::Arc, time::Duration};

use {
    async_trait::async_trait,
    relaydesk_auto_reply::AdminCheck,
    relaydesk_config::RelaydeskConfig,
    relaydesk_identity::{
        IdentityResolver, Resolution,
        jid::{LID_SERVER, looks_like_phone, sanitize_phone, split_jid},
    },
    relaydesk_sessions::{SettingsStore, WhatsAppSettings},
    tracing::{debug, warn},
};

/// Whole milliseconds for log fields, saturating at `u64::MAX`.
pub(crate) fn millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

/// Settings row within `timeout`, or `None` when the store is missing, fails
/// or is too slow.
pub async fn fetch_settings(
    store: Option<&Arc<dyn SettingsStore>>,
    timeout: Duration,
) -> Option<WhatsAppSettings> {
    let store = store?;
    match tokio::time::timeout(timeout, store.whatsapp_settings()).await {
        Ok(Ok(settings)) => Some(settings),
        Ok(Err(e)) => {
            warn!(error = %e, "failed to load whatsapp settings, using config");
            None
        },
        Err(_) => {
            warn!(timeout_ms = millis(timeout), "whatsapp settings lookup timed out, using config");
            None
        },
    }
}

pub struct AdminAuthorizer {
    known: BTreeSet<String>,
    resolver: Option<Arc<IdentityResolver>>,
    lookup_timeout: Duration,
    settings: Option<Arc<dyn SettingsStore>>,
    settings_timeout: Duration,
    agent_phone: Option<String>,
}

impl AdminAuthorizer {
    pub fn new(
        config: &RelaydeskConfig,
        resolver: Option<Arc<IdentityResolver>>,
        settings: Option<Arc<dyn SettingsStore>>,
    ) -> Self {
        Self {
            known: config.admins.known.keys().map(|p| sanitize_phone(p)).collect(),
            resolver,
            lookup_timeout: config.identity.lookup_timeout(),
            settings,
            settings_timeout: config.admins.settings_timeout(),
            agent_phone: config
                .messaging
                .agent_phone
                .as_deref()
                .map(sanitize_phone)
                .filter(|p| !p.is_empty()),
        }
    }

    /// Phone number behind `identifier`, resolving opaque ids when possible.
    async fn phone_for(&self, identifier: &str) -> String {
        let (user, server) = split_jid(identifier);
        let phone = sanitize_phone(user);
        if server != Some(LID_SERVER) && looks_like_phone(user) {
            return phone;
        }
        let Some(resolver) = &self.resolver else {
            return phone;
        };
        match tokio::time::timeout(self.lookup_timeout, resolver.resolve(identifier)).await {
            Ok(Resolution::Resolved(canonical)) => {
                debug!(identifier, canonical = %canonical, "resolved admin candidate");
                sanitize_phone(&canonical)
            },
            Ok(Resolution::Unresolved(_)) => phone,
            Err(_) => {
                warn!(identifier, "identity resolution timed out during admin check");
                phone
            },
        }
    }
}

#[async_trait]
impl AdminCheck for AdminAuthorizer {
    async fn is_authorized_admin(&self, identifier: &str) -> bool {
        let phone = self.phone_for(identifier).await;
        if phone.is_empty() {
            return false;
        }
        if self.known.contains(&phone) {
            debug!(phone = %phone, "sender is a known admin");
            return true;
        }

        match fetch_settings(self.settings.as_ref(), self.settings_timeout).await {
            Some(settings) => settings.numbers().any(|n| sanitize_phone(n) == phone),
            None => self.agent_phone.as_deref() == Some(phone.as_str()),
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use std::collections::HashMap;

    use {
        relaydesk_identity::{ContactLookup, IdentityCache, LookupError, ResolverSettings},
        relaydesk_sessions::Result as StoreResult,
    };

    use super::*;

    struct FixedSettings(Option<WhatsAppSettings>);

    #[async_trait]
    impl SettingsStore for FixedSettings {
        async fn whatsapp_settings(&self) -> StoreResult<WhatsAppSettings> {
            match &self.0 {
                Some(s) => Ok(s.clone()),
                None => Err(relaydesk_sessions::Error::message("database is locked")),
            }
        }

        async fn save_whatsapp_settings(&self, _: &WhatsAppSettings) -> StoreResult<()> {
            Ok(())
        }
    }

    struct SlowSettings;

    #[async_trait]
    impl SettingsStore for SlowSettings {
        async fn whatsapp_settings(&self) -> StoreResult<WhatsAppSettings> {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(WhatsAppSettings::default())
        }

        async fn save_whatsapp_settings(&self, _: &WhatsAppSettings) -> StoreResult<()> {
            Ok(())
        }
    }

    struct MapLookup;

    #[async_trait]
    impl ContactLookup for MapLookup {
        async fn lookup(&self, opaque: &[String]) -> Result<HashMap<String, String>, LookupError> {
            Ok(opaque
                .iter()
                .filter(|o| o.as_str() == "99887766554433")
                .map(|o| (o.clone(), "6281399710085@s.whatsapp.net".to_string()))
                .collect())
        }
    }

    fn config(agent_phone: Option<&str>) -> RelaydeskConfig {
        let mut cfg = RelaydeskConfig::default();
        cfg.messaging.agent_phone = agent_phone.map(Into::into);
        cfg.admins.settings_timeout_ms = 50;
        cfg
    }

    #[test]
    fn millis_saturates() {
        assert_eq!(millis(Duration::from_millis(2_500)), 2_500);
        assert_eq!(millis(Duration::MAX), u64::MAX);
    }

    #[tokio::test]
    async fn known_admins_match_after_sanitizing() {
        let auth = AdminAuthorizer::new(&config(None), None, None);
        assert!(auth.is_authorized_admin("6281399710085@s.whatsapp.net").await);
        assert!(auth.is_authorized_admin("6281399710085:12@s.whatsapp.net").await);
        assert!(auth.is_authorized_admin("+62 813-9971-0085").await);
        assert!(!auth.is_authorized_admin("6281111111111@s.whatsapp.net").await);
        assert!(!auth.is_authorized_admin("").await);
    }

    #[tokio::test]
    async fn settings_numbers_are_admins() {
        let store: Arc<dyn SettingsStore> = Arc::new(FixedSettings(Some(WhatsAppSettings {
            main_number: Some("081234567890".into()),
            ..Default::default()
        })));
        let auth = AdminAuthorizer::new(&config(Some("6287700000000")), None, Some(store));
        assert!(auth.is_authorized_admin("6281234567890@s.whatsapp.net").await);
        // Settings present: the static agent phone is not consulted.
        assert!(!auth.is_authorized_admin("6287700000000@s.whatsapp.net").await);
    }

    #[tokio::test]
    async fn falls_back_to_config_when_settings_fail_or_stall() {
        let failing: Arc<dyn SettingsStore> = Arc::new(FixedSettings(None));
        let auth = AdminAuthorizer::new(&config(Some("087700000000")), None, Some(failing));
        assert!(auth.is_authorized_admin("6287700000000@s.whatsapp.net").await);

        let slow: Arc<dyn SettingsStore> = Arc::new(SlowSettings);
        let auth = AdminAuthorizer::new(&config(Some("6287700000000")), None, Some(slow));
        assert!(auth.is_authorized_admin("6287700000000@s.whatsapp.net").await);
    }

    #[tokio::test]
    async fn opaque_ids_are_resolved_first() {
        let dir = tempfile::tempdir().unwrap();
        let cache = Arc::new(IdentityCache::load(dir.path().join("lid.json")).unwrap());
        let resolver = Arc::new(IdentityResolver::new(
            cache,
            Some(Arc::new(MapLookup)),
            ResolverSettings {
                initial_batch_size: 1,
                success_delay: Duration::ZERO,
                failure_delay: Duration::ZERO,
            },
        ));
        let auth = AdminAuthorizer::new(&config(None), Some(resolver), None);
        assert!(auth.is_authorized_admin("99887766554433@lid").await);
        assert!(!auth.is_authorized_admin("11223344556677@lid").await);
    }
}
