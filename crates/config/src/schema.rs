/// Config schema types (server, messaging, sessions, hub, auto-reply, identity, admins, ai, monitor).
use std::{collections::BTreeMap, path::PathBuf, time::Duration};

use {
    secrecy::{ExposeSecret, Secret},
    serde::{Deserialize, Serialize},
};

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RelaydeskConfig {
    pub server: ServerConfig,
    pub messaging: MessagingConfig,
    pub sessions: SessionsConfig,
    pub hub: HubConfig,
    pub auto_reply: AutoReplyConfig,
    pub identity: IdentityConfig,
    pub admins: AdminsConfig,
    pub ai: AiConfig,
    pub database: DatabaseConfig,
    pub monitor: MonitorConfig,
}

/// Gateway server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address to bind to. Defaults to "0.0.0.0".
    pub bind: String,
    pub port: u16,
    /// Admin API key. When unset, admin routes are open.
    #[serde(
        default,
        serialize_with = "serialize_option_secret",
        skip_serializing_if = "Option::is_none"
    )]
    pub api_key: Option<Secret<String>>,
    /// CORS origins for the visitor widget. `*` allows any origin.
    pub allowed_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0".into(),
            port: 3001,
            api_key: None,
            allowed_origins: vec![
                "http://localhost:3000".into(),
                "https://valprointertech.com".into(),
                "https://valprointertech.vercel.app".into(),
            ],
        }
    }
}

/// Messaging network (WhatsApp sidecar) configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MessagingConfig {
    /// Client that handles customer conversations and agent replies.
    pub bot_client_id: String,
    /// Client used for lead collection; its inbound messages are ignored.
    pub leads_client_id: String,
    /// WebSocket URL of the messaging sidecar. `None` disables the bridge.
    pub sidecar_url: Option<String>,
    /// Static agent phone, used when no dynamic setting is stored.
    pub agent_phone: Option<String>,
    /// Sidecar request timeout in milliseconds.
    pub request_timeout_ms: u64,
}

impl Default for MessagingConfig {
    fn default() -> Self {
        Self {
            bot_client_id: "bot".into(),
            leads_client_id: "leads".into(),
            sidecar_url: None,
            agent_phone: None,
            request_timeout_ms: 15_000,
        }
    }
}

impl MessagingConfig {
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionsConfig {
    pub cleanup_interval_secs: u64,
    /// Sessions idle longer than this are closed by the cleanup ticker.
    pub max_idle_secs: u64,
    /// Messages returned by the history endpoint.
    pub history_limit: u32,
    /// Messages handed to the chat engine as conversation context.
    pub context_window: u32,
}

impl Default for SessionsConfig {
    fn default() -> Self {
        Self {
            cleanup_interval_secs: 60,
            max_idle_secs: 360,
            history_limit: 100,
            context_window: 20,
        }
    }
}

impl SessionsConfig {
    #[must_use]
    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cleanup_interval_secs.max(1))
    }

    #[must_use]
    pub fn max_idle(&self) -> Duration {
        Duration::from_secs(self.max_idle_secs)
    }
}

/// Realtime hub limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HubConfig {
    /// Per-connection outbound buffer; events beyond it are dropped.
    pub send_buffer: usize,
    pub ping_interval_secs: u64,
    pub read_timeout_secs: u64,
    pub write_timeout_secs: u64,
    pub max_message_bytes: usize,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            send_buffer: 256,
            ping_interval_secs: 30,
            read_timeout_secs: 60,
            write_timeout_secs: 10,
            max_message_bytes: 512 * 1024,
        }
    }
}

impl HubConfig {
    #[must_use]
    pub fn ping_interval(&self) -> Duration {
        Duration::from_secs(self.ping_interval_secs.max(1))
    }

    #[must_use]
    pub fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.read_timeout_secs.max(1))
    }

    #[must_use]
    pub fn write_timeout(&self) -> Duration {
        Duration::from_secs(self.write_timeout_secs.max(1))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AutoReplyConfig {
    pub enabled: bool,
    pub cooldown_secs: u64,
    /// Replaces the built-in acknowledgment text.
    pub template: Option<String>,
}

impl Default for AutoReplyConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            cooldown_secs: 30 * 60,
            template: None,
        }
    }
}

impl AutoReplyConfig {
    #[must_use]
    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldown_secs)
    }
}

/// Contact identity resolution.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IdentityConfig {
    /// Cache file path. Relative paths resolve against the data directory.
    pub cache_path: PathBuf,
    pub initial_batch_size: usize,
    pub success_delay_ms: u64,
    pub failure_delay_ms: u64,
    /// Upper bound for a single resolution during admin checks.
    pub lookup_timeout_ms: u64,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            cache_path: PathBuf::from("lid_mapping.json"),
            initial_batch_size: 4,
            success_delay_ms: 2_000,
            failure_delay_ms: 1_000,
            lookup_timeout_ms: 5_000,
        }
    }
}

impl IdentityConfig {
    #[must_use]
    pub fn success_delay(&self) -> Duration {
        Duration::from_millis(self.success_delay_ms)
    }

    #[must_use]
    pub fn failure_delay(&self) -> Duration {
        Duration::from_millis(self.failure_delay_ms)
    }

    #[must_use]
    pub fn lookup_timeout(&self) -> Duration {
        Duration::from_millis(self.lookup_timeout_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AdminsConfig {
    /// Phone number → display name of operators always treated as admins.
    pub known: BTreeMap<String, String>,
    /// Bound on the dynamic settings lookup before falling back to config.
    pub settings_timeout_ms: u64,
}

impl Default for AdminsConfig {
    fn default() -> Self {
        let known = [
            ("6281399710085", "Angga Puziana"),
            ("6289518530306", "Ilyasa Meydiansyah"),
            ("6282258115474", "Valpro Intertech (Kantor)"),
            ("6282110100085", "Valpro Intertech (Backup)"),
        ]
        .into_iter()
        .map(|(phone, name)| (phone.to_string(), name.to_string()))
        .collect();
        Self {
            known,
            settings_timeout_ms: 2_000,
        }
    }
}

impl AdminsConfig {
    #[must_use]
    pub fn settings_timeout(&self) -> Duration {
        Duration::from_millis(self.settings_timeout_ms)
    }
}

/// OpenAI-compatible chat completion endpoint used for bot replies.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AiConfig {
    pub base_url: String,
    pub model: String,
    #[serde(
        default,
        serialize_with = "serialize_option_secret",
        skip_serializing_if = "Option::is_none"
    )]
    pub api_key: Option<Secret<String>>,
    pub timeout_secs: u64,
    /// Extra system prompt text prepended to every conversation.
    pub system_prompt: Option<String>,
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.groq.com/openai/v1".into(),
            model: "llama-3.3-70b-versatile".into(),
            api_key: None,
            timeout_secs: 30,
            system_prompt: None,
        }
    }
}

impl AiConfig {
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.max(1))
    }
}

/// Health alerts sent to the agent: messaging connection watch plus an
/// optional HTTP health check.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    pub enabled: bool,
    /// Polled every interval; `None` watches the messaging clients only.
    pub health_url: Option<String>,
    pub interval_secs: u64,
    pub request_timeout_secs: u64,
    /// Health responses slower than this count as slow.
    pub slow_latency_ms: u64,
    /// Consecutive slow checks before an alert.
    pub slow_checks: u32,
    /// How long a target stays down before the first alert.
    pub down_grace_secs: u64,
    /// Messaging clients to watch. Empty means the bot client.
    pub clients: Vec<String>,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            health_url: None,
            interval_secs: 300,
            request_timeout_secs: 10,
            slow_latency_ms: 5_000,
            slow_checks: 3,
            down_grace_secs: 300,
            clients: Vec::new(),
        }
    }
}

impl MonitorConfig {
    #[must_use]
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs.max(1))
    }

    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }

    #[must_use]
    pub fn slow_latency(&self) -> Duration {
        Duration::from_millis(self.slow_latency_ms)
    }

    #[must_use]
    pub fn down_grace(&self) -> Duration {
        Duration::from_secs(self.down_grace_secs)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// sqlx connection URL. Defaults to `relaydesk.db` in the data directory.
    pub url: Option<String>,
}

impl RelaydeskConfig {
    /// Copy of this config with every secret replaced by a placeholder.
    #[must_use]
    pub fn redacted(&self) -> Self {
        let mut cfg = self.clone();
        let mask = |s: &Option<Secret<String>>| {
            s.as_ref().map(|_| Secret::new("[REDACTED]".to_string()))
        };
        cfg.server.api_key = mask(&self.server.api_key);
        cfg.ai.api_key = mask(&self.ai.api_key);
        cfg
    }
}

// ── Serde helpers for Secret<String> ────────────────────────────────────────

fn serialize_option_secret<S: serde::Serializer>(
    secret: &Option<Secret<String>>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    match secret {
        Some(s) => serializer.serialize_some(s.expose_secret()),
        None => serializer.serialize_none(),
    }
}
