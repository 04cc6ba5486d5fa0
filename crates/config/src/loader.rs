use std::path::{Path, PathBuf};

use {
    secrecy::Secret,
    tracing::{debug, warn},
};

use crate::{env_subst::substitute_env, schema::RelaydeskConfig};

/// Standard config file names, checked in order.
const CONFIG_FILENAMES: &[&str] = &[
    "relaydesk.toml",
    "relaydesk.yaml",
    "relaydesk.yml",
    "relaydesk.json",
];

/// Load config from the given path (any supported format).
pub fn load_config(path: &Path) -> anyhow::Result<RelaydeskConfig> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("failed to read {}: {e}", path.display()))?;
    let raw = substitute_env(&raw);
    parse_config(&raw, path)
}

/// Discover and load config from standard locations.
///
/// Search order:
/// 1. `./relaydesk.{toml,yaml,yml,json}` (project-local)
/// 2. `~/.config/relaydesk/relaydesk.{toml,yaml,yml,json}` (user-global)
///
/// Returns `RelaydeskConfig::default()` if no config file is found.
pub fn discover_and_load() -> RelaydeskConfig {
    if let Some(path) = find_config_file() {
        debug!(path = %path.display(), "loading config");
        match load_config(&path) {
            Ok(cfg) => return cfg,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "failed to load config, using defaults");
            },
        }
    } else {
        debug!("no config file found, using defaults");
    }
    RelaydeskConfig::default()
}

/// Find the first config file in standard locations.
fn find_config_file() -> Option<PathBuf> {
    for name in CONFIG_FILENAMES {
        let p = PathBuf::from(name);
        if p.exists() {
            return Some(p);
        }
    }

    if let Some(dir) = config_dir() {
        for name in CONFIG_FILENAMES {
            let p = dir.join(name);
            if p.exists() {
                return Some(p);
            }
        }
    }

    None
}

/// Returns the user-global config directory (`~/.config/relaydesk/`).
pub fn config_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", "relaydesk").map(|d| d.config_dir().to_path_buf())
}

/// Returns the data directory holding the database and identity cache.
///
/// Falls back to `./data` when no home directory is available.
pub fn data_dir() -> PathBuf {
    directories::ProjectDirs::from("", "", "relaydesk")
        .map(|d| d.data_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from("data"))
}

/// Overlay the deployment environment variables onto `config`.
pub fn apply_env_overrides(config: &mut RelaydeskConfig) {
    apply_env_overrides_with(config, |name| std::env::var(name).ok());
}

fn apply_env_overrides_with(
    config: &mut RelaydeskConfig,
    lookup: impl Fn(&str) -> Option<String>,
) {
    let get = |name: &str| lookup(name).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

    if let Some(port) = get("PORT") {
        match port.parse() {
            Ok(p) => config.server.port = p,
            Err(e) => warn!(value = %port, error = %e, "ignoring invalid PORT"),
        }
    }
    if let Some(bind) = get("BIND") {
        config.server.bind = bind;
    }
    if let Some(key) = get("API_KEY") {
        config.server.api_key = Some(Secret::new(key));
    }
    if let Some(domains) = get("ALLOWED_DOMAINS") {
        config.server.allowed_origins = domains
            .split(',')
            .map(str::trim)
            .filter(|d| !d.is_empty())
            .map(String::from)
            .collect();
    }
    if let Some(id) = get("WA_BOT_CLIENT_ID") {
        config.messaging.bot_client_id = id;
    }
    if let Some(id) = get("WA_LEADS_CLIENT_ID") {
        config.messaging.leads_client_id = id;
    }
    if let Some(url) = get("WA_SIDECAR_URL") {
        config.messaging.sidecar_url = Some(url);
    }
    if let Some(phone) = get("AGENT_PHONE") {
        config.messaging.agent_phone = Some(phone);
    }
    if let Some(key) = get("GROQ_API_KEY") {
        config.ai.api_key = Some(Secret::new(key));
    }
    if let Some(url) = get("DATABASE_URL") {
        config.database.url = Some(url);
    }
    if let Some(web) = get("WEB_URL") {
        config.monitor.health_url = Some(format!("{}/api/health", web.trim_end_matches('/')));
    }
}

fn parse_config(raw: &str, path: &Path) -> anyhow::Result<RelaydeskConfig> {
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("toml");

    match ext {
        "toml" => Ok(toml::from_str(raw)?),
        "yaml" | "yml" => Ok(serde_yaml::from_str(raw)?),
        "json" => Ok(serde_json::from_str(raw)?),
        _ => anyhow::bail!("unsupported config format: .{ext}"),
    }
}
