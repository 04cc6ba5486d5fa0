//! Configuration loading and env substitution.
//!
//! Config files: `relaydesk.toml`, `relaydesk.yaml`, or `relaydesk.json`
//! Searched in `./` then `~/.config/relaydesk/`.
//!
//! Supports `${ENV_VAR}` substitution in all string values, plus the
//! deployment environment overrides applied by [`apply_env_overrides`].

pub mod env_subst;
pub mod loader;
pub mod schema;

pub use {
    loader::{apply_env_overrides, config_dir, data_dir, discover_and_load, load_config},
    schema::{
        AdminsConfig, AiConfig, AutoReplyConfig, DatabaseConfig, HubConfig, IdentityConfig,
        MessagingConfig, MonitorConfig, RelaydeskConfig, ServerConfig, SessionsConfig,
    },
};
