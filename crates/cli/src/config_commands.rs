use std::path::Path;

use {anyhow::Result, clap::Subcommand, relaydesk_config::RelaydeskConfig};

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Print the effective configuration as TOML, with secrets redacted.
    Show,
    /// Load the configuration file and report parse errors.
    Check,
    /// Print where configuration and data are read from.
    Paths,
}

pub fn handle_config(
    action: ConfigAction,
    config: &RelaydeskConfig,
    explicit: Option<&Path>,
) -> Result<()> {
    match action {
        ConfigAction::Show => {
            print!("{}", render(config)?);
            Ok(())
        },
        ConfigAction::Check => check(config, explicit),
        ConfigAction::Paths => {
            match relaydesk_config::config_dir() {
                Some(dir) => println!("config dir: {}", dir.display()),
                None => println!("config dir: (none)"),
            }
            println!("data dir:   {}", relaydesk_config::data_dir().display());
            println!("identity:   {}", config.identity.cache_path.display());
            Ok(())
        },
    }
}

fn render(config: &RelaydeskConfig) -> Result<String> {
    Ok(toml::to_string_pretty(&config.redacted())?)
}

/// Warnings for settings that start but leave a feature disabled.
fn warnings(config: &RelaydeskConfig) -> Vec<&'static str> {
    let mut out = Vec::new();
    if config.server.api_key.is_none() {
        out.push("server.api_key is not set; admin routes are open");
    }
    if config.messaging.sidecar_url.is_none() {
        out.push("messaging.sidecar_url is not set; WhatsApp bridging is disabled");
    }
    if config.ai.api_key.is_none() {
        out.push("ai.api_key is not set; visitors get scripted replies");
    }
    if config.server.allowed_origins.is_empty() {
        out.push("server.allowed_origins is empty; browsers cannot reach the widget routes");
    }
    out
}

fn check(config: &RelaydeskConfig, explicit: Option<&Path>) -> Result<()> {
    match explicit {
        Some(path) => eprintln!("Checked {}\n", path.display()),
        None => eprintln!("Checked discovered configuration\n"),
    }
    let warnings = warnings(config);
    for w in &warnings {
        eprintln!("  warning {w}");
    }
    if warnings.is_empty() {
        eprintln!("No issues found.");
    } else {
        eprintln!("\n{} warning(s)", warnings.len());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;

    fn with_keys() -> RelaydeskConfig {
        let raw = "[server]\napi_key = \"admin-secret\"\nallowed_origins = [\"*\"]\n\
                   [messaging]\nsidecar_url = \"ws://127.0.0.1:3001\"\n\
                   [ai]\napi_key = \"gsk-secret\"\n";
        toml::from_str(raw).unwrap()
    }

    #[test]
    fn show_redacts_secrets() {
        let rendered = render(&with_keys()).unwrap();
        assert!(!rendered.contains("admin-secret"));
        assert!(!rendered.contains("gsk-secret"));
        assert!(rendered.contains("[REDACTED]"));
    }

    #[test]
    fn warns_about_disabled_features() {
        assert!(warnings(&with_keys()).is_empty());
        let defaults = warnings(&RelaydeskConfig::default());
        assert!(defaults.iter().any(|w| w.contains("api_key is not set; admin")));
        assert!(defaults.iter().any(|w| w.contains("sidecar_url")));
    }
}
