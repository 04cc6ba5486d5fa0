mod config_commands;
mod db_commands;

use std::path::{Path, PathBuf};

use {
    clap::{Parser, Subcommand},
    relaydesk_config::RelaydeskConfig,
    tracing::info,
    tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt},
};

#[derive(Parser)]
#[command(name = "relaydesk", about = "Relaydesk business messaging gateway")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Output logs as JSON instead of human-readable.
    #[arg(long, global = true, default_value_t = false)]
    json_logs: bool,

    /// Address to bind to (overrides config value).
    #[arg(long, global = true)]
    bind: Option<String>,
    /// Port to listen on (overrides config and `PORT`).
    #[arg(long, global = true)]
    port: Option<u16>,
    /// Config file to load instead of searching the standard locations.
    #[arg(long, global = true, env = "RELAYDESK_CONFIG")]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the gateway server (default when no subcommand is provided).
    Gateway,
    /// Configuration inspection.
    Config {
        #[command(subcommand)]
        action: config_commands::ConfigAction,
    },
    /// Database management (migrate, clear, reset).
    Db {
        #[command(subcommand)]
        action: db_commands::DbAction,
    },
}

fn init_telemetry(cli: &Cli) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));

    let registry = tracing_subscriber::registry().with(filter);

    if cli.json_logs {
        registry
            .with(fmt::layer().json().with_target(true).with_thread_ids(false))
            .init();
    } else {
        registry
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_thread_ids(false)
                    .with_ansi(true),
            )
            .init();
    }
}

/// Config file (explicit or discovered), then environment, then CLI flags.
fn resolve_config(
    path: Option<&Path>,
    bind: Option<String>,
    port: Option<u16>,
) -> anyhow::Result<RelaydeskConfig> {
    let mut config = match path {
        Some(path) => relaydesk_config::load_config(path)?,
        None => relaydesk_config::discover_and_load(),
    };
    relaydesk_config::apply_env_overrides(&mut config);
    if let Some(bind) = bind {
        config.server.bind = bind;
    }
    if let Some(port) = port {
        config.server.port = port;
    }
    Ok(config)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_telemetry(&cli);

    info!(version = env!("CARGO_PKG_VERSION"), "relaydesk starting");

    let config = resolve_config(cli.config.as_deref(), cli.bind, cli.port)?;
    match cli.command {
        None | Some(Commands::Gateway) => relaydesk_gateway::start_gateway(config).await,
        Some(Commands::Config { action }) => {
            config_commands::handle_config(action, &config, cli.config.as_deref())
        },
        Some(Commands::Db { action }) => db_commands::handle_db(action, &config).await,
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;

    #[test]
    fn flags_override_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("relaydesk.toml");
        std::fs::write(&path, "[server]\nbind = \"127.0.0.1\"\nport = 4000\n").unwrap();

        let config = resolve_config(Some(&path), None, Some(5000)).unwrap();
        assert_eq!(config.server.bind, "127.0.0.1");
        assert_eq!(config.server.port, 5000);

        let config = resolve_config(Some(&path), Some("0.0.0.0".into()), None).unwrap();
        assert_eq!(config.server.bind, "0.0.0.0");
    }

    #[test]
    fn missing_explicit_config_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(resolve_config(Some(&dir.path().join("nope.toml")), None, None).is_err());
    }

    #[test]
    fn cli_parses_subcommands() {
        let cli = Cli::try_parse_from(["relaydesk", "--port", "9000", "db", "migrate"]).unwrap();
        assert_eq!(cli.port, Some(9000));
        assert!(matches!(cli.command, Some(Commands::Db { .. })));

        let cli = Cli::try_parse_from(["relaydesk"]).unwrap();
        assert!(cli.command.is_none());
    }
}
