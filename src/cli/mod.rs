//! CLI commands for LiveDesk using clap.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;

use crate::config::{load_settings, Settings};
use crate::web::run_web_server;

/// LiveDesk - single-agent live chat desk.
#[derive(Parser)]
#[command(name = "livedesk")]
#[command(version)]
#[command(about = "LiveDesk - pairs waiting customers with the on-duty agent", long_about = None)]
pub struct Commands {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Run the chat server
    Serve {
        #[command(flatten)]
        config: ConfigArg,

        /// Address to bind
        #[arg(long, env = "LIVEDESK_HOST")]
        host: Option<String>,

        /// Port to listen on
        #[arg(long, short, env = "LIVEDESK_PORT")]
        port: Option<u16>,
    },

    /// Print the effective settings as JSON
    Config {
        #[command(flatten)]
        config: ConfigArg,
    },
}

#[derive(Args, Debug, Clone)]
pub struct ConfigArg {
    /// Settings file (defaults to ~/.livedesk/settings.json)
    #[arg(long, env = "LIVEDESK_CONFIG")]
    pub config: Option<PathBuf>,
}

impl ConfigArg {
    fn load(&self) -> Result<Settings> {
        load_settings(self.config.as_deref()).context("Failed to load settings")
    }
}

impl Commands {
    /// Run the command.
    pub async fn run(&self) -> Result<()> {
        match &self.command {
            Command::Serve { config, host, port } => {
                cmd_serve(config, host.as_deref(), *port).await
            }
            Command::Config { config } => cmd_config(config),
        }
    }
}

// Command implementations

async fn cmd_serve(config: &ConfigArg, host: Option<&str>, port: Option<u16>) -> Result<()> {
    let settings = apply_overrides(config.load()?, host, port);

    println!(
        "LiveDesk serving on {}:{}",
        settings.server.host, settings.server.port
    );
    println!("  ws://{}:{}/ws?role=customer", settings.server.host, settings.server.port);
    println!("  ws://{}:{}/ws?role=agent", settings.server.host, settings.server.port);
    println!();
    println!("Press Ctrl+C to stop");

    let shutdown = CancellationToken::new();
    let trigger = shutdown.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Could not listen for Ctrl+C: {}", e);
            return;
        }
        tracing::info!("Shutdown requested");
        trigger.cancel();
    });

    run_web_server(&settings, shutdown)
        .await
        .context("Web server error")
}

fn cmd_config(config: &ConfigArg) -> Result<()> {
    let settings = config.load()?;
    println!("{}", serde_json::to_string_pretty(&settings)?);
    Ok(())
}

fn apply_overrides(mut settings: Settings, host: Option<&str>, port: Option<u16>) -> Settings {
    if let Some(host) = host {
        settings.server.host = host.to_string();
    }
    if let Some(port) = port {
        settings.server.port = port;
    }
    settings
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_serve() {
        let cli = Commands::try_parse_from([
            "livedesk", "serve", "--host", "127.0.0.1", "--port", "9000",
        ])
        .unwrap();

        match cli.command {
            Command::Serve { config, host, port } => {
                assert_eq!(host.as_deref(), Some("127.0.0.1"));
                assert_eq!(port, Some(9000));
                assert!(config.config.is_none());
            }
            _ => panic!("expected serve"),
        }
    }

    #[test]
    fn test_parse_config_path() {
        let cli = Commands::try_parse_from(["livedesk", "config", "--config", "/tmp/desk.json"])
            .unwrap();

        match cli.command {
            Command::Config { config } => {
                assert_eq!(config.config, Some(PathBuf::from("/tmp/desk.json")));
            }
            _ => panic!("expected config"),
        }
    }

    #[test]
    fn test_overrides_win_over_settings() {
        let settings = apply_overrides(Settings::default(), Some("127.0.0.1"), None);
        assert_eq!(settings.server.host, "127.0.0.1");
        assert_eq!(settings.server.port, 8000);

        let settings = apply_overrides(settings, None, Some(9001));
        assert_eq!(settings.server.port, 9001);
    }
}
