use crate::config::toml_config::AppConfig;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Clone, Parser)]
#[command(name = "leadpulse")]
#[command(about = "Marketing pulse for a small events business: dashboard server, data collector and proposal analyzer")]
pub struct CliConfig {
    /// Path to TOML configuration file (defaults to ./leadpulse.toml when present)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    pub json_logs: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Prepare the project directory and run the server in the foreground
    Launch {
        /// Override bootstrap.project_dir
        #[arg(long)]
        project_dir: Option<String>,
    },
    /// Run the dashboard HTTP server
    Serve {
        #[arg(long)]
        host: Option<String>,
        #[arg(long)]
        port: Option<u16>,
    },
    /// Pull analytics and CRM data into the daily report
    Collect {
        /// Log per-phase timings and memory use
        #[arg(long)]
        monitor: bool,
    },
    /// Turn the daily report into prioritized proposals
    Analyze {
        /// Log per-phase timings and memory use
        #[arg(long)]
        monitor: bool,
    },
}

impl CliConfig {
    /// Command-line flags take precedence over the file and the environment.
    pub fn apply_overrides(&self, config: &mut AppConfig) {
        match &self.command {
            Command::Launch {
                project_dir: Some(dir),
            } => config.bootstrap.project_dir = dir.clone(),
            Command::Serve { host, port } => {
                if let Some(host) = host {
                    config.server.host = host.clone();
                }
                if let Some(port) = port {
                    config.server.port = *port;
                }
            }
            _ => {}
        }
    }
}
