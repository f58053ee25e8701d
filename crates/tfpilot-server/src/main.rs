//! tfpilot server binary
//!
//! Hosts the deployment service over HTTP/WebSocket. Configuration comes
//! from an optional YAML file; the bind address and log level can be
//! overridden on the command line.

use anyhow::Result;
use clap::{Parser, Subcommand};
use log::LevelFilter;
use tfpilot_core::{Pilot, PilotConfig};
use tfpilot_server::{shutdown_signal, PilotServer, ServerConfig};

#[derive(Parser, Debug)]
#[clap(author, version, about = "tfpilot - self-service Terraform deployments")]
struct Cli {
    #[clap(subcommand)]
    command: Option<Commands>,

    #[clap(long, short, help = "Path to a YAML configuration file")]
    config: Option<String>,

    #[clap(long, help = "Bind address, overriding the configuration file")]
    bind_addr: Option<String>,

    #[clap(long, short, default_value = "info")]
    log_level: String,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the tfpilot server (default command)
    Run {
        #[clap(long, short, help = "Path to a YAML configuration file")]
        config: Option<String>,

        #[clap(long, help = "Bind address, overriding the configuration file")]
        bind_addr: Option<String>,
    },
    /// List past deployments
    History {
        #[clap(long, short, help = "Path to a YAML configuration file")]
        config: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level_filter = cli.log_level.parse().unwrap_or(LevelFilter::Info);
    env_logger::Builder::new()
        .filter_level(log_level_filter)
        .init();

    match cli.command {
        Some(Commands::Run { config, bind_addr }) => {
            run_server(config.or(cli.config), bind_addr.or(cli.bind_addr)).await
        }
        Some(Commands::History { config }) => show_history(config.or(cli.config)),
        None => run_server(cli.config, cli.bind_addr).await,
    }
}

fn load_config(path: Option<String>) -> Result<PilotConfig> {
    match &path {
        Some(p) => {
            log::info!("Loading configuration from {}", p);
            Ok(PilotConfig::from_file(p)?)
        }
        None => Ok(PilotConfig::default()),
    }
}

async fn run_server(config_path: Option<String>, bind_addr: Option<String>) -> Result<()> {
    let pilot_config = load_config(config_path)?;
    let bind_addr = bind_addr.unwrap_or_else(|| pilot_config.bind_addr.clone());

    let server_config = ServerConfig::default().with_bind_addr_str(&bind_addr)?;
    let pilot = Pilot::from_config(pilot_config)?;

    let server = PilotServer::with_config(pilot, server_config);
    server.serve_with_shutdown(shutdown_signal()).await?;
    Ok(())
}

fn show_history(config_path: Option<String>) -> Result<()> {
    let pilot_config = load_config(config_path)?;
    let pilot = Pilot::from_config(pilot_config)?;

    let records = pilot.history()?;
    if records.is_empty() {
        println!("No deployments recorded.");
        return Ok(());
    }
    for record in records {
        let finished = record
            .finished_at
            .map(|t| t.to_rfc3339())
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{}  {:?}  {}  {}  started {}  finished {}",
            record.id,
            record.status,
            record.action,
            record.repo,
            record.created_at.to_rfc3339(),
            finished
        );
    }
    Ok(())
}
