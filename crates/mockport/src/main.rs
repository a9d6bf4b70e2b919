use anyhow::Context;
use clap::Parser;
use mockport::{config, shutdown_signal, ConfigError, Runtime};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Serve configurable HTTP mock servers
#[derive(Parser, Debug)]
#[command(name = "mockport")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration document (YAML or JSON)
    #[arg(short, long, env = "MOCKPORT_CONFIG")]
    config: PathBuf,

    /// Validate the configuration and exit
    #[arg(long)]
    check: bool,

    /// Override the management API port from the configuration
    #[arg(short, long, env = "MOCKPORT_MANAGEMENT_PORT")]
    management_port: Option<u16>,

    /// Log filter, e.g. `info` or `mockport=debug`
    #[arg(long, env = "MOCKPORT_LOG", default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_new(&args.log_level).unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    if args.check {
        return check(&args);
    }

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn check(args: &Args) -> ExitCode {
    match config::check(&args.config) {
        Ok(_) => {
            println!("Config is valid");
            ExitCode::SUCCESS
        }
        Err(ConfigError::Invalid(errors)) => {
            println!("Config is not valid. See errors below:");
            for e in errors {
                println!("- {e}");
            }
            ExitCode::FAILURE
        }
        Err(e) => {
            println!("Config is not valid. See errors below:");
            println!("- {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> anyhow::Result<()> {
    let mut runtime_config = config::load(&args.config)
        .with_context(|| format!("failed to load {}", args.config.display()))?;
    if let Some(port) = args.management_port {
        runtime_config.management.port = port;
    }

    let summary = Runtime::new(runtime_config)
        .run_until(shutdown_signal())
        .await?;

    info!(
        "Stopped {} listener(s) after {} recorded request(s)",
        summary.listeners.len(),
        summary.records_applied
    );
    Ok(())
}
