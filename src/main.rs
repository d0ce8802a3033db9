//! Diagnosis crew service - main entry point

use diagnosis_crew::api::{self, ApiState};
use diagnosis_crew::config::ServiceConfig;
use diagnosis_crew::crew::LlmCrewFactory;
use diagnosis_crew::error::{ServiceError, ServiceResult};
use diagnosis_crew::llm::provider::LlmProvider;
use diagnosis_crew::llm::providers::OpenAiProvider;
use diagnosis_crew::observability::{init_default_logging, init_logging, LogFormat};
use diagnosis_crew::tasks::{RunOrchestrator, TaskRegistry};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info, Level};

/// Background-task HTTP API for the diagnosis crew
#[derive(Parser)]
#[command(name = "diagnosis-crew")]
#[command(about = "Background-task HTTP API for a sequential diagnosis crew")]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, value_name = "FILE", env = "DIAGNOSIS_CONFIG")]
    config: Option<PathBuf>,

    /// Verbose logging (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP service
    Serve,
    /// Validate configuration
    Config {
        /// Print the effective configuration
        #[arg(long)]
        show: bool,
    },
}

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    match cli.verbose {
        0 => init_default_logging(),
        n => {
            let level = if n == 1 { Level::DEBUG } else { Level::TRACE };
            let format = LogFormat::parse(&std::env::var("LOG_FORMAT").unwrap_or_default());
            init_logging(level, format, false);
        }
    }

    info!(
        "Starting diagnosis crew service v{}",
        env!("CARGO_PKG_VERSION")
    );

    let config = match ServiceConfig::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            process::exit(1);
        }
    };

    let result = match cli.command {
        Commands::Serve => run_service(config).await,
        Commands::Config { show } => handle_config_command(&config, show),
    };

    if let Err(e) = result {
        error!("Command failed: {}", e);
        process::exit(1);
    }

    info!("Application shutdown complete");
}

async fn run_service(config: ServiceConfig) -> ServiceResult<()> {
    let token = config.get_auth_token()?;
    let cors_origin = config.cors_origin()?;
    let addr = config.bind_addr()?;

    let provider: Arc<dyn LlmProvider> = Arc::new(OpenAiProvider::new(config.openai_config()?)?);
    let factory = LlmCrewFactory::new(
        config.crew_definition(),
        provider.clone(),
        config.crew_settings(),
    )?;

    let registry = TaskRegistry::new();
    let orchestrator = RunOrchestrator::new(registry, Arc::new(factory));
    let state = ApiState::new(orchestrator, token).with_llm(provider);

    info!(
        model = %config.llm.model,
        steps = config.crew_definition().tasks.len(),
        "Crew configured"
    );

    api::serve(state, addr, &cors_origin, shutdown_signal()).await
}

/// Resolve on SIGINT or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for SIGINT: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received SIGINT, shutting down gracefully..."),
        _ = terminate => info!("Received SIGTERM, shutting down gracefully..."),
    }
}

fn handle_config_command(config: &ServiceConfig, show: bool) -> ServiceResult<()> {
    config.validate()?;
    info!("Configuration is valid");

    if show {
        let rendered = toml::to_string_pretty(config)
            .map_err(|e| ServiceError::internal(format!("failed to render config: {e}")))?;
        println!("{rendered}");
    }

    Ok(())
}
