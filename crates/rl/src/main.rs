use clap::{Parser, Subcommand};
use rl_agent::Orchestrator;
use rl_core::config::Settings;
use rl_events::bus::EventBus;
use rl_platform::{AzureClient, OpenAiAnalyzer};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::Path;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "rl", about = "Automated PR review service for Azure DevOps")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the webhook sink, admin surface and review workers.
    Serve,
    /// Print the OpenAPI document and exit.
    Openapi,
}

#[tokio::main]
async fn main() {
    init_tracing();

    let cli = Cli::parse();
    match cli.command {
        Command::Serve => serve().await,
        Command::Openapi => {
            println!("{}", rl_serve::openapi::generate_spec());
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);
    if std::env::var("RL_LOG_FORMAT").as_deref() == Ok("text") {
        registry.with(fmt::layer()).init();
    } else {
        registry.with(fmt::layer().json()).init();
    }
}

async fn serve() {
    let settings = match Settings::from_env() {
        Ok(settings) => Arc::new(settings),
        Err(err) => {
            eprintln!("configuration error: {err}");
            std::process::exit(1);
        }
    };
    if let Some(parent) = Path::new(&settings.db_path).parent() {
        let _ = std::fs::create_dir_all(parent);
    }

    let platform = match AzureClient::new(
        &settings.organization,
        &settings.pat,
        settings.platform_timeout,
    ) {
        Ok(client) => Arc::new(client),
        Err(err) => {
            eprintln!("platform client error: {err}");
            std::process::exit(1);
        }
    };
    let analyzer = match OpenAiAnalyzer::new(settings.analyzer.clone()) {
        Ok(analyzer) => Arc::new(analyzer),
        Err(err) => {
            eprintln!("analyzer client error: {err}");
            std::process::exit(1);
        }
    };

    let event_bus = EventBus::new(1024);
    let orchestrator = Arc::new(Orchestrator::new(
        settings.clone(),
        event_bus.clone(),
        platform.clone(),
        analyzer,
    ));
    match orchestrator.recover() {
        Ok(0) => {}
        Ok(recovered) => tracing::warn!(recovered, "expired agents recovered at boot"),
        Err(err) => tracing::error!(error = %err, "boot recovery failed"),
    }

    let shutdown = CancellationToken::new();
    let orchestrator_task = {
        let shutdown = shutdown.clone();
        let orchestrator = orchestrator.clone();
        tokio::spawn(async move { orchestrator.run(shutdown).await })
    };

    let state = rl_serve::AppState {
        settings: settings.clone(),
        event_bus,
        platform,
    };
    let addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), settings.port);

    tokio::select! {
        result = rl_serve::serve(state, addr) => {
            if let Err(err) = result {
                tracing::error!(error = %err, "http surface exited");
            }
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("shutdown signal received");
        }
    }

    shutdown.cancel();
    let _ = orchestrator_task.await;
}
