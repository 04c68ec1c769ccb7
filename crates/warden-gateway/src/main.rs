//! The `wardend` daemon binary.
//!
//! Exit codes: 0 normal shutdown, 2 config error (unreadable template
//! directory, port in use, invalid settings), 3 storage error.

use clap::Parser;
use std::process::ExitCode;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use warden_gateway::cli::{Cli, Command, ConfigCommand};
use warden_gateway::{BootError, ConfigSeverity, WardenConfig, api, build_app_state, spawn_background_tasks};

const EXIT_CONFIG: u8 = 2;
const EXIT_STORAGE: u8 = 3;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match WardenConfig::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(message) => {
            eprintln!("wardend: {message}");
            return ExitCode::from(EXIT_CONFIG);
        },
    };

    match cli.command {
        None | Some(Command::Serve) => {
            init_tracing();
            serve(Arc::new(config)).await
        },
        Some(Command::Config(ConfigCommand::Validate)) => validate(&config),
        Some(Command::Config(ConfigCommand::Show)) => {
            match toml::to_string_pretty(&config) {
                Ok(text) => {
                    println!("{text}");
                    ExitCode::SUCCESS
                },
                Err(e) => {
                    eprintln!("wardend: cannot render config: {e}");
                    ExitCode::from(EXIT_CONFIG)
                },
            }
        },
        Some(Command::Version) => {
            println!("wardend {}", env!("CARGO_PKG_VERSION"));
            ExitCode::SUCCESS
        },
    }
}

/// Structured logging; `WARDEN_LOG` overrides the filter.
fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env("WARDEN_LOG")
                .unwrap_or_else(|_| EnvFilter::new("info,warden_gateway=debug")),
        )
        .init();
}

fn validate(config: &WardenConfig) -> ExitCode {
    let issues = config.validate();
    for issue in &issues {
        let label = match issue.severity {
            ConfigSeverity::Warning => "warning",
            ConfigSeverity::Error => "error",
        };
        println!("{label}: {issue}");
    }
    if issues.iter().any(|i| i.severity == ConfigSeverity::Error) {
        ExitCode::from(EXIT_CONFIG)
    } else {
        println!("configuration ok");
        ExitCode::SUCCESS
    }
}

async fn serve(config: Arc<WardenConfig>) -> ExitCode {
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "warden starting");

    let (state, webhook_rx) = match build_app_state(Arc::clone(&config)).await {
        Ok(built) => built,
        Err(e @ BootError::Config(_)) => {
            tracing::error!("{e}");
            return ExitCode::from(EXIT_CONFIG);
        },
        Err(e @ BootError::Storage(_)) => {
            tracing::error!("{e}");
            return ExitCode::from(EXIT_STORAGE);
        },
    };

    let tasks = spawn_background_tasks(&state, webhook_rx);

    let listener = match tokio::net::TcpListener::bind(&config.server.listen).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!(listen = %config.server.listen, error = %e, "cannot bind");
            return ExitCode::from(EXIT_CONFIG);
        },
    };
    tracing::info!(listen = %config.server.listen, "warden listening");

    let app = api::router(state);
    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await;

    for task in tasks {
        task.abort();
    }

    if let Err(e) = served {
        tracing::error!(error = %e, "server error");
        return ExitCode::from(EXIT_STORAGE);
    }
    tracing::info!("warden stopped");
    ExitCode::SUCCESS
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_err() {
        tracing::warn!("cannot listen for ctrl-c; running until killed");
        std::future::pending::<()>().await;
    }
}
