#![allow(clippy::must_use_candidate, clippy::missing_errors_doc)]

mod args;
mod ask;

use args::{Args, Command};
use chorus_config::Config;
use chorus_server::Server;
use clap::Parser;
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let config = load_config(&args)?;
    let _telemetry_guard = chorus_telemetry::init(config.telemetry.as_ref(), &args.log)?;

    match args.command {
        Command::Serve { listen } => serve(config, listen).await,
        Command::Ask(ask) => ask::run(config, ask).await,
    }
}

/// A missing file at the default location means "no config"
fn load_config(args: &Args) -> anyhow::Result<Config> {
    if args.config.exists() {
        return Config::load(&args.config);
    }

    if std::env::var_os("CHORUS_CONFIG").is_some() || args.config.as_os_str() != "chorus.toml" {
        anyhow::bail!("config file {} does not exist", args.config.display());
    }

    Ok(Config::default())
}

async fn serve(config: Config, listen: Option<std::net::SocketAddr>) -> anyhow::Result<()> {
    let mut server = Server::new(&config)?;
    if let Some(listen) = listen {
        server = server.with_listen_address(listen);
    }

    tracing::info!(relay_path = %config.server.relay_path, "starting chorus relay");

    let shutdown = CancellationToken::new();
    let shutdown_clone = shutdown.clone();

    tokio::spawn(async move {
        shutdown_signal().await;
        shutdown_clone.cancel();
    });

    server.serve(shutdown).await?;

    tracing::info!("chorus stopped");
    Ok(())
}

/// Wait for a shutdown signal (`SIGINT` or `SIGTERM`)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }

    tracing::info!("shutdown signal received");
}
