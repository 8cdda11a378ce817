//! dmrelay CLI and REST API entry point.
//!
//! Binary name: `dmrelay`
//!
//! Parses CLI arguments, opens the database, then dispatches to the
//! requested command or starts the REST API server.

mod cli;
mod http;
mod state;

use std::time::Duration;

use clap::Parser;
use clap_complete::generate;
use dmrelay_core::sync::spawn_periodic_reload;
use dmrelay_observe::tracing_setup::{init_quiet, init_tracing, shutdown_tracing, LogFormat};
use tokio_util::sync::CancellationToken;

use cli::{Cli, Commands};
use state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let format = if cli.log_json { LogFormat::Json } else { LogFormat::Pretty };
    let init = if cli.quiet {
        init_quiet(format)
    } else {
        init_tracing(cli.verbose, format, cli.otel)
    };
    if let Err(e) = init {
        eprintln!("Warning: failed to initialize logging: {e}");
    }

    // Shell completions don't need app state
    if let Commands::Completions { shell } = &cli.command {
        let mut cmd = <Cli as clap::CommandFactory>::command();
        generate(*shell, &mut cmd, "dmrelay", &mut std::io::stdout());
        return Ok(());
    }

    let state = AppState::init().await?;

    let result = match cli.command {
        Commands::Serve { port, host } => serve(state, host, port).await,
        Commands::Reload => cli::maintenance::reload(&state, cli.json).await,
        Commands::Repair => cli::maintenance::repair(&state, cli.json).await,
        Commands::Import { file } => cli::maintenance::import(&state, &file, cli.json).await,
        Commands::List => cli::conversation::list_conversations(&state, cli.json).await,
        Commands::Show { user_id } => {
            cli::conversation::show_conversation(&state, &user_id, cli.json).await
        }
        Commands::Completions { .. } => Ok(()),
    };

    shutdown_tracing();
    result
}

async fn serve(state: AppState, host: Option<String>, port: Option<u16>) -> anyhow::Result<()> {
    tracing::info!(data_dir = %state.data_dir.display(), "starting relay");

    // A failed startup load is not fatal; the cache fills as messages arrive.
    match state.sync.reload().await {
        Ok(report) => tracing::info!(
            conversations = report.conversations,
            messages = report.messages,
            "initial load complete"
        ),
        Err(e) => tracing::error!(error = %e, "initial load failed; starting with an empty cache"),
    }

    let cancel = CancellationToken::new();
    let reloader = (state.config.reload_interval_seconds > 0).then(|| {
        spawn_periodic_reload(
            state.sync.clone(),
            Duration::from_secs(state.config.reload_interval_seconds),
            cancel.clone(),
        )
    });

    let host = host.unwrap_or_else(|| state.config.host.clone());
    let port = port.unwrap_or(state.config.port);
    let addr = format!("{host}:{port}");
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    println!(
        "  {} dmrelay listening on {}",
        console::style("⚡").bold(),
        console::style(format!("http://{addr}")).cyan()
    );
    if state.auth.is_required() {
        println!("  {}", console::style("Operator token required").dim());
    }
    println!("  {}", console::style("Press Ctrl+C to stop").dim());

    let sync = state.sync.clone();
    let router = http::router::build_router(state);

    let stop = cancel.clone();
    let shutdown_sync = sync.clone();
    axum::serve(listener, router)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            stop.cancel();
            // Ends every open event stream so graceful shutdown can finish.
            shutdown_sync.broadcaster().shutdown();
        })
        .await?;

    cancel.cancel();
    if let Some(handle) = reloader {
        let _ = handle.await;
    }
    sync.gateway().pool().close().await;

    println!("\n  Server stopped.");
    Ok(())
}

/// Wait for Ctrl+C or SIGTERM for graceful shutdown.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %e, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
