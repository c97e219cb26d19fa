use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use tokio::net::TcpListener;
use tracing::{error, info};

use relhost_observe::{capture_local_offset, init_logger};

mod config;
mod wire;

use config::HostConfig;

/// Host that serves application releases from on-demand worker processes.
#[derive(Debug, Parser)]
#[command(name = "relhost-hostd", version)]
struct Args {
    /// TOML configuration file; built-in defaults when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Validate the configuration and exit.
    #[arg(long)]
    check: bool,
}

fn main() -> anyhow::Result<()> {
    // 1) configuration
    dotenvy::dotenv().ok();
    let args = Args::parse();
    let cfg = HostConfig::load(args.config.as_deref())?;

    // 2) logger; the local offset can only be read while single-threaded
    capture_local_offset();
    init_logger(&cfg.log)?;
    if args.check {
        info!("configuration is valid");
        return Ok(());
    }

    // 3) runtime
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("building tokio runtime")?;
    runtime.block_on(serve(cfg))
}

async fn serve(cfg: HostConfig) -> anyhow::Result<()> {
    let host = wire::build(&cfg).await?;

    let listener = TcpListener::bind(&cfg.server.listen)
        .await
        .with_context(|| format!("binding {}", cfg.server.listen))?;
    info!(addr = %listener.local_addr()?, prefix = %cfg.server.release_prefix, "listening");

    axum::serve(listener, host.router)
        .with_graceful_shutdown(wait_for_shutdown())
        .await
        .context("http server")?;

    info!("http server stopped; terminating workers");
    host.supervisor.shutdown().await;
    info!("shutdown complete");
    Ok(())
}

async fn wait_for_shutdown() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received ctrl-c"),
        _ = terminate => info!("received SIGTERM"),
    }
}
