//! Nodestrap Agent
//!
//! Runs on the node itself:
//! - bootstrap: turns the node config into a plan, applies it, records completion
//! - info: prints configured and installed versions
//! - probe: waits for the health probes of a written plan
//! - retry: runs a command until it succeeds

mod cli;
mod duration;

use clap::Parser;
use cli::Cli;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // kube and reqwest both use rustls; pick one provider for the process.
    if rustls::crypto::ring::default_provider().install_default().is_err() {
        error!("Failed to install rustls crypto provider");
    }

    let cancel = CancellationToken::new();
    tokio::spawn(cancel_on_signal(cancel.clone()));

    if let Err(e) = cli.run(cancel).await {
        error!("{:#}", e);
        std::process::exit(1);
    }
}

async fn cancel_on_signal(cancel: CancellationToken) {
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            if let Err(e) = result {
                error!("Failed to listen for Ctrl-C: {}", e);
                return;
            }
        }
        () = terminate => {}
    }

    info!("Shutdown signal received, cancelling");
    cancel.cancel();
}
