//! Warden gateway binary.
//!
//! Serves sessions until interrupted, echoing application frames back to
//! their sender.

use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use warden_gateway::{Cli, EchoHandler, Gateway};

#[tokio::main]
async fn main() -> ExitCode {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "Gateway failed");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = cli.to_config();
    info!(addr = %config.bind_addr, "Starting warden gateway");

    let gateway = Arc::new(Gateway::new(config, Arc::new(EchoHandler))?);
    let listener = gateway.bind().await?;
    let mut server = tokio::spawn(Arc::clone(&gateway).serve(listener));

    tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            signal?;
            info!("Interrupt received");
            gateway.shutdown();
            server.await??;
        }
        result = &mut server => result??,
    }
    Ok(())
}
