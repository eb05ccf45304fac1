//! Mock Stratum Server
//!
//! Serves synthetic jobs to XMRig and Stratum v1 miners until interrupted.

use clap::Parser;
use mock_stratum_server::{
    VERSION,
    config::{Args, ServerConfig},
    error::Result,
    stratum::{ALGORITHM, DIFFICULTY, PoolServer},
    utils::init_logging,
};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = ServerConfig::from_args(&args)?;

    if args.print_config {
        print!("{}", config.to_yaml()?);
        return Ok(());
    }

    init_logging(&args.log_level, args.log_format);

    info!("Starting mock stratum server v{}", VERSION);
    info!(
        "Port: {}, algo: {}, difficulty: {}, protocols: XMRig (login) + Stratum v1",
        config.port, ALGORITHM, DIFFICULTY
    );

    let server = PoolServer::bind(config).await?;

    let shutdown = CancellationToken::new();
    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Interrupt received");
                signal_token.cancel();
            }
            Err(e) => error!("Failed to listen for interrupt: {}", e),
        }
    });

    info!("Waiting for miners...");
    let stats = server.run(shutdown).await?;

    info!(
        "Shutting down. Shares: accepted={}, rejected={}",
        stats.shares_accepted, stats.shares_rejected
    );

    Ok(())
}
