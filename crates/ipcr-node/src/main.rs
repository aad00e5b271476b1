use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;

use ipcr_node::{Node, NodeConfig, NodeError};

#[derive(Parser)]
#[command(name = "ipcr-node", about = "Inter-processor message router daemon")]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "/etc/ipcr/config.toml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match NodeConfig::load(&cli.config) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("failed to load config from {}: {e}", cli.config.display());
            return ExitCode::FAILURE;
        }
    };

    if std::env::var("RUST_LOG_FORMAT").as_deref() == Ok("json") {
        ipcr_node::logging::init_json(&config.logging.level);
    } else {
        ipcr_node::logging::init(&config.logging.level);
    }

    match serve(config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "router exited");
            ExitCode::FAILURE
        }
    }
}

/// Run the router until SIGINT, tearing every link down on the way out.
async fn serve(config: NodeConfig) -> Result<(), NodeError> {
    let mut node = Node::new(config)?;

    if let Err(e) = node.start().await {
        node.shutdown().await;
        return Err(e);
    }

    let signal = tokio::select! {
        () = node.run() => Ok(()),
        signal = tokio::signal::ctrl_c() => {
            tracing::info!("received SIGINT, shutting down");
            signal
        }
    };
    node.shutdown().await;
    signal.map_err(NodeError::from)
}
