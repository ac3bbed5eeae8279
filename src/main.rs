//! Line-oriented TCP Chat Server - Entry Point
//!
//! Parses command line options, starts the ChatServer and stops it on Ctrl-C.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use line_chat::config::{DEFAULT_IDLE_TIMEOUT, DEFAULT_PORT, DEFAULT_REAP_INTERVAL};
use line_chat::{ChatServer, ServerConfig};

/// TCP chat server
#[derive(Parser, Debug)]
#[command(name = "line_chat", version, about, long_about = None)]
struct Cli {
    /// Interface to listen on
    #[arg(long, default_value_t = IpAddr::V4(Ipv4Addr::UNSPECIFIED))]
    host: IpAddr,

    /// Port to listen on
    #[arg(short, long, env = "PORT", default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Seconds of silence before a client is disconnected
    #[arg(short = 't', long, default_value_t = DEFAULT_IDLE_TIMEOUT.as_secs())]
    idle_timeout: u64,

    /// Seconds between idle scans
    #[arg(
        long,
        default_value_t = DEFAULT_REAP_INTERVAL.as_secs(),
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    reap_interval: u64,
}

impl Cli {
    fn server_config(&self) -> ServerConfig {
        ServerConfig::new(SocketAddr::new(self.host, self.port).to_string())
            .with_idle_timeout(Duration::from_secs(self.idle_timeout))
            .with_reap_interval(Duration::from_secs(self.reap_interval))
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Use RUST_LOG env var to control log level
    // e.g., RUST_LOG=debug or RUST_LOG=line_chat=trace
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("line_chat=info")),
        )
        .init();

    let cli = Cli::parse();

    let config = cli.server_config();

    // Bind failure is fatal and aborts startup
    let server = match ChatServer::bind(config.clone()).await {
        Ok(server) => server,
        Err(e) => {
            error!("Failed to start on {}: {}", config.bind_addr, e);
            std::process::exit(1);
        }
    };

    let shutdown = server.shutdown_token();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Received interrupt signal");
                shutdown.cancel();
            }
            Err(e) => error!("Unable to listen for Ctrl-C: {}", e),
        }
    });

    server.run().await?;
    Ok(())
}
