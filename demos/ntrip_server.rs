//! NTRIP relay server
//!
//! Relays a serial device (or an upstream TCP feed) to NTRIP subscribers.
//!
//! Run with:
//!   cargo run --example ntrip_server -- --device /dev/ttyUSB0
//!   cargo run --example ntrip_server -- --upstream 192.168.1.20:5000 --bind 0.0.0.0:2101
//!
//! Then pull the stream:
//!   cargo run --example ntrip_client -- --server localhost:2101 --mountpoint RTCM3

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use ntrip_relay::{DeviceSource, NtripServer, ServerConfig};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(version, about, long_about = None)]
struct Args {
    /// Device to read corrections from (serial line configured beforehand)
    #[arg(short, long, conflicts_with = "upstream", required_unless_present = "upstream")]
    device: Option<PathBuf>,

    /// Upstream TCP feed to read corrections from
    #[arg(short, long)]
    upstream: Option<String>,

    /// Address to accept subscribers on
    #[arg(short, long, default_value = "0.0.0.0:2101")]
    bind: SocketAddr,

    /// Only serve this mountpoint (any mountpoint is accepted by default)
    #[arg(short, long)]
    mountpoint: Option<String>,

    /// Require this username (with --password)
    #[arg(long, requires = "password")]
    username: Option<String>,

    /// Require this password (with --username)
    #[arg(long, requires = "username")]
    password: Option<String>,

    /// Per-subscriber write timeout in seconds
    #[arg(long, default_value_t = 5)]
    write_timeout: u64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let args = Args::parse();

    let mut config = ServerConfig::with_addr(args.bind)
        .write_timeout(Duration::from_secs(args.write_timeout));
    if let Some(mountpoint) = args.mountpoint {
        config = config.mountpoint(mountpoint);
    }
    if let (Some(username), Some(password)) = (args.username, args.password) {
        config = config.credentials(username, password);
    }

    let server = match (args.device, args.upstream) {
        (Some(device), _) => NtripServer::start(config, DeviceSource::open(device).await?).await?,
        (None, Some(upstream)) => {
            let source = tokio::net::TcpStream::connect(&upstream).await?;
            tracing::info!(upstream = %upstream, "Connected to upstream feed");
            NtripServer::start(config, source).await?
        }
        (None, None) => anyhow::bail!("either --device or --upstream is required"),
    };

    server.run_until(shutdown_signal()).await?;
    Ok(())
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = term.recv() => {}
                }
            }
            Err(_) => {
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
