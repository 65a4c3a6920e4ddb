//! NTRIP client
//!
//! Pulls a mountpoint into a timestamped file, optionally echoing the raw
//! stream to stdout for a downstream consumer.
//!
//! Run with:
//!   cargo run --example ntrip_client -- --server localhost:2101 --mountpoint RTCM3
//!   cargo run --example ntrip_client -- --username alice --password secret --stdout | xxd

use clap::Parser;
use ntrip_relay::{ClientConfig, NtripClient, RelaySink};
use tokio::io::AsyncWriteExt;
use tokio::sync::broadcast::error::RecvError;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(version, about, long_about = None)]
struct Args {
    /// NTRIP server address
    #[arg(short, long, default_value = "localhost:2101")]
    server: String,

    /// NTRIP mountpoint
    #[arg(short, long, default_value = "RTCM3")]
    mountpoint: String,

    /// NTRIP username
    #[arg(short, long, default_value = "")]
    username: String,

    /// NTRIP password
    #[arg(short, long, default_value = "")]
    password: String,

    /// Output file for received data (a timestamp is appended)
    #[arg(short, long, default_value = "rtcm_data.bin")]
    output: String,

    /// Also write the raw stream to stdout
    #[arg(long)]
    stdout: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Logs go to stderr so stdout can carry the stream
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let args = Args::parse();

    let config = ClientConfig::new(args.server)
        .mountpoint(args.mountpoint)
        .credentials(args.username, args.password)
        .output(args.output);
    let client = NtripClient::new(config);

    let session = client.connect().await?;

    let output = client.config().timestamped_output();
    let mut sink = RelaySink::create(&output).await?;

    let echo = args.stdout.then(|| {
        let mut mirror = sink.subscribe();
        tokio::spawn(async move {
            let mut stdout = tokio::io::stdout();
            loop {
                match mirror.recv().await {
                    Ok(chunk) => {
                        if stdout.write_all(&chunk).await.is_err() || stdout.flush().await.is_err() {
                            break;
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "stdout fell behind, chunks skipped");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        })
    });

    let stats = session
        .relay_into(&mut sink, async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;

    // Closing the mirror lets the echo task drain what is left and exit
    let bytes_written = sink.bytes_written();
    drop(sink);
    if let Some(echo) = echo {
        echo.await?;
    }

    tracing::info!(
        output = %output.display(),
        bytes = stats.bytes_received,
        written = bytes_written,
        bitrate = stats.bitrate(),
        "Done"
    );
    Ok(())
}
