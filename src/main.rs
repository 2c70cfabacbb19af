//! avogadro-send - push a molecule into a running Avogadro2.
//!
//! Reads molecule text from a file (or stdin with `-`), sends it as a
//! `loadMolecule` request, waits briefly so an error reply can be logged,
//! then disconnects cleanly.

use std::io::Read;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use avogadro_rpc::{RpcChannel, RpcConfig};

/// Methane, sent when no input file is given.
const SAMPLE_XYZ: &str = "5\n\
XYZ file\n\
C      0.00000    0.00000    0.00000\n\
H      0.00000    0.00000    1.08900\n\
H      1.02672    0.00000   -0.36300\n\
H     -0.51336   -0.88916   -0.36300\n\
H     -0.51336    0.88916   -0.36300";

#[derive(Parser)]
#[command(
    name = "avogadro-send",
    version,
    about = "Send a molecule to a running Avogadro2 over its RPC socket"
)]
struct Args {
    /// Molecule file to send ("-" reads stdin). Sends methane if omitted.
    file: Option<PathBuf>,

    /// File format of the molecule, as Avogadro2 names it
    #[arg(short, long, default_value = "xyz")]
    format: String,

    /// Local server name or socket path [env: AVOGADRO_SERVER_NAME]
    #[arg(short, long)]
    server: Option<String>,

    /// Connect timeout in milliseconds [env: AVOGADRO_CONNECT_TIMEOUT_MS]
    #[arg(long)]
    timeout_ms: Option<u64>,

    /// How long to wait for an error reply after sending, in milliseconds
    #[arg(long, default_value_t = 200)]
    wait_ms: u64,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,
}

fn read_content(file: Option<&PathBuf>) -> Result<String> {
    match file {
        None => Ok(SAMPLE_XYZ.to_string()),
        Some(path) if path.as_os_str() == "-" => {
            let mut content = String::new();
            std::io::stdin()
                .read_to_string(&mut content)
                .context("Failed to read molecule from stdin")?;
            Ok(content)
        }
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read molecule from {}", path.display())),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let default_filter = if args.verbose {
        "avogadro_rpc=debug,avogadro_send=debug"
    } else {
        "avogadro_rpc=info,avogadro_send=info"
    };
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| default_filter.into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    let mut config = RpcConfig::from_env();
    if let Some(server) = args.server {
        config = config.with_server_name(server);
    }
    if let Some(ms) = args.timeout_ms {
        config = config.with_connect_timeout(Duration::from_millis(ms));
    }

    let content = read_content(args.file.as_ref())?;

    tracing::info!(
        "Sending {} molecule ({} bytes) to {}",
        args.format,
        content.len(),
        config.socket_path().display()
    );

    let mut channel = RpcChannel::new(&config);
    if !channel.send_molecule_update(&args.format, &content).await {
        bail!("Failed to connect to server: {}", config.server_name);
    }

    // Give Avogadro2 a moment to answer; errors are logged as they arrive
    channel
        .process_events_for(Duration::from_millis(args.wait_ms))
        .await;
    channel.disconnect();

    Ok(())
}
