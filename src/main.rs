//! Record a live console stream and relay it to spectators.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tokio::net::TcpStream;
use tracing_subscriber::EnvFilter;

use slp_relay::status::LogOnlyBackend;
use slp_relay::{FileEvent, RelayConfig, RelayError, RelayService};

#[derive(Parser)]
#[command(name = "slp-relay")]
#[command(about = "Records a live console replay stream and relays it to spectators")]
#[command(version)]
struct Cli {
    /// TOML config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Console address, overriding the config (`host:port`)
    #[arg(short, long, value_name = "HOST:PORT")]
    upstream: Option<String>,

    /// Directory replay files are written to
    #[arg(short, long)]
    output_dir: Option<PathBuf>,
}

impl Cli {
    fn into_config(self) -> slp_relay::error::Result<RelayConfig> {
        let mut config = RelayConfig::load(self.config.as_deref())?;

        if let Some(upstream) = self.upstream {
            let (address, port) = upstream.rsplit_once(':').ok_or_else(|| {
                RelayError::InvalidConfig(format!("upstream '{}' is not host:port", upstream))
            })?;
            config.upstream.port = port.parse().map_err(|_| {
                RelayError::InvalidConfig(format!("upstream port '{}' is invalid", port))
            })?;
            config.upstream.address = address.to_string();
        }
        if let Some(dir) = self.output_dir {
            config.output_dir = dir;
        }
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("slp_relay=info")),
        )
        .init();

    match run(Cli::parse()).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> slp_relay::error::Result<()> {
    let config = cli.into_config()?;
    let upstream_addr = config.upstream_addr();
    let backend = Arc::new(LogOnlyBackend::new(config.status.source_name.clone()));

    let service = RelayService::builder(config)
        .scene_backend(backend)
        .on_file_change(|event| match event {
            FileEvent::RecordingStarted(path) => {
                tracing::info!("New replay file {}", path.display())
            }
            FileEvent::RecordingFinished(path) => {
                tracing::info!("Replay file complete {}", path.display())
            }
        })
        .start()
        .await?;

    tracing::info!("Connecting to console at {}", upstream_addr);
    let upstream = TcpStream::connect(&upstream_addr).await?;
    upstream.set_nodelay(true)?;

    let pumped = tokio::select! {
        result = service.pump(upstream) => result,
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Interrupted, shutting down");
            Ok(())
        }
    };

    let closed = service.shutdown().await;
    pumped.and(closed)
}
