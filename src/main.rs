//! HTTP Stub Kit - serve a YAML stub fixture over HTTP

use anyhow::Result;
use clap::Parser;
use http_stub_kit::{StubFile, StubRegistry, StubServer};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(
    name = "http-stub-kit",
    about = "Serve canned HTTP responses from a YAML stub fixture",
    version
)]
struct Args {
    /// Path to the stub fixture
    #[arg(short, long, default_value = "stubs.yaml")]
    config: PathBuf,

    /// Address to listen on
    #[arg(short, long, default_value = "127.0.0.1:8080")]
    bind: SocketAddr,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short = 'L', long, default_value = "info")]
    log_level: Level,

    /// Print an example fixture and exit
    #[arg(long)]
    print_config: bool,

    /// Validate the fixture and exit
    #[arg(long)]
    validate: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let subscriber = FmtSubscriber::builder()
        .with_max_level(args.log_level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    if args.print_config {
        print!("{}", include_str!("../fixtures/default-stubs.yaml"));
        return Ok(());
    }

    let fixture = if args.config.exists() {
        info!(path = ?args.config, "Loading stub fixture");
        StubFile::from_file(&args.config)?
    } else if args.validate {
        anyhow::bail!("Stub fixture not found: {:?}", args.config);
    } else {
        info!("Using empty fixture (no stubs)");
        StubFile::default()
    };

    if args.validate {
        println!("Fixture is valid ({} stubs defined)", fixture.stubs.len());
        return Ok(());
    }

    let registry = Arc::new(StubRegistry::new());
    let ids = fixture.install(&registry)?;

    let server = StubServer::builder(registry)
        .settings(fixture.settings.clone())
        .fallback(fixture.fallback_response()?)
        .bind(args.bind)
        .start()
        .await?;

    info!(uri = %server.uri(), stubs = ids.len(), "Serving stubs, press Ctrl-C to stop");
    tokio::signal::ctrl_c().await?;
    info!("Shutting down");

    Ok(())
}
