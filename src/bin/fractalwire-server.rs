use anyhow::{Context, Result};
use clap::Parser;
use fractalwire::compute::ComputeMode;
use fractalwire::report::{write_stdout_json, ReportLine};
use fractalwire::server::{Server, DEFAULT_MAX_TILE_PIXELS};
use fractalwire::transport;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(
    name = "fractalwire-server",
    version,
    about = "Serve Mandelbrot tiles over TCP"
)]
struct Cli {
    /// TCP port to listen on (0 picks a free port).
    #[arg(env = "FRACTALWIRE_PORT")]
    port: u16,

    /// Address to bind the listener to.
    #[arg(long, env = "FRACTALWIRE_BIND", default_value = "0.0.0.0")]
    bind: String,

    /// Compute tiles on the blocking pool instead of the event loop.
    #[arg(long, env = "FRACTALWIRE_OFFLOAD")]
    offload: bool,

    /// Largest tile, in pixels, a request may ask for.
    #[arg(long, env = "FRACTALWIRE_MAX_TILE_PIXELS", default_value_t = DEFAULT_MAX_TILE_PIXELS)]
    max_tile_pixels: u64,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("fractalwire=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    let listener = transport::bind(&cli.bind, cli.port)
        .await
        .with_context(|| format!("failed to bind {}:{}", cli.bind, cli.port))?;
    let port = listener.local_addr().context("listener has no address")?.port();
    write_stdout_json(&ReportLine::Listening { port })?;

    let mode = if cli.offload {
        ComputeMode::Offload
    } else {
        ComputeMode::Inline
    };
    Server::builder()
        .compute_mode(mode)
        .max_tile_pixels(cli.max_tile_pixels)
        .build()
        .serve(listener)
        .await?;
    Ok(())
}
