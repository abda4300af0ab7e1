use anyhow::{Context, Result};
use clap::Parser;
use fractalwire::image::{write_pgm, DEFAULT_OUTPUT};
use fractalwire::report::{write_stdout_json, ReportLine};
use fractalwire::transport::Endpoint;
use fractalwire::{Complex, Dispatcher, Job};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(
    name = "fractalwire-client",
    version,
    about = "Render a Mandelbrot image across tile servers",
    allow_negative_numbers = true
)]
struct Cli {
    /// Real part of the lower corner.
    min_re: f64,
    /// Imaginary part of the lower corner.
    min_im: f64,
    /// Real part of the upper corner.
    max_re: f64,
    /// Imaginary part of the upper corner.
    max_im: f64,
    /// Iteration bound per pixel.
    max_iter: u32,
    /// Canvas width in pixels.
    width: u32,
    /// Canvas height in pixels.
    height: u32,
    /// Tiles per axis; width and height must be multiples of it.
    divisions: u32,
    /// Tile servers as `address:port`.
    #[arg(required = true)]
    servers: Vec<Endpoint>,

    /// Where to write the PGM image.
    #[arg(long, short, env = "FRACTALWIRE_OUTPUT", default_value = DEFAULT_OUTPUT)]
    output: String,
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

    let job = Job::new(
        Complex::new(cli.min_re, cli.min_im),
        Complex::new(cli.max_re, cli.max_im),
        cli.width,
        cli.height,
        cli.max_iter,
        cli.divisions,
    )?;

    let mut dispatcher = Dispatcher::new(job);
    for server in cli.servers {
        dispatcher.connect(server);
    }
    let outcome = dispatcher.run().await.context("render failed")?;

    tracing::info!(path = %cli.output, "writing image");
    write_pgm(&cli.output, job.width() as usize, job.height() as usize, outcome.canvas.pixels())
        .with_context(|| format!("failed to write {}", cli.output))?;
    write_stdout_json(&ReportLine::rendered(
        job.width(),
        job.height(),
        &outcome.stats,
        cli.output.as_str(),
    ))?;
    Ok(())
}
