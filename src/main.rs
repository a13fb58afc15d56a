// src/main.rs

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use rand::rngs::StdRng;
use rand::{thread_rng, SeedableRng};

use tdoa_bench::scenario::{generate_benchmark, DEFAULT_EXPERIMENTS, DEFAULT_SIGMA};

#[derive(Parser, Debug)]
#[command(
    name = "tdoa_bench_gen",
    version,
    about = "Generate benchmark files to test TDOA solver capabilities"
)]
struct Cli {
    /// JSON output filename.
    #[arg(short, long)]
    filename: PathBuf,

    /// Number of receivers to place.
    #[arg(short, long)]
    number_receivers: usize,

    /// How many experiments to generate.
    #[arg(short = 'v', long, default_value_t = DEFAULT_EXPERIMENTS)]
    number_experiments: usize,

    /// Standard deviation of the measurement noise.
    #[arg(short, long, default_value_t = DEFAULT_SIGMA)]
    sigma: f64,

    /// RNG seed for reproducible benchmarks.
    #[arg(long)]
    seed: Option<u64>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let benchmark = match cli.seed {
        Some(seed) => generate_benchmark(
            cli.number_receivers,
            cli.number_experiments,
            cli.sigma,
            &mut StdRng::seed_from_u64(seed),
        ),
        None => generate_benchmark(
            cli.number_receivers,
            cli.number_experiments,
            cli.sigma,
            &mut thread_rng(),
        ),
    }?;

    benchmark
        .save(&cli.filename)
        .with_context(|| format!("write benchmark to {}", cli.filename.display()))?;

    Ok(())
}
