// src/locate.rs

use std::fs::File;
use std::io::{self, Write};
use std::path::PathBuf;
use std::time::Instant;

use anyhow::{bail, Context, Result};
use clap::{Parser, ValueEnum};

use tdoa_bench::locator::{initial_guess, nonlinear_optimization};
use tdoa_bench::scenario::Benchmark;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Method {
    /// Linearized least squares only.
    Linear,
    /// Least squares refined by nonlinear optimization.
    Nonlinear,
}

#[derive(Parser)]
#[command(
    name = "tdoa_bench_locate",
    version,
    about = "Solve TDOA benchmark files and report timing per fix"
)]
struct Cli {
    /// JSON benchmark file with receiver positions and measurements.
    #[arg(short, long)]
    receiver_file: PathBuf,

    /// Estimation method.
    #[arg(short, long, value_enum, default_value = "linear")]
    method: Method,

    /// Size of the averaging window over consecutive measurements.
    #[arg(short, long, default_value_t = 1)]
    window_size: usize,

    /// Where to dump the output: stdout or a file path.
    #[arg(short, long, default_value = "stdout")]
    output: String,
}

/// One localization result: solve time and estimated position.
struct Fix {
    micros: u128,
    x: f64,
    y: f64,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let benchmark = Benchmark::load(&cli.receiver_file)
        .with_context(|| format!("read benchmark from {}", cli.receiver_file.display()))?;

    let fixes = solve_benchmark(&benchmark, cli.method, cli.window_size)?;
    write_fixes(&fixes, &cli.output)
}

/// Solves every window position of the benchmark and times each fix.
fn solve_benchmark(benchmark: &Benchmark, method: Method, window: usize) -> Result<Vec<Fix>> {
    let mut receivers = benchmark.receiver_array();
    let num_receivers = receivers.len();
    if num_receivers == 0 {
        bail!("benchmark contains no receivers");
    }
    if window == 0 {
        bail!("window size must be at least 1");
    }

    let num_measurements = benchmark.measurements.len();
    if num_measurements < window {
        bail!(
            "not enough measurements: {} for the selected window size {}",
            num_measurements,
            window
        );
    }

    // TOA matrix, checked against the receiver count
    let mut toas = Vec::with_capacity(num_measurements);
    for measurement in &benchmark.measurements {
        if measurement.len() != num_receivers {
            bail!(
                "expected {} values per measurement as it is the number of receivers, got {}",
                num_receivers,
                measurement.len()
            );
        }
        toas.push(measurement.values().copied().collect::<Vec<f64>>());
    }

    let mut fixes = Vec::with_capacity(num_measurements - window + 1);
    for i in 0..=num_measurements - window {
        let start = Instant::now();

        // Mean TOA per receiver over the window
        for (j, receiver) in receivers.iter_mut().enumerate() {
            let sum: f64 = toas[i..i + window].iter().map(|row| row[j]).sum();
            receiver.timestamp = sum / window as f64;
        }

        let mut estimate = initial_guess(&receivers)?;
        if method == Method::Nonlinear {
            estimate = nonlinear_optimization(&receivers, estimate)?;
        }

        fixes.push(Fix {
            micros: start.elapsed().as_micros(),
            x: estimate[0],
            y: estimate[1],
        });
    }

    Ok(fixes)
}

fn write_fixes(fixes: &[Fix], output: &str) -> Result<()> {
    if output == "stdout" {
        let stdout = io::stdout();
        let mut out = stdout.lock();
        writeln!(out, "\nTiming Results")?;
        writeln!(out, "----------")?;
        for fix in fixes {
            writeln!(out, "{},{:.5},{:.5}", fix.micros, fix.x, fix.y)?;
        }
    } else {
        let mut file =
            File::create(output).with_context(|| format!("create output file {output}"))?;
        for fix in fixes {
            writeln!(file, "{},{:.5},{:.5}", fix.micros, fix.x, fix.y)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use tdoa_bench::scenario::generate_benchmark;

    #[test]
    fn test_receiver_file_is_required() {
        assert!(Cli::try_parse_from(["tdoa_bench_locate"]).is_err());
    }

    #[test]
    fn test_method_flag_parses() {
        let cli =
            Cli::try_parse_from(["tdoa_bench_locate", "-r", "b.json", "-m", "nonlinear"]).unwrap();
        assert_eq!(cli.method, Method::Nonlinear);
        assert_eq!(cli.window_size, 1);
        assert_eq!(cli.output, "stdout");
    }

    #[test]
    fn test_zero_window_is_rejected() {
        let mut rng = StdRng::seed_from_u64(11);
        let benchmark = generate_benchmark(4, 2, 0.0, &mut rng).unwrap();
        assert!(solve_benchmark(&benchmark, Method::Linear, 0).is_err());
    }

    #[test]
    fn test_window_larger_than_experiments_is_rejected() {
        let mut rng = StdRng::seed_from_u64(11);
        let benchmark = generate_benchmark(4, 2, 0.0, &mut rng).unwrap();
        assert!(solve_benchmark(&benchmark, Method::Linear, 5).is_err());
    }

    #[test]
    fn test_every_window_position_is_solved() {
        let mut rng = StdRng::seed_from_u64(19);
        let benchmark = generate_benchmark(5, 6, 0.1, &mut rng).unwrap();
        let fixes = solve_benchmark(&benchmark, Method::Linear, 3).unwrap();
        assert_eq!(fixes.len(), 4);
    }

    #[test]
    fn test_noiseless_benchmark_solves_to_center() {
        let mut rng = StdRng::seed_from_u64(11);
        let benchmark = generate_benchmark(5, 4, 0.0, &mut rng).unwrap();

        let fixes = solve_benchmark(&benchmark, Method::Nonlinear, 1).unwrap();
        assert_eq!(fixes.len(), 4);
        for fix in &fixes {
            assert!((fix.x - benchmark.center[0]).abs() < 1e-3);
            assert!((fix.y - benchmark.center[1]).abs() < 1e-3);
        }
    }
}
