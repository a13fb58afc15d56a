// src/scenario.rs

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::io;
use std::path::Path;

use nalgebra::Vector2;
use rand::Rng;
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};

use crate::locator::Receiver;

/// Half-width of the square area receivers are placed in.
pub const PLACEMENT_HALF_RANGE: f64 = 10.0;

/// Default number of experiments per benchmark.
pub const DEFAULT_EXPERIMENTS: usize = 100;

/// Default measurement noise standard deviation.
pub const DEFAULT_SIGMA: f64 = 1.0;

/// Errors that can occur while generating a benchmark.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScenarioError {
    /// A benchmark needs at least one receiver.
    EmptyReceiverSet,

    /// Sigma must be finite and non-negative.
    InvalidSigma,
}

impl fmt::Display for ScenarioError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyReceiverSet => write!(f, "number of receivers must be at least 1"),
            Self::InvalidSigma => write!(f, "sigma must be finite and non-negative"),
        }
    }
}

impl std::error::Error for ScenarioError {}

/// A synthetic TOA benchmark: the assumed emitter position, the
/// receiver layout and the noisy range observations.
///
/// Receivers and per-experiment values are keyed by receiver index, so
/// the serialized JSON carries stringified indices in generation
/// order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Benchmark {
    pub center: [f64; 2],
    pub receivers: BTreeMap<usize, [f64; 2]>,
    pub measurements: Vec<BTreeMap<usize, f64>>,
}

impl Benchmark {
    /// Reads a benchmark from a JSON file.
    pub fn load<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        let data = fs::read(path)?;
        let benchmark = serde_json::from_slice(&data)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        Ok(benchmark)
    }

    /// Writes the benchmark as compact UTF-8 JSON, overwriting any
    /// existing file.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> io::Result<()> {
        let data = serde_json::to_vec(self)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        fs::write(path, data)
    }

    /// Receivers in index order with zeroed timestamps, ready to take
    /// observed TOAs.
    pub fn receiver_array(&self) -> Vec<Receiver> {
        self.receivers
            .values()
            .map(|&[x, y]| Receiver::at(x, y))
            .collect()
    }
}

/// Generates a synthetic TOA benchmark.
///
/// Receivers are placed uniformly at random in the placement square,
/// the emitter is assumed at their centroid, and every experiment
/// observes the true emitter-to-receiver distances plus independent
/// Gaussian noise.
///
/// # Arguments
/// * `num_receivers` - How many receivers to place; must be at least 1.
/// * `num_experiments` - How many noisy experiments to generate.
/// * `sigma` - Standard deviation of the measurement noise.
/// * `rng` - Randomness source; pass a seeded rng for reproducible output.
///
/// # Returns
/// The generated benchmark record.
pub fn generate_benchmark<R: Rng>(
    num_receivers: usize,
    num_experiments: usize,
    sigma: f64,
    rng: &mut R,
) -> Result<Benchmark, ScenarioError> {
    if num_receivers == 0 {
        return Err(ScenarioError::EmptyReceiverSet);
    }
    let noise = Normal::new(0.0, sigma).map_err(|_| ScenarioError::InvalidSigma)?;

    // Receiver positions, uniform over the placement square
    let mut receivers = BTreeMap::new();
    let mut positions = Vec::with_capacity(num_receivers);
    for i in 0..num_receivers {
        let p = Vector2::new(
            rng.gen_range(-PLACEMENT_HALF_RANGE..PLACEMENT_HALF_RANGE),
            rng.gen_range(-PLACEMENT_HALF_RANGE..PLACEMENT_HALF_RANGE),
        );
        positions.push(p);
        receivers.insert(i, [p[0], p[1]]);
    }

    // The emitter is assumed at the receiver centroid
    let mut center = Vector2::zeros();
    for p in &positions {
        center += *p;
    }
    center /= num_receivers as f64;

    let distances: Vec<f64> = positions.iter().map(|p| (center - *p).norm()).collect();

    // Noisy range observations per experiment
    let mut measurements = Vec::with_capacity(num_experiments);
    for _ in 0..num_experiments {
        let mut experiment = BTreeMap::new();
        for (j, d) in distances.iter().enumerate() {
            experiment.insert(j, d + noise.sample(rng));
        }
        measurements.push(experiment);
    }

    Ok(Benchmark {
        center: [center[0], center[1]],
        receivers,
        measurements,
    })
}
