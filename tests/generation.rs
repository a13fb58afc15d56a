// tests/generation.rs

use std::env;
use std::fs;

use rand::rngs::StdRng;
use rand::SeedableRng;

use tdoa_bench::algebra::norm;
use tdoa_bench::scenario::{generate_benchmark, Benchmark};

#[test]
fn test_benchmark_has_requested_shape() {
    let mut rng = StdRng::seed_from_u64(1);
    let benchmark = generate_benchmark(7, 25, 1.0, &mut rng).unwrap();

    assert_eq!(benchmark.receivers.len(), 7);
    assert_eq!(benchmark.measurements.len(), 25);

    let expected_keys: Vec<usize> = (0..7).collect();
    let receiver_keys: Vec<usize> = benchmark.receivers.keys().copied().collect();
    assert_eq!(receiver_keys, expected_keys);

    for experiment in &benchmark.measurements {
        let keys: Vec<usize> = experiment.keys().copied().collect();
        assert_eq!(keys, expected_keys);
    }
}

#[test]
fn test_center_is_receiver_centroid() {
    let mut rng = StdRng::seed_from_u64(2);
    let benchmark = generate_benchmark(9, 1, 1.0, &mut rng).unwrap();

    let mut mean_x = 0.0;
    let mut mean_y = 0.0;
    for [x, y] in benchmark.receivers.values() {
        mean_x += x;
        mean_y += y;
    }
    mean_x /= benchmark.receivers.len() as f64;
    mean_y /= benchmark.receivers.len() as f64;

    assert!((benchmark.center[0] - mean_x).abs() < 1e-12);
    assert!((benchmark.center[1] - mean_y).abs() < 1e-12);
}

// With sigma 0 every record holds exactly the true distances to the
// center, with no noise term at all.
#[test]
fn test_zero_sigma_measurements_equal_true_distances() {
    let mut rng = StdRng::seed_from_u64(3);
    let benchmark = generate_benchmark(3, 2, 0.0, &mut rng).unwrap();

    assert_eq!(benchmark.measurements.len(), 2);
    for experiment in &benchmark.measurements {
        for (j, value) in experiment {
            let [x, y] = benchmark.receivers[j];
            let distance = norm(benchmark.center[0] - x, benchmark.center[1] - y);
            assert_eq!(*value, distance);
        }
    }
}

#[test]
fn test_fixed_seed_reproduces_benchmark() {
    let mut rng_a = StdRng::seed_from_u64(42);
    let mut rng_b = StdRng::seed_from_u64(42);

    let a = generate_benchmark(6, 12, 0.5, &mut rng_a).unwrap();
    let b = generate_benchmark(6, 12, 0.5, &mut rng_b).unwrap();
    assert_eq!(a, b);
}

#[test]
fn test_different_seeds_differ() {
    let mut rng_a = StdRng::seed_from_u64(1);
    let mut rng_b = StdRng::seed_from_u64(2);

    let a = generate_benchmark(6, 12, 0.5, &mut rng_a).unwrap();
    let b = generate_benchmark(6, 12, 0.5, &mut rng_b).unwrap();
    assert_ne!(a, b);
}

// Receiver indices must serialize as stringified integers in
// generation order, also past index 9 where lexicographic order would
// diverge from numeric order.
#[test]
fn test_serialized_keys_follow_generation_order() {
    let mut rng = StdRng::seed_from_u64(4);
    let benchmark = generate_benchmark(12, 1, 1.0, &mut rng).unwrap();

    let json = serde_json::to_string(&benchmark).unwrap();
    let receivers_section = &json[json.find("\"receivers\"").unwrap()..];
    let pos_9 = receivers_section.find("\"9\":").unwrap();
    let pos_10 = receivers_section.find("\"10\":").unwrap();
    let pos_11 = receivers_section.find("\"11\":").unwrap();
    assert!(pos_9 < pos_10);
    assert!(pos_10 < pos_11);
}

#[test]
fn test_save_and_load_round_trip() {
    let mut rng = StdRng::seed_from_u64(5);
    let benchmark = generate_benchmark(4, 3, 1.0, &mut rng).unwrap();

    let path = env::temp_dir().join("tdoa_bench_round_trip.json");
    benchmark.save(&path).unwrap();
    let loaded = Benchmark::load(&path).unwrap();
    fs::remove_file(&path).unwrap();

    assert_eq!(benchmark, loaded);
}

#[test]
fn test_save_to_unwritable_path_fails() {
    let mut rng = StdRng::seed_from_u64(6);
    let benchmark = generate_benchmark(3, 1, 1.0, &mut rng).unwrap();

    // A directory is never a writable output file
    assert!(benchmark.save(env::temp_dir()).is_err());
}

#[test]
fn test_load_rejects_malformed_json() {
    let path = env::temp_dir().join("tdoa_bench_malformed.json");
    fs::write(&path, b"{\"center\": [0.0").unwrap();
    let result = Benchmark::load(&path);
    fs::remove_file(&path).unwrap();

    assert_eq!(
        result.unwrap_err().kind(),
        std::io::ErrorKind::InvalidData
    );
}
