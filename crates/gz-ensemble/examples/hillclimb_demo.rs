//! Fit the reference classifiers on a synthetic three-class problem and
//! hillclimb an ensemble on a held-out split.
//!
//! ```text
//! RUST_LOG=info cargo run -p gz-ensemble --example hillclimb_demo
//! ```

use anyhow::Result;
use ndarray::{Array1, Array2};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing_subscriber::EnvFilter;

use gz_ensemble::{FitOptions, HillclimbConfig, MetaEnsembler, SeedSize};
use gz_types::{Features, Labels, ParamSet};

const CENTERS: [[f64; 2]; 3] = [[0.0, 0.0], [3.0, 3.0], [0.0, 4.0]];

fn blobs(n_per_class: usize, rng: &mut StdRng) -> (Features, Labels) {
    let n = n_per_class * CENTERS.len();
    let mut x = Array2::zeros((n, 2));
    let mut y = Array1::zeros(n);
    for (class, center) in CENTERS.iter().enumerate() {
        for i in 0..n_per_class {
            let row = class * n_per_class + i;
            x[[row, 0]] = center[0] + rng.random_range(-1.5..1.5);
            x[[row, 1]] = center[1] + rng.random_range(-1.5..1.5);
            y[row] = class as i64;
        }
    }
    (x, y)
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let mut rng = StdRng::seed_from_u64(2024);
    let (x_train, y_train) = blobs(40, &mut rng);
    let (x_val, y_val) = blobs(20, &mut rng);

    let names = [
        "nearest_neighbors",
        "naive_bayes",
        "logistic_regression",
        "decision_tree",
        "neuralnet",
    ];
    let mut ensembler =
        MetaEnsembler::new(gz_learners::default_registry(), &names, x_train.dim())?;
    println!("{}", ensembler.summary());

    let workdir = tempfile::tempdir()?;
    let save_dir = workdir.path().join(format!("run-{}", ensembler.run_id()));
    let options = FitOptions::new()
        .with_scoring("accuracy")
        .with_override("nearest_neighbors", ParamSet::new().with("n_jobs", 2));
    let history = ensembler.fit(&x_train, &y_train, &save_dir, &options)?;
    for (algorithm, records) in history.iter() {
        if let Some(best) = records.first() {
            println!("{algorithm}: {} models, best recorded {:.4}", records.len(), best.score);
        }
    }

    let config = HillclimbConfig::new()
        .with_n_best(SeedSize::Fraction(0.1))
        .with_p(0.3)
        .with_iterations(20)
        .with_seed(7);
    for (iteration, score) in ensembler.hillclimb(&x_val, &y_val, &config)? {
        println!("iteration {iteration:>2}: {score:.4}");
    }

    let ensemble = ensembler.weighted_ensemble()?;
    let predicted = ensemble.predict(&x_val)?;
    let accuracy = gz_ensemble::get_scorer("accuracy")?.score(&predicted, &y_val)?;
    println!(
        "{} members, weights {:?}, validation accuracy {:.4}",
        ensemble.len(),
        ensemble.weights(),
        accuracy
    );
    Ok(())
}
