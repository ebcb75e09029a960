mod training_tests;

use candle_core::{DType, Device, Tensor};
use candle_nn::{Linear, VarBuilder, VarMap};
use rand::rngs::StdRng;
use rand::seq::index::sample;
use rand::{Rng, SeedableRng};

use crate::features::{FeatureVector, Perspective, Sample};
use crate::network::{Dims, Network};

/// Linear layer from a row-major `(rows, cols)` weight and a bias.
pub(crate) fn linear(weights: &[f32], rows: usize, cols: usize, bias: &[f32]) -> Linear {
    let device = Device::Cpu;
    Linear::new(
        Tensor::from_slice(weights, (rows, cols), &device).unwrap(),
        Some(Tensor::from_slice(bias, rows, &device).unwrap()),
    )
}

/// Randomly initialized network on the CPU.
pub(crate) fn random_network(dims: Dims) -> Network {
    let vm = VarMap::new();
    let vb = VarBuilder::from_varmap(&vm, DType::F32, &Device::Cpu);
    Network::new(dims, &vb).unwrap()
}

/// Positions with `active` random features per side and a random side to move.
pub(crate) fn random_samples(dims: Dims, count: usize, active: usize, seed: u64) -> Vec<Sample> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..count)
        .map(|_| {
            let white = FeatureVector::new(dims.inputs, sample(&mut rng, dims.inputs, active))
                .unwrap();
            let black = FeatureVector::new(dims.inputs, sample(&mut rng, dims.inputs, active))
                .unwrap();
            let side = if rng.gen_bool(0.5) {
                Perspective::White
            } else {
                Perspective::Black
            };
            let score = rng.gen_range(-800.0..800.0);
            Sample::new(side, white, black, 0.5, score).unwrap()
        })
        .collect()
}

pub(crate) fn column(t: &Tensor) -> Vec<f32> {
    t.flatten_all().unwrap().to_vec1::<f32>().unwrap()
}

/// Asserts that two floating point values are within `epsilon` of each other
pub(crate) fn assert_approx_eq(a: f32, b: f32, epsilon: f32, description: &str) {
    assert!(
        (a - b).abs() < epsilon,
        "{} differ by more than epsilon: |{} - {}| = {} > {}",
        description,
        a,
        b,
        (a - b).abs(),
        epsilon
    );
}
