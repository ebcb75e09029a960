use candle_core::{Device, Result};
use nnue::{Batch, FeatureVector, Perspective, Sample};
use rand::rngs::StdRng;
use rand::seq::index::sample;
use rand::{Rng, SeedableRng};

/// Generates random sparse positions with a learnable target.
///
/// Every feature carries a fixed value; a position's score is the value of
/// the mover's features minus the value of the opponent's, so swapping sides
/// and feature vectors leaves the target unchanged.
pub struct Synthetic {
    inputs: usize,
    active: usize,
    values: Vec<f32>,
    rng: StdRng,
}

impl Synthetic {
    pub fn new(inputs: usize, active: usize, seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let values = (0..inputs).map(|_| rng.gen_range(-100.0..100.0)).collect();
        Self {
            inputs,
            active: active.min(inputs),
            values,
            rng,
        }
    }

    pub fn samples(&mut self, count: usize) -> Result<Vec<Sample>> {
        (0..count).map(|_| self.sample()).collect()
    }

    pub fn batch(&mut self, count: usize, device: &Device) -> Result<Batch> {
        Batch::from_samples(&self.samples(count)?, self.inputs, device)
    }

    fn sample(&mut self) -> Result<Sample> {
        let white = self.features()?;
        let black = self.features()?;
        let side = if self.rng.gen_bool(0.5) {
            Perspective::White
        } else {
            Perspective::Black
        };

        let (us, them) = match side {
            Perspective::White => (&white, &black),
            Perspective::Black => (&black, &white),
        };
        let score = self.material(us) - self.material(them);
        let outcome = match score {
            s if s > 100.0 => 1.0,
            s if s < -100.0 => 0.0,
            _ => 0.5,
        };

        Sample::new(side, white, black, outcome, score)
    }

    fn features(&mut self) -> Result<FeatureVector> {
        let count = self.rng.gen_range(1..=self.active.max(1));
        FeatureVector::new(self.inputs, sample(&mut self.rng, self.inputs, count))
    }

    fn material(&self, features: &FeatureVector) -> f32 {
        features.active().iter().map(|&idx| self.values[idx]).sum()
    }
}
