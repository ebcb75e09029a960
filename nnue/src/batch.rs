use candle_core::{bail, Device, Result, Tensor};

use crate::features::Sample;

/// A mini-batch of samples laid out as dense candle tensors.
pub struct Batch {
    pub us: Tensor,
    pub them: Tensor,
    pub white: Tensor,
    pub black: Tensor,
    pub outcome: Tensor,
    pub score: Tensor,
}

impl Batch {
    pub fn from_samples(samples: &[Sample], inputs: usize, device: &Device) -> Result<Self> {
        let n = samples.len();

        let mut us = Vec::with_capacity(n);
        let mut them = Vec::with_capacity(n);
        let mut white = Vec::with_capacity(n * inputs);
        let mut black = Vec::with_capacity(n * inputs);
        let mut outcome = Vec::with_capacity(n);
        let mut score = Vec::with_capacity(n);

        for sample in samples {
            if sample.white.dim() != inputs || sample.black.dim() != inputs {
                bail!(
                    "sample has {}/{} inputs, network expects {}",
                    sample.white.dim(),
                    sample.black.dim(),
                    inputs
                );
            }

            us.push(sample.us);
            them.push(sample.them);
            white.extend_from_slice(&sample.white.to_dense());
            black.extend_from_slice(&sample.black.to_dense());
            outcome.push(sample.outcome);
            score.push(sample.score);
        }

        Ok(Self {
            us: Tensor::from_vec(us, (n, 1), device)?,
            them: Tensor::from_vec(them, (n, 1), device)?,
            white: Tensor::from_vec(white, (n, inputs), device)?,
            black: Tensor::from_vec(black, (n, inputs), device)?,
            outcome: Tensor::from_vec(outcome, (n, 1), device)?,
            score: Tensor::from_vec(score, (n, 1), device)?,
        })
    }

    pub fn len(&self) -> usize {
        self.score.dims().first().copied().unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
