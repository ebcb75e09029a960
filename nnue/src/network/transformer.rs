use candle_core::{bail, Result, Tensor};
use candle_nn::{linear, Linear, Module, VarBuilder};

use super::model::check_linear;

/// Sparse input layer. One affine map applied to each side's features with
/// the same weights; color only enters through the perspective indicators.
pub struct FeatureTransformer {
    linear: Linear,
    inputs: usize,
    outputs: usize,
}

impl FeatureTransformer {
    pub fn new(inputs: usize, outputs: usize, vs: VarBuilder) -> Result<Self> {
        Ok(Self {
            linear: linear(inputs, outputs, vs)?,
            inputs,
            outputs,
        })
    }

    pub fn from_linear(linear: Linear, inputs: usize, outputs: usize) -> Result<Self> {
        check_linear("input", &linear, inputs, outputs)?;
        Ok(Self {
            linear,
            inputs,
            outputs,
        })
    }

    /// `(N, inputs) -> (N, outputs)`. No activation at this stage.
    pub fn forward(&self, features: &Tensor) -> Result<Tensor> {
        let (_, width) = features.dims2()?;
        if width != self.inputs {
            bail!(
                "feature vector has {width} inputs, transformer expects {}",
                self.inputs
            );
        }
        self.linear.forward(features)
    }

    pub fn linear(&self) -> &Linear {
        &self.linear
    }

    pub fn inputs(&self) -> usize {
        self.inputs
    }

    pub fn outputs(&self) -> usize {
        self.outputs
    }
}
