use candle_core::{bail, Result};

use crate::features::{FeatureVector, Perspective};
use crate::network::FeatureTransformer;

use super::params::{requantize, QDType, QuantParams};

/// Integer form of the shared feature transformer.
///
/// Weights are quantized to i8 and transposed so one feature's contribution to
/// every output is a contiguous row. The weights are shared, but each side has
/// its own input scale, so biases and the requantization multiplier are kept
/// per side.
pub struct QFeatureTransformer {
    // [feature_idx][out_idx]
    weights: Box<[i8]>,
    inputs: usize,
    outputs: usize,
    sides: [SideParams; 2],
    output: QuantParams,
}

struct SideParams {
    input: QuantParams,
    // [out_idx], scale input * weight
    biases: Box<[i32]>,
    multiplier: f32,
    // Quantized value of an active binary feature, minus the zero point.
    unit: i32,
}

impl QFeatureTransformer {
    pub fn from_transformer(
        transformer: &FeatureTransformer,
        white: QuantParams,
        black: QuantParams,
        weight: QuantParams,
        output: QuantParams,
    ) -> Result<Self> {
        if weight.dtype != QDType::QInt8 || weight.zero_point != 0 {
            bail!("transformer weights need symmetric QInt8 params, got {weight:?}");
        }
        let linear = transformer.linear();
        let Some(bias) = linear.bias() else {
            bail!("cannot quantize a feature transformer without bias");
        };

        let inputs = transformer.inputs();
        let outputs = transformer.outputs();
        let weights = quantize_transposed(
            &linear.weight().flatten_all()?.to_vec1::<f32>()?,
            inputs,
            outputs,
            weight,
        );
        let bias = bias.to_vec1::<f32>()?;

        let side = |input: QuantParams| -> Result<SideParams> {
            let accumulator = QuantParams::new(input.scale * weight.scale, 0, QDType::QInt32)?;
            Ok(SideParams {
                input,
                biases: bias.iter().map(|&b| accumulator.quantize(b)).collect(),
                multiplier: accumulator.scale / output.scale,
                unit: input.quantize(1.0) - input.zero_point,
            })
        };

        Ok(Self {
            weights,
            inputs,
            outputs,
            sides: [side(white)?, side(black)?],
            output,
        })
    }

    pub fn inputs(&self) -> usize {
        self.inputs
    }

    pub fn outputs(&self) -> usize {
        self.outputs
    }

    pub fn output_params(&self) -> QuantParams {
        self.output
    }

    pub fn input_params(&self, side: Perspective) -> QuantParams {
        self.sides[side as usize].input
    }

    pub(crate) fn biases(&self, side: Perspective) -> &[i32] {
        &self.sides[side as usize].biases
    }

    /// Adds `factor` times the weight row of `feature` to `acc`.
    #[inline]
    pub(crate) fn accumulate(&self, acc: &mut [i32], feature: usize, factor: i32) {
        let offset = feature * self.outputs;
        let row = &self.weights[offset..offset + self.outputs];
        for (a, &w) in acc.iter_mut().zip(row) {
            *a += factor * w as i32;
        }
    }

    /// Converts a side's accumulator into u8 activations at the shared output scale.
    pub(crate) fn requantize(&self, side: Perspective, acc: &[i32], output: &mut [u8]) {
        let multiplier = self.sides[side as usize].multiplier;
        for (out, &a) in output.iter_mut().zip(acc) {
            *out = requantize(a, multiplier, &self.output) as u8;
        }
    }

    fn unit(&self, side: Perspective) -> i32 {
        self.sides[side as usize].unit
    }
}

/// Incrementally maintained feature transformer state for one side.
///
/// Instead of recomputing the embedding from scratch for each position, only
/// the rows of features that changed since the last update are added or
/// subtracted.
#[derive(Clone, Debug)]
pub struct Accumulator {
    side: Perspective,
    values: Box<[i32]>,
    // To know which inputs have changed since the last update
    features: FeatureVector,
}

impl Accumulator {
    pub fn new(transformer: &QFeatureTransformer, side: Perspective) -> Self {
        Self {
            side,
            values: transformer.biases(side).into(),
            features: FeatureVector::empty(transformer.inputs()),
        }
    }

    pub fn reset(&mut self, transformer: &QFeatureTransformer) -> Result<()> {
        self.check_width(transformer)?;
        self.values.copy_from_slice(transformer.biases(self.side));
        self.features = FeatureVector::empty(transformer.inputs());
        Ok(())
    }

    /// Recomputes from the bias and every active feature.
    pub fn refresh(
        &mut self,
        transformer: &QFeatureTransformer,
        features: &FeatureVector,
    ) -> Result<()> {
        self.check_dim(transformer, features)?;
        self.reset(transformer)?;

        let unit = transformer.unit(self.side);
        for &idx in features.active() {
            transformer.accumulate(&mut self.values, idx, unit);
        }
        self.features = features.clone();
        Ok(())
    }

    /// Applies only the difference between the current and the new features.
    pub fn update(
        &mut self,
        transformer: &QFeatureTransformer,
        features: &FeatureVector,
    ) -> Result<()> {
        self.check_dim(transformer, features)?;

        let unit = transformer.unit(self.side);
        features.for_each_diff(&self.features, |idx, is_active| {
            let factor = if is_active { unit } else { -unit };
            transformer.accumulate(&mut self.values, idx, factor);
        });

        self.features = features.clone();
        Ok(())
    }

    pub fn add_feature(&mut self, transformer: &QFeatureTransformer, idx: usize) -> Result<()> {
        self.check_width(transformer)?;
        if self.features.insert(idx)? {
            transformer.accumulate(&mut self.values, idx, transformer.unit(self.side));
        }
        Ok(())
    }

    pub fn remove_feature(&mut self, transformer: &QFeatureTransformer, idx: usize) -> Result<()> {
        self.check_width(transformer)?;
        if self.features.remove(idx) {
            transformer.accumulate(&mut self.values, idx, -transformer.unit(self.side));
        }
        Ok(())
    }

    pub fn side(&self) -> Perspective {
        self.side
    }

    pub fn values(&self) -> &[i32] {
        &self.values
    }

    pub fn features(&self) -> &FeatureVector {
        &self.features
    }

    fn check_dim(
        &self,
        transformer: &QFeatureTransformer,
        features: &FeatureVector,
    ) -> Result<()> {
        self.check_width(transformer)?;
        if features.dim() != transformer.inputs() {
            bail!(
                "feature vector has {} inputs, transformer expects {}",
                features.dim(),
                transformer.inputs()
            );
        }
        Ok(())
    }

    // An accumulator only fits the transformer it was created from
    fn check_width(&self, transformer: &QFeatureTransformer) -> Result<()> {
        if self.values.len() != transformer.outputs()
            || self.features.dim() != transformer.inputs()
        {
            bail!(
                "accumulator of width {} over {} inputs does not fit a {}x{} transformer",
                self.values.len(),
                self.features.dim(),
                transformer.inputs(),
                transformer.outputs()
            );
        }
        Ok(())
    }
}

/// Quantizes transformer weights to i8 and transposes them.
/// Layout changes from [out_idx][feature_idx] to [feature_idx][out_idx].
fn quantize_transposed(
    weights: &[f32],
    inputs: usize,
    outputs: usize,
    params: QuantParams,
) -> Box<[i8]> {
    let mut quantized = vec![0i8; inputs * outputs].into_boxed_slice();
    for out_idx in 0..outputs {
        let src_row_offset = out_idx * inputs;
        for feature_idx in 0..inputs {
            quantized[feature_idx * outputs + out_idx] =
                params.quantize(weights[src_row_offset + feature_idx]) as i8;
        }
    }
    quantized
}
