use candle_core::{bail, Result};
use candle_nn::Linear;

use super::params::{requantize, QDType, QuantParams};

// Integer linear layer: u8 activations in, i8 weights, i32 accumulation, u8 out.
pub struct QLinear {
    // [out_idx][in_idx]
    weights: Box<[i8]>,
    // Scale input * weight, zero offset
    biases: Box<[i32]>,
    input_size: usize,
    output_size: usize,
    input_zero_point: i32,
    multiplier: f32,
    output: QuantParams,
    relu: bool,
}

impl QLinear {
    pub fn from_candle_linear(
        linear: &Linear,
        input: QuantParams,
        weight: QuantParams,
        output: QuantParams,
        relu: bool,
    ) -> Result<Self> {
        if weight.dtype != QDType::QInt8 || weight.zero_point != 0 {
            bail!("linear weights need symmetric QInt8 params, got {weight:?}");
        }
        let Some(bias) = linear.bias() else {
            bail!("cannot quantize a linear layer without bias");
        };

        let (output_size, input_size) = linear.weight().dims2()?;
        let accumulator = QuantParams::new(input.scale * weight.scale, 0, QDType::QInt32)?;

        Ok(Self {
            weights: linear
                .weight()
                .flatten_all()?
                .to_vec1::<f32>()?
                .into_iter()
                .map(|w| weight.quantize(w) as i8)
                .collect(),
            biases: bias
                .to_vec1::<f32>()?
                .into_iter()
                .map(|b| accumulator.quantize(b))
                .collect(),
            input_size,
            output_size,
            input_zero_point: input.zero_point,
            multiplier: accumulator.scale / output.scale,
            output,
            relu,
        })
    }

    pub fn forward(&self, input: &[u8], output: &mut [u8]) {
        let floor = if self.relu {
            self.output.zero_point
        } else {
            i32::MIN
        };

        for (i, val) in output.iter_mut().enumerate().take(self.output_size) {
            let offset = i * self.input_size;
            let weights_row = &self.weights[offset..offset + self.input_size];

            let acc = self.biases[i]
                + input
                    .iter()
                    .zip(weights_row)
                    .map(|(&x, &w)| (x as i32 - self.input_zero_point) * w as i32)
                    .sum::<i32>();

            *val = requantize(acc, self.multiplier, &self.output).max(floor) as u8;
        }
    }

    pub fn output_params(&self) -> QuantParams {
        self.output
    }
}
