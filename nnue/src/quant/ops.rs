use candle_core::Result;

use super::params::{requantize, QDType, QuantParams};

/// Quantized per-row scale: a scalar indicator times an activation vector.
pub struct QMul {
    lhs_zero_point: i32,
    rhs_zero_point: i32,
    multiplier: f32,
    output: QuantParams,
}

impl QMul {
    pub fn new(lhs: QuantParams, rhs: QuantParams, output: QuantParams) -> Result<Self> {
        // Product scale, used only to derive the multiplier.
        let product = QuantParams::new(lhs.scale * rhs.scale, 0, QDType::QInt32)?;
        Ok(Self {
            lhs_zero_point: lhs.zero_point,
            rhs_zero_point: rhs.zero_point,
            multiplier: product.scale / output.scale,
            output,
        })
    }

    pub fn apply(&self, lhs: i32, rhs: &[u8], output: &mut [u8]) {
        let a = lhs - self.lhs_zero_point;
        for (out, &b) in output.iter_mut().zip(rhs) {
            let acc = a * (b as i32 - self.rhs_zero_point);
            *out = requantize(acc, self.multiplier, &self.output) as u8;
        }
    }

    pub fn output_params(&self) -> QuantParams {
        self.output
    }
}

/// Quantized elementwise sum, optionally with ReLU folded in.
pub struct QAdd {
    lhs: QuantParams,
    rhs: QuantParams,
    output: QuantParams,
    relu: bool,
}

impl QAdd {
    pub fn new(lhs: QuantParams, rhs: QuantParams, output: QuantParams, relu: bool) -> Self {
        Self {
            lhs,
            rhs,
            output,
            relu,
        }
    }

    pub fn apply(&self, lhs: &[u8], rhs: &[u8], output: &mut [u8]) {
        let (qmin, qmax) = self.output.dtype.range();
        let floor = if self.relu { self.output.zero_point } else { qmin };
        let lhs_m = self.lhs.scale / self.output.scale;
        let rhs_m = self.rhs.scale / self.output.scale;

        for ((out, &a), &b) in output.iter_mut().zip(lhs).zip(rhs) {
            let a = (a as i32 - self.lhs.zero_point) as f32 * lhs_m;
            let b = (b as i32 - self.rhs.zero_point) as f32 * rhs_m;
            let q = (a + b).round() as i32 + self.output.zero_point;
            *out = q.clamp(floor, qmax) as u8;
        }
    }

    pub fn output_params(&self) -> QuantParams {
        self.output
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mul_by_indicator() {
        let indicator = QuantParams::new(1.0 / 255.0, 0, QDType::QUInt8).unwrap();
        let act = QuantParams::new(0.1, 50, QDType::QUInt8).unwrap();
        let mul = QMul::new(indicator, act, act).unwrap();

        let values = [50u8, 60, 30];
        let mut out = [0u8; 3];

        mul.apply(255, &values, &mut out);
        assert_eq!(out, values);

        mul.apply(0, &values, &mut out);
        assert_eq!(out, [50, 50, 50]);
    }

    #[test]
    fn test_add_with_relu() {
        let params = QuantParams::new(0.5, 10, QDType::QUInt8).unwrap();
        let add = QAdd::new(params, params, params, true);

        // 1.0 + 2.0 and -3.0 + 1.0
        let mut out = [0u8; 2];
        add.apply(&[12, 4], &[14, 12], &mut out);

        assert_eq!(params.dequantize(out[0] as i32), 3.0);
        assert_eq!(out[1] as i32, params.zero_point);
    }
}
