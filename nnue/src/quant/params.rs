use candle_core::{bail, Device, Result, Tensor};

/// Integer representation behind a quantized value.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum QDType {
    /// Activations.
    QUInt8,
    /// Weights.
    QInt8,
    /// Biases and accumulators.
    QInt32,
}

impl QDType {
    pub fn range(self) -> (i32, i32) {
        match self {
            QDType::QUInt8 => (u8::MIN as i32, u8::MAX as i32),
            QDType::QInt8 => (i8::MIN as i32, i8::MAX as i32),
            QDType::QInt32 => (i32::MIN, i32::MAX),
        }
    }

    pub fn is_signed(self) -> bool {
        !matches!(self, QDType::QUInt8)
    }
}

/// Affine mapping `real = (q - zero_point) * scale`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct QuantParams {
    pub scale: f32,
    pub zero_point: i32,
    pub dtype: QDType,
}

impl QuantParams {
    pub fn new(scale: f32, zero_point: i32, dtype: QDType) -> Result<Self> {
        if !scale.is_finite() || scale <= 0.0 {
            bail!("quantization scale must be positive and finite, got {scale}");
        }
        let (qmin, qmax) = dtype.range();
        if zero_point < qmin || zero_point > qmax {
            bail!("zero point {zero_point} outside {dtype:?} range [{qmin}, {qmax}]");
        }
        Ok(Self {
            scale,
            zero_point,
            dtype,
        })
    }

    /// Unit scale, zero offset.
    pub fn identity(dtype: QDType) -> Self {
        Self {
            scale: 1.0,
            zero_point: 0,
            dtype,
        }
    }

    #[inline]
    pub fn quantize(&self, x: f32) -> i32 {
        let (qmin, qmax) = self.dtype.range();
        let q = (x / self.scale).round() as i64 + self.zero_point as i64;
        q.clamp(qmin as i64, qmax as i64) as i32
    }

    #[inline]
    pub fn dequantize(&self, q: i32) -> f32 {
        (q - self.zero_point) as f32 * self.scale
    }
}

/// Rescales an integer accumulator into the output representation.
#[inline]
pub fn requantize(acc: i32, multiplier: f32, output: &QuantParams) -> i32 {
    let (qmin, qmax) = output.dtype.range();
    let q = (acc as f32 * multiplier).round() as i64 + output.zero_point as i64;
    q.clamp(qmin as i64, qmax as i64) as i32
}

/// Row-major integer matrix together with its quantization parameters.
#[derive(Clone, Debug)]
pub struct QTensor {
    values: Vec<i32>,
    rows: usize,
    cols: usize,
    params: QuantParams,
}

impl QTensor {
    /// Quantization entry: converts a `(rows, cols)` float tensor.
    pub fn quantize(tensor: &Tensor, params: QuantParams) -> Result<Self> {
        let (rows, cols) = tensor.dims2()?;
        let values = tensor
            .flatten_all()?
            .to_vec1::<f32>()?
            .into_iter()
            .map(|x| params.quantize(x))
            .collect();

        Ok(Self {
            values,
            rows,
            cols,
            params,
        })
    }

    pub fn from_values(
        values: Vec<i32>,
        rows: usize,
        cols: usize,
        params: QuantParams,
    ) -> Result<Self> {
        if values.len() != rows * cols {
            bail!(
                "{} values do not fill a ({rows}, {cols}) tensor",
                values.len()
            );
        }
        Ok(Self {
            values,
            rows,
            cols,
            params,
        })
    }

    /// Quantization exit: back to a float tensor on `device`.
    pub fn dequantize(&self, device: &Device) -> Result<Tensor> {
        let values: Vec<f32> = self
            .values
            .iter()
            .map(|&q| self.params.dequantize(q))
            .collect();
        Tensor::from_vec(values, (self.rows, self.cols), device)
    }

    pub fn row(&self, idx: usize) -> &[i32] {
        &self.values[idx * self.cols..(idx + 1) * self.cols]
    }

    pub fn values(&self) -> &[i32] {
        &self.values
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn params(&self) -> QuantParams {
        self.params
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quantize_clamps_to_dtype() {
        let params = QuantParams::new(0.5, 10, QDType::QUInt8).unwrap();
        assert_eq!(params.quantize(1.0), 12);
        assert_eq!(params.quantize(-100.0), 0);
        assert_eq!(params.quantize(1000.0), 255);
        assert_eq!(params.dequantize(12), 1.0);
    }

    #[test]
    fn test_invalid_params_are_rejected() {
        assert!(QuantParams::new(0.0, 0, QDType::QUInt8).is_err());
        assert!(QuantParams::new(f32::NAN, 0, QDType::QUInt8).is_err());
        assert!(QuantParams::new(1.0, -1, QDType::QUInt8).is_err());
        assert!(QuantParams::new(1.0, -1, QDType::QInt8).is_ok());
    }

    #[test]
    fn test_requantize() {
        let out = QuantParams::new(0.25, 3, QDType::QUInt8).unwrap();
        assert_eq!(requantize(100, 0.01, &out), 4);
        assert_eq!(requantize(-10_000, 0.01, &out), 0);
    }

    #[test]
    fn test_identity_roundtrip_on_binary_tensor() {
        let device = Device::Cpu;
        let t = Tensor::new(&[[0f32, 1., 1.], [1., 0., 0.]], &device).unwrap();

        let q = QTensor::quantize(&t, QuantParams::identity(QDType::QUInt8)).unwrap();
        assert_eq!(q.row(0), &[0, 1, 1]);
        assert_eq!(q.rows(), 2);

        let back = q.dequantize(&device).unwrap();
        assert_eq!(back.to_vec2::<f32>().unwrap(), t.to_vec2::<f32>().unwrap());
    }

    #[test]
    fn test_from_values_checks_length() {
        let params = QuantParams::identity(QDType::QInt32);
        assert!(QTensor::from_values(vec![1, 2, 3], 2, 2, params).is_err());
        assert!(QTensor::from_values(vec![1, 2, 3, 4], 2, 2, params).is_ok());
    }
}
