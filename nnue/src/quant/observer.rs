use candle_core::{bail, Result, Tensor};

use super::params::{QDType, QuantParams};

/// Collects statistics over tensors seen during calibration and turns them
/// into quantization parameters. The statistic and the mapping are up to the
/// implementation; the network only decides where observers sit.
pub trait Observer: Clone {
    fn new(dtype: QDType) -> Self;

    fn observe(&mut self, values: &Tensor) -> Result<()>;

    /// Folds another observer's statistics into this one.
    fn merge(&mut self, other: &Self);

    fn qparams(&self) -> Result<QuantParams>;
}

/// Tracks the running min and max. Unsigned types get an affine mapping over
/// the range (widened to include zero); signed types a symmetric one around zero.
#[derive(Clone, Debug)]
pub struct MinMaxObserver {
    dtype: QDType,
    min: f32,
    max: f32,
    seen: usize,
}

impl MinMaxObserver {
    pub fn range(&self) -> Option<(f32, f32)> {
        (self.seen > 0).then_some((self.min, self.max))
    }
}

impl Observer for MinMaxObserver {
    fn new(dtype: QDType) -> Self {
        Self {
            dtype,
            min: f32::INFINITY,
            max: f32::NEG_INFINITY,
            seen: 0,
        }
    }

    fn observe(&mut self, values: &Tensor) -> Result<()> {
        let values = values.flatten_all()?.to_vec1::<f32>()?;
        for v in values {
            self.min = self.min.min(v);
            self.max = self.max.max(v);
            self.seen += 1;
        }
        Ok(())
    }

    fn merge(&mut self, other: &Self) {
        self.min = self.min.min(other.min);
        self.max = self.max.max(other.max);
        self.seen += other.seen;
    }

    fn qparams(&self) -> Result<QuantParams> {
        let Some((min, max)) = self.range() else {
            bail!("observer has not seen any values");
        };
        if !min.is_finite() || !max.is_finite() {
            bail!("observed range [{min}, {max}] is not finite");
        }

        let (qmin, qmax) = self.dtype.range();
        let levels = qmax as f64 - qmin as f64;

        if self.dtype.is_signed() {
            let amax = min.abs().max(max.abs());
            if amax <= f32::EPSILON {
                return Ok(QuantParams::identity(self.dtype));
            }
            let scale = (amax as f64 / (levels / 2.0)) as f32;
            return QuantParams::new(scale, 0, self.dtype);
        }

        let (min, max) = (min.min(0.0), max.max(0.0));
        if max - min <= f32::EPSILON {
            return Ok(QuantParams::identity(self.dtype));
        }
        let scale = ((max - min) as f64 / levels) as f32;
        let zero_point = (qmin - (min / scale).round() as i32).clamp(qmin, qmax);
        QuantParams::new(scale, zero_point, self.dtype)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::Device;

    #[test]
    fn test_unobserved_has_no_params() {
        let obs = MinMaxObserver::new(QDType::QUInt8);
        assert!(obs.qparams().is_err());
    }

    #[test]
    fn test_affine_range_covers_observed_values() {
        let mut obs = MinMaxObserver::new(QDType::QUInt8);
        let t = Tensor::new(&[-1f32, 0.5, 3.0], &Device::Cpu).unwrap();
        obs.observe(&t).unwrap();

        let params = obs.qparams().unwrap();
        assert!((params.scale - 4.0 / 255.0).abs() < 1e-6);
        assert_eq!(params.zero_point, 64);
        assert!((params.dequantize(params.quantize(-1.0)) + 1.0).abs() <= params.scale);
        assert!((params.dequantize(params.quantize(3.0)) - 3.0).abs() <= params.scale);
        assert_eq!(params.dequantize(params.quantize(0.0)), 0.0);
    }

    #[test]
    fn test_non_negative_range_has_zero_offset() {
        let mut obs = MinMaxObserver::new(QDType::QUInt8);
        obs.observe(&Tensor::new(&[0f32, 1.0], &Device::Cpu).unwrap())
            .unwrap();

        let params = obs.qparams().unwrap();
        assert_eq!(params.zero_point, 0);
        assert_eq!(params.quantize(1.0), 255);
    }

    #[test]
    fn test_symmetric_for_signed_types() {
        let mut obs = MinMaxObserver::new(QDType::QInt8);
        obs.observe(&Tensor::new(&[-0.2f32, 0.6], &Device::Cpu).unwrap())
            .unwrap();

        let params = obs.qparams().unwrap();
        assert_eq!(params.zero_point, 0);
        assert_eq!(params.quantize(0.6), 127);
        assert!(params.quantize(-0.6) <= -127);
    }

    #[test]
    fn test_merge_widens_range() {
        let device = Device::Cpu;
        let mut a = MinMaxObserver::new(QDType::QUInt8);
        let mut b = MinMaxObserver::new(QDType::QUInt8);
        a.observe(&Tensor::new(&[0f32, 1.0], &device).unwrap()).unwrap();
        b.observe(&Tensor::new(&[-2f32, 0.5], &device).unwrap()).unwrap();

        a.merge(&b);
        assert_eq!(a.range(), Some((-2.0, 1.0)));
    }

    #[test]
    fn test_degenerate_range_falls_back_to_unit_scale() {
        let mut obs = MinMaxObserver::new(QDType::QUInt8);
        obs.observe(&Tensor::zeros(4, candle_core::DType::F32, &Device::Cpu).unwrap())
            .unwrap();
        assert_eq!(obs.qparams().unwrap(), QuantParams::identity(QDType::QUInt8));
    }
}
