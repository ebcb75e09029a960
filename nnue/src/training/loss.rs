use candle_core::{Result, Tensor};
use candle_nn::{loss::mse, ops::sigmoid};

/// Squashing constant mapping centipawns into sigmoid space.
pub const CP_ALPHA: f64 = 0.0016;

/// `sigmoid(score * CP_ALPHA)`, in (0, 1) for finite scores.
pub fn cp_conversion(score: &Tensor) -> Result<Tensor> {
    sigmoid(&score.affine(CP_ALPHA, 0.0)?)
}

/// Mean squared error between the network output and the squashed score.
pub fn eval_loss(pred: &Tensor, score: &Tensor) -> Result<Tensor> {
    mse(pred, &cp_conversion(score)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::Device;

    fn scores() -> Tensor {
        Tensor::new(
            &[-8000f32, -3000., -400., -1., 0., 1., 250., 3000., 8000.],
            &Device::Cpu,
        )
        .unwrap()
    }

    #[test]
    fn test_cp_conversion_is_monotonic() {
        let squashed = cp_conversion(&scores()).unwrap().to_vec1::<f32>().unwrap();
        for pair in squashed.windows(2) {
            assert!(pair[0] < pair[1], "{} !< {}", pair[0], pair[1]);
        }
    }

    #[test]
    fn test_cp_conversion_is_bounded() {
        let squashed = cp_conversion(&scores()).unwrap().to_vec1::<f32>().unwrap();
        for v in squashed {
            assert!(v > 0.0 && v < 1.0, "{v} outside (0, 1)");
        }
    }

    #[test]
    fn test_cp_conversion_midpoint() {
        let zero = Tensor::new(&[0f32], &Device::Cpu).unwrap();
        let v = cp_conversion(&zero).unwrap().to_vec1::<f32>().unwrap()[0];
        assert!((v - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_loss_is_zero_on_exact_target() {
        let score = Tensor::new(&[[-300f32], [0.], [125.]], &Device::Cpu).unwrap();
        let pred = cp_conversion(&score).unwrap();

        let loss = eval_loss(&pred, &score).unwrap().to_scalar::<f32>().unwrap();
        assert_eq!(loss, 0.0);
    }

    #[test]
    fn test_loss_is_positive_otherwise() {
        let score = Tensor::new(&[[-300f32], [0.], [125.]], &Device::Cpu).unwrap();
        let pred = Tensor::new(&[[0.1f32], [0.5], [0.9]], &Device::Cpu).unwrap();

        let loss = eval_loss(&pred, &score).unwrap().to_scalar::<f32>().unwrap();
        assert!(loss > 0.0);
    }

    #[test]
    fn test_non_finite_score_propagates() {
        let score = Tensor::new(&[[f32::NAN], [0.], [125.]], &Device::Cpu).unwrap();
        let pred = Tensor::new(&[[0.1f32], [0.5], [0.9]], &Device::Cpu).unwrap();

        let loss = eval_loss(&pred, &score).unwrap().to_scalar::<f32>().unwrap();
        assert!(loss.is_nan());
    }
}
