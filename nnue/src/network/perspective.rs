use candle_core::{Result, Tensor};

/// Combines the two side embeddings into one mover-relative vector:
///
/// `us * [w, b] + them * [b, w]`
///
/// Each primitive is a separate call so that calibration can observe the two
/// products and the sum independently.
#[derive(Clone, Copy, Debug, Default)]
pub struct PerspectiveCombiner;

impl PerspectiveCombiner {
    /// `(N, L1), (N, L1) -> (N, 2 * L1)`
    pub fn concat(&self, first: &Tensor, second: &Tensor) -> Result<Tensor> {
        Tensor::cat(&[first, second], 1)
    }

    /// Scales each row by its `(N, 1)` indicator.
    pub fn mul(&self, indicator: &Tensor, embeddings: &Tensor) -> Result<Tensor> {
        indicator.broadcast_mul(embeddings)
    }

    pub fn add(&self, a: &Tensor, b: &Tensor) -> Result<Tensor> {
        a.add(b)
    }

    /// Products for both orderings, before the sum.
    pub fn products(
        &self,
        us: &Tensor,
        them: &Tensor,
        white: &Tensor,
        black: &Tensor,
    ) -> Result<(Tensor, Tensor)> {
        let us_part = self.mul(us, &self.concat(white, black)?)?;
        let them_part = self.mul(them, &self.concat(black, white)?)?;
        Ok((us_part, them_part))
    }

    pub fn combine(
        &self,
        us: &Tensor,
        them: &Tensor,
        white: &Tensor,
        black: &Tensor,
    ) -> Result<Tensor> {
        let (us_part, them_part) = self.products(us, them, white, black)?;
        self.add(&us_part, &them_part)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::Device;

    #[test]
    fn test_combine_selects_ordering_per_row() {
        let device = Device::Cpu;
        let w = Tensor::new(&[[1f32, 2.], [5., 6.]], &device).unwrap();
        let b = Tensor::new(&[[3f32, 4.], [7., 8.]], &device).unwrap();
        let us = Tensor::new(&[[1f32], [0.]], &device).unwrap();
        let them = Tensor::new(&[[0f32], [1.]], &device).unwrap();

        let combined = PerspectiveCombiner
            .combine(&us, &them, &w, &b)
            .unwrap()
            .to_vec2::<f32>()
            .unwrap();

        assert_eq!(combined[0], vec![1., 2., 3., 4.]);
        assert_eq!(combined[1], vec![7., 8., 5., 6.]);
    }
}
