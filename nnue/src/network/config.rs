use candle_core::{bail, Result};

use super::{HALFKP_INPUTS, L1, L2, L3};

/// Layer widths of the network.
///
/// `inputs -> l1` per side, then `2 * l1 -> l2 -> l3 -> 1`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Dims {
    pub inputs: usize,
    pub l1: usize,
    pub l2: usize,
    pub l3: usize,
}

impl Dims {
    pub const HALFKP: Dims = Dims {
        inputs: HALFKP_INPUTS,
        l1: L1,
        l2: L2,
        l3: L3,
    };

    pub fn new(inputs: usize, l1: usize, l2: usize, l3: usize) -> Result<Self> {
        let dims = Self {
            inputs,
            l1,
            l2,
            l3,
        };
        dims.validate()?;
        Ok(dims)
    }

    pub fn validate(&self) -> Result<()> {
        if self.inputs == 0 || self.l1 == 0 || self.l2 == 0 || self.l3 == 0 {
            bail!("all layer widths must be non-zero, got {self:?}");
        }
        Ok(())
    }

    /// Width of the combined two-perspective vector.
    pub fn combined(&self) -> usize {
        2 * self.l1
    }
}

impl Default for Dims {
    fn default() -> Self {
        Self::HALFKP
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_halfkp_dims() {
        assert_eq!(Dims::HALFKP.inputs, 41024);
        assert_eq!(Dims::HALFKP.combined(), 512);
        assert!(Dims::HALFKP.validate().is_ok());
    }

    #[test]
    fn test_zero_width_is_rejected() {
        assert!(Dims::new(4, 0, 2, 2).is_err());
        assert!(Dims::new(0, 2, 2, 2).is_err());
        assert!(Dims::new(4, 2, 2, 2).is_ok());
    }
}
