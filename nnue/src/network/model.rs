use candle_core::{bail, Result, Tensor};
use candle_nn::{linear, Linear, Module, VarBuilder};

use crate::quant::QuantPoint;

use super::{Dims, FeatureTransformer, PerspectiveCombiner};

/// Receives the tensor produced at each quantization point during a forward pass.
pub trait Probe {
    fn record(&mut self, point: QuantPoint, values: &Tensor) -> Result<()>;
}

/// Plain float inference records nothing.
impl Probe for () {
    #[inline]
    fn record(&mut self, _point: QuantPoint, _values: &Tensor) -> Result<()> {
        Ok(())
    }
}

// Candle network definition (used for training and calibration)
pub struct Network {
    dims: Dims,
    pub(crate) input: FeatureTransformer,
    pub(crate) combiner: PerspectiveCombiner,
    pub(crate) l1: Linear,
    pub(crate) l2: Linear,
    pub(crate) output: Linear,
}

impl Network {
    pub fn new(dims: Dims, vs: &VarBuilder) -> Result<Self> {
        dims.validate()?;
        Ok(Self {
            dims,
            input: FeatureTransformer::new(dims.inputs, dims.l1, vs.pp("input"))?,
            combiner: PerspectiveCombiner,
            l1: linear(dims.combined(), dims.l2, vs.pp("l1"))?,
            l2: linear(dims.l2, dims.l3, vs.pp("l2"))?,
            output: linear(dims.l3, 1, vs.pp("output"))?,
        })
    }

    /// Builds a network from explicit layers, checking every shape against `dims`.
    pub fn from_linears(
        dims: Dims,
        input: Linear,
        l1: Linear,
        l2: Linear,
        output: Linear,
    ) -> Result<Self> {
        dims.validate()?;
        check_linear("l1", &l1, dims.combined(), dims.l2)?;
        check_linear("l2", &l2, dims.l2, dims.l3)?;
        check_linear("output", &output, dims.l3, 1)?;

        Ok(Self {
            dims,
            input: FeatureTransformer::from_linear(input, dims.inputs, dims.l1)?,
            combiner: PerspectiveCombiner,
            l1,
            l2,
            output,
        })
    }

    pub fn dims(&self) -> Dims {
        self.dims
    }

    /// Scalar evaluation per row, shape `(N, 1)`.
    pub fn forward(
        &self,
        us: &Tensor,
        them: &Tensor,
        white: &Tensor,
        black: &Tensor,
    ) -> Result<Tensor> {
        self.forward_probed(us, them, white, black, &mut ())
    }

    /// Feature transformer output for one side.
    pub fn transform(&self, features: &Tensor) -> Result<Tensor> {
        self.input.forward(features)
    }

    /// The `2 * L1` mover-relative vector before activation.
    pub fn combine(
        &self,
        us: &Tensor,
        them: &Tensor,
        white: &Tensor,
        black: &Tensor,
    ) -> Result<Tensor> {
        self.check_inputs(us, them, white, black)?;
        let w = self.input.forward(white)?;
        let b = self.input.forward(black)?;
        self.combiner.combine(us, them, &w, &b)
    }

    pub(crate) fn forward_probed<P: Probe>(
        &self,
        us: &Tensor,
        them: &Tensor,
        white: &Tensor,
        black: &Tensor,
        probe: &mut P,
    ) -> Result<Tensor> {
        self.check_inputs(us, them, white, black)?;

        // Quantization entry
        probe.record(QuantPoint::Us, us)?;
        probe.record(QuantPoint::Them, them)?;
        probe.record(QuantPoint::White, white)?;
        probe.record(QuantPoint::Black, black)?;

        // Shared-weight feature transformer
        let w = self.input.forward(white)?;
        let b = self.input.forward(black)?;
        probe.record(QuantPoint::Transform, &w)?;
        probe.record(QuantPoint::Transform, &b)?;

        let (us_part, them_part) = self.combiner.products(us, them, &w, &b)?;
        probe.record(QuantPoint::UsMul, &us_part)?;
        probe.record(QuantPoint::ThemMul, &them_part)?;

        let x = self.combiner.add(&us_part, &them_part)?.relu()?;
        probe.record(QuantPoint::CombineAdd, &x)?;

        let x = x.apply(&self.l1)?.relu()?;
        probe.record(QuantPoint::Hidden1, &x)?;

        let x = x.apply(&self.l2)?.relu()?;
        probe.record(QuantPoint::Hidden2, &x)?;

        // Quantization exit
        let x = self.output.forward(&x)?;
        probe.record(QuantPoint::Output, &x)?;

        Ok(x)
    }

    fn check_inputs(
        &self,
        us: &Tensor,
        them: &Tensor,
        white: &Tensor,
        black: &Tensor,
    ) -> Result<()> {
        let (rows, width) = white.dims2()?;
        if black.dims2()? != (rows, width) {
            bail!(
                "white features {:?} and black features {:?} differ in shape",
                white.dims(),
                black.dims()
            );
        }
        if width != self.dims.inputs {
            bail!(
                "feature vectors have {width} inputs, network expects {}",
                self.dims.inputs
            );
        }
        for (name, indicator) in [("us", us), ("them", them)] {
            if indicator.dims2()? != (rows, 1) {
                bail!(
                    "{name} indicator has shape {:?}, expected ({rows}, 1)",
                    indicator.dims()
                );
            }
        }
        Ok(())
    }
}

pub(crate) fn check_linear(
    name: &str,
    linear: &Linear,
    inputs: usize,
    outputs: usize,
) -> Result<()> {
    let shape = linear.weight().dims2()?;
    if shape != (outputs, inputs) {
        bail!("{name} weight has shape {shape:?}, expected ({outputs}, {inputs})");
    }

    match linear.bias() {
        Some(bias) if bias.dims1()? == outputs => Ok(()),
        Some(bias) => bail!(
            "{name} bias has shape {:?}, expected ({outputs},)",
            bias.dims()
        ),
        None => bail!("{name} is missing its bias"),
    }
}
