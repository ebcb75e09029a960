use ahash::AHashMap;
use candle_core::{bail, Result, Tensor};
use candle_nn::Linear;
use rayon::prelude::*;

use crate::features::Perspective;
use crate::network::{Dims, Network};

use super::accumulator::{Accumulator, QFeatureTransformer};
use super::linear::QLinear;
use super::ops::{QAdd, QMul};
use super::params::{QTensor, QuantParams};
use super::QuantPoint;

/// Integer inference engine, produced from a calibrated network.
///
/// Every weight, bias and activation lives in the quantized domain; floats only
/// appear at the entry (indicators and features) and the exit (scalar score).
pub struct QuantizedNetwork {
    dims: Dims,
    points: AHashMap<QuantPoint, QuantParams>,
    transformer: QFeatureTransformer,
    us_mul: QMul,
    them_mul: QMul,
    add: QAdd,
    l1: QLinear,
    l2: QLinear,
    output: QLinear,
}

impl QuantizedNetwork {
    /// Converts `network` using the activation params at each point and the
    /// weight params chosen for each linear layer.
    pub(crate) fn build(
        network: &Network,
        activation: impl Fn(QuantPoint) -> Result<QuantParams>,
        weight: impl Fn(&Linear) -> Result<QuantParams>,
    ) -> Result<Self> {
        let mut points = AHashMap::with_capacity(QuantPoint::ALL.len());
        for point in QuantPoint::ALL {
            points.insert(point, activation(point)?);
        }
        let p = |point: QuantPoint| points[&point];

        let transformer = QFeatureTransformer::from_transformer(
            &network.input,
            p(QuantPoint::White),
            p(QuantPoint::Black),
            weight(network.input.linear())?,
            p(QuantPoint::Transform),
        )?;

        let us_mul = QMul::new(p(QuantPoint::Us), p(QuantPoint::Transform), p(QuantPoint::UsMul))?;
        let them_mul = QMul::new(
            p(QuantPoint::Them),
            p(QuantPoint::Transform),
            p(QuantPoint::ThemMul),
        )?;
        let add = QAdd::new(
            p(QuantPoint::UsMul),
            p(QuantPoint::ThemMul),
            p(QuantPoint::CombineAdd),
            QuantPoint::CombineAdd.fuses_relu(),
        );

        let l1 = QLinear::from_candle_linear(
            &network.l1,
            p(QuantPoint::CombineAdd),
            weight(&network.l1)?,
            p(QuantPoint::Hidden1),
            QuantPoint::Hidden1.fuses_relu(),
        )?;
        let l2 = QLinear::from_candle_linear(
            &network.l2,
            p(QuantPoint::Hidden1),
            weight(&network.l2)?,
            p(QuantPoint::Hidden2),
            QuantPoint::Hidden2.fuses_relu(),
        )?;
        let output = QLinear::from_candle_linear(
            &network.output,
            p(QuantPoint::Hidden2),
            weight(&network.output)?,
            p(QuantPoint::Output),
            QuantPoint::Output.fuses_relu(),
        )?;

        Ok(Self {
            dims: network.dims(),
            points,
            transformer,
            us_mul,
            them_mul,
            add,
            l1,
            l2,
            output,
        })
    }

    pub fn dims(&self) -> Dims {
        self.dims
    }

    pub fn params(&self, point: QuantPoint) -> QuantParams {
        self.points[&point]
    }

    /// Calibration state by name, in forward-pass order.
    pub fn calibration(&self) -> Vec<(&'static str, QuantParams)> {
        QuantPoint::ALL
            .iter()
            .map(|&point| (point.name(), self.params(point)))
            .collect()
    }

    /// Scale and zero point that map `evaluate_raw` back to a real score.
    pub fn output_params(&self) -> QuantParams {
        self.output.output_params()
    }

    pub fn transformer(&self) -> &QFeatureTransformer {
        &self.transformer
    }

    /// Fresh accumulator for one side, holding only the bias.
    pub fn accumulator(&self, side: Perspective) -> Accumulator {
        Accumulator::new(&self.transformer, side)
    }

    /// Integer score from incrementally maintained accumulators.
    pub fn evaluate_raw(
        &self,
        us: f32,
        them: f32,
        white: &Accumulator,
        black: &Accumulator,
    ) -> Result<i32> {
        if white.side() != Perspective::White || black.side() != Perspective::Black {
            bail!(
                "accumulators are for {:?}/{:?}, expected White/Black",
                white.side(),
                black.side()
            );
        }
        for acc in [white, black] {
            if acc.values().len() != self.dims.l1 || acc.features().dim() != self.dims.inputs {
                bail!(
                    "{:?} accumulator of width {} over {} inputs does not fit a {}x{} network",
                    acc.side(),
                    acc.values().len(),
                    acc.features().dim(),
                    self.dims.inputs,
                    self.dims.l1
                );
            }
        }

        Ok(self.evaluate_accumulated(
            self.params(QuantPoint::Us).quantize(us),
            self.params(QuantPoint::Them).quantize(them),
            white.values(),
            black.values(),
        ))
    }

    pub fn evaluate(
        &self,
        us: f32,
        them: f32,
        white: &Accumulator,
        black: &Accumulator,
    ) -> Result<f32> {
        let raw = self.evaluate_raw(us, them, white, black)?;
        Ok(self.output_params().dequantize(raw))
    }

    /// Batched quantized inference: `(N, 1)` integer scores at `output_params()`.
    /// Rows are evaluated in parallel.
    pub fn forward_quantized(
        &self,
        us: &Tensor,
        them: &Tensor,
        white: &Tensor,
        black: &Tensor,
    ) -> Result<QTensor> {
        let (rows, width) = white.dims2()?;
        if width != self.dims.inputs || black.dims2()? != (rows, width) {
            bail!(
                "feature tensors {:?}/{:?} do not match {} inputs",
                white.dims(),
                black.dims(),
                self.dims.inputs
            );
        }
        if us.dims2()? != (rows, 1) || them.dims2()? != (rows, 1) {
            bail!(
                "indicators {:?}/{:?} must have shape ({rows}, 1)",
                us.dims(),
                them.dims()
            );
        }

        let us = QTensor::quantize(us, self.params(QuantPoint::Us))?;
        let them = QTensor::quantize(them, self.params(QuantPoint::Them))?;
        let white = QTensor::quantize(white, self.params(QuantPoint::White))?;
        let black = QTensor::quantize(black, self.params(QuantPoint::Black))?;

        let scores: Vec<i32> = (0..rows)
            .into_par_iter()
            .map(|row| {
                let white_acc = self.accumulate_row(Perspective::White, &white, row);
                let black_acc = self.accumulate_row(Perspective::Black, &black, row);
                self.evaluate_accumulated(us.row(row)[0], them.row(row)[0], &white_acc, &black_acc)
            })
            .collect();

        QTensor::from_values(scores, rows, 1, self.output_params())
    }

    /// Batched inference with the exit conversion applied, shape `(N, 1)`.
    pub fn forward(
        &self,
        us: &Tensor,
        them: &Tensor,
        white: &Tensor,
        black: &Tensor,
    ) -> Result<Tensor> {
        self.forward_quantized(us, them, white, black)?
            .dequantize(us.device())
    }

    fn accumulate_row(&self, side: Perspective, features: &QTensor, row: usize) -> Vec<i32> {
        let zero_point = features.params().zero_point;
        let mut acc = self.transformer.biases(side).to_vec();

        for (idx, &q) in features.row(row).iter().enumerate() {
            let factor = q - zero_point;
            if factor != 0 {
                self.transformer.accumulate(&mut acc, idx, factor);
            }
        }
        acc
    }

    fn evaluate_accumulated(&self, us: i32, them: i32, white: &[i32], black: &[i32]) -> i32 {
        let l1 = self.dims.l1;

        // [w, b] and [b, w] at the transformer output scale
        let mut wb = vec![0u8; 2 * l1];
        let mut bw = vec![0u8; 2 * l1];
        {
            let (w, b) = wb.split_at_mut(l1);
            self.transformer.requantize(Perspective::White, white, w);
            self.transformer.requantize(Perspective::Black, black, b);
        }
        bw[..l1].copy_from_slice(&wb[l1..]);
        bw[l1..].copy_from_slice(&wb[..l1]);

        let mut us_part = vec![0u8; 2 * l1];
        let mut them_part = vec![0u8; 2 * l1];
        self.us_mul.apply(us, &wb, &mut us_part);
        self.them_mul.apply(them, &bw, &mut them_part);

        let mut combined = vec![0u8; 2 * l1];
        self.add.apply(&us_part, &them_part, &mut combined);

        let mut hidden1 = vec![0u8; self.dims.l2];
        self.l1.forward(&combined, &mut hidden1);

        let mut hidden2 = vec![0u8; self.dims.l3];
        self.l2.forward(&hidden1, &mut hidden2);

        let mut output = [0u8; 1];
        self.output.forward(&hidden2, &mut output);

        output[0] as i32
    }
}
