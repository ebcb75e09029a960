pub mod accumulator;
pub mod calibrate;
pub mod linear;
pub mod network;
pub mod observer;
pub mod ops;
pub mod params;

pub use accumulator::{Accumulator, QFeatureTransformer};
pub use calibrate::CalibratingNetwork;
pub use linear::QLinear;
pub use network::QuantizedNetwork;
pub use observer::{MinMaxObserver, Observer};
pub use ops::{QAdd, QMul};
pub use params::{QDType, QTensor, QuantParams};

/// Named points of the forward pass where tensors cross into, out of, or
/// through the quantized domain. Each carries its own scale and zero point.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum QuantPoint {
    Us,
    Them,
    White,
    Black,
    /// Output of the shared feature transformer, for both sides.
    Transform,
    UsMul,
    ThemMul,
    /// Sum of both products, with the following ReLU fused in.
    CombineAdd,
    Hidden1,
    Hidden2,
    Output,
}

impl QuantPoint {
    pub const ALL: [QuantPoint; 11] = [
        QuantPoint::Us,
        QuantPoint::Them,
        QuantPoint::White,
        QuantPoint::Black,
        QuantPoint::Transform,
        QuantPoint::UsMul,
        QuantPoint::ThemMul,
        QuantPoint::CombineAdd,
        QuantPoint::Hidden1,
        QuantPoint::Hidden2,
        QuantPoint::Output,
    ];

    /// Stable name used when calibration state is stored alongside the weights.
    pub fn name(self) -> &'static str {
        match self {
            QuantPoint::Us => "quant.us",
            QuantPoint::Them => "quant.them",
            QuantPoint::White => "quant.white",
            QuantPoint::Black => "quant.black",
            QuantPoint::Transform => "input",
            QuantPoint::UsMul => "input_mul.us",
            QuantPoint::ThemMul => "input_mul.them",
            QuantPoint::CombineAdd => "input_add",
            QuantPoint::Hidden1 => "l1",
            QuantPoint::Hidden2 => "l2",
            QuantPoint::Output => "output",
        }
    }

    /// Whether the op producing this point has its ReLU folded in.
    pub fn fuses_relu(self) -> bool {
        matches!(
            self,
            QuantPoint::CombineAdd | QuantPoint::Hidden1 | QuantPoint::Hidden2
        )
    }
}

/// Points whose outputs feed the same fused add and must share one scale.
pub const SHARED_SCALE_GROUPS: &[&[QuantPoint]] = &[&[QuantPoint::UsMul, QuantPoint::ThemMul]];

/// The shared-scale group containing `point`, if any.
pub fn shared_scale_group(point: QuantPoint) -> Option<&'static [QuantPoint]> {
    SHARED_SCALE_GROUPS
        .iter()
        .copied()
        .find(|group| group.contains(&point))
}
