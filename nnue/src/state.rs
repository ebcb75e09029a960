use std::fmt;

use candle_core::{Error, Result, Tensor};

use crate::network::{Dims, Network};
use crate::quant::{CalibratingNetwork, MinMaxObserver, Observer, QuantizedNetwork};

/// Lifecycle of the model: trained in float, observed during calibration,
/// then frozen into integers. Each state is a distinct type, so the quantized
/// path cannot run on parameters that were never calibrated.
pub enum Model<O: Observer = MinMaxObserver> {
    Float(Network),
    Calibrating(CalibratingNetwork<O>),
    Quantized(QuantizedNetwork),
}

/// A refused state transition. Carries the model back unchanged.
pub struct TransitionError<O: Observer = MinMaxObserver> {
    model: Model<O>,
    error: Error,
}

impl<O: Observer> TransitionError<O> {
    pub fn into_model(self) -> Model<O> {
        self.model
    }

    pub fn error(&self) -> &Error {
        &self.error
    }
}

impl<O: Observer> fmt::Debug for TransitionError<O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransitionError")
            .field("state", &self.model.name())
            .field("error", &self.error)
            .finish()
    }
}

impl<O: Observer> fmt::Display for TransitionError<O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} model: {}", self.model.name(), self.error)
    }
}

impl<O: Observer> std::error::Error for TransitionError<O> {}

impl<O: Observer> Model<O> {
    pub fn name(&self) -> &'static str {
        match self {
            Model::Float(_) => "float",
            Model::Calibrating(_) => "calibrating",
            Model::Quantized(_) => "quantized",
        }
    }

    pub fn dims(&self) -> Dims {
        match self {
            Model::Float(net) => net.dims(),
            Model::Calibrating(net) => net.network().dims(),
            Model::Quantized(net) => net.dims(),
        }
    }

    /// Scalar score per row, shape `(N, 1)`. While calibrating, also records
    /// statistics.
    pub fn forward(
        &mut self,
        us: &Tensor,
        them: &Tensor,
        white: &Tensor,
        black: &Tensor,
    ) -> Result<Tensor> {
        match self {
            Model::Float(net) => net.forward(us, them, white, black),
            Model::Calibrating(net) => net.observe(us, them, white, black),
            Model::Quantized(net) => net.forward(us, them, white, black),
        }
    }

    /// Float -> Calibrating.
    pub fn begin_calibration(self) -> std::result::Result<Self, TransitionError<O>> {
        match self {
            Model::Float(net) => Ok(Model::Calibrating(net.prepare())),
            other => Err(other.refuse("cannot begin calibration")),
        }
    }

    /// Calibrating -> Quantized. On failure the model stays calibrating and
    /// can observe more batches.
    pub fn quantize(self) -> std::result::Result<Self, TransitionError<O>> {
        match self {
            Model::Calibrating(net) => match net.convert() {
                Ok(quantized) => Ok(Model::Quantized(quantized)),
                Err(error) => Err(TransitionError {
                    model: Model::Calibrating(net),
                    error,
                }),
            },
            other => Err(other.refuse("cannot quantize")),
        }
    }

    fn refuse(self, action: &str) -> TransitionError<O> {
        let error = Error::Msg(format!("{action} a {} model", self.name()));
        TransitionError { model: self, error }
    }
}

impl<O: Observer> From<Network> for Model<O> {
    fn from(network: Network) -> Self {
        Model::Float(network)
    }
}
