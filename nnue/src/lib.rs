pub mod batch;
pub mod features;
pub mod network;
pub mod quant;
pub mod state;
pub mod training;

pub use batch::Batch;
pub use features::{FeatureVector, Perspective, Sample};
pub use network::{Dims, Network};
pub use quant::{CalibratingNetwork, QuantizedNetwork};
pub use state::{Model, TransitionError};

#[cfg(test)]
mod tests;
