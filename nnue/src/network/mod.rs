pub mod config;
pub mod model;
pub mod perspective;
pub mod transformer;

pub use config::Dims;
pub use model::{Network, Probe};
pub use perspective::PerspectiveCombiner;
pub use transformer::FeatureTransformer;

/// Number of halfkp input features per side: 64 king squares times
/// (64 squares * 10 non-king pieces + 1).
pub const HALFKP_INPUTS: usize = 64 * (64 * 10 + 1);

/// Width of each side's embedding.
pub const L1: usize = 256;

/// Width of the first hidden layer.
pub const L2: usize = 32;

/// Width of the second hidden layer.
pub const L3: usize = 32;
