pub mod adadelta;
pub mod loss;
pub mod metrics;
pub mod trainer;

pub use adadelta::{Adadelta, AdadeltaParams};
pub use loss::{cp_conversion, eval_loss, CP_ALPHA};
pub use metrics::{MetricsTracker, Stage, StageLosses};
pub use trainer::Trainer;
