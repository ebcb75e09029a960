use candle_core::{DType, Device, Result};
use candle_nn::{Optimizer, VarBuilder, VarMap};

use crate::batch::Batch;
use crate::network::{Dims, Network};

use super::adadelta::{Adadelta, AdadeltaParams};
use super::loss::eval_loss;
use super::metrics::{Stage, StageLosses};

/// Owns the float network, its parameters and the optimizer state.
///
/// Each training step runs forward and backward over the whole batch, then
/// updates every parameter once before the next batch is read.
pub struct Trainer {
    network: Network,
    varmap: VarMap,
    optimizer: Adadelta,
    losses: StageLosses,
}

impl Trainer {
    pub fn new(dims: Dims, params: AdadeltaParams, device: &Device) -> Result<Self> {
        let varmap = VarMap::new();
        let vs = VarBuilder::from_varmap(&varmap, DType::F32, device);
        let network = Network::new(dims, &vs)?;
        let optimizer = Adadelta::new(varmap.all_vars(), params)?;

        log::info!(
            "Created network {}x{} -> {} -> {} -> 1 with {} parameter tensors",
            dims.inputs,
            dims.l1,
            dims.l2,
            dims.l3,
            optimizer.num_vars()
        );

        Ok(Self {
            network,
            varmap,
            optimizer,
            losses: StageLosses::default(),
        })
    }

    /// Loss for one batch, recorded under the stage's metric.
    /// Gradients are applied only for `Stage::Train`.
    pub fn step(&mut self, batch: &Batch, stage: Stage) -> Result<f32> {
        let preds = self
            .network
            .forward(&batch.us, &batch.them, &batch.white, &batch.black)?;
        let loss = eval_loss(&preds, &batch.score)?;

        if stage.applies_gradients() {
            self.optimizer.backward_step(&loss)?;
        }

        let loss = loss.to_scalar::<f32>()?;
        self.losses.record(stage, loss);
        log::debug!("{}: {:.6}", stage.metric_name(), loss);

        Ok(loss)
    }

    pub fn training_step(&mut self, batch: &Batch) -> Result<f32> {
        self.step(batch, Stage::Train)
    }

    pub fn validation_step(&mut self, batch: &Batch) -> Result<f32> {
        self.step(batch, Stage::Validation)
    }

    pub fn test_step(&mut self, batch: &Batch) -> Result<f32> {
        self.step(batch, Stage::Test)
    }

    pub fn mean_loss(&self, stage: Stage) -> Option<f32> {
        self.losses.mean(stage)
    }

    /// Logs the epoch's mean losses and starts the next epoch from zero.
    pub fn end_epoch(&mut self, epoch: usize) -> (Option<f32>, Option<f32>) {
        let train = self.losses.mean(Stage::Train);
        let val = self.losses.mean(Stage::Validation);

        for stage in [Stage::Train, Stage::Validation] {
            if let Some(loss) = self.losses.mean(stage) {
                log::info!("epoch {epoch} {}: {:.6}", stage.metric_name(), loss);
            }
            self.losses.reset(stage);
        }

        (train, val)
    }

    pub fn network(&self) -> &Network {
        &self.network
    }

    pub fn varmap(&self) -> &VarMap {
        &self.varmap
    }

    pub fn optimizer(&self) -> &Adadelta {
        &self.optimizer
    }

    pub fn into_network(self) -> Network {
        self.network
    }
}
