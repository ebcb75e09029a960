/// Which pass a loss belongs to. Only training applies gradients.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Stage {
    Train,
    Validation,
    Test,
}

impl Stage {
    pub const ALL: [Stage; 3] = [Stage::Train, Stage::Validation, Stage::Test];

    pub fn metric_name(self) -> &'static str {
        match self {
            Stage::Train => "train_loss",
            Stage::Validation => "val_loss",
            Stage::Test => "test_loss",
        }
    }

    pub fn applies_gradients(self) -> bool {
        matches!(self, Stage::Train)
    }
}

#[derive(Clone, Copy, Debug, Default)]
struct RunningLoss {
    sum: f64,
    count: usize,
}

/// Running mean loss per stage.
#[derive(Clone, Debug, Default)]
pub struct StageLosses {
    losses: [RunningLoss; 3],
}

impl StageLosses {
    pub fn record(&mut self, stage: Stage, loss: f32) {
        let running = &mut self.losses[stage as usize];
        running.sum += loss as f64;
        running.count += 1;
    }

    pub fn mean(&self, stage: Stage) -> Option<f32> {
        let running = &self.losses[stage as usize];
        (running.count > 0).then(|| (running.sum / running.count as f64) as f32)
    }

    pub fn count(&self, stage: Stage) -> usize {
        self.losses[stage as usize].count
    }

    pub fn reset(&mut self, stage: Stage) {
        self.losses[stage as usize] = RunningLoss::default();
    }
}

pub struct MetricsTracker {
    best_val_loss: f32,
    epochs_no_improve: u64,
    patience: u64,
}

impl MetricsTracker {
    pub fn new(patience: u64) -> Self {
        Self {
            best_val_loss: f32::MAX,
            epochs_no_improve: 0,
            patience,
        }
    }

    // Returns if model improved (lowest val loss)
    pub fn update(&mut self, val_loss: f32) -> bool {
        if val_loss < self.best_val_loss {
            self.best_val_loss = val_loss;
            self.epochs_no_improve = 0;
            true
        } else {
            self.epochs_no_improve += 1;
            false
        }
    }

    pub fn should_stop(&self) -> bool {
        self.epochs_no_improve >= self.patience
    }

    pub fn best_val_loss(&self) -> Option<f32> {
        (self.best_val_loss < f32::MAX).then_some(self.best_val_loss)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metric_names() {
        assert_eq!(Stage::Train.metric_name(), "train_loss");
        assert_eq!(Stage::Validation.metric_name(), "val_loss");
        assert_eq!(Stage::Test.metric_name(), "test_loss");
        assert!(Stage::Train.applies_gradients());
        assert!(!Stage::Validation.applies_gradients());
        assert!(!Stage::Test.applies_gradients());
    }

    #[test]
    fn test_stage_losses_are_independent() {
        let mut losses = StageLosses::default();
        losses.record(Stage::Train, 1.0);
        losses.record(Stage::Train, 3.0);
        losses.record(Stage::Validation, 0.5);

        assert_eq!(losses.mean(Stage::Train), Some(2.0));
        assert_eq!(losses.mean(Stage::Validation), Some(0.5));
        assert_eq!(losses.mean(Stage::Test), None);

        losses.reset(Stage::Train);
        assert_eq!(losses.count(Stage::Train), 0);
        assert_eq!(losses.mean(Stage::Validation), Some(0.5));
    }

    #[test]
    fn test_early_stopping() {
        let mut tracker = MetricsTracker::new(2);
        assert!(tracker.update(1.0));
        assert!(tracker.update(0.8));
        assert!(!tracker.update(0.9));
        assert!(!tracker.should_stop());
        assert!(!tracker.update(0.85));
        assert!(tracker.should_stop());
        assert_eq!(tracker.best_val_loss(), Some(0.8));
    }
}
