use candle_core::{Device, Result};

use super::random_samples;
use crate::features::{FeatureVector, Perspective, Sample};
use crate::batch::Batch;
use crate::network::Dims;
use crate::training::{AdadeltaParams, Stage, Trainer};

fn setup() -> Result<(Trainer, Batch)> {
    let dims = Dims::new(16, 8, 4, 4)?;
    let trainer = Trainer::new(dims, AdadeltaParams::default(), &Device::Cpu)?;
    let batch = Batch::from_samples(&random_samples(dims, 64, 3, 21), dims.inputs, &Device::Cpu)?;
    Ok((trainer, batch))
}

fn snapshot(trainer: &Trainer) -> Result<Vec<Vec<f32>>> {
    let data = trainer.varmap().data().lock().unwrap();
    let mut names: Vec<&String> = data.keys().collect();
    names.sort();
    let values = names
        .into_iter()
        .map(|name| data[name].as_tensor().flatten_all()?.to_vec1::<f32>())
        .collect::<Result<Vec<_>>>()?;
    Ok(values)
}

#[test]
fn test_training_reduces_loss() -> Result<()> {
    let (mut trainer, batch) = setup()?;

    let before = trainer.validation_step(&batch)?;
    for _ in 0..300 {
        trainer.training_step(&batch)?;
    }
    let after = trainer.validation_step(&batch)?;

    assert!(after < before, "loss went from {before} to {after}");
    assert_eq!(trainer.optimizer().steps(), 300);
    Ok(())
}

#[test]
fn test_only_training_updates_parameters() -> Result<()> {
    let (mut trainer, batch) = setup()?;
    let initial = snapshot(&trainer)?;

    trainer.validation_step(&batch)?;
    trainer.test_step(&batch)?;
    assert_eq!(snapshot(&trainer)?, initial);
    assert_eq!(trainer.optimizer().steps(), 0);

    trainer.training_step(&batch)?;
    assert_ne!(snapshot(&trainer)?, initial);
    Ok(())
}

#[test]
fn test_losses_are_tracked_per_stage() -> Result<()> {
    let (mut trainer, batch) = setup()?;

    let train = trainer.training_step(&batch)?;
    let val = trainer.validation_step(&batch)?;
    let test = trainer.test_step(&batch)?;
    for loss in [train, val, test] {
        assert!(loss.is_finite() && loss >= 0.0, "loss {loss}");
    }

    assert_eq!(trainer.mean_loss(Stage::Train), Some(train));
    assert_eq!(trainer.mean_loss(Stage::Validation), Some(val));
    assert_eq!(trainer.mean_loss(Stage::Test), Some(test));

    let (epoch_train, epoch_val) = trainer.end_epoch(1);
    assert_eq!(epoch_train, Some(train));
    assert_eq!(epoch_val, Some(val));
    assert_eq!(trainer.mean_loss(Stage::Train), None);
    assert_eq!(trainer.mean_loss(Stage::Validation), None);
    assert_eq!(trainer.mean_loss(Stage::Test), Some(test));
    Ok(())
}

#[test]
fn test_optimizer_owns_every_parameter() -> Result<()> {
    let (trainer, _) = setup()?;
    assert_eq!(trainer.optimizer().num_vars(), 8);
    assert_eq!(trainer.optimizer().params().lr, 1.0);
    Ok(())
}

#[test]
fn test_non_finite_score_reaches_the_loss() -> Result<()> {
    let (mut trainer, _) = setup()?;
    let sample = Sample::new(
        Perspective::White,
        FeatureVector::new(16, [0, 3])?,
        FeatureVector::new(16, [7])?,
        0.5,
        f32::NAN,
    )?;
    let batch = Batch::from_samples(&[sample], 16, &Device::Cpu)?;

    let loss = trainer.validation_step(&batch)?;
    assert!(loss.is_nan());
    assert!(trainer.mean_loss(Stage::Validation).is_some_and(f32::is_nan));
    Ok(())
}
