mod args;
mod device;
mod progress;
mod synthetic;

use args::Args;
use candle_core::Device;
use clap::Parser;
use log::LevelFilter;
use nnue::training::{AdadeltaParams, MetricsTracker, Stage, Trainer};
use nnue::{Batch, Dims, Model, Network};
use progress::TrainingProgressBar;
use simplelog::{Config, SimpleLogger};
use std::{
    error::Error,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};
use synthetic::Synthetic;

fn main() -> Result<(), Box<dyn Error>> {
    let args = init()?;

    // Set up SIGINT handler
    let stop_flag = Arc::new(AtomicBool::new(false));
    let stop_flag_handler = Arc::clone(&stop_flag);

    ctrlc::set_handler(move || {
        log::info!("Received SIGINT, stopping training...");
        stop_flag_handler.store(true, Ordering::Relaxed);
    })?;

    let threads = args.threads.unwrap_or_else(num_cpus::get);
    rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .build_global()?;

    let device = device::select_device(args.cpu)?;
    log::info!("Using {} with {} inference threads", device::describe(&device), threads);

    let dims = Dims::new(args.inputs, args.l1, args.l2, args.l3)?;
    let mut data = Synthetic::new(dims.inputs, args.active, args.seed);
    let validation = eval_batches(&mut data, &args, &device)?;
    let test = eval_batches(&mut data, &args, &device)?;

    let mut model: Model =
        train(&args, dims, &mut data, &validation, &test, &device, &stop_flag)?.into();
    let float_outputs = forward_all(&mut model, &test)?;

    log::info!("Calibrating on {} batches", args.calibration_batches);
    let mut model = model.begin_calibration()?;
    for _ in 0..args.calibration_batches.max(1) {
        let batch = data.batch(args.batch_size, &device)?;
        model.forward(&batch.us, &batch.them, &batch.white, &batch.black)?;
    }

    let mut model = model.quantize()?;
    if let Model::Quantized(quantized) = &model {
        for (name, params) in quantized.calibration() {
            log::info!(
                "{name}: scale {:.6}, zero point {}",
                params.scale,
                params.zero_point
            );
        }
    }

    let quantized_outputs = forward_all(&mut model, &test)?;
    compare(&float_outputs, &quantized_outputs);
    check_symmetry(&mut model, &mut data, &args, &device)?;

    log::info!("Done!");
    Ok(())
}

fn init() -> Result<Args, Box<dyn Error>> {
    let args = Args::parse();
    SimpleLogger::init(LevelFilter::Info, Config::default())?;

    Ok(args)
}

fn eval_batches(
    data: &mut Synthetic,
    args: &Args,
    device: &Device,
) -> candle_core::Result<Vec<Batch>> {
    (0..args.eval_batches.max(1))
        .map(|_| data.batch(args.batch_size, device))
        .collect()
}

fn train(
    args: &Args,
    dims: Dims,
    data: &mut Synthetic,
    validation: &[Batch],
    test: &[Batch],
    device: &Device,
    stop_flag: &AtomicBool,
) -> Result<Network, Box<dyn Error>> {
    let mut trainer = Trainer::new(dims, AdadeltaParams::default(), device)?;
    let mut tracker = MetricsTracker::new(args.patience);

    for epoch in 1..=args.epochs {
        let progress = TrainingProgressBar::new(args.batches_per_epoch)?;

        for _ in 0..args.batches_per_epoch {
            if stop_flag.load(Ordering::Relaxed) {
                break;
            }
            let batch = data.batch(args.batch_size, device)?;
            progress.update(trainer.training_step(&batch)?);
        }

        for batch in validation {
            trainer.validation_step(batch)?;
        }

        let (train_loss, val_loss) = trainer.end_epoch(epoch);
        let val_loss = val_loss.unwrap_or(f32::MAX);
        progress.finish(val_loss, train_loss.unwrap_or(f32::NAN));

        if stop_flag.load(Ordering::Relaxed) {
            log::info!("Stopping after {} epochs", epoch);
            break;
        }
        tracker.update(val_loss);
        if tracker.should_stop() {
            log::info!("Early stopping after {} epochs", epoch);
            break;
        }
    }

    for batch in test {
        trainer.test_step(batch)?;
    }
    if let Some(loss) = trainer.mean_loss(Stage::Test) {
        log::info!("{}: {:.6}", Stage::Test.metric_name(), loss);
    }

    Ok(trainer.into_network())
}

fn forward_all(model: &mut Model, batches: &[Batch]) -> candle_core::Result<Vec<f32>> {
    let mut outputs = Vec::new();
    for batch in batches {
        let out = model.forward(&batch.us, &batch.them, &batch.white, &batch.black)?;
        outputs.extend(out.flatten_all()?.to_vec1::<f32>()?);
    }
    Ok(outputs)
}

fn compare(float: &[f32], quantized: &[f32]) {
    let errors: Vec<f32> = float
        .iter()
        .zip(quantized)
        .map(|(f, q)| (f - q).abs())
        .collect();
    let max = errors.iter().cloned().fold(0.0, f32::max);
    let mean = errors.iter().sum::<f32>() / errors.len().max(1) as f32;

    log::info!(
        "Quantized vs float over {} positions: mean error {:.5}, max error {:.5}",
        errors.len(),
        mean,
        max
    );
}

// Swapping indicators and feature vectors must not change the evaluation.
fn check_symmetry(
    model: &mut Model,
    data: &mut Synthetic,
    args: &Args,
    device: &Device,
) -> Result<(), Box<dyn Error>> {
    let samples = data.samples(args.batch_size)?;
    let swapped: Vec<_> = samples.iter().map(|s| s.swapped()).collect();

    let outputs = forward_all(model, &[Batch::from_samples(&samples, args.inputs, device)?])?;
    let mirrored = forward_all(model, &[Batch::from_samples(&swapped, args.inputs, device)?])?;

    let mismatches = outputs
        .iter()
        .zip(&mirrored)
        .filter(|(a, b)| a != b)
        .count();
    if mismatches > 0 {
        log::warn!(
            "{} of {} {} evaluations changed when sides were swapped",
            mismatches,
            outputs.len(),
            model.name()
        );
    } else {
        log::info!("{} evaluations are side-symmetric", model.name());
    }
    Ok(())
}
