use clap::Parser;

#[derive(Parser, Debug, Clone)]
#[command(name = "NNUE Quantization Check")]
#[command(version = "0.1.0")]
pub struct Args {
    /// Feature vector width per side.
    #[arg(long, default_value_t = 768)]
    pub inputs: usize,

    /// Feature transformer width.
    #[arg(long, default_value_t = 64)]
    pub l1: usize,

    #[arg(long, default_value_t = 16)]
    pub l2: usize,

    #[arg(long, default_value_t = 16)]
    pub l3: usize,

    /// Active features per side in generated positions.
    #[arg(long, default_value_t = 24)]
    pub active: usize,

    /// Number of positions per training batch.
    #[arg(long, default_value_t = 256)]
    pub batch_size: usize,

    /// Maximum number of training epochs.
    #[arg(long, default_value_t = 20)]
    pub epochs: usize,

    #[arg(long, default_value_t = 50)]
    pub batches_per_epoch: usize,

    /// Batches held out for validation and for the final test.
    #[arg(long, default_value_t = 4)]
    pub eval_batches: usize,

    /// Batches observed before converting to integers.
    #[arg(long, default_value_t = 8)]
    pub calibration_batches: usize,

    /// Epochs without improvement before early stopping.
    #[arg(long, default_value_t = 3)]
    pub patience: u64,

    #[arg(long, default_value_t = 42)]
    pub seed: u64,

    /// Train on the CPU even when an accelerator is available.
    #[arg(long)]
    pub cpu: bool,

    /// Worker threads for batched quantized inference. Defaults to all cores.
    #[arg(long)]
    pub threads: Option<usize>,
}
