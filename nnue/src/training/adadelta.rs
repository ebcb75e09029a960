use candle_core::backprop::GradStore;
use candle_core::{Result, Var};
use candle_nn::Optimizer;

/// Adadelta hyperparameters.
///
/// `lr` scales the already-normalized per-parameter update; 1.0 applies the
/// update as computed.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AdadeltaParams {
    pub lr: f64,
    pub rho: f64,
    pub eps: f64,
    pub weight_decay: f64,
}

impl Default for AdadeltaParams {
    fn default() -> Self {
        Self {
            lr: 1.0,
            rho: 0.9,
            eps: 1e-6,
            weight_decay: 0.0,
        }
    }
}

// Per-parameter running averages
#[derive(Debug)]
struct VarAdadelta {
    var: Var,
    square_avg: Var,
    acc_delta: Var,
}

/// Adaptive optimizer whose state is owned here and updated once per step.
#[derive(Debug)]
pub struct Adadelta {
    vars: Vec<VarAdadelta>,
    params: AdadeltaParams,
    steps: usize,
}

impl Adadelta {
    pub fn params(&self) -> &AdadeltaParams {
        &self.params
    }

    pub fn steps(&self) -> usize {
        self.steps
    }

    pub fn num_vars(&self) -> usize {
        self.vars.len()
    }
}

impl Optimizer for Adadelta {
    type Config = AdadeltaParams;

    fn new(vars: Vec<Var>, params: AdadeltaParams) -> Result<Self> {
        let vars = vars
            .into_iter()
            .filter(|var| var.dtype().is_float())
            .map(|var| -> Result<VarAdadelta> {
                let dtype = var.dtype();
                let shape = var.shape();
                let device = var.device();
                let square_avg = Var::zeros(shape, dtype, device)?;
                let acc_delta = Var::zeros(shape, dtype, device)?;
                Ok(VarAdadelta {
                    var,
                    square_avg,
                    acc_delta,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            vars,
            params,
            steps: 0,
        })
    }

    fn learning_rate(&self) -> f64 {
        self.params.lr
    }

    fn set_learning_rate(&mut self, lr: f64) {
        self.params.lr = lr;
    }

    fn step(&mut self, grads: &GradStore) -> Result<()> {
        let AdadeltaParams {
            lr,
            rho,
            eps,
            weight_decay,
        } = self.params;

        for var in self.vars.iter() {
            let theta = &var.var;
            let Some(grad) = grads.get(theta) else {
                continue;
            };

            let grad = if weight_decay != 0.0 {
                grad.add(&theta.affine(weight_decay, 0.0)?)?
            } else {
                grad.clone()
            };

            // E[g^2] = rho * E[g^2] + (1 - rho) * g^2
            let square_avg = var
                .square_avg
                .affine(rho, 0.0)?
                .add(&grad.sqr()?.affine(1.0 - rho, 0.0)?)?;

            // delta = sqrt(E[dx^2] + eps) / sqrt(E[g^2] + eps) * g
            let std = square_avg.affine(1.0, eps)?.sqrt()?;
            let delta = var
                .acc_delta
                .affine(1.0, eps)?
                .sqrt()?
                .div(&std)?
                .mul(&grad)?;

            // E[dx^2] = rho * E[dx^2] + (1 - rho) * delta^2
            let acc_delta = var
                .acc_delta
                .affine(rho, 0.0)?
                .add(&delta.sqr()?.affine(1.0 - rho, 0.0)?)?;

            theta.set(&theta.sub(&delta.affine(lr, 0.0)?)?)?;
            var.square_avg.set(&square_avg)?;
            var.acc_delta.set(&acc_delta)?;
        }

        self.steps += 1;
        Ok(())
    }
}
