use ahash::AHashMap;
use candle_core::{bail, Result, Tensor};

use crate::batch::Batch;
use crate::network::{Network, Probe};

use super::network::QuantizedNetwork;
use super::observer::{MinMaxObserver, Observer};
use super::params::{QDType, QuantParams};
use super::{shared_scale_group, QuantPoint};

/// A float network running in observer mode.
///
/// Forward passes produce the same float output as `Network::forward` while
/// collecting statistics at every `QuantPoint`. Only this state can be
/// converted into a `QuantizedNetwork`.
pub struct CalibratingNetwork<O: Observer = MinMaxObserver> {
    network: Network,
    observers: AHashMap<QuantPoint, O>,
    batches: usize,
}

struct Recorder<'a, O: Observer> {
    observers: &'a mut AHashMap<QuantPoint, O>,
}

impl<O: Observer> Probe for Recorder<'_, O> {
    fn record(&mut self, point: QuantPoint, values: &Tensor) -> Result<()> {
        self.observers
            .entry(point)
            .or_insert_with(|| O::new(QDType::QUInt8))
            .observe(values)
    }
}

impl Network {
    /// Moves the float network into calibration.
    pub fn prepare<O: Observer>(self) -> CalibratingNetwork<O> {
        log::info!("Preparing network for calibration");
        CalibratingNetwork {
            network: self,
            observers: AHashMap::new(),
            batches: 0,
        }
    }
}

impl<O: Observer> CalibratingNetwork<O> {
    pub fn observe(
        &mut self,
        us: &Tensor,
        them: &Tensor,
        white: &Tensor,
        black: &Tensor,
    ) -> Result<Tensor> {
        let mut recorder = Recorder {
            observers: &mut self.observers,
        };
        let output = self
            .network
            .forward_probed(us, them, white, black, &mut recorder)?;

        self.batches += 1;
        log::debug!("Observed calibration batch {}", self.batches);
        Ok(output)
    }

    pub fn observe_batch(&mut self, batch: &Batch) -> Result<Tensor> {
        self.observe(&batch.us, &batch.them, &batch.white, &batch.black)
    }

    pub fn batches_observed(&self) -> usize {
        self.batches
    }

    pub fn network(&self) -> &Network {
        &self.network
    }

    /// Abandons calibration and returns the float network.
    pub fn into_float(self) -> Network {
        self.network
    }

    /// Activation params at `point`. Points in a shared-scale group use the
    /// union of the group's statistics.
    pub fn qparams(&self, point: QuantPoint) -> Result<QuantParams> {
        let members = shared_scale_group(point).unwrap_or(std::slice::from_ref(&point));

        let mut merged: Option<O> = None;
        for member in members {
            let Some(observer) = self.observers.get(member) else {
                bail!("no statistics recorded at {}", member.name());
            };
            match merged.as_mut() {
                Some(m) => m.merge(observer),
                None => merged = Some(observer.clone()),
            }
        }

        match merged {
            Some(observer) => observer.qparams(),
            None => bail!("no statistics recorded at {}", point.name()),
        }
    }

    /// Converts weights and activations to integers using the statistics so
    /// far. The float network and its observers are left untouched.
    pub fn convert(&self) -> Result<QuantizedNetwork> {
        if self.batches == 0 {
            bail!("cannot quantize before at least one calibration batch was observed");
        }

        let quantized = QuantizedNetwork::build(
            &self.network,
            |point| self.qparams(point),
            |linear| {
                let mut observer = O::new(QDType::QInt8);
                observer.observe(linear.weight())?;
                observer.qparams()
            },
        )?;

        log::info!(
            "Quantized network after {} calibration batches",
            self.batches
        );
        Ok(quantized)
    }
}
