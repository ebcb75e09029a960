use candle_core::{bail, Result};

/// Sparse binary feature vector for one side of a position.
///
/// Only the indices of active features are stored, sorted and de-duplicated.
/// The dimension is fixed by the feature encoder and must match the network's
/// input width.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FeatureVector {
    dim: usize,
    active: Vec<usize>,
}

impl FeatureVector {
    pub fn new(dim: usize, indices: impl IntoIterator<Item = usize>) -> Result<Self> {
        let mut active: Vec<usize> = indices.into_iter().collect();
        active.sort_unstable();
        active.dedup();

        if let Some(&last) = active.last() {
            if last >= dim {
                bail!("feature index {last} out of range for {dim} inputs");
            }
        }

        Ok(Self { dim, active })
    }

    pub fn empty(dim: usize) -> Self {
        Self {
            dim,
            active: Vec::new(),
        }
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn active(&self) -> &[usize] {
        &self.active
    }

    pub fn len(&self) -> usize {
        self.active.len()
    }

    pub fn is_empty(&self) -> bool {
        self.active.is_empty()
    }

    pub fn contains(&self, idx: usize) -> bool {
        self.active.binary_search(&idx).is_ok()
    }

    /// Activates `idx`. Returns false if it was already active.
    pub fn insert(&mut self, idx: usize) -> Result<bool> {
        if idx >= self.dim {
            bail!("feature index {idx} out of range for {} inputs", self.dim);
        }
        match self.active.binary_search(&idx) {
            Ok(_) => Ok(false),
            Err(pos) => {
                self.active.insert(pos, idx);
                Ok(true)
            }
        }
    }

    /// Deactivates `idx`. Returns false if it was not active.
    pub fn remove(&mut self, idx: usize) -> bool {
        match self.active.binary_search(&idx) {
            Ok(pos) => {
                self.active.remove(pos);
                true
            }
            Err(_) => false,
        }
    }

    /// Dense 0/1 row, the layout candle consumes.
    pub fn to_dense(&self) -> Vec<f32> {
        let mut dense = vec![0f32; self.dim];
        for &idx in &self.active {
            dense[idx] = 1.0;
        }
        dense
    }

    /// Calls `f(idx, is_active)` for every index whose state differs from `previous`.
    pub fn for_each_diff(&self, previous: &FeatureVector, mut f: impl FnMut(usize, bool)) {
        let (mut i, mut j) = (0, 0);
        let (new, old) = (&self.active, &previous.active);

        while i < new.len() && j < old.len() {
            match new[i].cmp(&old[j]) {
                std::cmp::Ordering::Less => {
                    f(new[i], true);
                    i += 1;
                }
                std::cmp::Ordering::Greater => {
                    f(old[j], false);
                    j += 1;
                }
                std::cmp::Ordering::Equal => {
                    i += 1;
                    j += 1;
                }
            }
        }

        new[i..].iter().for_each(|&idx| f(idx, true));
        old[j..].iter().for_each(|&idx| f(idx, false));
    }
}

/// Side to move. Decides which feature vector is "us" at the combine step.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Perspective {
    White,
    Black,
}

impl Perspective {
    /// The `(us, them)` indicator pair fed to the network.
    pub fn indicators(self) -> (f32, f32) {
        match self {
            Perspective::White => (1.0, 0.0),
            Perspective::Black => (0.0, 1.0),
        }
    }

    pub fn flip(self) -> Self {
        match self {
            Perspective::White => Perspective::Black,
            Perspective::Black => Perspective::White,
        }
    }
}

/// One training position: indicators, both sides' features and the targets.
/// `outcome` and `score` are only read by the loss.
#[derive(Clone, Debug)]
pub struct Sample {
    pub us: f32,
    pub them: f32,
    pub white: FeatureVector,
    pub black: FeatureVector,
    pub outcome: f32,
    pub score: f32,
}

impl Sample {
    pub fn new(
        side_to_move: Perspective,
        white: FeatureVector,
        black: FeatureVector,
        outcome: f32,
        score: f32,
    ) -> Result<Self> {
        if white.dim() != black.dim() {
            bail!(
                "white features have {} inputs but black features have {}",
                white.dim(),
                black.dim()
            );
        }

        let (us, them) = side_to_move.indicators();
        Ok(Self {
            us,
            them,
            white,
            black,
            outcome,
            score,
        })
    }

    pub fn inputs(&self) -> usize {
        self.white.dim()
    }

    /// Same position with indicators and feature vectors exchanged.
    /// The network must evaluate it identically.
    pub fn swapped(&self) -> Self {
        Self {
            us: self.them,
            them: self.us,
            white: self.black.clone(),
            black: self.white.clone(),
            outcome: self.outcome,
            score: self.score,
        }
    }
}
