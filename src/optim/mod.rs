//! Optimizer selected by [`OptimizerKind`].

pub mod adam;


pub use adam::{Adam, ParamsAdam};

use std::collections::HashMap;

use candle_core::{Tensor, Var};
use candle_nn::{Optimizer, SGD, VarMap};

use crate::config::OptimizerKind;

/// Tensors keyed by name, as stored in a safetensors file.
pub type NamedTensors = HashMap<String, Tensor>;

/// Either Adam (no weight decay) or plain SGD.
///
/// `backward_step` recomputes gradients from zero on every call, so there is
/// no separate `zero_grad`.
#[derive(Debug)]
pub enum TrainOptimizer {
    Adam(Adam),
    Sgd(SGD),
}

impl TrainOptimizer {
    /// Optimizer over every variable of `var_map`.
    pub fn new(kind: OptimizerKind, var_map: &VarMap, lr: f64) -> candle_core::Result<Self> {
        match kind {
            OptimizerKind::Adam => {
                let params = ParamsAdam {
                    lr,
                    ..Default::default()
                };
                Ok(Self::Adam(Adam::new(named_vars(var_map)?, params)?))
            }
            OptimizerKind::Sgd => Ok(Self::Sgd(SGD::new(var_map.all_vars(), lr)?)),
        }
    }

    pub fn kind(&self) -> OptimizerKind {
        match self {
            Self::Adam(_) => OptimizerKind::Adam,
            Self::Sgd(_) => OptimizerKind::Sgd,
        }
    }

    /// Back-propagates `loss` and applies one update.
    pub fn backward_step(&mut self, loss: &Tensor) -> candle_core::Result<()> {
        match self {
            Self::Adam(opt) => opt.backward_step(loss),
            Self::Sgd(opt) => opt.backward_step(loss),
        }
    }

    pub fn learning_rate(&self) -> f64 {
        match self {
            Self::Adam(opt) => opt.learning_rate(),
            Self::Sgd(opt) => opt.learning_rate(),
        }
    }

    /// Internal buffers a checkpoint needs to resume exactly. SGD has none.
    pub fn state(&self) -> candle_core::Result<NamedTensors> {
        match self {
            Self::Adam(opt) => opt.state(),
            Self::Sgd(_) => Ok(NamedTensors::new()),
        }
    }

    pub fn load_state(&mut self, state: &NamedTensors) -> candle_core::Result<()> {
        match self {
            Self::Adam(opt) => opt.load_state(state),
            Self::Sgd(_) => Ok(()),
        }
    }
}

fn named_vars(var_map: &VarMap) -> candle_core::Result<Vec<(String, Var)>> {
    let Ok(data) = var_map.data().lock() else {
        candle_core::bail!("variable map lock poisoned");
    };
    Ok(data
        .iter()
        .map(|(name, var)| (name.clone(), var.clone()))
        .collect())
}
