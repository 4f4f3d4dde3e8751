//! Adam whose moment estimates can be saved and restored.
//!
//! ```text
//! m ← β1·m + (1-β1)·g
//! v ← β2·v + (1-β2)·g²
//! θ ← θ - lr · (m / (1-β1ᵗ)) / (√(v / (1-β2ᵗ)) + ε)
//! ```

use candle_core::backprop::GradStore;
use candle_core::{DType, Device, Result, Tensor, Var};

use super::NamedTensors;

/// Key of the step counter in [`Adam::state`].
pub const STEP_KEY: &str = "t";

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParamsAdam {
    pub lr: f64,
    pub beta1: f64,
    pub beta2: f64,
    pub eps: f64,
}

impl Default for ParamsAdam {
    fn default() -> Self {
        Self {
            lr: 1e-3,
            beta1: 0.9,
            beta2: 0.999,
            eps: 1e-8,
        }
    }
}

#[derive(Debug)]
struct Slot {
    name: String,
    var: Var,
    m: Tensor,
    v: Tensor,
}

/// Adam over named variables. Moments are keyed by variable name so they
/// survive a round trip through a checkpoint.
#[derive(Debug)]
pub struct Adam {
    slots: Vec<Slot>,
    params: ParamsAdam,
    step_t: u64,
}

impl Adam {
    pub fn new(vars: Vec<(String, Var)>, params: ParamsAdam) -> Result<Self> {
        let mut slots = vars
            .into_iter()
            .filter(|(_, var)| var.dtype().is_float())
            .map(|(name, var)| {
                Ok(Slot {
                    m: var.zeros_like()?,
                    v: var.zeros_like()?,
                    name,
                    var,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        slots.sort_by(|a, b| a.name.cmp(&b.name));

        Ok(Self {
            slots,
            params,
            step_t: 0,
        })
    }

    pub fn learning_rate(&self) -> f64 {
        self.params.lr
    }

    pub fn step(&mut self, grads: &GradStore) -> Result<()> {
        self.step_t += 1;
        let ParamsAdam {
            lr,
            beta1,
            beta2,
            eps,
        } = self.params;
        let t = i32::try_from(self.step_t).unwrap_or(i32::MAX);
        let m_scale = 1.0 / (1.0 - beta1.powi(t));
        let v_scale = 1.0 / (1.0 - beta2.powi(t));

        for slot in &mut self.slots {
            let Some(grad) = grads.get(slot.var.as_tensor()) else {
                continue;
            };
            // Moments never join the autograd graph.
            let grad = grad.detach();
            let m = slot.m.affine(beta1, 0.0)?.add(&grad.affine(1.0 - beta1, 0.0)?)?;
            let v = slot.v.affine(beta2, 0.0)?.add(&grad.sqr()?.affine(1.0 - beta2, 0.0)?)?;

            let denom = v.affine(v_scale, 0.0)?.sqrt()?.affine(1.0, eps)?;
            let update = m.affine(m_scale * lr, 0.0)?.div(&denom)?;
            slot.var.set(&slot.var.as_tensor().sub(&update)?)?;

            slot.m = m;
            slot.v = v;
        }
        Ok(())
    }

    pub fn backward_step(&mut self, loss: &Tensor) -> Result<()> {
        let grads = loss.backward()?;
        self.step(&grads)
    }

    /// Deep copies of the moments (`m.<var>`, `v.<var>`) and the step counter.
    pub fn state(&self) -> Result<NamedTensors> {
        let mut state = NamedTensors::with_capacity(2 * self.slots.len() + 1);
        for slot in &self.slots {
            state.insert(format!("m.{}", slot.name), slot.m.copy()?);
            state.insert(format!("v.{}", slot.name), slot.v.copy()?);
        }
        state.insert(
            STEP_KEY.to_string(),
            Tensor::new(&[self.step_t as f64], &Device::Cpu)?,
        );
        Ok(state)
    }

    /// Replaces the moments and step counter with `state` from [`Adam::state`].
    pub fn load_state(&mut self, state: &NamedTensors) -> Result<()> {
        let step = entry(state, STEP_KEY)?
            .to_dtype(DType::F64)?
            .flatten_all()?
            .get(0)?
            .to_scalar::<f64>()?;

        for slot in &mut self.slots {
            let m = moment(state, &format!("m.{}", slot.name), &slot.var)?;
            let v = moment(state, &format!("v.{}", slot.name), &slot.var)?;
            slot.m = m;
            slot.v = v;
        }
        self.step_t = step as u64;
        Ok(())
    }
}

fn entry<'a>(state: &'a NamedTensors, key: &str) -> Result<&'a Tensor> {
    match state.get(key) {
        Some(tensor) => Ok(tensor),
        None => candle_core::bail!("optimizer state has no `{key}`"),
    }
}

fn moment(state: &NamedTensors, key: &str, var: &Var) -> Result<Tensor> {
    let saved = entry(state, key)?;
    if saved.dims() != var.dims() {
        candle_core::bail!(
            "optimizer state `{key}` has shape {:?}, variable has {:?}",
            saved.dims(),
            var.dims()
        );
    }
    saved.to_device(var.device())?.to_dtype(var.dtype())?.copy()
}
