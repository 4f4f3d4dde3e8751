use candle_core::Device;
use tracing::{info, warn};

use super::error::ModelError;
use crate::config::DeviceKind;

type Opener = fn() -> candle_core::Result<Device>;

#[cfg(feature = "metal")]
fn open_metal() -> candle_core::Result<Device> {
    Device::new_metal(0)
}

#[cfg(feature = "cuda")]
fn open_cuda() -> candle_core::Result<Device> {
    Device::new_cuda(0)
}

/// Accelerator backends compiled into this build, in `auto` preference order.
pub(crate) fn accelerators() -> Vec<(&'static str, Opener)> {
    #[allow(unused_mut)]
    let mut backends: Vec<(&'static str, Opener)> = Vec::new();
    #[cfg(feature = "metal")]
    backends.push(("metal", open_metal as Opener));
    #[cfg(feature = "cuda")]
    backends.push(("cuda", open_cuda as Opener));
    backends
}

/// Device that embeds and trains for a `--device` preference.
///
/// `auto` opens the first accelerator that works and trains on CPU when none
/// does. `cpu` never touches an accelerator.
pub fn select_device(kind: DeviceKind) -> Result<Device, ModelError> {
    if kind == DeviceKind::Cpu {
        info!(device = "cpu", "Training device requested");
        return Ok(Device::Cpu);
    }

    let backends = accelerators();
    if backends.is_empty() {
        info!(
            device = "cpu",
            "Build has no metal/cuda feature, training on CPU"
        );
        return Ok(Device::Cpu);
    }

    let tried = backends.len();
    for (name, open) in backends {
        match open() {
            Ok(device) => {
                info!(device = name, "Training device selected");
                return Ok(device);
            }
            Err(e) => warn!(device = name, error = %e, "Accelerator failed to open"),
        }
    }

    warn!(tried, "No accelerator opened, epochs will run on CPU");
    Ok(Device::Cpu)
}
