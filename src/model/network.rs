//! Compact convolutional backbone with pooling aggregation.

use candle_core::{D, DType, Device, Module, Tensor, Var};
use candle_nn::{Conv2d, Conv2dConfig, VarBuilder, VarMap};
use rand::{Rng, SeedableRng};
use rand_xoshiro::Xoshiro256PlusPlus;
use tracing::info;

use super::error::ModelError;
use super::{FeatureExtractor, Mode};
use crate::config::{Aggregation, TrainConfig};

/// GeM exponent.
const GEM_P: f64 = 3.0;
const GEM_EPS: f64 = 1e-6;
const NORM_EPS: f64 = 1e-12;

struct ConvSpec {
    name: &'static str,
    out_channels: usize,
    stride: usize,
}

/// Backbone + aggregation producing L2-normalized descriptors.
pub struct GeoLocalizationNet {
    var_map: VarMap,
    convs: Vec<Conv2d>,
    aggregation: Aggregation,
    features_dim: usize,
    device: Device,
}

impl std::fmt::Debug for GeoLocalizationNet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeoLocalizationNet")
            .field("layers", &self.convs.len())
            .field("aggregation", &self.aggregation)
            .field("features_dim", &self.features_dim)
            .field("device", &self.device)
            .finish()
    }
}

impl GeoLocalizationNet {
    const KERNEL: usize = 3;

    /// Builds the network with weights drawn from a generator seeded by `config.seed`.
    pub fn new(
        config: &TrainConfig,
        in_channels: usize,
        device: &Device,
    ) -> Result<Self, ModelError> {
        if in_channels == 0 {
            return Err(ModelError::InvalidConfig {
                reason: "in_channels must be greater than zero".to_string(),
            });
        }

        let specs = [
            ConvSpec {
                name: "conv1",
                out_channels: 32,
                stride: 2,
            },
            ConvSpec {
                name: "conv2",
                out_channels: 64,
                stride: 2,
            },
            ConvSpec {
                name: "conv3",
                out_channels: config.features_dim,
                stride: 1,
            },
        ];

        let var_map = VarMap::new();
        Self::seed_weights(&var_map, &specs, in_channels, config.seed, device)?;

        let vb = VarBuilder::from_varmap(&var_map, DType::F32, device);
        let mut convs = Vec::with_capacity(specs.len());
        let mut channels = in_channels;
        for spec in &specs {
            let cfg = Conv2dConfig {
                padding: 1,
                stride: spec.stride,
                ..Default::default()
            };
            convs.push(candle_nn::conv2d(
                channels,
                spec.out_channels,
                Self::KERNEL,
                cfg,
                vb.pp(spec.name),
            )?);
            channels = spec.out_channels;
        }

        info!(
            aggregation = %config.aggregation,
            features_dim = config.features_dim,
            "Feature extractor built"
        );

        Ok(Self {
            var_map,
            convs,
            aggregation: config.aggregation,
            features_dim: config.features_dim,
            device: device.clone(),
        })
    }

    /// Fills the var map so construction is reproducible for a seed.
    fn seed_weights(
        var_map: &VarMap,
        specs: &[ConvSpec],
        in_channels: usize,
        seed: u64,
        device: &Device,
    ) -> Result<(), ModelError> {
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(seed);
        let mut data = var_map
            .data()
            .lock()
            .map_err(|e| ModelError::InvalidConfig {
                reason: format!("var map lock poisoned: {e}"),
            })?;

        let mut channels = in_channels;
        for spec in specs {
            let fan_in = channels * Self::KERNEL * Self::KERNEL;
            let bound = 1.0 / (fan_in as f32).sqrt();
            let count = spec.out_channels * fan_in;
            let weights: Vec<f32> = (0..count).map(|_| rng.random_range(-bound..bound)).collect();
            let weight = Tensor::from_vec(
                weights,
                (spec.out_channels, channels, Self::KERNEL, Self::KERNEL),
                device,
            )?;
            let bias = Tensor::zeros(spec.out_channels, DType::F32, device)?;

            data.insert(format!("{}.weight", spec.name), Var::from_tensor(&weight)?);
            data.insert(format!("{}.bias", spec.name), Var::from_tensor(&bias)?);
            channels = spec.out_channels;
        }
        Ok(())
    }

    fn aggregate(&self, maps: &Tensor) -> candle_core::Result<Tensor> {
        match self.aggregation {
            Aggregation::AvgPool => maps.mean((2, 3)),
            Aggregation::Gem => maps
                .maximum(GEM_EPS)?
                .powf(GEM_P)?
                .mean((2, 3))?
                .powf(1.0 / GEM_P),
        }
    }
}

/// Row-wise L2 normalization of a `[N, D]` tensor.
pub fn l2_normalize(xs: &Tensor) -> candle_core::Result<Tensor> {
    let norm = xs.sqr()?.sum_keepdim(D::Minus1)?.sqrt()?.affine(1.0, NORM_EPS)?;
    xs.broadcast_div(&norm)
}

impl FeatureExtractor for GeoLocalizationNet {
    fn embed(&self, images: &Tensor, mode: Mode) -> Result<Tensor, ModelError> {
        if images.rank() != 4 {
            return Err(ModelError::InvalidInput {
                dims: images.dims().to_vec(),
            });
        }

        let mut xs = images.to_device(&self.device)?;
        for conv in &self.convs {
            xs = conv.forward(&xs)?.relu()?;
        }
        let features = l2_normalize(&self.aggregate(&xs)?)?;

        Ok(match mode {
            Mode::Train => features,
            Mode::Inference => features.detach(),
        })
    }

    fn features_dim(&self) -> usize {
        self.features_dim
    }

    fn device(&self) -> &Device {
        &self.device
    }

    fn var_map(&self) -> &VarMap {
        &self.var_map
    }
}
