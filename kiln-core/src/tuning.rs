use serde::{Deserialize, Serialize};

use crate::DeviceMap;

/// Precision the model weights are loaded with.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WeightType {
    /// Let the engine pick (bf16 on accelerators, f32 on CPU).
    #[default]
    Auto,
    F32,
    F16,
    Bf16,
}

serde_plain::derive_fromstr_from_deserialize!(WeightType);
serde_plain::derive_display_from_serialize!(WeightType);

/// Noise schedule used by the sampler.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scheduler {
    /// Whatever the model variant recommends.
    #[default]
    Default,
    Discrete,
    Karras,
}

serde_plain::derive_fromstr_from_deserialize!(Scheduler);
serde_plain::derive_display_from_serialize!(Scheduler);

/// Engine tuning applied when a generation context is opened.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TuningFlags {
    /// Worker threads for CPU compute; negative means "let the engine decide".
    pub n_threads: i32,
    pub weight_type: WeightType,
    pub scheduler: Scheduler,
    pub device_map: DeviceMap,
}

impl Default for TuningFlags {
    fn default() -> Self {
        Self {
            n_threads: -1,
            weight_type: WeightType::Auto,
            scheduler: Scheduler::Default,
            device_map: DeviceMap::default(),
        }
    }
}
