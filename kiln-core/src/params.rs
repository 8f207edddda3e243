use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::ValidationError;

pub const DEFAULT_WIDTH: u32 = 512;
pub const DEFAULT_HEIGHT: u32 = 512;
pub const DEFAULT_CFG_SCALE: f32 = 7.0;
pub const DEFAULT_GUIDANCE: f32 = 3.5;
pub const DEFAULT_SAMPLE_STEPS: u32 = 20;
pub const DEFAULT_SEED: i64 = 42;

/// Smallest accepted width/height in pixels.
pub const MIN_DIMENSION: u32 = 64;
/// Largest accepted width/height in pixels.
pub const MAX_DIMENSION: u32 = 4096;
/// Width and height must be multiples of this.
pub const DIMENSION_ALIGN: u32 = 8;
pub const MAX_SAMPLE_STEPS: u32 = 1000;

/// Denoising sampler requested by the caller.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SampleMethod {
    #[serde(rename = "euler")]
    Euler,
    #[default]
    #[serde(rename = "euler_a")]
    EulerA,
    #[serde(rename = "heun")]
    Heun,
    #[serde(rename = "dpm2")]
    Dpm2,
    #[serde(rename = "dpm++2m")]
    DpmPlusPlus2M,
    #[serde(rename = "lcm")]
    Lcm,
}

serde_plain::derive_fromstr_from_deserialize!(SampleMethod);
serde_plain::derive_display_from_serialize!(SampleMethod);

/// Server-side defaults that are not hard-coded into the parameter builder.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GenerationDefaults {
    /// Model used when the request does not name one.
    pub model_path: PathBuf,
    /// Where every generated image is written. Not settable by callers.
    pub output_path: PathBuf,
}

impl Default for GenerationDefaults {
    fn default() -> Self {
        Self {
            model_path: PathBuf::from("models/flux1-schnell.safetensors"),
            output_path: PathBuf::from("output.png"),
        }
    }
}

/// Fully resolved inputs of one generation request.
#[derive(Clone, Debug, PartialEq)]
pub struct ParameterSet {
    pub prompt: String,
    pub negative_prompt: String,
    pub width: u32,
    pub height: u32,
    pub cfg_scale: f32,
    pub guidance: f32,
    pub sample_steps: u32,
    pub seed: i64,
    pub sample_method: SampleMethod,
    pub model_path: PathBuf,
    pub output_path: PathBuf,
}

impl ParameterSet {
    /// Build a parameter set from a raw JSON request body.
    pub fn from_json(body: &[u8], defaults: &GenerationDefaults) -> Result<Self, ValidationError> {
        let value: Value = serde_json::from_slice(body)
            .map_err(|e| ValidationError::new(format!("malformed JSON body: {e}")))?;
        match value {
            Value::Object(map) => Self::from_map(&map, defaults),
            _ => Err(ValidationError::new("request body must be a JSON object")),
        }
    }

    /// Build a parameter set from a decoded key-value mapping.
    ///
    /// Explicit values win over `defaults`; unknown keys are ignored and a
    /// JSON `null` counts as absent.
    pub fn from_map(
        map: &Map<String, Value>,
        defaults: &GenerationDefaults,
    ) -> Result<Self, ValidationError> {
        let fields = Fields(map);

        let prompt = match fields.get("prompt", "prompt") {
            None => return Err(ValidationError::prompt_required()),
            Some(Value::String(s)) if s.trim().is_empty() => {
                return Err(ValidationError::prompt_required())
            }
            Some(Value::String(s)) => s.clone(),
            Some(_) => return Err(ValidationError::invalid_field("prompt")),
        };

        let model_path = match fields.string("model_path", "modelPath")? {
            Some(path) if path.is_empty() => return Err(ValidationError::invalid_field("model_path")),
            Some(path) => PathBuf::from(path),
            None => defaults.model_path.clone(),
        };

        let sample_method = match fields.string("sample_method", "sampleMethod")? {
            Some(name) => name
                .parse()
                .map_err(|_| ValidationError::invalid_field("sample_method"))?,
            None => SampleMethod::default(),
        };

        Ok(Self {
            prompt,
            negative_prompt: fields
                .string("negative_prompt", "negativePrompt")?
                .unwrap_or_default(),
            width: fields
                .dimension("width", "width")?
                .unwrap_or(DEFAULT_WIDTH),
            height: fields
                .dimension("height", "height")?
                .unwrap_or(DEFAULT_HEIGHT),
            cfg_scale: fields
                .float("cfg_scale", "cfgScale")?
                .unwrap_or(DEFAULT_CFG_SCALE),
            guidance: fields
                .float("guidance", "guidance")?
                .unwrap_or(DEFAULT_GUIDANCE),
            sample_steps: fields
                .integer("sample_steps", "sampleSteps", 1..=MAX_SAMPLE_STEPS)?
                .unwrap_or(DEFAULT_SAMPLE_STEPS),
            seed: fields.seed("seed", "seed")?.unwrap_or(DEFAULT_SEED),
            sample_method,
            model_path,
            output_path: defaults.output_path.clone(),
        })
    }

    /// One-line description of the generation settings, used in logs.
    pub fn summary(&self) -> String {
        format!(
            "{} | Steps: {}, CFG scale: {}, Guidance: {}, Seed: {}, Size: {}x{}, Sampler: {}",
            self.prompt,
            self.sample_steps,
            self.cfg_scale,
            self.guidance,
            self.seed,
            self.width,
            self.height,
            self.sample_method,
        )
    }
}

/// Typed accessors over the request mapping. Each field is looked up by its
/// snake_case name first, then by its camelCase alias.
struct Fields<'a>(&'a Map<String, Value>);

impl Fields<'_> {
    fn get(&self, name: &str, alias: &str) -> Option<&Value> {
        [name, alias]
            .into_iter()
            .filter_map(|key| self.0.get(key))
            .find(|value| !value.is_null())
    }

    fn string(&self, name: &str, alias: &str) -> Result<Option<String>, ValidationError> {
        match self.get(name, alias) {
            None => Ok(None),
            Some(Value::String(s)) => Ok(Some(s.clone())),
            Some(_) => Err(ValidationError::invalid_field(name)),
        }
    }

    fn integer(
        &self,
        name: &str,
        alias: &str,
        range: std::ops::RangeInclusive<u32>,
    ) -> Result<Option<u32>, ValidationError> {
        let Some(value) = self.get(name, alias) else {
            return Ok(None);
        };
        integral(value)
            .and_then(|n| u32::try_from(n).ok())
            .filter(|n| range.contains(n))
            .map(Some)
            .ok_or_else(|| ValidationError::invalid_field(name))
    }

    fn dimension(&self, name: &str, alias: &str) -> Result<Option<u32>, ValidationError> {
        match self.integer(name, alias, MIN_DIMENSION..=MAX_DIMENSION)? {
            Some(n) if n % DIMENSION_ALIGN != 0 => Err(ValidationError::invalid_field(name)),
            other => Ok(other),
        }
    }

    fn float(&self, name: &str, alias: &str) -> Result<Option<f32>, ValidationError> {
        let Some(value) = self.get(name, alias) else {
            return Ok(None);
        };
        value
            .as_f64()
            .map(|f| f as f32)
            .filter(|f| f.is_finite())
            .map(Some)
            .ok_or_else(|| ValidationError::invalid_field(name))
    }

    fn seed(&self, name: &str, alias: &str) -> Result<Option<i64>, ValidationError> {
        let Some(value) = self.get(name, alias) else {
            return Ok(None);
        };
        integral(value)
            .map(Some)
            .ok_or_else(|| ValidationError::invalid_field(name))
    }
}

/// Integers, and floats with no fractional part such as `512.0`.
fn integral(value: &Value) -> Option<i64> {
    value.as_i64().or_else(|| {
        value
            .as_f64()
            .filter(|f| f.fract() == 0.0 && *f >= i64::MIN as f64 && *f < i64::MAX as f64)
            .map(|f| f as i64)
    })
}
