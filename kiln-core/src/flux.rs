//! Flux text-to-image engine built on candle.
//!
//! The transformer weights come from the configured model file. The T5 and
//! CLIP text encoders are fetched from the Hugging Face hub; the autoencoder
//! is taken from an `ae.safetensors` next to the model file when present,
//! otherwise from the hub as well.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Error, Result};
use candle_core::{DType, Device, IndexOp, Tensor};
use candle_nn::{Module, VarBuilder};
use candle_transformers::models::clip::text_model::{
    Activation, ClipTextConfig, ClipTextTransformer,
};
use candle_transformers::models::flux::{autoencoder, model, sampling};
use candle_transformers::models::t5::{self, T5EncoderModel};
use hf_hub::api::sync::Api;
use tokenizers::Tokenizer;
use tracing::{debug, info, warn};

use crate::{
    select_best_device, tensor_to_artifact, EngineError, ImageArtifact, Loader, ModelLike,
    ModelVariant, ParameterSet, Scheduler, TuningFlags, WeightType,
};

/// Flux transformer and latent sizes require multiples of 16.
const FLUX_DIMENSION_ALIGN: u32 = 16;
const T5_MAX_TOKENS: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FluxVariant {
    Schnell,
    Dev,
}

impl FluxVariant {
    fn hub_repo(self) -> &'static str {
        match self {
            Self::Schnell => "black-forest-labs/FLUX.1-schnell",
            Self::Dev => "black-forest-labs/FLUX.1-dev",
        }
    }
}

pub struct FluxModel {
    device: Device,
    dtype: DType,
    shift_schedule: bool,
    t5_model: T5EncoderModel,
    t5_tokenizer: Tokenizer,
    clip_model: ClipTextTransformer,
    clip_tokenizer: Tokenizer,
    autoencoder: autoencoder::AutoEncoder,
    flux_model: model::Flux,
}

impl FluxModel {
    fn t5_embedding(&mut self, prompt: &str) -> Result<Tensor> {
        let mut tokens = self
            .t5_tokenizer
            .encode(prompt, true)
            .map_err(Error::msg)?
            .get_ids()
            .to_vec();
        tokens.resize(T5_MAX_TOKENS, 0);
        let input_ids = Tensor::new(&*tokens, &self.device)?.unsqueeze(0)?;
        Ok(self.t5_model.forward(&input_ids)?)
    }

    fn clip_embedding(&self, prompt: &str) -> Result<Tensor> {
        let tokens = self
            .clip_tokenizer
            .encode(prompt, true)
            .map_err(Error::msg)?
            .get_ids()
            .to_vec();
        let input_ids = Tensor::new(&*tokens, &self.device)?.unsqueeze(0)?;
        Ok(self.clip_model.forward(&input_ids)?)
    }

    fn run(&mut self, params: &ParameterSet) -> Result<ImageArtifact> {
        let width = params.width as usize;
        let height = params.height as usize;

        if self.device.is_cpu() {
            debug!("the CPU generator cannot be seeded; output is not reproducible");
        } else {
            self.device.set_seed(params.seed as u64)?;
        }

        let noise = sampling::get_noise(1, height, width, &self.device)?.to_dtype(self.dtype)?;
        let t5_emb = self.t5_embedding(&params.prompt)?;
        let clip_emb = self.clip_embedding(&params.prompt)?;

        let state = sampling::State::new(&t5_emb, &clip_emb, &noise)?;
        let shift = if self.shift_schedule {
            Some((state.img.dim(1)?, 0.5, 1.15))
        } else {
            None
        };
        let timesteps = sampling::get_schedule(params.sample_steps as usize, shift);

        let latent = sampling::denoise(
            &self.flux_model,
            &state.img,
            &state.img_ids,
            &state.txt,
            &state.txt_ids,
            &state.vec,
            &timesteps,
            params.guidance as f64,
        )?;
        let latent = sampling::unpack(&latent, height, width)?;
        debug!("denoised latent image");

        let decoded = self.autoencoder.decode(&latent)?;
        let img = ((decoded.clamp(-1f32, 1f32)? + 1.0)? * 127.5)?.to_dtype(DType::U8)?;
        tensor_to_artifact(&img.i(0)?)
    }
}

impl ModelLike for FluxModel {
    fn generate(&mut self, params: &ParameterSet) -> Result<Option<ImageArtifact>, EngineError> {
        if params.width % FLUX_DIMENSION_ALIGN != 0 || params.height % FLUX_DIMENSION_ALIGN != 0 {
            return Err(EngineError::backend(format!(
                "flux requires width and height to be multiples of {FLUX_DIMENSION_ALIGN}"
            )));
        }
        if !params.negative_prompt.is_empty() {
            debug!("flux does not use negative prompts; ignoring it");
        }
        debug!(
            sample_method = %params.sample_method,
            cfg_scale = params.cfg_scale,
            "flux samples with its flow-matching euler solver"
        );

        self.run(params)
            .map(Some)
            .map_err(|e| EngineError::backend(format!("{e:#}")))
    }
}

pub struct FluxLoader;

impl FluxLoader {
    fn open(model_path: &Path, flags: &TuningFlags) -> Result<FluxModel> {
        if !model_path.is_file() {
            bail!("model file {} not found", model_path.display());
        }
        let model_name = model_path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        let variant = match ModelVariant::from_name(&model_name) {
            Some(ModelVariant::Flux(variant)) => variant,
            None => bail!("{model_name} is not a flux model"),
        };
        let shift_schedule = match flags.scheduler {
            Scheduler::Default => variant == FluxVariant::Dev,
            Scheduler::Discrete => false,
            Scheduler::Karras => bail!("flux does not support the karras scheduler"),
        };
        if flags.n_threads > 0 {
            warn!(
                n_threads = flags.n_threads,
                "thread count is managed by the candle runtime; ignoring it"
            );
        }

        // Configure device.
        let device = select_best_device(flags.device_map).context("failed to set up device")?;
        let dtype = match flags.weight_type {
            WeightType::Auto => device.bf16_default_to_f32(),
            WeightType::F32 => DType::F32,
            WeightType::F16 => DType::F16,
            WeightType::Bf16 => DType::BF16,
        };
        info!(?variant, ?device, ?dtype, "loading flux");

        let api = Api::new().context("failed to create hf hub API")?;

        // --- Load T5 Model and Tokenizer ---
        let t5_repo = api.repo(hf_hub::Repo::with_revision(
            "google/t5-v1_1-xxl".to_string(),
            hf_hub::RepoType::Model,
            "refs/pr/2".to_string(),
        ));
        let t5_model_file = t5_repo
            .get("model.safetensors")
            .context("failed to load T5 model file")?;
        let t5_vb = unsafe {
            VarBuilder::from_mmaped_safetensors(&[t5_model_file], dtype, &device)
                .context("failed to build T5 var builder")?
        };
        let t5_config_file = t5_repo
            .get("config.json")
            .context("failed to get T5 config")?;
        let t5_config: t5::Config = serde_json::from_str(
            &std::fs::read_to_string(&t5_config_file).context("failed to read T5 config")?,
        )
        .context("failed to parse T5 config")?;
        let t5_model = T5EncoderModel::load(t5_vb, &t5_config).context("failed to load T5 model")?;
        let t5_tokenizer_file = api
            .model("lmz/mt5-tokenizers".to_string())
            .get("t5-v1_1-xxl.tokenizer.json")
            .context("failed to get T5 tokenizer")?;
        let t5_tokenizer = Tokenizer::from_file(t5_tokenizer_file)
            .map_err(Error::msg)
            .context("failed to load T5 tokenizer")?;

        // --- Load CLIP Model and Tokenizer ---
        let clip_repo = api.repo(hf_hub::Repo::model(
            "openai/clip-vit-large-patch14".to_string(),
        ));
        let clip_model_file = clip_repo
            .get("model.safetensors")
            .context("failed to get CLIP model file")?;
        let clip_vb = unsafe {
            VarBuilder::from_mmaped_safetensors(&[clip_model_file], dtype, &device)
                .context("failed to build CLIP var builder")?
        };
        let clip_config = ClipTextConfig {
            vocab_size: 49408,
            projection_dim: 768,
            activation: Activation::QuickGelu,
            intermediate_size: 3072,
            embed_dim: 768,
            max_position_embeddings: 77,
            pad_with: None,
            num_hidden_layers: 12,
            num_attention_heads: 12,
        };
        let clip_model = ClipTextTransformer::new(clip_vb.pp("text_model"), &clip_config)
            .context("failed to load CLIP model")?;
        let clip_tokenizer_file = clip_repo
            .get("tokenizer.json")
            .context("failed to get CLIP tokenizer")?;
        let clip_tokenizer = Tokenizer::from_file(clip_tokenizer_file)
            .map_err(Error::msg)
            .context("failed to load CLIP tokenizer")?;

        // --- Load Autoencoder ---
        let autoencoder_file = match sibling(model_path, "ae.safetensors") {
            Some(local) => local,
            None => api
                .model(variant.hub_repo().to_string())
                .get("ae.safetensors")
                .context("failed to get autoencoder model file")?,
        };
        let autoencoder_vb = unsafe {
            VarBuilder::from_mmaped_safetensors(&[autoencoder_file], dtype, &device)
                .context("failed to build autoencoder var builder")?
        };
        let autoencoder_config = match variant {
            FluxVariant::Schnell => autoencoder::Config::schnell(),
            FluxVariant::Dev => autoencoder::Config::dev(),
        };
        let autoencoder = autoencoder::AutoEncoder::new(&autoencoder_config, autoencoder_vb)
            .context("failed to load autoencoder")?;

        // --- Load Flux Model (non-quantized) ---
        let flux_vb = unsafe {
            VarBuilder::from_mmaped_safetensors(&[model_path], dtype, &device)
                .context("failed to build flux var builder")?
        };
        let flux_config = match variant {
            FluxVariant::Schnell => model::Config::schnell(),
            FluxVariant::Dev => model::Config::dev(),
        };
        let flux_model =
            model::Flux::new(&flux_config, flux_vb).context("failed to load flux model")?;

        Ok(FluxModel {
            device,
            dtype,
            shift_schedule,
            t5_model,
            t5_tokenizer,
            clip_model,
            clip_tokenizer,
            autoencoder,
            flux_model,
        })
    }
}

impl Loader for FluxLoader {
    fn load(
        &self,
        model_path: &Path,
        flags: &TuningFlags,
    ) -> Result<Box<dyn ModelLike>, EngineError> {
        let model = Self::open(model_path, flags)
            .map_err(|e| EngineError::context_init(format!("{e:#}")))?;
        Ok(Box::new(model))
    }
}

fn sibling(model_path: &Path, file_name: &str) -> Option<PathBuf> {
    let candidate = model_path.with_file_name(file_name);
    candidate.is_file().then_some(candidate)
}
