//! Server configuration from command-line flags and `KILN_*` environment
//! variables.

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use kiln_core::{DeviceMap, GenerationDefaults, Scheduler, TuningFlags, WeightType, WorkerConfig};

#[derive(Parser, Debug, Clone)]
#[command(author, version, about = "Kiln image generation server")]
pub struct ServerConfig {
    /// Host address to bind the server to
    #[arg(long, env = "KILN_HOST", default_value = "0.0.0.0")]
    pub host: String,

    /// Port to bind the server to
    #[arg(long, env = "KILN_PORT", default_value_t = 8080)]
    pub port: u16,

    /// Model file used when a request does not name one
    #[arg(long, env = "KILN_MODEL", default_value = "models/flux1-schnell.safetensors")]
    pub model: PathBuf,

    /// Where generated images are written (overwritten on every request)
    #[arg(long, env = "KILN_OUTPUT", default_value = "output.png")]
    pub output: PathBuf,

    /// CPU threads for the engine; negative lets the engine decide
    #[arg(long, env = "KILN_THREADS", default_value_t = -1, allow_negative_numbers = true)]
    pub threads: i32,

    /// Weight precision: auto, f32, f16 or bf16
    #[arg(long, env = "KILN_WEIGHT_TYPE", default_value_t = WeightType::Auto)]
    pub weight_type: WeightType,

    /// Noise schedule: default, discrete or karras
    #[arg(long, env = "KILN_SCHEDULER", default_value_t = Scheduler::Default)]
    pub scheduler: Scheduler,

    /// Use CPU instead of GPU
    #[arg(long, env = "KILN_CPU")]
    pub cpu: bool,

    /// Accelerator ordinal
    #[arg(long, env = "KILN_DEVICE", default_value_t = 0)]
    pub device: usize,

    /// Give up waiting for a generation after this many seconds
    #[arg(long, env = "KILN_TIMEOUT_SECS")]
    pub timeout_secs: Option<u64>,

    /// Generation jobs that may wait in the queue
    #[arg(long, env = "KILN_QUEUE_CAPACITY", default_value_t = 16)]
    pub queue_capacity: usize,

    /// `tracing` filter, e.g. `info` or `debug,tower_http=warn`
    #[arg(long, env = "KILN_LOG", default_value = "info")]
    pub log_level: String,

    /// Emit logs as newline-delimited JSON
    #[arg(long, env = "KILN_LOG_JSON")]
    pub log_json: bool,
}

impl ServerConfig {
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn generation_defaults(&self) -> GenerationDefaults {
        GenerationDefaults {
            model_path: self.model.clone(),
            output_path: self.output.clone(),
        }
    }

    pub fn tuning_flags(&self) -> TuningFlags {
        TuningFlags {
            n_threads: self.threads,
            weight_type: self.weight_type,
            scheduler: self.scheduler,
            device_map: DeviceMap::new(self.cpu, self.device),
        }
    }

    pub fn worker_config(&self) -> WorkerConfig {
        WorkerConfig {
            queue_capacity: self.queue_capacity,
            timeout: self.timeout_secs.map(Duration::from_secs),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_map_onto_core_configuration() {
        let config = ServerConfig::try_parse_from([
            "kiln-server",
            "--port",
            "9000",
            "--model",
            "/models/flux1-dev.safetensors",
            "--output",
            "/tmp/out.png",
            "--threads",
            "8",
            "--weight-type",
            "bf16",
            "--scheduler",
            "discrete",
            "--cpu",
            "--timeout-secs",
            "30",
        ])
        .unwrap();

        assert_eq!(config.bind_address(), "0.0.0.0:9000");
        assert_eq!(
            config.generation_defaults(),
            GenerationDefaults {
                model_path: "/models/flux1-dev.safetensors".into(),
                output_path: "/tmp/out.png".into(),
            }
        );
        assert_eq!(
            config.tuning_flags(),
            TuningFlags {
                n_threads: 8,
                weight_type: WeightType::Bf16,
                scheduler: Scheduler::Discrete,
                device_map: DeviceMap::ForceCpu,
            }
        );
        assert_eq!(config.worker_config().timeout, Some(Duration::from_secs(30)));
    }

    #[test]
    fn unknown_weight_type_is_rejected() {
        assert!(ServerConfig::try_parse_from(["kiln-server", "--weight-type", "fp8"]).is_err());
    }
}
