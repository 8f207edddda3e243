use anyhow::Result;
use candle_core::utils::{cuda_is_available, metal_is_available};
use candle_core::{Device, Tensor};
use tracing::warn;

use crate::{DeviceMap, ImageArtifact};

pub fn select_best_device(device_map: DeviceMap) -> Result<Device> {
    match device_map {
        DeviceMap::ForceCpu => Ok(Device::Cpu),
        DeviceMap::Ordinal(ordinal) if cuda_is_available() => Ok(Device::new_cuda(ordinal)?),
        DeviceMap::Ordinal(ordinal) if metal_is_available() => Ok(Device::new_metal(ordinal)?),
        DeviceMap::Ordinal(_) => {
            #[cfg(all(target_os = "macos", target_arch = "aarch64"))]
            {
                warn!("running on CPU, to run on GPU(metal), build with `--features metal`");
            }
            #[cfg(not(all(target_os = "macos", target_arch = "aarch64")))]
            {
                warn!("running on CPU, to run on GPU, build with `--features cuda`");
            }
            Ok(Device::Cpu)
        }
    }
}

/// Converts a u8 tensor with shape (channels, height, width) into an artifact.
pub fn tensor_to_artifact(img: &Tensor) -> Result<ImageArtifact> {
    let (channels, height, width) = img.dims3()?;
    let pixels = img.permute((1, 2, 0))?.flatten_all()?.to_vec1::<u8>()?;
    Ok(ImageArtifact::new(
        width as u32,
        height as u32,
        channels as u32,
        pixels,
    ))
}
