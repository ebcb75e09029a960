use candle_core::Device;
use std::error::Error;

/// First accelerator compiled in, unless `force_cpu` is set.
pub fn select_device(force_cpu: bool) -> Result<Device, Box<dyn Error>> {
    if force_cpu {
        return Ok(Device::Cpu);
    }

    #[cfg(feature = "cuda")]
    if let Ok(device) = Device::cuda_if_available(0) {
        if device.is_cuda() {
            return Ok(device);
        }
    }
    #[cfg(feature = "metal")]
    if let Ok(device) = Device::new_metal(0) {
        if device.is_metal() {
            return Ok(device);
        }
    }
    Ok(Device::Cpu)
}

pub fn describe(device: &Device) -> &'static str {
    if device.is_cuda() {
        "CUDA"
    } else if device.is_metal() {
        "Metal"
    } else {
        "CPU"
    }
}
