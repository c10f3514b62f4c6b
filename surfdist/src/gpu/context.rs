//! Compute device acquisition.
//!
//! Adapters are enumerated for the backends named in `WGPU_BACKEND`
//! (primary backends when unset) and ranked by device type, so a real
//! GPU wins over a software rasterizer. A software adapter is still
//! accepted as a last resort, with a warning.

use crate::SurfdistError;
use log::{error, info, warn};
use std::fmt;

/// Adapter details kept for logging.
#[derive(Debug, Clone)]
pub struct AdapterInfo {
    pub name: String,
    pub device_type: wgpu::DeviceType,
    pub backend: wgpu::Backend,
}

impl fmt::Display for AdapterInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({:?}, {:?})",
            self.name, self.backend, self.device_type
        )
    }
}

/// Device, queue and the instance they came from.
///
/// Fields drop top to bottom, so `_instance` is last and outlives
/// `device` and `queue`.
pub struct GpuContext {
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
    pub adapter_info: AdapterInfo,
    _instance: wgpu::Instance,
}

impl GpuContext {
    /// Acquires the best available compute device, blocking the
    /// current thread.
    pub fn new() -> Result<Self, SurfdistError> {
        pollster::block_on(Self::init_async())
    }

    /// Acquires the best available compute device.
    pub async fn init_async() -> Result<Self, SurfdistError> {
        let backends = wgpu::util::backend_bits_from_env().unwrap_or(wgpu::Backends::PRIMARY);
        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
            backends,
            ..Default::default()
        });

        let adapters = instance.enumerate_adapters(backends);
        for adapter in &adapters {
            let info = adapter.get_info();
            info!(
                "found adapter {} ({:?}, {:?})",
                info.name, info.backend, info.device_type
            );
        }

        let adapter = adapters
            .into_iter()
            .min_by_key(|a| rank(a.get_info().device_type))
            .ok_or(SurfdistError::NoAdapter)?;

        let raw_info = adapter.get_info();
        let adapter_info = AdapterInfo {
            name: raw_info.name,
            device_type: raw_info.device_type,
            backend: raw_info.backend,
        };
        if adapter_info.device_type == wgpu::DeviceType::Cpu {
            warn!("no hardware adapter, falling back to {adapter_info}");
        } else {
            info!("using adapter {adapter_info}");
        }

        let (device, queue): (wgpu::Device, wgpu::Queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("surfdist"),
                    required_features: wgpu::Features::empty(),
                    required_limits: adapter.limits(),
                    memory_hints: wgpu::MemoryHints::Performance,
                },
                None,
            )
            .await?;

        // Anything not caught by an error scope ends up here instead of
        // wgpu's default panicking handler.
        device.on_uncaptured_error(Box::new(|e| error!("uncaptured device error: {e}")));

        Ok(Self {
            device,
            queue,
            adapter_info,
            _instance: instance,
        })
    }
}

impl fmt::Display for GpuContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "GpuContext {{ adapter: {} }}", self.adapter_info)
    }
}

/// Lower is better.
fn rank(device_type: wgpu::DeviceType) -> u8 {
    match device_type {
        wgpu::DeviceType::DiscreteGpu => 0,
        wgpu::DeviceType::IntegratedGpu => 1,
        wgpu::DeviceType::VirtualGpu => 2,
        wgpu::DeviceType::Other => 3,
        wgpu::DeviceType::Cpu => 4,
    }
}

#[cfg(test)]
mod tests {
    use super::rank;
    use wgpu::DeviceType;

    #[test]
    fn test_hardware_outranks_software() {
        let mut types = [
            DeviceType::Cpu,
            DeviceType::Other,
            DeviceType::IntegratedGpu,
            DeviceType::VirtualGpu,
            DeviceType::DiscreteGpu,
        ];
        types.sort_by_key(|t| rank(*t));
        assert_eq!(types[0], DeviceType::DiscreteGpu);
        assert_eq!(types[1], DeviceType::IntegratedGpu);
        assert_eq!(types[4], DeviceType::Cpu);
    }
}
