use crate::{GpuContext, SurfdistError};
use heightmap::Heightmap;
use log::debug;
use wgpu::util::DeviceExt;

/// Read-only elevation grid resident on the device.
///
/// One `u32` word per cell, row-major. Never written after upload.
pub struct DeviceGrid {
    pub buffer: wgpu::Buffer,
    pub width: usize,
}

impl DeviceGrid {
    pub fn upload(gpu: &GpuContext, grid: &Heightmap, label: &str) -> Result<Self, SurfdistError> {
        let words = grid.to_device_words();
        let max = gpu.device.limits().max_storage_buffer_binding_size;
        if words.len() as u64 > u64::from(max) {
            return Err(SurfdistError::Config(format!(
                "{label} grid needs {} bytes, device binding limit is {max}",
                words.len()
            )));
        }
        let buffer = gpu
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some(label),
                contents: &words,
                usage: wgpu::BufferUsages::STORAGE,
            });
        debug!(
            "uploaded {label} grid; width: {}, bytes: {}",
            grid.width(),
            words.len()
        );
        Ok(Self {
            buffer,
            width: grid.width(),
        })
    }
}
