// src/gpu.rs
// wgpu instance/adapter/device bootstrap shared by the builder and the tracer
// This file exists to centralize device acquisition, limits, and synchronous buffer readback.
// RELEVANT FILES: src/accel/mod.rs, src/tracer.rs, src/renderer.rs

use crate::error::{RenderError, RenderResult};

/// Owned GPU context: instance, adapter, device, queue.
///
/// Construction is fallible so callers (tests in particular) can skip GPU
/// work when no adapter is present instead of aborting the process.
pub struct GpuContext {
    pub instance: wgpu::Instance,
    pub adapter: wgpu::Adapter,
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
}

impl GpuContext {
    /// Acquire an adapter and device suitable for the compute pipelines.
    ///
    /// The tracer dispatches 32x32 workgroups, so the default 256-invocation
    /// limit is raised to 1024 where the adapter supports it.
    pub fn new() -> RenderResult<Self> {
        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });

        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            compatible_surface: None,
            force_fallback_adapter: false,
        }))
        .ok_or_else(|| RenderError::device("No suitable GPU adapter found"))?;

        let adapter_limits = adapter.limits();
        let required_limits = wgpu::Limits {
            max_compute_invocations_per_workgroup: 1024u32
                .min(adapter_limits.max_compute_invocations_per_workgroup),
            max_compute_workgroup_size_x: 1024u32
                .min(adapter_limits.max_compute_workgroup_size_x),
            max_compute_workgroup_size_y: 1024u32
                .min(adapter_limits.max_compute_workgroup_size_y),
            ..wgpu::Limits::default()
        };

        let (device, queue) = pollster::block_on(adapter.request_device(
            &wgpu::DeviceDescriptor {
                label: Some("glint-device"),
                required_features: wgpu::Features::empty(),
                required_limits,
            },
            None,
        ))
        .map_err(|e| RenderError::Device(format!("Failed to create device: {}", e)))?;

        let info = adapter.get_info();
        log::info!(
            "GPU context ready: {} ({:?}, {:?})",
            info.name,
            info.backend,
            info.device_type
        );

        Ok(Self {
            instance,
            adapter,
            device,
            queue,
        })
    }

    /// Synchronously map a MAP_READ buffer and copy its first `size` bytes out.
    ///
    /// The buffer must already contain the data (copies submitted and the
    /// submission completed or about to complete under `Maintain::Wait`).
    pub fn read_buffer(&self, buffer: &wgpu::Buffer, size: u64) -> RenderResult<Vec<u8>> {
        let slice = buffer.slice(0..size);
        let (tx, rx) = std::sync::mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |res| {
            let _ = tx.send(res);
        });
        self.device.poll(wgpu::Maintain::Wait);
        rx.recv()
            .map_err(|_| RenderError::readback("map_async callback dropped"))?
            .map_err(|e| RenderError::Readback(format!("MapAsync failed: {:?}", e)))?;
        let data = slice.get_mapped_range().to_vec();
        buffer.unmap();
        Ok(data)
    }
}
