// src/tracer.rs
// Stage 2: path tracing dispatches, accumulation readback, and tonemap
// This file exists to own the trace pipeline, the per-target accumulation
// buffers, and the one-pass-per-sample submission loop.
// RELEVANT FILES: src/shaders/trace.wgsl, src/accel/mod.rs, src/renderer.rs

use bytemuck::{Pod, Zeroable};
use rand::Rng;

use crate::error::{RenderError, RenderResult};
use crate::gpu::GpuContext;
use crate::scene::types::TraceUniforms;
use crate::scene::Scene;

const WORKGROUP_XY: u32 = 32;

#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
struct ImageInfo {
    width: u32,
    height: u32,
    _pad: [u32; 2],
}

struct AccumTarget {
    width: u32,
    height: u32,
    accum: wgpu::Buffer,
    staging: wgpu::Buffer,
    image_info: wgpu::Buffer,
}

/// Path tracer over the per-frame BVH.
///
/// Each sample is its own compute pass and submission so the accumulation
/// writes of sample k are ordered before sample k+1 reads, and so the host
/// can reseed the kernel RNG between samples.
pub struct PathTracer {
    pipeline: wgpu::ComputePipeline,
    target: Option<AccumTarget>,
}

impl PathTracer {
    pub fn new(gpu: &GpuContext) -> RenderResult<Self> {
        let module = gpu
            .device
            .create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some("trace"),
                source: wgpu::ShaderSource::Wgsl(include_str!("shaders/trace.wgsl").into()),
            });
        let pipeline = gpu
            .device
            .create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                label: Some("trace-paths"),
                layout: None,
                module: &module,
                entry_point: "trace_paths",
            });
        Ok(Self {
            pipeline,
            target: None,
        })
    }

    fn ensure_target(&mut self, gpu: &GpuContext, width: u32, height: u32) {
        let fits = matches!(&self.target, Some(t) if t.width == width && t.height == height);
        if fits {
            return;
        }
        let pixels = width as u64 * height as u64;
        let size = pixels * 16;
        let device = &gpu.device;
        self.target = Some(AccumTarget {
            width,
            height,
            accum: device.create_buffer(&wgpu::BufferDescriptor {
                label: Some("trace-accum"),
                size,
                usage: wgpu::BufferUsages::STORAGE
                    | wgpu::BufferUsages::COPY_SRC
                    | wgpu::BufferUsages::COPY_DST,
                mapped_at_creation: false,
            }),
            staging: device.create_buffer(&wgpu::BufferDescriptor {
                label: Some("trace-staging"),
                size,
                usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
                mapped_at_creation: false,
            }),
            image_info: device.create_buffer(&wgpu::BufferDescriptor {
                label: Some("trace-image-info"),
                size: std::mem::size_of::<ImageInfo>() as u64,
                usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
                mapped_at_creation: false,
            }),
        });
        log::debug!("trace target allocated at {}x{}", width, height);
    }

    /// Trace `samples` samples per pixel and return the tonemapped RGBA8
    /// image, row-major from the top-left.
    #[allow(clippy::too_many_arguments)]
    pub fn trace<R: Rng>(
        &mut self,
        gpu: &GpuContext,
        scene: &Scene,
        uniforms: &wgpu::Buffer,
        nodes: &wgpu::Buffer,
        width: u32,
        height: u32,
        samples: u32,
        rng: &mut R,
    ) -> RenderResult<Vec<u8>> {
        if width == 0 || height == 0 {
            return Err(RenderError::render("render target must be non-empty"));
        }
        let samples = samples.max(1);
        self.ensure_target(gpu, width, height);
        let target = self
            .target
            .as_ref()
            .ok_or_else(|| RenderError::render("trace target not allocated"))?;
        let scene_buffers = scene.buffers()?;
        let device = &gpu.device;

        gpu.queue.write_buffer(
            &target.image_info,
            0,
            bytemuck::bytes_of(&ImageInfo {
                width,
                height,
                _pad: [0; 2],
            }),
        );

        let uniforms_bg = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("trace-uniforms-bg"),
            layout: &self.pipeline.get_bind_group_layout(0),
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: uniforms.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: target.image_info.as_entire_binding(),
                },
            ],
        });
        let scene_bg = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("trace-scene-bg"),
            layout: &self.pipeline.get_bind_group_layout(1),
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: scene_buffers.triangles.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: scene_buffers.spheres.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: scene_buffers.materials.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: nodes.as_entire_binding(),
                },
            ],
        });
        let accum_bg = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("trace-accum-bg"),
            layout: &self.pipeline.get_bind_group_layout(2),
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: target.accum.as_entire_binding(),
            }],
        });

        let groups_x = (width + WORKGROUP_XY - 1) / WORKGROUP_XY;
        let groups_y = (height + WORKGROUP_XY - 1) / WORKGROUP_XY;

        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("trace-clear"),
        });
        encoder.clear_buffer(&target.accum, 0, None);
        gpu.queue.submit(Some(encoder.finish()));

        for sample in 0..samples {
            // Fresh kernel seed per sample; each submission is ordered after
            // the matching uniform write on the queue timeline.
            let seed: u32 = rng.gen();
            gpu.queue.write_buffer(
                uniforms,
                TraceUniforms::RANDOM_STATE_OFFSET,
                bytemuck::bytes_of(&seed),
            );
            let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("trace-sample"),
            });
            {
                let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                    label: Some("trace-paths"),
                    timestamp_writes: None,
                });
                pass.set_pipeline(&self.pipeline);
                pass.set_bind_group(0, &uniforms_bg, &[]);
                pass.set_bind_group(1, &scene_bg, &[]);
                pass.set_bind_group(2, &accum_bg, &[]);
                pass.dispatch_workgroups(groups_x, groups_y, 1);
            }
            gpu.queue.submit(Some(encoder.finish()));
            log::trace!("submitted sample {}/{}", sample + 1, samples);
        }

        let size = width as u64 * height as u64 * 16;
        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("trace-readback"),
        });
        encoder.copy_buffer_to_buffer(&target.accum, 0, &target.staging, 0, size);
        gpu.queue.submit(Some(encoder.finish()));
        let data = gpu.read_buffer(&target.staging, size)?;

        Ok(tonemap(bytemuck::cast_slice(&data), samples))
    }
}

/// Average the accumulated radiance, apply sqrt gamma, and quantize to
/// RGBA8 with opaque alpha.
fn tonemap(accum: &[[f32; 4]], samples: u32) -> Vec<u8> {
    let inv = 1.0 / samples as f32;
    let mut out = Vec::with_capacity(accum.len() * 4);
    for px in accum {
        for c in &px[..3] {
            let v = (c * inv).max(0.0).sqrt().min(1.0);
            out.push((v * 255.0 + 0.5) as u8);
        }
        out.push(255);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::tonemap;

    #[test]
    fn tonemap_averages_and_gammas() {
        // Four samples summing to 1.0 -> mean 0.25 -> sqrt 0.5.
        let accum = [[1.0f32, 0.0, 4.0, 4.0]];
        let out = tonemap(&accum, 4);
        assert_eq!(out.len(), 4);
        assert_eq!(out[0], 128);
        assert_eq!(out[1], 0);
        assert_eq!(out[2], 255);
        assert_eq!(out[3], 255);
    }

    #[test]
    fn tonemap_clamps_overbright() {
        let accum = [[100.0f32, -1.0, 0.0, 1.0]];
        let out = tonemap(&accum, 1);
        assert_eq!(out[0], 255);
        assert_eq!(out[1], 0);
    }
}
