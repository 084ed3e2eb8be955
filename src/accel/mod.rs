// src/accel/mod.rs
// GPU HLBVH builder: per-frame construction of the BVH in compute shaders
// This file exists to own the seven Stage-1 pipelines, the derived buffers,
// and the two-submission frame protocol with its host bounds round trip.
// RELEVANT FILES: src/shaders/build.wgsl, src/accel/cpu.rs, src/renderer.rs

pub mod cpu;

use crate::error::{RenderError, RenderResult};
use crate::gpu::GpuContext;
use crate::scene::types::{BvhNodeGpu, SceneBounds};
use crate::scene::Scene;

const WORKGROUP_PRIMITIVE: u32 = 32;
const WORKGROUP_BUILD: u32 = 256;

/// Derived per-frame buffers, sized for `capacity` primitives and reused
/// across frames until the primitive count grows past it.
struct FrameBuffers {
    capacity: u32,
    aabbs: wgpu::Buffer,
    morton_ping: wgpu::Buffer,
    morton_pong: wgpu::Buffer,
    nodes: wgpu::Buffer,
    construction: wgpu::Buffer,
    bounds: wgpu::Buffer,
    bounds_staging: wgpu::Buffer,
    bounds_uniform: wgpu::Buffer,
}

/// Builds the HLBVH from scratch every frame.
///
/// Stage 1a transforms primitives to world space, extracts their AABBs and
/// reduces the enclosing scene bounds, which the host reads back and
/// re-uploads as a uniform. Stage 1b assigns Morton keys, radix-sorts them,
/// runs the parallel radix-tree construction and propagates AABBs bottom-up.
/// Both submissions are waited on before tracing starts.
pub struct HlbvhBuilder {
    transform_pipeline: wgpu::ComputePipeline,
    extract_pipeline: wgpu::ComputePipeline,
    bounds_pipeline: wgpu::ComputePipeline,
    morton_pipeline: wgpu::ComputePipeline,
    sort_pipeline: wgpu::ComputePipeline,
    build_pipeline: wgpu::ComputePipeline,
    refit_pipeline: wgpu::ComputePipeline,
    frame: Option<FrameBuffers>,
}

impl HlbvhBuilder {
    pub fn new(gpu: &GpuContext) -> RenderResult<Self> {
        let device = &gpu.device;

        let transform_module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("hlbvh-transform"),
            source: wgpu::ShaderSource::Wgsl(include_str!("../shaders/transform.wgsl").into()),
        });
        let bounds_module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("hlbvh-scene-bounds"),
            source: wgpu::ShaderSource::Wgsl(include_str!("../shaders/scene_bounds.wgsl").into()),
        });
        let morton_module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("hlbvh-morton"),
            source: wgpu::ShaderSource::Wgsl(include_str!("../shaders/morton.wgsl").into()),
        });
        let sort_module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("hlbvh-sort"),
            source: wgpu::ShaderSource::Wgsl(include_str!("../shaders/sort.wgsl").into()),
        });
        let build_module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("hlbvh-build"),
            source: wgpu::ShaderSource::Wgsl(include_str!("../shaders/build.wgsl").into()),
        });
        let refit_module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("hlbvh-refit"),
            source: wgpu::ShaderSource::Wgsl(include_str!("../shaders/refit.wgsl").into()),
        });

        let pipeline = |label: &str, module: &wgpu::ShaderModule, entry: &str| {
            device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                label: Some(label),
                layout: None,
                module,
                entry_point: entry,
            })
        };

        Ok(Self {
            transform_pipeline: pipeline("transform-primitives", &transform_module, "transform_primitives"),
            extract_pipeline: pipeline("extract-aabbs", &transform_module, "extract_aabbs"),
            bounds_pipeline: pipeline("reduce-bounds", &bounds_module, "reduce_bounds"),
            morton_pipeline: pipeline("assign-morton", &morton_module, "assign_morton_codes"),
            sort_pipeline: pipeline("sort-morton", &sort_module, "sort_morton_codes"),
            build_pipeline: pipeline("build-radix-tree", &build_module, "build_radix_tree"),
            refit_pipeline: pipeline("propagate-bounds", &refit_module, "propagate_bounds"),
            frame: None,
        })
    }

    fn ensure_buffers(&mut self, gpu: &GpuContext, prim_count: u32) {
        let recreate = match &self.frame {
            None => true,
            Some(f) => f.capacity < prim_count,
        };
        if !recreate {
            return;
        }
        let device = &gpu.device;
        let n = prim_count as u64;
        let node_count = 2 * n - 1;
        let storage = wgpu::BufferUsages::STORAGE;
        let make = |label: &str, size: u64, usage: wgpu::BufferUsages| {
            device.create_buffer(&wgpu::BufferDescriptor {
                label: Some(label),
                size,
                usage,
                mapped_at_creation: false,
            })
        };
        self.frame = Some(FrameBuffers {
            capacity: prim_count,
            aabbs: make("hlbvh-aabbs", n * 48, storage),
            morton_ping: make("hlbvh-morton-ping", n * 8, storage),
            morton_pong: make("hlbvh-morton-pong", n * 8, storage),
            nodes: make("hlbvh-nodes", node_count * 64, storage | wgpu::BufferUsages::COPY_SRC),
            construction: make(
                "hlbvh-construction",
                node_count * 8,
                storage | wgpu::BufferUsages::COPY_DST,
            ),
            bounds: make("hlbvh-bounds", 32, storage | wgpu::BufferUsages::COPY_SRC),
            bounds_staging: make(
                "hlbvh-bounds-staging",
                32,
                wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            ),
            bounds_uniform: make(
                "hlbvh-bounds-uniform",
                32,
                wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            ),
        });
        log::debug!(
            "HLBVH buffers allocated for {} primitives ({} nodes)",
            prim_count,
            node_count
        );
    }

    fn frame_buffers(&self) -> RenderResult<&FrameBuffers> {
        self.frame
            .as_ref()
            .ok_or_else(|| RenderError::render("HLBVH buffers not allocated"))
    }

    /// The node buffer for the most recent build, bound read-only by the
    /// tracer.
    pub fn nodes_buffer(&self) -> RenderResult<&wgpu::Buffer> {
        Ok(&self.frame_buffers()?.nodes)
    }

    /// Run both Stage-1 submissions for the flushed scene. Returns the
    /// enclosing scene bounds read back between them.
    pub fn build_frame(
        &mut self,
        gpu: &GpuContext,
        scene: &Scene,
        uniforms: &wgpu::Buffer,
    ) -> RenderResult<SceneBounds> {
        let n = scene.primitive_count();
        if n == 0 {
            return Err(RenderError::scene("cannot build BVH for empty scene"));
        }
        self.ensure_buffers(gpu, n);

        let scene_buffers = scene.buffers()?;
        let frame = self.frame_buffers()?;
        let device = &gpu.device;

        fn entry(binding: u32, buffer: &wgpu::Buffer) -> wgpu::BindGroupEntry<'_> {
            wgpu::BindGroupEntry {
                binding,
                resource: buffer.as_entire_binding(),
            }
        }
        let prim_groups = (n + WORKGROUP_PRIMITIVE - 1) / WORKGROUP_PRIMITIVE;
        let build_groups = (n + WORKGROUP_BUILD - 1) / WORKGROUP_BUILD;

        // Stage 1a: transform, extract, reduce, copy bounds out.
        let transform_bg = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("transform-bg"),
            layout: &self.transform_pipeline.get_bind_group_layout(0),
            entries: &[
                entry(0, uniforms),
                entry(1, &scene_buffers.models),
                entry(2, &scene_buffers.triangles),
                entry(3, &scene_buffers.spheres),
            ],
        });
        let extract_bg = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("extract-bg"),
            layout: &self.extract_pipeline.get_bind_group_layout(0),
            entries: &[
                entry(0, uniforms),
                entry(2, &scene_buffers.triangles),
                entry(3, &scene_buffers.spheres),
                entry(4, &frame.aabbs),
            ],
        });
        let bounds_bg = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("bounds-bg"),
            layout: &self.bounds_pipeline.get_bind_group_layout(0),
            entries: &[
                entry(0, uniforms),
                entry(1, &frame.aabbs),
                entry(2, &frame.bounds),
            ],
        });

        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("hlbvh-stage1a"),
        });
        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("transform-primitives"),
                timestamp_writes: None,
            });
            pass.set_pipeline(&self.transform_pipeline);
            pass.set_bind_group(0, &transform_bg, &[]);
            pass.dispatch_workgroups(prim_groups, 1, 1);
        }
        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("extract-aabbs"),
                timestamp_writes: None,
            });
            pass.set_pipeline(&self.extract_pipeline);
            pass.set_bind_group(0, &extract_bg, &[]);
            pass.dispatch_workgroups(prim_groups, 1, 1);
        }
        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("reduce-bounds"),
                timestamp_writes: None,
            });
            pass.set_pipeline(&self.bounds_pipeline);
            pass.set_bind_group(0, &bounds_bg, &[]);
            pass.dispatch_workgroups(1, 1, 1);
        }
        encoder.copy_buffer_to_buffer(&frame.bounds, 0, &frame.bounds_staging, 0, 32);
        gpu.queue.submit(Some(encoder.finish()));

        // Host round trip: the Morton kernel needs the finished bounds as a
        // uniform, so this wait sits between the two submissions.
        let data = gpu.read_buffer(&frame.bounds_staging, 32)?;
        let bounds: SceneBounds = *bytemuck::from_bytes(&data);
        log::debug!(
            "scene bounds: min {:?} max {:?}",
            bounds.min,
            bounds.max
        );
        gpu.queue
            .write_buffer(&frame.bounds_uniform, 0, bytemuck::bytes_of(&bounds));

        // Stage 1b: morton, sort, build, refit.
        let morton_bg = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("morton-bg"),
            layout: &self.morton_pipeline.get_bind_group_layout(0),
            entries: &[
                entry(0, uniforms),
                entry(1, &frame.bounds_uniform),
                entry(2, &frame.aabbs),
                entry(3, &frame.morton_ping),
            ],
        });
        let sort_bg = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("sort-bg"),
            layout: &self.sort_pipeline.get_bind_group_layout(0),
            entries: &[
                entry(0, uniforms),
                entry(1, &frame.morton_ping),
                entry(2, &frame.morton_pong),
            ],
        });
        let build_bg = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("build-bg"),
            layout: &self.build_pipeline.get_bind_group_layout(0),
            entries: &[
                entry(0, uniforms),
                entry(1, &frame.morton_ping),
                entry(2, &frame.aabbs),
                entry(3, &frame.nodes),
                entry(4, &frame.construction),
            ],
        });
        let refit_bg = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("refit-bg"),
            layout: &self.refit_pipeline.get_bind_group_layout(0),
            entries: &[
                entry(0, uniforms),
                entry(1, &frame.nodes),
                entry(2, &frame.construction),
            ],
        });

        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("hlbvh-stage1b"),
        });
        // Visit counters must start at zero for the refit arrival rule.
        encoder.clear_buffer(&frame.construction, 0, None);
        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("assign-morton"),
                timestamp_writes: None,
            });
            pass.set_pipeline(&self.morton_pipeline);
            pass.set_bind_group(0, &morton_bg, &[]);
            pass.dispatch_workgroups(prim_groups, 1, 1);
        }
        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("sort-morton"),
                timestamp_writes: None,
            });
            pass.set_pipeline(&self.sort_pipeline);
            pass.set_bind_group(0, &sort_bg, &[]);
            pass.dispatch_workgroups(1, 1, 1);
        }
        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("build-radix-tree"),
                timestamp_writes: None,
            });
            pass.set_pipeline(&self.build_pipeline);
            pass.set_bind_group(0, &build_bg, &[]);
            pass.dispatch_workgroups(build_groups, 1, 1);
        }
        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("propagate-bounds"),
                timestamp_writes: None,
            });
            pass.set_pipeline(&self.refit_pipeline);
            pass.set_bind_group(0, &refit_bg, &[]);
            pass.dispatch_workgroups(prim_groups, 1, 1);
        }
        gpu.queue.submit(Some(encoder.finish()));
        gpu.device.poll(wgpu::Maintain::Wait);

        Ok(bounds)
    }

    /// Copy the node array back to the host. Debug/test helper.
    pub fn read_nodes(&self, gpu: &GpuContext, prim_count: u32) -> RenderResult<Vec<BvhNodeGpu>> {
        let frame = self.frame_buffers()?;
        let size = (2 * prim_count as u64 - 1) * 64;
        let staging = gpu.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("hlbvh-nodes-staging"),
            size,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let mut encoder = gpu
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("hlbvh-nodes-readback"),
            });
        encoder.copy_buffer_to_buffer(&frame.nodes, 0, &staging, 0, size);
        gpu.queue.submit(Some(encoder.finish()));
        let data = gpu.read_buffer(&staging, size)?;
        Ok(bytemuck::cast_slice(&data).to_vec())
    }
}
