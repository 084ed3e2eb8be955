// src/renderer.rs
// Frame driver: flush -> Stage 1a -> bounds round trip -> Stage 1b -> Stage 2
// This file exists to tie the scene store, HLBVH builder, and path tracer
// into one synchronous per-frame protocol.
// RELEVANT FILES: src/accel/mod.rs, src/tracer.rs, src/scene/mod.rs

use bytemuck::Zeroable;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use wgpu::util::DeviceExt;

use crate::accel::HlbvhBuilder;
use crate::error::RenderResult;
use crate::gpu::GpuContext;
use crate::scene::types::TraceUniforms;
use crate::scene::{Camera, Scene};
use crate::tracer::PathTracer;

/// Offscreen renderer. Every call to [`Renderer::render_frame`] re-uploads
/// the scene, rebuilds the BVH from scratch on the device, and traces the
/// configured samples per pixel.
pub struct Renderer {
    uniforms: wgpu::Buffer,
    builder: HlbvhBuilder,
    tracer: PathTracer,
    rng: StdRng,
}

impl Renderer {
    pub fn new(gpu: &GpuContext) -> RenderResult<Self> {
        Self::with_seed(gpu, rand::thread_rng().gen())
    }

    /// Deterministic sample-seed sequence for reproducible renders.
    pub fn with_seed(gpu: &GpuContext, seed: u64) -> RenderResult<Self> {
        let uniforms = gpu
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("trace-uniforms"),
                contents: bytemuck::bytes_of(&TraceUniforms::zeroed()),
                usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            });
        Ok(Self {
            uniforms,
            builder: HlbvhBuilder::new(gpu)?,
            tracer: PathTracer::new(gpu)?,
            rng: StdRng::seed_from_u64(seed),
        })
    }

    /// Render one frame and return the RGBA8 image, row-major from the
    /// top-left.
    pub fn render_frame(
        &mut self,
        gpu: &GpuContext,
        scene: &mut Scene,
        camera: &Camera,
        width: u32,
        height: u32,
    ) -> RenderResult<Vec<u8>> {
        scene.flush(gpu)?;

        let uniforms = TraceUniforms {
            cam_pos: camera.position.to_array(),
            _pad0: 0.0,
            cam_look_at: camera.look_at.to_array(),
            _pad1: 0.0,
            cam_up_dir: camera.up.to_array(),
            _pad2: 0.0,
            vertical_fov: camera.vertical_fov,
            num_triangles: scene.triangle_count(),
            num_spheres: scene.sphere_count(),
            num_materials: scene.material_count(),
            num_lights: scene.light_count(),
            max_ray_trace_depth: scene.max_ray_trace_depth(),
            random_state: self.rng.gen(),
            _pad3: 0,
        };
        gpu.queue
            .write_buffer(&self.uniforms, 0, bytemuck::bytes_of(&uniforms));

        let bounds = self.builder.build_frame(gpu, scene, &self.uniforms)?;
        log::debug!(
            "frame: {} primitives, bounds min {:?} max {:?}",
            scene.primitive_count(),
            bounds.min,
            bounds.max
        );

        let nodes = self.builder.nodes_buffer()?;
        self.tracer.trace(
            gpu,
            scene,
            &self.uniforms,
            nodes,
            width,
            height,
            scene.rays_per_pixel(),
            &mut self.rng,
        )
    }

    /// Builder access for tests that inspect the constructed tree.
    pub fn builder(&self) -> &HlbvhBuilder {
        &self.builder
    }
}
