// src/scene/mod.rs
// Host-side primitive store with staging rules and per-frame GPU upload
// This file exists to own the authoritative model-space scene arrays and the
// storage buffers the kernels bind, with misuse rejected before device work.
// RELEVANT FILES: src/scene/types.rs, src/accel/mod.rs, src/tracer.rs

pub mod camera;
pub mod presets;
pub mod types;

pub use camera::Camera;
pub use types::*;

use glam::{Mat4, Vec3};
use wgpu::util::DeviceExt;

use crate::error::{RenderError, RenderResult};
use crate::gpu::GpuContext;

const DEFAULT_MAX_DEPTH: u32 = 5;
const DEFAULT_RAYS_PER_PIXEL: u32 = 16;

/// Storage buffers holding the flushed scene arrays, plus their element
/// capacities. Buffers are grown (reallocated) when an array outgrows its
/// capacity and reused when it shrinks.
pub struct SceneBuffers {
    pub models: wgpu::Buffer,
    pub triangles: wgpu::Buffer,
    pub spheres: wgpu::Buffer,
    pub materials: wgpu::Buffer,
    model_capacity: usize,
    triangle_capacity: usize,
    sphere_capacity: usize,
    material_capacity: usize,
}

/// Authoritative scene store.
///
/// Geometry is authored in model space and never mutated after
/// finalization; only model matrices may change between frames. Every frame
/// re-uploads the model-space arrays because the transform kernel overwrites
/// them in place with world-space data.
pub struct Scene {
    models: Vec<ModelGpu>,
    triangles: Vec<TriangleGpu>,
    spheres: Vec<SphereGpu>,
    materials: Vec<MaterialGpu>,
    max_ray_trace_depth: u32,
    rays_per_pixel: u32,
    finalized: bool,
    gpu: Option<SceneBuffers>,
}

impl Default for Scene {
    fn default() -> Self {
        Self::new()
    }
}

impl Scene {
    pub fn new() -> Self {
        Self {
            models: Vec::new(),
            triangles: Vec::new(),
            spheres: Vec::new(),
            materials: Vec::new(),
            max_ray_trace_depth: DEFAULT_MAX_DEPTH,
            rays_per_pixel: DEFAULT_RAYS_PER_PIXEL,
            finalized: false,
            gpu: None,
        }
    }

    fn reject_if_finalized(&self, what: &str) -> RenderResult<()> {
        if self.finalized {
            return Err(RenderError::scene(format!(
                "cannot add {} after finalization",
                what
            )));
        }
        Ok(())
    }

    /// Register a model matrix and return its index.
    pub fn add_model(&mut self, matrix: Mat4) -> RenderResult<u32> {
        self.reject_if_finalized("model")?;
        self.models.push(ModelGpu::from_mat4(matrix));
        Ok((self.models.len() - 1) as u32)
    }

    /// Register a material and return its index.
    pub fn add_material(&mut self, albedo: Vec3, material_type: MaterialType) -> RenderResult<u32> {
        self.reject_if_finalized("material")?;
        self.materials.push(MaterialGpu::new(albedo, material_type));
        Ok((self.materials.len() - 1) as u32)
    }

    fn check_refs(&self, material_index: u32, model_index: u32) -> RenderResult<()> {
        if material_index as usize >= self.materials.len() {
            return Err(RenderError::scene(format!(
                "material index {} out of range ({} materials)",
                material_index,
                self.materials.len()
            )));
        }
        if model_index as usize >= self.models.len() {
            return Err(RenderError::scene(format!(
                "model index {} out of range ({} models)",
                model_index,
                self.models.len()
            )));
        }
        Ok(())
    }

    /// Add a triangle with model-space vertices.
    pub fn add_triangle(
        &mut self,
        v0: Vec3,
        v1: Vec3,
        v2: Vec3,
        material_index: u32,
        model_index: u32,
    ) -> RenderResult<u32> {
        self.reject_if_finalized("triangle")?;
        self.check_refs(material_index, model_index)?;
        self.triangles
            .push(TriangleGpu::new(v0, v1, v2, material_index, model_index));
        Ok((self.triangles.len() - 1) as u32)
    }

    /// Add a quad as two triangles spanning `corner`, `corner + edge_u`,
    /// `corner + edge_u + edge_v`, `corner + edge_v`.
    pub fn add_quad(
        &mut self,
        corner: Vec3,
        edge_u: Vec3,
        edge_v: Vec3,
        material_index: u32,
        model_index: u32,
    ) -> RenderResult<()> {
        let far = corner + edge_u + edge_v;
        self.add_triangle(corner, corner + edge_u, far, material_index, model_index)?;
        self.add_triangle(corner, far, corner + edge_v, material_index, model_index)?;
        Ok(())
    }

    /// Add a sphere with model-space center and radius.
    pub fn add_sphere(
        &mut self,
        center: Vec3,
        radius: f32,
        material_index: u32,
        model_index: u32,
    ) -> RenderResult<u32> {
        self.reject_if_finalized("sphere")?;
        self.check_refs(material_index, model_index)?;
        self.spheres
            .push(SphereGpu::new(center, radius, material_index, model_index));
        Ok((self.spheres.len() - 1) as u32)
    }

    /// Replace a model matrix. Allowed after finalization; this is the only
    /// supported per-frame scene mutation.
    pub fn set_model_transform(&mut self, model_index: u32, matrix: Mat4) -> RenderResult<()> {
        let slot = self
            .models
            .get_mut(model_index as usize)
            .ok_or_else(|| RenderError::scene(format!("model index {} out of range", model_index)))?;
        *slot = ModelGpu::from_mat4(matrix);
        Ok(())
    }

    pub fn set_max_ray_trace_depth(&mut self, depth: u32) {
        self.max_ray_trace_depth = depth.max(1);
    }

    pub fn set_rays_per_pixel(&mut self, rays: u32) {
        self.rays_per_pixel = rays.max(1);
    }

    pub fn max_ray_trace_depth(&self) -> u32 {
        self.max_ray_trace_depth
    }

    pub fn rays_per_pixel(&self) -> u32 {
        self.rays_per_pixel
    }

    pub fn model_count(&self) -> u32 {
        self.models.len() as u32
    }

    pub fn triangle_count(&self) -> u32 {
        self.triangles.len() as u32
    }

    pub fn sphere_count(&self) -> u32 {
        self.spheres.len() as u32
    }

    pub fn material_count(&self) -> u32 {
        self.materials.len() as u32
    }

    /// Total primitive count, the `n` every per-primitive dispatch sizes on.
    pub fn primitive_count(&self) -> u32 {
        self.triangle_count() + self.sphere_count()
    }

    /// Number of primitives referencing a `Light` material.
    pub fn light_count(&self) -> u32 {
        let is_light = |mi: u32| {
            self.materials
                .get(mi as usize)
                .map(|m| m.is_light())
                .unwrap_or(false)
        };
        let tris = self
            .triangles
            .iter()
            .filter(|t| is_light(t.material_index))
            .count();
        let sphs = self
            .spheres
            .iter()
            .filter(|s| is_light(s.material_index))
            .count();
        (tris + sphs) as u32
    }

    pub fn is_finalized(&self) -> bool {
        self.finalized
    }

    pub fn models(&self) -> &[ModelGpu] {
        &self.models
    }

    pub fn triangles(&self) -> &[TriangleGpu] {
        &self.triangles
    }

    pub fn spheres(&self) -> &[SphereGpu] {
        &self.spheres
    }

    pub fn materials(&self) -> &[MaterialGpu] {
        &self.materials
    }

    /// Validate the minimum renderable scene and freeze geometry. The
    /// kernels index both primitive arrays unconditionally, so each must be
    /// non-empty before any device work is recorded.
    pub fn prep_for_render(&mut self) -> RenderResult<()> {
        if self.finalized {
            return Err(RenderError::scene("scene already finalized"));
        }
        if self.models.is_empty() {
            return Err(RenderError::scene("scene has no models"));
        }
        if self.materials.is_empty() {
            return Err(RenderError::scene("scene has no materials"));
        }
        if self.triangles.is_empty() {
            return Err(RenderError::scene(
                "scene has no triangles; at least one is required",
            ));
        }
        if self.spheres.is_empty() {
            return Err(RenderError::scene(
                "scene has no spheres; at least one is required",
            ));
        }
        self.finalized = true;
        log::debug!(
            "scene finalized: {} triangles, {} spheres, {} materials, {} models, {} lights",
            self.triangle_count(),
            self.sphere_count(),
            self.material_count(),
            self.model_count(),
            self.light_count()
        );
        Ok(())
    }

    /// Upload the current scene arrays, creating or growing the storage
    /// buffers as needed. Must be called once per frame before Stage 1a.
    pub fn flush(&mut self, gpu: &GpuContext) -> RenderResult<&SceneBuffers> {
        if !self.finalized {
            return Err(RenderError::scene("flush called before prep_for_render"));
        }

        let needs_create = match &self.gpu {
            None => true,
            Some(b) => {
                b.model_capacity < self.models.len()
                    || b.triangle_capacity < self.triangles.len()
                    || b.sphere_capacity < self.spheres.len()
                    || b.material_capacity < self.materials.len()
            }
        };

        if needs_create {
            self.gpu = Some(SceneBuffers {
                models: create_storage_init(gpu, "scene-models", &self.models),
                triangles: create_storage_init(gpu, "scene-triangles", &self.triangles),
                spheres: create_storage_init(gpu, "scene-spheres", &self.spheres),
                materials: create_storage_init(gpu, "scene-materials", &self.materials),
                model_capacity: self.models.len(),
                triangle_capacity: self.triangles.len(),
                sphere_capacity: self.spheres.len(),
                material_capacity: self.materials.len(),
            });
            log::debug!(
                "scene buffers (re)allocated for {} primitives",
                self.primitive_count()
            );
        } else if let Some(b) = &self.gpu {
            // The transform kernel clobbered last frame's contents, so every
            // array goes up again even when nothing changed on the host.
            gpu.queue
                .write_buffer(&b.models, 0, bytemuck::cast_slice(&self.models));
            gpu.queue
                .write_buffer(&b.triangles, 0, bytemuck::cast_slice(&self.triangles));
            gpu.queue
                .write_buffer(&b.spheres, 0, bytemuck::cast_slice(&self.spheres));
            gpu.queue
                .write_buffer(&b.materials, 0, bytemuck::cast_slice(&self.materials));
        }

        self.buffers()
    }

    /// Flushed buffers, or a scene error if `flush` has not run yet.
    pub fn buffers(&self) -> RenderResult<&SceneBuffers> {
        self.gpu
            .as_ref()
            .ok_or_else(|| RenderError::scene("scene buffers not flushed"))
    }
}

fn create_storage_init<T: bytemuck::Pod>(
    gpu: &GpuContext,
    label: &str,
    data: &[T],
) -> wgpu::Buffer {
    gpu.device
        .create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(label),
            contents: bytemuck::cast_slice(data),
            usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST,
        })
}
