// src/scene/types.rs
// GPU-visible data types shared by host code and the WGSL kernels
// This file exists to pin the byte-exact #[repr(C)] layouts every shader reads.
// RELEVANT FILES: src/shaders/transform.wgsl, src/shaders/build.wgsl, src/accel/cpu.rs

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec3};

/// Sentinel index meaning "no node" / "no parent" / "not a leaf payload".
pub const INVALID_INDEX: u32 = u32::MAX;

/// `AabbGpu::primitive_type` value for spheres.
pub const PRIMITIVE_SPHERE: u32 = 0;
/// `AabbGpu::primitive_type` value for triangles.
pub const PRIMITIVE_TRIANGLE: u32 = 1;

/// Surface behavior selector stored per material.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u32)]
pub enum MaterialType {
    /// Emits its albedo and terminates the path.
    Light = 0,
    /// Lambertian: cosine-weighted hemisphere scatter.
    Diffuse = 1,
    /// Perfect mirror reflection.
    Metallic = 2,
    /// Glass: refract or reflect by Schlick probability, IOR 1.5.
    Dielectric = 3,
}

/// Per-object model matrix, column-major, 64 bytes.
#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub struct ModelGpu {
    pub matrix: [[f32; 4]; 4],
}

impl ModelGpu {
    pub fn from_mat4(m: Mat4) -> Self {
        Self {
            matrix: m.to_cols_array_2d(),
        }
    }

    pub fn to_mat4(&self) -> Mat4 {
        Mat4::from_cols_array_2d(&self.matrix)
    }
}

/// Triangle with 16-byte-aligned vertices, 64 bytes.
///
/// Vertices are authored in model space; the transform kernel overwrites
/// them with world-space positions each frame.
#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub struct TriangleGpu {
    pub v0: [f32; 3],
    pub _pad0: f32,
    pub v1: [f32; 3],
    pub _pad1: f32,
    pub v2: [f32; 3],
    pub _pad2: f32,
    pub material_index: u32,
    pub model_index: u32,
    pub _pad3: [u32; 2],
}

impl TriangleGpu {
    pub fn new(v0: Vec3, v1: Vec3, v2: Vec3, material_index: u32, model_index: u32) -> Self {
        Self {
            v0: v0.to_array(),
            _pad0: 0.0,
            v1: v1.to_array(),
            _pad1: 0.0,
            v2: v2.to_array(),
            _pad2: 0.0,
            material_index,
            model_index,
            _pad3: [0; 2],
        }
    }
}

/// Sphere, 32 bytes. Center in model space until the transform kernel runs.
#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub struct SphereGpu {
    pub center: [f32; 3],
    pub _pad0: f32,
    pub radius: f32,
    pub material_index: u32,
    pub model_index: u32,
    pub _pad1: u32,
}

impl SphereGpu {
    pub fn new(center: Vec3, radius: f32, material_index: u32, model_index: u32) -> Self {
        Self {
            center: center.to_array(),
            _pad0: 0.0,
            radius,
            material_index,
            model_index,
            _pad1: 0,
        }
    }
}

/// Material record, 32 bytes.
#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub struct MaterialGpu {
    pub albedo: [f32; 3],
    pub _pad0: f32,
    pub material_type: u32,
    pub _pad1: [u32; 3],
}

impl MaterialGpu {
    pub fn new(albedo: Vec3, material_type: MaterialType) -> Self {
        Self {
            albedo: albedo.to_array(),
            _pad0: 0.0,
            material_type: material_type as u32,
            _pad1: [0; 3],
        }
    }

    pub fn is_light(&self) -> bool {
        self.material_type == MaterialType::Light as u32
    }
}

/// World-space bounding box with typed primitive backlink, 48 bytes.
///
/// `index` is the typed index into the triangle or sphere array and
/// `primitive_type` selects which (`PRIMITIVE_TRIANGLE` / `PRIMITIVE_SPHERE`).
#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub struct AabbGpu {
    pub center: [f32; 3],
    pub _pad0: f32,
    pub min_x: f32,
    pub max_x: f32,
    pub min_y: f32,
    pub max_y: f32,
    pub min_z: f32,
    pub max_z: f32,
    pub index: u32,
    pub primitive_type: u32,
}

impl AabbGpu {
    pub fn from_min_max(min: Vec3, max: Vec3, index: u32, primitive_type: u32) -> Self {
        let center = (min + max) * 0.5;
        Self {
            center: center.to_array(),
            _pad0: 0.0,
            min_x: min.x,
            max_x: max.x,
            min_y: min.y,
            max_y: max.y,
            min_z: min.z,
            max_z: max.z,
            index,
            primitive_type,
        }
    }

    pub fn min(&self) -> Vec3 {
        Vec3::new(self.min_x, self.min_y, self.min_z)
    }

    pub fn max(&self) -> Vec3 {
        Vec3::new(self.max_x, self.max_y, self.max_z)
    }

    /// Smallest box containing both operands. Backlink fields are cleared.
    pub fn union(&self, other: &AabbGpu) -> AabbGpu {
        AabbGpu::from_min_max(
            self.min().min(other.min()),
            self.max().max(other.max()),
            0,
            0,
        )
    }

    pub fn contains(&self, other: &AabbGpu) -> bool {
        self.min_x <= other.min_x
            && self.min_y <= other.min_y
            && self.min_z <= other.min_z
            && self.max_x >= other.max_x
            && self.max_y >= other.max_y
            && self.max_z >= other.max_z
    }
}

/// Morton key paired with the index of the AABB it was derived from, 8 bytes.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Pod, Zeroable)]
pub struct MortonPrimitive {
    pub code: u32,
    pub aabb_index: u32,
}

/// BVH node, 64 bytes. Leaves have `left == right == INVALID_INDEX` and carry
/// the primitive backlink in their embedded AABB; internal nodes get their
/// AABB filled in by the bottom-up propagation kernel.
#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub struct BvhNodeGpu {
    pub aabb: AabbGpu,
    pub left: u32,
    pub right: u32,
    pub aabb_index: u32,
    pub _pad0: u32,
}

impl BvhNodeGpu {
    pub fn is_leaf(&self) -> bool {
        self.left == INVALID_INDEX
    }
}

/// Per-node construction scratch: parent link plus a visit counter used by
/// the propagation kernel. One entry per node (2n-1 total), 8 bytes each.
#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub struct ConstructionInfo {
    pub parent: u32,
    pub visits: u32,
}

/// Uniform block shared by every kernel, 80 bytes. Field order and offsets
/// are load-bearing; the WGSL declarations mirror this exactly.
#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub struct TraceUniforms {
    pub cam_pos: [f32; 3],
    pub _pad0: f32,
    pub cam_look_at: [f32; 3],
    pub _pad1: f32,
    pub cam_up_dir: [f32; 3],
    pub _pad2: f32,
    pub vertical_fov: f32,
    pub num_triangles: u32,
    pub num_spheres: u32,
    pub num_materials: u32,
    pub num_lights: u32,
    pub max_ray_trace_depth: u32,
    pub random_state: u32,
    pub _pad3: u32,
}

impl TraceUniforms {
    /// Byte offset of `random_state`, rewritten before every sample pass.
    pub const RANDOM_STATE_OFFSET: u64 = std::mem::offset_of!(TraceUniforms, random_state) as u64;
}

/// Scene-enclosing bounds produced by the reduction kernel, 32 bytes.
#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub struct SceneBounds {
    pub min: [f32; 3],
    pub _pad0: f32,
    pub max: [f32; 3],
    pub _pad1: f32,
}

impl SceneBounds {
    pub fn min_v(&self) -> Vec3 {
        Vec3::from_array(self.min)
    }

    pub fn max_v(&self) -> Vec3 {
        Vec3::from_array(self.max)
    }
}
