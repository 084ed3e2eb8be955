// src/lib.rs
// glint: GPU path tracer with per-frame HLBVH construction
// This file exists to wire the crate's modules together and re-export the
// public surface.
// RELEVANT FILES: src/renderer.rs, src/accel/mod.rs, src/scene/mod.rs

//! GPU path tracer that rebuilds its bounding volume hierarchy from scratch
//! every frame, entirely in compute shaders.
//!
//! A frame runs as two waited compute submissions followed by tracing:
//! primitives are transformed to world space and their enclosing bounds
//! reduced on the device, the host reads the bounds back and re-uploads them,
//! then Morton assignment, radix sort, parallel radix-tree construction, and
//! bottom-up AABB propagation produce the BVH the trace kernel consumes.

pub mod accel;
pub mod error;
pub mod gpu;
pub mod renderer;
pub mod scene;
pub mod tracer;

pub use error::{RenderError, RenderResult};
pub use gpu::GpuContext;
pub use renderer::Renderer;
pub use scene::{Camera, MaterialType, Scene};
