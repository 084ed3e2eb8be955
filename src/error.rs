// src/error.rs
// Unified error handling for the renderer
// This file exists to give every fallible path one error type with stable categories.
// RELEVANT FILES: src/gpu.rs, src/scene/mod.rs, src/accel/mod.rs, src/tracer.rs

use thiserror::Error;

/// Unified error type for GPU rendering operations.
#[derive(Error, Debug)]
pub enum RenderError {
    /// Adapter/device acquisition or loss
    #[error("Device error: {0}")]
    Device(String),

    /// Host-to-device upload failures
    #[error("Upload error: {0}")]
    Upload(String),

    /// Pipeline or pass execution failures
    #[error("Render error: {0}")]
    Render(String),

    /// Device-to-host readback failures (map_async and friends)
    #[error("Readback error: {0}")]
    Readback(String),

    /// Scene misuse: staging-rule violations, bad indices, empty scenes
    #[error("Scene error: {0}")]
    Scene(String),

    /// File I/O errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl RenderError {
    pub fn device(msg: impl Into<String>) -> Self {
        RenderError::Device(msg.into())
    }

    pub fn upload(msg: impl Into<String>) -> Self {
        RenderError::Upload(msg.into())
    }

    pub fn render(msg: impl Into<String>) -> Self {
        RenderError::Render(msg.into())
    }

    pub fn readback(msg: impl Into<String>) -> Self {
        RenderError::Readback(msg.into())
    }

    pub fn scene(msg: impl Into<String>) -> Self {
        RenderError::Scene(msg.into())
    }
}

/// Convenience result alias used throughout the crate.
pub type RenderResult<T> = Result<T, RenderError>;
