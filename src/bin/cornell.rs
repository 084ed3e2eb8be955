// src/bin/cornell.rs
// Offscreen demo: render the Cornell box preset to cornell.png

use anyhow::{Context, Result};

use glint::scene::presets;
use glint::{GpuContext, Renderer};

fn main() -> Result<()> {
    env_logger::init();

    let gpu = GpuContext::new().context("failed to acquire a GPU")?;
    let mut scene = presets::cornell_box()?;
    let camera = presets::cornell_camera();
    let mut renderer = Renderer::new(&gpu)?;

    let (width, height) = (800, 800);
    let pixels = renderer.render_frame(&gpu, &mut scene, &camera, width, height)?;

    let image = image::RgbaImage::from_raw(width, height, pixels)
        .context("rendered pixel buffer has unexpected size")?;
    image.save("cornell.png").context("failed to write cornell.png")?;
    println!("wrote cornell.png ({}x{})", width, height);
    Ok(())
}
