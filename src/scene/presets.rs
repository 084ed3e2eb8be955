// src/scene/presets.rs
// Ready-made scenes used by the demo binary and the GPU integration tests

use glam::{Mat4, Vec3};
use rand::Rng;

use crate::error::RenderResult;
use crate::scene::{Camera, MaterialType, Scene};

/// Cornell-style box: colored walls built from quads, a spherical light
/// under the roof, and one sphere of each non-light material inside.
pub fn cornell_box() -> RenderResult<Scene> {
    let mut scene = Scene::new();

    let identity = scene.add_model(Mat4::IDENTITY)?;

    let green = scene.add_material(Vec3::new(0.1, 1.0, 0.1), MaterialType::Diffuse)?;
    let red = scene.add_material(Vec3::new(1.0, 0.1, 0.1), MaterialType::Diffuse)?;
    let blue = scene.add_material(Vec3::new(0.1, 0.1, 1.0), MaterialType::Diffuse)?;
    let white = scene.add_material(Vec3::new(1.0, 1.0, 1.0), MaterialType::Diffuse)?;
    let light = scene.add_material(Vec3::new(1.0, 1.0, 1.0), MaterialType::Light)?;
    let matte = scene.add_material(Vec3::new(0.3, 0.5, 0.7), MaterialType::Diffuse)?;
    let mirror = scene.add_material(Vec3::new(0.8, 0.8, 0.9), MaterialType::Metallic)?;
    let glass = scene.add_material(Vec3::new(1.0, 1.0, 1.0), MaterialType::Dielectric)?;

    // Box interior: x in [-10, 10], y in [-4, 6], z in [4, 13].
    let span_x = Vec3::new(20.0, 0.0, 0.0);
    let span_y = Vec3::new(0.0, 10.0, 0.0);
    let span_z = Vec3::new(0.0, 0.0, 9.0);
    scene.add_quad(Vec3::new(-10.0, -4.0, 4.0), span_x, span_z, green, identity)?;
    scene.add_quad(Vec3::new(-10.0, 6.0, 4.0), span_x, span_z, red, identity)?;
    scene.add_quad(Vec3::new(-10.0, -4.0, 13.0), span_x, span_y, blue, identity)?;
    scene.add_quad(Vec3::new(-10.0, -4.0, 4.0), span_z, span_y, white, identity)?;
    scene.add_quad(Vec3::new(10.0, -4.0, 4.0), span_z, span_y, white, identity)?;

    // Spheres are authored at the origin and placed by their model matrices
    // so the transform stage does real work every frame.
    let lamp = scene.add_model(Mat4::from_translation(Vec3::new(0.0, 5.0, 10.0)))?;
    scene.add_sphere(Vec3::ZERO, 1.0, light, lamp)?;

    let ball = scene.add_model(Mat4::from_translation(Vec3::new(-0.5, 0.0, 12.0)))?;
    scene.add_sphere(Vec3::ZERO, 2.0, matte, ball)?;

    let chrome = scene.add_model(Mat4::from_translation(Vec3::new(4.0, -2.0, 10.0)))?;
    scene.add_sphere(Vec3::ZERO, 2.0, mirror, chrome)?;

    let marble = scene.add_model(Mat4::from_translation(Vec3::new(-4.0, -2.0, 10.0)))?;
    scene.add_sphere(Vec3::ZERO, 2.0, glass, marble)?;

    scene.set_max_ray_trace_depth(5);
    scene.set_rays_per_pixel(16);
    scene.prep_for_render()?;
    Ok(scene)
}

/// Camera framing the Cornell box from outside its open face.
pub fn cornell_camera() -> Camera {
    Camera::new(
        Vec3::new(0.0, 1.0, -10.0),
        Vec3::new(0.0, 1.0, 10.0),
        Vec3::Y,
        80.0,
    )
}

/// Outdoor arrangement: a giant ground sphere, a spherical light, a ring of
/// randomly tinted spheres, and one tilted quad.
pub fn random_spheres<R: Rng>(rng: &mut R) -> RenderResult<Scene> {
    let mut scene = Scene::new();

    let identity = scene.add_model(Mat4::IDENTITY)?;

    let random_color = |rng: &mut R| {
        Vec3::new(
            rng.gen_range(0.0..1.0),
            rng.gen_range(0.0..1.0),
            rng.gen_range(0.0..1.0),
        )
    };

    let ground = scene.add_material(Vec3::splat(0.5), MaterialType::Diffuse)?;
    let light = scene.add_material(Vec3::ONE, MaterialType::Light)?;
    let tint_a = scene.add_material(random_color(rng), MaterialType::Diffuse)?;
    let tint_b = scene.add_material(random_color(rng), MaterialType::Metallic)?;
    let tint_c = scene.add_material(random_color(rng), MaterialType::Diffuse)?;
    let quad_mat = scene.add_material(Vec3::new(0.3, 0.5, 0.7), MaterialType::Diffuse)?;

    scene.add_sphere(Vec3::new(0.0, -1000.0, 0.0), 1000.0, ground, identity)?;
    scene.add_sphere(Vec3::new(0.0, 1.05, 3.5), 1.0, light, identity)?;
    scene.add_sphere(Vec3::new(-4.0, 1.0, 4.0), 2.0, tint_a, identity)?;
    scene.add_sphere(Vec3::new(4.0, 1.0, 4.0), 3.0, tint_b, identity)?;
    scene.add_sphere(Vec3::new(0.0, 1.0, -4.0), 1.0, tint_c, identity)?;
    scene.add_sphere(Vec3::new(4.0, 1.0, -4.0), 2.0, tint_c, identity)?;
    scene.add_sphere(Vec3::new(-4.0, 1.0, -4.0), 3.0, tint_c, identity)?;
    scene.add_sphere(Vec3::new(4.0, 5.0, 4.0), 1.0, tint_a, identity)?;
    scene.add_sphere(Vec3::new(-4.0, 5.0, 4.0), 1.0, tint_a, identity)?;

    scene.add_quad(
        Vec3::new(-2.5, 0.1, 4.0),
        Vec3::new(5.0, 0.0, 0.0),
        Vec3::new(0.0, 1.0, 3.0),
        quad_mat,
        identity,
    )?;

    scene.set_max_ray_trace_depth(5);
    scene.set_rays_per_pixel(16);
    scene.prep_for_render()?;
    Ok(scene)
}

/// Camera matching the random-spheres layout.
pub fn random_spheres_camera() -> Camera {
    Camera::new(
        Vec3::new(0.0, 2.0, -12.0),
        Vec3::new(0.0, 1.0, 0.0),
        Vec3::Y,
        90.0,
    )
}
