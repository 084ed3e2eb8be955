// tests/scene_staging.rs
// Staging-rule enforcement: misuse is rejected on the host before any
// device work is recorded.

use anyhow::Result;
use glam::{Mat4, Vec3};

use glint::{MaterialType, RenderError, Scene};

fn minimal_scene() -> Result<Scene> {
    let mut scene = Scene::new();
    let model = scene.add_model(Mat4::IDENTITY)?;
    let mat = scene.add_material(Vec3::ONE, MaterialType::Diffuse)?;
    scene.add_triangle(Vec3::ZERO, Vec3::X, Vec3::Y, mat, model)?;
    scene.add_sphere(Vec3::new(0.0, 0.0, 5.0), 1.0, mat, model)?;
    Ok(scene)
}

fn assert_scene_err<T: std::fmt::Debug>(result: Result<T, RenderError>) {
    match result {
        Err(RenderError::Scene(_)) => {}
        other => panic!("expected a scene error, got {:?}", other),
    }
}

#[test]
fn adds_rejected_after_finalization() -> Result<()> {
    let mut scene = minimal_scene()?;
    scene.prep_for_render()?;
    assert!(scene.is_finalized());

    assert_scene_err(scene.add_model(Mat4::IDENTITY));
    assert_scene_err(scene.add_material(Vec3::ONE, MaterialType::Light));
    assert_scene_err(scene.add_triangle(Vec3::ZERO, Vec3::X, Vec3::Y, 0, 0));
    assert_scene_err(scene.add_sphere(Vec3::ZERO, 1.0, 0, 0));
    Ok(())
}

#[test]
fn finalizing_twice_is_an_error() -> Result<()> {
    let mut scene = minimal_scene()?;
    scene.prep_for_render()?;
    assert_scene_err(scene.prep_for_render());
    Ok(())
}

#[test]
fn model_transform_updates_allowed_after_finalization() -> Result<()> {
    let mut scene = minimal_scene()?;
    scene.prep_for_render()?;
    scene.set_model_transform(0, Mat4::from_translation(Vec3::X))?;
    assert_scene_err(scene.set_model_transform(99, Mat4::IDENTITY));
    Ok(())
}

#[test]
fn dangling_indices_rejected_at_add_time() -> Result<()> {
    let mut scene = Scene::new();
    let model = scene.add_model(Mat4::IDENTITY)?;
    let mat = scene.add_material(Vec3::ONE, MaterialType::Diffuse)?;

    assert_scene_err(scene.add_triangle(Vec3::ZERO, Vec3::X, Vec3::Y, mat + 1, model));
    assert_scene_err(scene.add_triangle(Vec3::ZERO, Vec3::X, Vec3::Y, mat, model + 1));
    assert_scene_err(scene.add_sphere(Vec3::ZERO, 1.0, mat + 7, model));
    assert_scene_err(scene.add_sphere(Vec3::ZERO, 1.0, mat, model + 7));
    Ok(())
}

#[test]
fn minimum_scene_enforced_at_finalization() -> Result<()> {
    // Empty scene.
    assert_scene_err(Scene::new().prep_for_render());

    // No sphere.
    let mut no_sphere = Scene::new();
    let model = no_sphere.add_model(Mat4::IDENTITY)?;
    let mat = no_sphere.add_material(Vec3::ONE, MaterialType::Diffuse)?;
    no_sphere.add_triangle(Vec3::ZERO, Vec3::X, Vec3::Y, mat, model)?;
    assert_scene_err(no_sphere.prep_for_render());

    // No triangle.
    let mut no_triangle = Scene::new();
    let model = no_triangle.add_model(Mat4::IDENTITY)?;
    let mat = no_triangle.add_material(Vec3::ONE, MaterialType::Diffuse)?;
    no_triangle.add_sphere(Vec3::ZERO, 1.0, mat, model)?;
    assert_scene_err(no_triangle.prep_for_render());
    Ok(())
}

#[test]
fn buffers_unavailable_before_flush() -> Result<()> {
    let mut scene = minimal_scene()?;
    scene.prep_for_render()?;
    assert_scene_err(scene.buffers().map(|_| ()));
    Ok(())
}

#[test]
fn light_count_tracks_primitives_not_materials() -> Result<()> {
    let mut scene = Scene::new();
    let model = scene.add_model(Mat4::IDENTITY)?;
    let light = scene.add_material(Vec3::ONE, MaterialType::Light)?;
    let grey = scene.add_material(Vec3::splat(0.5), MaterialType::Diffuse)?;

    // Two primitives share the one light material; an unused light material
    // contributes nothing.
    scene.add_material(Vec3::ONE, MaterialType::Light)?;
    scene.add_triangle(Vec3::ZERO, Vec3::X, Vec3::Y, light, model)?;
    scene.add_sphere(Vec3::ZERO, 1.0, light, model)?;
    scene.add_sphere(Vec3::new(3.0, 0.0, 0.0), 1.0, grey, model)?;

    assert_eq!(scene.light_count(), 2);
    assert_eq!(scene.primitive_count(), 3);
    Ok(())
}

#[test]
fn depth_and_sample_settings_clamp_to_one() {
    let mut scene = Scene::new();
    assert_eq!(scene.max_ray_trace_depth(), 5);
    assert_eq!(scene.rays_per_pixel(), 16);

    scene.set_max_ray_trace_depth(0);
    scene.set_rays_per_pixel(0);
    assert_eq!(scene.max_ray_trace_depth(), 1);
    assert_eq!(scene.rays_per_pixel(), 1);

    scene.set_max_ray_trace_depth(12);
    scene.set_rays_per_pixel(64);
    assert_eq!(scene.max_ray_trace_depth(), 12);
    assert_eq!(scene.rays_per_pixel(), 64);
}
