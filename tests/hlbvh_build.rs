// tests/hlbvh_build.rs
// Host-side validation of the HLBVH pipeline via the CPU reference:
// Morton ordering, sort stability, tree well-formedness, bound soundness,
// and first-bounce shading.

use anyhow::Result;
use glam::{Mat4, Vec3};

use glint::accel::cpu;
use glint::scene::types::*;
use glint::scene::{MaterialType, Scene};

/// Scene with one identity model, one diffuse material, and spheres at the
/// given centers (unit radius), plus one triangle so the minimum-scene rule
/// holds.
fn sphere_scene(centers: &[Vec3]) -> Result<Scene> {
    let mut scene = Scene::new();
    let model = scene.add_model(Mat4::IDENTITY)?;
    let mat = scene.add_material(Vec3::splat(0.8), MaterialType::Diffuse)?;
    scene.add_triangle(
        Vec3::new(50.0, 50.0, 50.0),
        Vec3::new(51.0, 50.0, 50.0),
        Vec3::new(50.0, 51.0, 50.0),
        mat,
        model,
    )?;
    for c in centers {
        scene.add_sphere(*c, 1.0, mat, model)?;
    }
    scene.prep_for_render()?;
    Ok(scene)
}

#[test]
fn morton_codes_interleave_axes() {
    // Lowest bit of each triple belongs to z, then y, then x.
    let z_mask = 0x49249249u32;
    let y_mask = z_mask << 1;
    let x_mask = z_mask << 2;

    let cz = cpu::morton_code(Vec3::new(0.0, 0.0, 0.999));
    let cy = cpu::morton_code(Vec3::new(0.0, 0.999, 0.0));
    let cx = cpu::morton_code(Vec3::new(0.999, 0.0, 0.0));
    assert_ne!(cz, 0);
    assert_eq!(cz & !z_mask, 0);
    assert_eq!(cy & !y_mask, 0);
    assert_eq!(cx & !x_mask, 0);
}

#[test]
fn morton_codes_clamp_at_grid_edge() {
    // Exactly 1.0 quantizes to 1024 and must clamp back to 1023.
    let top = cpu::morton_code(Vec3::ONE);
    assert_eq!(top, cpu::expand_bits(1023) << 2 | cpu::expand_bits(1023) << 1 | cpu::expand_bits(1023));
    assert!(cpu::morton_code(Vec3::splat(2.0)) == top);
}

#[test]
fn morton_codes_monotonic_along_axis() {
    let mut prev = 0;
    for i in 1..=10 {
        let code = cpu::morton_code(Vec3::new(i as f32 / 10.0, 0.0, 0.0));
        assert!(code >= prev, "codes must not decrease along +x");
        prev = code;
    }
}

#[test]
fn radix_sort_orders_and_preserves_duplicates() {
    // Keys chosen so every 8-bit digit position matters, with duplicates.
    let codes = [
        0xdeadbeefu32,
        0x00000001,
        0xdeadbeef,
        0x80000000,
        0x00010000,
        0x00000100,
        0xdeadbeef,
        0,
    ];
    let keys: Vec<MortonPrimitive> = codes
        .iter()
        .enumerate()
        .map(|(i, &code)| MortonPrimitive {
            code,
            aabb_index: i as u32,
        })
        .collect();
    let sorted = cpu::radix_sort(keys.clone());

    assert_eq!(sorted.len(), keys.len());
    for w in sorted.windows(2) {
        assert!(w[0].code <= w[1].code);
        if w[0].code == w[1].code {
            // Stability: equal keys keep their original relative order.
            assert!(w[0].aabb_index < w[1].aabb_index);
        }
    }
    let mut indices: Vec<u32> = sorted.iter().map(|k| k.aabb_index).collect();
    indices.sort_unstable();
    assert_eq!(indices, (0..keys.len() as u32).collect::<Vec<_>>());
}

/// Walk the tree from the root, checking binary structure, leaf coverage,
/// and parent-contains-child bounds.
fn check_tree(nodes: &[BvhNodeGpu], n: usize) {
    assert_eq!(nodes.len(), 2 * n - 1);
    let root = cpu::root_index(n as u32) as usize;

    let mut leaf_seen = vec![false; n];
    let mut stack = vec![root];
    let mut visited = 0usize;
    while let Some(idx) = stack.pop() {
        visited += 1;
        assert!(visited <= nodes.len(), "cycle or duplicate reachability");
        let node = &nodes[idx];
        if node.is_leaf() {
            assert!(idx < n, "leaves live in [0, n)");
            assert_eq!(node.right, INVALID_INDEX);
            assert!(!leaf_seen[idx], "leaf reached twice");
            leaf_seen[idx] = true;
        } else {
            assert!(idx >= n, "internal nodes live in [n, 2n-1)");
            assert_eq!(node.aabb_index, INVALID_INDEX);
            let left = node.left as usize;
            let right = node.right as usize;
            assert!(left < nodes.len() && right < nodes.len());
            // Propagated bounds are the exact componentwise union of the
            // children, not merely a containing box.
            let union_min = nodes[left].aabb.min().min(nodes[right].aabb.min());
            let union_max = nodes[left].aabb.max().max(nodes[right].aabb.max());
            assert_eq!(node.aabb.min(), union_min, "internal min must equal child union");
            assert_eq!(node.aabb.max(), union_max, "internal max must equal child union");
            stack.push(left);
            stack.push(right);
        }
    }
    assert_eq!(visited, nodes.len(), "every node reachable exactly once");
    assert!(leaf_seen.iter().all(|&s| s), "every leaf reachable");
}

#[test]
fn tree_well_formed_for_scattered_spheres() -> Result<()> {
    let centers: Vec<Vec3> = (0..31)
        .map(|i| {
            let f = i as f32;
            Vec3::new((f * 1.7).sin() * 20.0, (f * 2.3).cos() * 15.0, f)
        })
        .collect();
    let scene = sphere_scene(&centers)?;
    let (nodes, _, _) = cpu::build_scene_bvh(&scene);
    check_tree(&nodes, scene.primitive_count() as usize);
    Ok(())
}

#[test]
fn tree_leaves_follow_sorted_morton_order() -> Result<()> {
    let centers: Vec<Vec3> = (0..16)
        .map(|i| Vec3::new(((i * 7) % 16) as f32, ((i * 3) % 16) as f32, i as f32))
        .collect();
    let scene = sphere_scene(&centers)?;

    let (triangles, spheres) = cpu::transform_scene(&scene);
    let aabbs = cpu::extract_aabbs(&triangles, &spheres);
    let bounds = cpu::scene_bounds(&aabbs);
    let sorted = cpu::radix_sort(cpu::assign_morton(&aabbs, &bounds));
    let (nodes, _) = cpu::build_tree(&sorted, &aabbs);

    for (i, key) in sorted.iter().enumerate() {
        assert_eq!(nodes[i].aabb_index, key.aabb_index);
    }
    Ok(())
}

#[test]
fn duplicate_centroids_still_build_a_binary_tree() -> Result<()> {
    // Identical centers give identical Morton keys; the position tie-break
    // must still produce a well-formed binary tree.
    let centers = vec![Vec3::new(3.0, 3.0, 3.0); 9];
    let scene = sphere_scene(&centers)?;
    let (nodes, _, _) = cpu::build_scene_bvh(&scene);
    check_tree(&nodes, scene.primitive_count() as usize);
    Ok(())
}

#[test]
fn tree_depth_stays_within_traversal_stack_bound() -> Result<()> {
    // The trace kernel defers one sibling per level on a 64-entry stack.
    // Path lengths are capped by the strictly increasing prefix metric:
    // 30 code bits plus the 32-bit position tie-break. Duplicate
    // centroids maximize tie-break depth, so probe both extremes.
    let duplicates = sphere_scene(&vec![Vec3::splat(1.0); 200])?;
    let scattered = sphere_scene(
        &(0..200)
            .map(|i| {
                let f = i as f32;
                Vec3::new((f * 1.1).sin() * 30.0, (f * 1.9).cos() * 30.0, f * 0.3)
            })
            .collect::<Vec<_>>(),
    )?;

    for scene in [&duplicates, &scattered] {
        let (nodes, _, _) = cpu::build_scene_bvh(scene);
        let n = scene.primitive_count() as usize;
        let mut max_depth = 0usize;
        let mut stack = vec![(cpu::root_index(n as u32) as usize, 0usize)];
        while let Some((idx, depth)) = stack.pop() {
            max_depth = max_depth.max(depth);
            let node = &nodes[idx];
            if !node.is_leaf() {
                stack.push((node.left as usize, depth + 1));
                stack.push((node.right as usize, depth + 1));
            }
        }
        assert!(max_depth < 64, "tree depth {} exceeds traversal stack", max_depth);
    }
    Ok(())
}

#[test]
fn two_primitives_build_one_internal_node() -> Result<()> {
    let scene = sphere_scene(&[Vec3::new(-5.0, 0.0, 0.0)])?;
    // 1 triangle + 1 sphere.
    assert_eq!(scene.primitive_count(), 2);
    let (nodes, _, bounds) = cpu::build_scene_bvh(&scene);
    check_tree(&nodes, 2);

    let root = &nodes[cpu::root_index(2) as usize];
    assert!(!root.is_leaf());
    assert_eq!(root.aabb.min(), bounds.min_v());
    assert_eq!(root.aabb.max(), bounds.max_v());
    Ok(())
}

#[test]
fn single_primitive_builds_one_leaf_and_no_internal_nodes() {
    let aabb = AabbGpu::from_min_max(Vec3::ZERO, Vec3::ONE, 0, PRIMITIVE_SPHERE);
    let keys = [MortonPrimitive {
        code: 0x1234,
        aabb_index: 0,
    }];
    let (nodes, info) = cpu::build_tree(&keys, std::slice::from_ref(&aabb));

    assert_eq!(nodes.len(), 1, "one primitive yields exactly one node");
    assert!(nodes[0].is_leaf());
    assert_eq!(nodes[0].aabb_index, 0);
    assert_eq!(nodes[0].aabb.min(), Vec3::ZERO);
    assert_eq!(nodes[0].aabb.max(), Vec3::ONE);
    // The lone leaf is the root and has no parent.
    assert_eq!(cpu::root_index(1), 0);
    assert_eq!(info[0].parent, INVALID_INDEX);
}

#[test]
fn rebuild_from_same_primitives_is_identical() -> Result<()> {
    let centers: Vec<Vec3> = (0..23)
        .map(|i| {
            let f = i as f32;
            Vec3::new((f * 2.1).sin() * 12.0, (f * 0.5).cos() * 9.0, f * 0.75)
        })
        .collect();
    let scene = sphere_scene(&centers)?;

    let (first, _, first_bounds) = cpu::build_scene_bvh(&scene);
    let (second, _, second_bounds) = cpu::build_scene_bvh(&scene);

    assert_eq!(first.len(), second.len());
    assert_eq!(first_bounds.min, second_bounds.min);
    assert_eq!(first_bounds.max, second_bounds.max);
    for (a, b) in first.iter().zip(second.iter()) {
        assert_eq!(a.left, b.left);
        assert_eq!(a.right, b.right);
        assert_eq!(a.aabb_index, b.aabb_index);
        assert_eq!(a.aabb.min(), b.aabb.min());
        assert_eq!(a.aabb.max(), b.aabb.max());
    }
    Ok(())
}

#[test]
fn root_bounds_equal_scene_bounds() -> Result<()> {
    let centers: Vec<Vec3> = (0..25)
        .map(|i| Vec3::new((i % 5) as f32 * 4.0, (i / 5) as f32 * 3.0, -(i as f32)))
        .collect();
    let scene = sphere_scene(&centers)?;
    let (nodes, aabbs, bounds) = cpu::build_scene_bvh(&scene);
    let n = scene.primitive_count() as usize;
    check_tree(&nodes, n);

    let root = &nodes[cpu::root_index(n as u32) as usize];
    assert_eq!(root.aabb.min(), bounds.min_v());
    assert_eq!(root.aabb.max(), bounds.max_v());

    // Bound soundness: every primitive box sits inside the root.
    for a in &aabbs {
        assert!(root.aabb.contains(a));
    }
    Ok(())
}

#[test]
fn model_transforms_apply_before_aabb_extraction() -> Result<()> {
    let mut scene = Scene::new();
    let moved = scene.add_model(Mat4::from_translation(Vec3::new(10.0, 0.0, 0.0)))?;
    let mat = scene.add_material(Vec3::ONE, MaterialType::Diffuse)?;
    scene.add_triangle(Vec3::ZERO, Vec3::X, Vec3::Y, mat, moved)?;
    scene.add_sphere(Vec3::ZERO, 2.0, mat, moved)?;
    scene.prep_for_render()?;

    let (triangles, spheres) = cpu::transform_scene(&scene);
    assert_eq!(triangles[0].v0, [10.0, 0.0, 0.0]);
    assert_eq!(spheres[0].center, [10.0, 0.0, 0.0]);

    let aabbs = cpu::extract_aabbs(&triangles, &spheres);
    assert_eq!(aabbs[1].min(), Vec3::new(8.0, -2.0, -2.0));
    assert_eq!(aabbs[1].primitive_type, PRIMITIVE_SPHERE);
    assert_eq!(aabbs[0].primitive_type, PRIMITIVE_TRIANGLE);
    Ok(())
}

#[test]
fn scaled_model_grows_sphere_radius() -> Result<()> {
    let mut scene = Scene::new();
    let scaled = scene.add_model(Mat4::from_scale(Vec3::new(3.0, 1.0, 1.0)))?;
    let mat = scene.add_material(Vec3::ONE, MaterialType::Diffuse)?;
    scene.add_triangle(Vec3::ZERO, Vec3::X, Vec3::Y, mat, scaled)?;
    scene.add_sphere(Vec3::ZERO, 1.0, mat, scaled)?;
    scene.prep_for_render()?;

    let (_, spheres) = cpu::transform_scene(&scene);
    // Largest basis length wins under non-uniform scale.
    assert_eq!(spheres[0].radius, 3.0);
    Ok(())
}

#[test]
fn traversal_matches_per_primitive_closest_hit() -> Result<()> {
    let centers: Vec<Vec3> = (0..20)
        .map(|i| {
            let f = i as f32;
            Vec3::new((f * 0.9).sin() * 8.0, (f * 1.3).cos() * 8.0, 10.0 + f)
        })
        .collect();
    let scene = sphere_scene(&centers)?;
    let (nodes, _, _) = cpu::build_scene_bvh(&scene);
    let (triangles, spheres) = cpu::transform_scene(&scene);

    for k in 0..32 {
        let f = k as f32;
        let ray = cpu::Ray {
            origin: Vec3::new(0.0, 0.0, -5.0),
            dir: Vec3::new((f * 0.37).sin() * 0.4, (f * 0.61).cos() * 0.4, 1.0),
        };
        let via_tree = cpu::closest_hit(&nodes, &triangles, &spheres, &ray);

        // Brute force: query each primitive through its own one-leaf tree.
        let mut best: Option<f32> = None;
        for (i, t) in triangles.iter().enumerate() {
            let solo = cpu::extract_aabbs(std::slice::from_ref(t), &[]);
            let mut aabb = solo[0];
            aabb.index = i as u32;
            let (single, _) = cpu::build_tree(
                &[MortonPrimitive { code: 0, aabb_index: 0 }],
                std::slice::from_ref(&aabb),
            );
            if let Some(h) = cpu::closest_hit(&single, &triangles, &spheres, &ray) {
                best = Some(best.map_or(h.t, |b: f32| b.min(h.t)));
            }
        }
        for (i, s) in spheres.iter().enumerate() {
            let solo = cpu::extract_aabbs(&[], std::slice::from_ref(s));
            let mut aabb = solo[0];
            aabb.index = i as u32;
            let (single, _) = cpu::build_tree(
                &[MortonPrimitive { code: 0, aabb_index: 0 }],
                std::slice::from_ref(&aabb),
            );
            if let Some(h) = cpu::closest_hit(&single, &triangles, &spheres, &ray) {
                best = Some(best.map_or(h.t, |b: f32| b.min(h.t)));
            }
        }

        match (via_tree, best) {
            (Some(h), Some(b)) => assert!((h.t - b).abs() < 1e-4, "tree hit differs from brute force"),
            (None, None) => {}
            (tree, brute) => panic!("hit disagreement: tree {:?} brute {:?}", tree.map(|h| h.t), brute),
        }
    }
    Ok(())
}

#[test]
fn camera_ray_on_emissive_quad_returns_albedo() -> Result<()> {
    let mut scene = Scene::new();
    let model = scene.add_model(Mat4::IDENTITY)?;
    let light = scene.add_material(Vec3::new(0.9, 0.8, 0.7), MaterialType::Light)?;
    let grey = scene.add_material(Vec3::splat(0.5), MaterialType::Diffuse)?;
    scene.add_quad(
        Vec3::new(-1.0, -1.0, 5.0),
        Vec3::new(2.0, 0.0, 0.0),
        Vec3::new(0.0, 2.0, 0.0),
        light,
        model,
    )?;
    scene.add_sphere(Vec3::new(0.0, 0.0, 100.0), 1.0, grey, model)?;
    scene.set_max_ray_trace_depth(1);
    scene.prep_for_render()?;

    let (nodes, _, _) = cpu::build_scene_bvh(&scene);
    let (triangles, spheres) = cpu::transform_scene(&scene);

    let ray = cpu::Ray {
        origin: Vec3::ZERO,
        dir: Vec3::Z,
    };
    let mut no_rand = || panic!("light hit must not consume randomness");
    let color = cpu::radiance(
        &nodes,
        &triangles,
        &spheres,
        scene.materials(),
        ray,
        1,
        &mut no_rand,
    );
    assert_eq!(color, Vec3::new(0.9, 0.8, 0.7));

    // A miss to the side is black at depth 1.
    let miss = cpu::Ray {
        origin: Vec3::ZERO,
        dir: Vec3::new(10.0, 0.0, 1.0),
    };
    let mut zero = || 0.5f32;
    let black = cpu::radiance(
        &nodes,
        &triangles,
        &spheres,
        scene.materials(),
        miss,
        1,
        &mut zero,
    );
    assert_eq!(black, Vec3::ZERO);
    Ok(())
}
