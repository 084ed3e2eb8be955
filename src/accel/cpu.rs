// src/accel/cpu.rs
// CPU reference of the per-frame HLBVH pipeline and BVH traversal
// This file exists to mirror each compute kernel step-for-step so host tests
// can validate ordering, topology, and bounds without a GPU.
// RELEVANT FILES: src/shaders/morton.wgsl, src/shaders/build.wgsl, src/accel/mod.rs

use bytemuck::Zeroable;
use glam::{Mat4, Vec3};

use crate::scene::types::*;
use crate::scene::Scene;

/// Normalization floor applied per axis so degenerate (flat) scene extents
/// do not divide by zero during Morton quantization.
pub const MIN_EXTENT: f32 = 1e-6;

/// Spread the low 10 bits of `v` so consecutive result bits are 3 apart.
pub fn expand_bits(v: u32) -> u32 {
    let mut v = v & 0x3ff;
    v = (v.wrapping_mul(0x0001_0001)) & 0xFF00_00FF;
    v = (v.wrapping_mul(0x0000_0101)) & 0x0F00_F00F;
    v = (v.wrapping_mul(0x0000_0011)) & 0xC30C_30C3;
    v = (v.wrapping_mul(0x0000_0005)) & 0x4924_9249;
    v
}

/// 30-bit Morton code for a point in the unit cube, 10 bits per axis,
/// x in the most significant bit of each triple and z in the least.
pub fn morton_code(p: Vec3) -> u32 {
    let q = (p * 1024.0).clamp(Vec3::ZERO, Vec3::splat(1023.0));
    (expand_bits(q.x as u32) << 2) | (expand_bits(q.y as u32) << 1) | expand_bits(q.z as u32)
}

/// Model-to-world transform of the scene's primitive arrays, matching the
/// transform kernel: vertices through the full matrix, sphere centers
/// through the matrix, sphere radii scaled by the largest basis length.
pub fn transform_scene(scene: &Scene) -> (Vec<TriangleGpu>, Vec<SphereGpu>) {
    let models: Vec<Mat4> = scene.models().iter().map(|m| m.to_mat4()).collect();

    let triangles = scene
        .triangles()
        .iter()
        .map(|t| {
            let m = models[t.model_index as usize];
            let mut out = *t;
            out.v0 = m.transform_point3(Vec3::from_array(t.v0)).to_array();
            out.v1 = m.transform_point3(Vec3::from_array(t.v1)).to_array();
            out.v2 = m.transform_point3(Vec3::from_array(t.v2)).to_array();
            out
        })
        .collect();

    let spheres = scene
        .spheres()
        .iter()
        .map(|s| {
            let m = models[s.model_index as usize];
            let mut out = *s;
            out.center = m.transform_point3(Vec3::from_array(s.center)).to_array();
            let scale = m
                .x_axis
                .truncate()
                .length()
                .max(m.y_axis.truncate().length())
                .max(m.z_axis.truncate().length());
            out.radius = s.radius * scale;
            out
        })
        .collect();

    (triangles, spheres)
}

/// Per-primitive AABBs in kernel order: triangles first, then spheres.
pub fn extract_aabbs(triangles: &[TriangleGpu], spheres: &[SphereGpu]) -> Vec<AabbGpu> {
    let mut aabbs = Vec::with_capacity(triangles.len() + spheres.len());
    for (i, t) in triangles.iter().enumerate() {
        let v0 = Vec3::from_array(t.v0);
        let v1 = Vec3::from_array(t.v1);
        let v2 = Vec3::from_array(t.v2);
        let min = v0.min(v1).min(v2);
        let max = v0.max(v1).max(v2);
        aabbs.push(AabbGpu::from_min_max(min, max, i as u32, PRIMITIVE_TRIANGLE));
    }
    for (i, s) in spheres.iter().enumerate() {
        let c = Vec3::from_array(s.center);
        let r = Vec3::splat(s.radius);
        aabbs.push(AabbGpu::from_min_max(c - r, c + r, i as u32, PRIMITIVE_SPHERE));
    }
    aabbs
}

/// Min/max reduction over every primitive AABB.
pub fn scene_bounds(aabbs: &[AabbGpu]) -> SceneBounds {
    let mut min = Vec3::splat(f32::INFINITY);
    let mut max = Vec3::splat(f32::NEG_INFINITY);
    for a in aabbs {
        min = min.min(a.min());
        max = max.max(a.max());
    }
    SceneBounds {
        min: min.to_array(),
        _pad0: 0.0,
        max: max.to_array(),
        _pad1: 0.0,
    }
}

/// Morton key per AABB from its center normalized into the scene bounds.
pub fn assign_morton(aabbs: &[AabbGpu], bounds: &SceneBounds) -> Vec<MortonPrimitive> {
    let min = bounds.min_v();
    let extent = (bounds.max_v() - min).max(Vec3::splat(MIN_EXTENT));
    aabbs
        .iter()
        .enumerate()
        .map(|(i, a)| {
            let p = ((Vec3::from_array(a.center) - min) / extent).clamp(Vec3::ZERO, Vec3::ONE);
            MortonPrimitive {
                code: morton_code(p),
                aabb_index: i as u32,
            }
        })
        .collect()
}

/// Stable LSD radix sort on the Morton key, four 8-bit passes, exactly as
/// the single-workgroup sort kernel performs them.
pub fn radix_sort(mut keys: Vec<MortonPrimitive>) -> Vec<MortonPrimitive> {
    let n = keys.len();
    let mut scratch = vec![MortonPrimitive { code: 0, aabb_index: 0 }; n];
    for pass in 0..4u32 {
        let shift = pass * 8;
        let mut hist = [0u32; 256];
        for k in &keys {
            hist[((k.code >> shift) & 0xff) as usize] += 1;
        }
        let mut sum = 0u32;
        for h in hist.iter_mut() {
            let c = *h;
            *h = sum;
            sum += c;
        }
        for k in &keys {
            let d = ((k.code >> shift) & 0xff) as usize;
            scratch[hist[d] as usize] = *k;
            hist[d] += 1;
        }
        std::mem::swap(&mut keys, &mut scratch);
    }
    keys
}

/// Index of the traversal root: internal node `n` for multi-primitive
/// scenes, leaf 0 when there is exactly one primitive.
pub fn root_index(n: u32) -> u32 {
    if n == 1 {
        0
    } else {
        n
    }
}

/// Longest-common-prefix metric over sorted keys, with the sorted-position
/// tie-break that keeps duplicate keys distinct. Out-of-range `j` yields -1.
fn lcp(sorted: &[MortonPrimitive], i: i32, j: i32) -> i32 {
    let n = sorted.len() as i32;
    if j < 0 || j >= n {
        return -1;
    }
    let ci = sorted[i as usize].code;
    let cj = sorted[j as usize].code;
    if ci == cj {
        32 + ((i as u32) ^ (j as u32)).leading_zeros() as i32
    } else {
        (ci ^ cj).leading_zeros() as i32
    }
}

/// Radix-tree construction plus bottom-up AABB propagation.
///
/// Layout matches the device buffers: `2n-1` nodes with leaves in sorted
/// order at `[0, n)` and internal nodes at `[n, 2n-1)`; `info[k].parent`
/// links every node to its parent, `INVALID_INDEX` at the root.
pub fn build_tree(
    sorted: &[MortonPrimitive],
    aabbs: &[AabbGpu],
) -> (Vec<BvhNodeGpu>, Vec<ConstructionInfo>) {
    let n = sorted.len();
    let node_count = 2 * n - 1;
    let mut nodes = vec![BvhNodeGpu::zeroed(); node_count];
    let mut info = vec![
        ConstructionInfo {
            parent: INVALID_INDEX,
            visits: 0,
        };
        node_count
    ];

    for (i, mp) in sorted.iter().enumerate() {
        nodes[i] = BvhNodeGpu {
            aabb: aabbs[mp.aabb_index as usize],
            left: INVALID_INDEX,
            right: INVALID_INDEX,
            aabb_index: mp.aabb_index,
            _pad0: 0,
        };
    }
    if n == 1 {
        return (nodes, info);
    }

    for i in 0..(n - 1) as i32 {
        let d = if lcp(sorted, i, i + 1) - lcp(sorted, i, i - 1) > 0 {
            1
        } else {
            -1
        };
        let delta_min = lcp(sorted, i, i - d);

        let mut l_max = 2i32;
        while lcp(sorted, i, i + l_max * d) > delta_min {
            l_max <<= 1;
        }
        let mut l = 0i32;
        let mut t = l_max >> 1;
        while t >= 1 {
            if lcp(sorted, i, i + (l + t) * d) > delta_min {
                l += t;
            }
            t >>= 1;
        }
        let j = i + l * d;
        let delta_node = lcp(sorted, i, j);

        let mut s = 0i32;
        let mut t = l;
        loop {
            t = (t + 1) >> 1;
            if lcp(sorted, i, i + (s + t) * d) > delta_node {
                s += t;
            }
            if t <= 1 {
                break;
            }
        }
        let gamma = i + s * d + d.min(0);

        let left = if i.min(j) == gamma {
            gamma as u32
        } else {
            (n as i32 + gamma) as u32
        };
        let right = if i.max(j) == gamma + 1 {
            (gamma + 1) as u32
        } else {
            (n as i32 + gamma + 1) as u32
        };

        let node_index = n + i as usize;
        nodes[node_index] = BvhNodeGpu {
            aabb: AabbGpu::zeroed(),
            left,
            right,
            aabb_index: INVALID_INDEX,
            _pad0: 0,
        };
        info[left as usize].parent = node_index as u32;
        info[right as usize].parent = node_index as u32;
    }
    info[n].parent = INVALID_INDEX;

    propagate_bounds(&mut nodes, &mut info);
    (nodes, info)
}

/// Bottom-up union walk with the same visit-counter rule as the refit
/// kernel: the first arrival at an internal node stops, the second unions
/// the children (both known complete) and continues upward.
fn propagate_bounds(nodes: &mut [BvhNodeGpu], info: &mut [ConstructionInfo]) {
    let n = (nodes.len() + 1) / 2;
    for leaf in 0..n {
        let mut cur = info[leaf].parent;
        while cur != INVALID_INDEX {
            let prev = info[cur as usize].visits;
            info[cur as usize].visits += 1;
            if prev == 0 {
                break;
            }
            let left = nodes[cur as usize].left as usize;
            let right = nodes[cur as usize].right as usize;
            let merged = nodes[left].aabb.union(&nodes[right].aabb);
            nodes[cur as usize].aabb = merged;
            cur = info[cur as usize].parent;
        }
    }
}

/// Full Stage-1 pipeline on the host.
pub fn build_scene_bvh(scene: &Scene) -> (Vec<BvhNodeGpu>, Vec<AabbGpu>, SceneBounds) {
    let (triangles, spheres) = transform_scene(scene);
    let aabbs = extract_aabbs(&triangles, &spheres);
    let bounds = scene_bounds(&aabbs);
    let sorted = radix_sort(assign_morton(&aabbs, &bounds));
    let (nodes, _) = build_tree(&sorted, &aabbs);
    (nodes, aabbs, bounds)
}

// ---------------------------------------------------------------------------
// Reference traversal and shading, mirroring trace.wgsl.

pub const T_MIN: f32 = 1e-3;

#[derive(Clone, Copy, Debug)]
pub struct Ray {
    pub origin: Vec3,
    pub dir: Vec3,
}

#[derive(Clone, Copy, Debug)]
pub struct Hit {
    pub t: f32,
    pub point: Vec3,
    pub normal: Vec3,
    pub front_face: bool,
    pub material_index: u32,
}

fn ray_aabb(ray: &Ray, inv_dir: Vec3, aabb: &AabbGpu, t_max: f32) -> bool {
    let t0 = (aabb.min() - ray.origin) * inv_dir;
    let t1 = (aabb.max() - ray.origin) * inv_dir;
    let t_near = t0.min(t1);
    let t_far = t0.max(t1);
    let enter = t_near.max_element().max(T_MIN);
    let exit = t_far.min_element().min(t_max);
    enter <= exit
}

fn ray_triangle(ray: &Ray, tri: &TriangleGpu, t_max: f32) -> Option<(f32, Vec3)> {
    let v0 = Vec3::from_array(tri.v0);
    let e1 = Vec3::from_array(tri.v1) - v0;
    let e2 = Vec3::from_array(tri.v2) - v0;
    let p = ray.dir.cross(e2);
    let det = e1.dot(p);
    if det.abs() < 1e-7 {
        return None;
    }
    let inv_det = 1.0 / det;
    let s = ray.origin - v0;
    let u = s.dot(p) * inv_det;
    if !(0.0..=1.0).contains(&u) {
        return None;
    }
    let q = s.cross(e1);
    let v = ray.dir.dot(q) * inv_det;
    if v < 0.0 || u + v > 1.0 {
        return None;
    }
    let t = e2.dot(q) * inv_det;
    if t < T_MIN || t > t_max {
        return None;
    }
    Some((t, e1.cross(e2).normalize()))
}

fn ray_sphere(ray: &Ray, sphere: &SphereGpu, t_max: f32) -> Option<(f32, Vec3)> {
    let center = Vec3::from_array(sphere.center);
    let oc = ray.origin - center;
    let a = ray.dir.length_squared();
    let half_b = oc.dot(ray.dir);
    let c = oc.length_squared() - sphere.radius * sphere.radius;
    let disc = half_b * half_b - a * c;
    if disc < 0.0 {
        return None;
    }
    let sqrt_d = disc.sqrt();
    let mut t = (-half_b - sqrt_d) / a;
    if t < T_MIN || t > t_max {
        t = (-half_b + sqrt_d) / a;
        if t < T_MIN || t > t_max {
            return None;
        }
    }
    let normal = (ray.origin + ray.dir * t - center) / sphere.radius;
    Some((t, normal))
}

/// Stack-based closest-hit query against the node array.
pub fn closest_hit(
    nodes: &[BvhNodeGpu],
    triangles: &[TriangleGpu],
    spheres: &[SphereGpu],
    ray: &Ray,
) -> Option<Hit> {
    let n = (nodes.len() + 1) / 2;
    let inv_dir = ray.dir.recip();
    let mut closest = f32::INFINITY;
    let mut hit: Option<Hit> = None;

    let mut stack = vec![root_index(n as u32)];
    while let Some(idx) = stack.pop() {
        let node = &nodes[idx as usize];
        if !ray_aabb(ray, inv_dir, &node.aabb, closest) {
            continue;
        }
        if node.is_leaf() {
            let leaf = &node.aabb;
            let found = if leaf.primitive_type == PRIMITIVE_TRIANGLE {
                let tri = &triangles[leaf.index as usize];
                ray_triangle(ray, tri, closest).map(|(t, normal)| (t, normal, tri.material_index))
            } else {
                let sph = &spheres[leaf.index as usize];
                ray_sphere(ray, sph, closest).map(|(t, normal)| (t, normal, sph.material_index))
            };
            if let Some((t, outward, material_index)) = found {
                closest = t;
                let front_face = ray.dir.dot(outward) < 0.0;
                hit = Some(Hit {
                    t,
                    point: ray.origin + ray.dir * t,
                    normal: if front_face { outward } else { -outward },
                    front_face,
                    material_index,
                });
            }
        } else {
            stack.push(node.left);
            stack.push(node.right);
        }
    }
    hit
}

fn schlick(cosine: f32, ref_idx: f32) -> f32 {
    let r0 = ((1.0 - ref_idx) / (1.0 + ref_idx)).powi(2);
    r0 + (1.0 - r0) * (1.0 - cosine).powi(5)
}

/// Path radiance with the same material rules as the trace kernel. `rand`
/// supplies uniform [0,1) samples so tests can drive it deterministically.
pub fn radiance<F: FnMut() -> f32>(
    nodes: &[BvhNodeGpu],
    triangles: &[TriangleGpu],
    spheres: &[SphereGpu],
    materials: &[MaterialGpu],
    ray: Ray,
    max_depth: u32,
    rand: &mut F,
) -> Vec3 {
    let mut throughput = Vec3::ONE;
    let mut ray = ray;
    for _ in 0..max_depth {
        let Some(hit) = closest_hit(nodes, triangles, spheres, &ray) else {
            return Vec3::ZERO;
        };
        let mat = &materials[hit.material_index as usize];
        let albedo = Vec3::from_array(mat.albedo);
        let unit_dir = ray.dir.normalize();
        let dir = match mat.material_type {
            x if x == MaterialType::Light as u32 => {
                return throughput * albedo;
            }
            x if x == MaterialType::Metallic as u32 => {
                let reflected = unit_dir - 2.0 * unit_dir.dot(hit.normal) * hit.normal;
                if reflected.dot(hit.normal) <= 0.0 {
                    return Vec3::ZERO;
                }
                reflected
            }
            x if x == MaterialType::Dielectric as u32 => {
                let ratio = if hit.front_face { 1.0 / 1.5 } else { 1.5 };
                let cos_theta = (-unit_dir).dot(hit.normal).min(1.0);
                let sin_theta = (1.0 - cos_theta * cos_theta).sqrt();
                if ratio * sin_theta > 1.0 || schlick(cos_theta, ratio) > rand() {
                    unit_dir - 2.0 * unit_dir.dot(hit.normal) * hit.normal
                } else {
                    let perp = ratio * (unit_dir + cos_theta * hit.normal);
                    let para = -(1.0 - perp.length_squared()).abs().sqrt() * hit.normal;
                    perp + para
                }
            }
            _ => {
                // Diffuse: cosine-weighted via normal + unit sphere sample.
                let u = rand();
                let v = rand();
                let phi = 2.0 * std::f32::consts::PI * u;
                let z = 2.0 * v - 1.0;
                let r = (1.0 - z * z).sqrt();
                let sample = Vec3::new(r * phi.cos(), r * phi.sin(), z);
                let scatter = hit.normal + sample;
                if scatter.length_squared() < 1e-8 {
                    hit.normal
                } else {
                    scatter
                }
            }
        };
        throughput *= albedo;
        ray = Ray {
            origin: hit.point,
            dir,
        };
    }
    Vec3::ZERO
}
