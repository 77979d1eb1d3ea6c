//! WGSL sources for the ray tracing kernel and the presentation quad.
//!
//! The kernel is assembled per scene: a storage buffer that is not bound is
//! not declared either, and its accessor returns a zeroed record instead.
//! Counts always gate indexing, so the accessor is never reached for an
//! empty collection.

use crate::backend::BufferKind;
use crate::frame::{TILE_HEIGHT, TILE_WIDTH};

/// Format of the image the kernel writes and the quad samples.
pub const OUTPUT_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba16Float;

/// Binding of the output image inside the compute bind group.
pub const OUTPUT_BINDING: u32 = 0;
/// Binding of the per-frame uniform block inside the compute bind group.
pub const PARAMS_BINDING: u32 = 4;

pub const COMPUTE_ENTRY: &str = "main";

fn record_struct(kind: BufferKind) -> &'static str {
    match kind {
        BufferKind::Lights => "PointLight",
        BufferKind::Spheres => "Sphere",
        BufferKind::Triangles => "Triangle",
    }
}

fn accessor(kind: BufferKind) -> &'static str {
    match kind {
        BufferKind::Lights => "light_at",
        BufferKind::Spheres => "sphere_at",
        BufferKind::Triangles => "triangle_at",
    }
}

fn storage_declaration(kind: BufferKind, bound: bool) -> String {
    let record = record_struct(kind);
    let accessor = accessor(kind);
    if bound {
        format!(
            "@group(0) @binding({slot})\nvar<storage, read> {name}: array<{record}>;\n\
             fn {accessor}(i: u32) -> {record} {{\n    return {name}[i];\n}}\n",
            slot = kind.slot(),
            name = kind.label(),
        )
    } else {
        format!("fn {accessor}(i: u32) -> {record} {{\n    return {record}();\n}}\n")
    }
}

/// Full compute shader for the given set of bound storage slots.
pub fn compute_source(bound: &[BufferKind]) -> String {
    let mut source = String::with_capacity(KERNEL_PRELUDE.len() + KERNEL_BODY.len() + 512);
    source.push_str(KERNEL_PRELUDE);
    source.push_str(&format!(
        "@group(0) @binding({OUTPUT_BINDING})\n\
         var output_image: texture_storage_2d<rgba16float, write>;\n\
         @group(0) @binding({PARAMS_BINDING})\nvar<uniform> params: Params;\n\n"
    ));
    for kind in BufferKind::ALL {
        source.push_str(&storage_declaration(kind, bound.contains(&kind)));
        source.push('\n');
    }
    source.push_str(KERNEL_BODY);
    source.push_str(&format!(
        "\n@compute @workgroup_size({TILE_WIDTH}, {TILE_HEIGHT}, 1)\n{KERNEL_ENTRY}"
    ));
    source
}

const KERNEL_PRELUDE: &str = r#"
struct Camera {
    position: vec4<f32>,
    forward: vec4<f32>,
    up: vec4<f32>,
    right: vec4<f32>,
}

struct Params {
    camera: Camera,
    background_color: vec4<f32>,
    fov: f32,
    b_volume: f32,
    light_count: u32,
    sphere_count: u32,
    triangle_count: u32,
}

struct PointLight {
    position: vec4<f32>,
    color: vec3<f32>,
    opacity: f32,
}

struct Sphere {
    center: vec3<f32>,
    radius: f32,
    color: vec4<f32>,
}

struct Triangle {
    p0: vec4<f32>,
    p1: vec4<f32>,
    p2: vec4<f32>,
    color: vec4<f32>,
    bounding_volume: vec4<f32>,
}

"#;

const KERNEL_BODY: &str = r#"
const EPSILON: f32 = 1e-4;
const FAR: f32 = 1e30;
const AMBIENT: f32 = 0.1;

struct Hit {
    t: f32,
    normal: vec3<f32>,
    color: vec3<f32>,
}

fn hit_sphere(origin: vec3<f32>, dir: vec3<f32>, sphere: Sphere) -> f32 {
    let oc = origin - sphere.center;
    let b = dot(oc, dir);
    let c = dot(oc, oc) - sphere.radius * sphere.radius;
    let disc = b * b - c;
    if disc < 0.0 {
        return -1.0;
    }
    let root = sqrt(disc);
    var t = -b - root;
    if t < EPSILON {
        t = -b + root;
    }
    return t;
}

fn hit_triangle(origin: vec3<f32>, dir: vec3<f32>, tri: Triangle) -> f32 {
    let e1 = tri.p1.xyz - tri.p0.xyz;
    let e2 = tri.p2.xyz - tri.p0.xyz;
    let p = cross(dir, e2);
    let det = dot(e1, p);
    if abs(det) < 1e-8 {
        return -1.0;
    }
    let inv_det = 1.0 / det;
    let s = origin - tri.p0.xyz;
    let u = dot(s, p) * inv_det;
    if u < 0.0 || u > 1.0 {
        return -1.0;
    }
    let q = cross(s, e1);
    let v = dot(dir, q) * inv_det;
    if v < 0.0 || u + v > 1.0 {
        return -1.0;
    }
    return dot(e2, q) * inv_det;
}

// Coarse rejection against the origin-centred scene sphere.
fn hits_scene_bound(origin: vec3<f32>, dir: vec3<f32>) -> bool {
    let b = dot(origin, dir);
    let c = dot(origin, origin) - params.b_volume * params.b_volume;
    return c <= 0.0 || (b <= 0.0 && b * b - c >= 0.0);
}

fn trace(origin: vec3<f32>, dir: vec3<f32>) -> Hit {
    var hit: Hit;
    hit.t = FAR;
    for (var i = 0u; i < params.sphere_count; i += 1u) {
        let sphere = sphere_at(i);
        let t = hit_sphere(origin, dir, sphere);
        if t > EPSILON && t < hit.t {
            hit.t = t;
            hit.normal = normalize(origin + dir * t - sphere.center);
            hit.color = sphere.color.rgb;
        }
    }
    if params.triangle_count > 0u && hits_scene_bound(origin, dir) {
        for (var i = 0u; i < params.triangle_count; i += 1u) {
            let tri = triangle_at(i);
            let t = hit_triangle(origin, dir, tri);
            if t > EPSILON && t < hit.t {
                hit.t = t;
                var normal = normalize(cross(tri.p1.xyz - tri.p0.xyz, tri.p2.xyz - tri.p0.xyz));
                if dot(normal, dir) > 0.0 {
                    normal = -normal;
                }
                hit.normal = normal;
                hit.color = tri.color.rgb;
            }
        }
    }
    return hit;
}

fn shade(origin: vec3<f32>, dir: vec3<f32>) -> vec3<f32> {
    let hit = trace(origin, dir);
    var color = params.background_color.rgb;
    if hit.t < FAR {
        let hit_point = origin + dir * hit.t;
        color = hit.color * AMBIENT;
        for (var i = 0u; i < params.light_count; i += 1u) {
            let light = light_at(i);
            let to_light = light.position.xyz - hit_point;
            let light_distance = length(to_light);
            let l = to_light / light_distance;
            let diffuse = max(dot(hit.normal, l), 0.0);
            if diffuse > 0.0 {
                let shadow = trace(hit_point + hit.normal * EPSILON, l);
                if shadow.t >= light_distance {
                    color += hit.color * light.color * diffuse;
                }
            }
        }
    }
    // Lights are drawn as small glowing discs in front of the geometry.
    for (var i = 0u; i < params.light_count; i += 1u) {
        let light = light_at(i);
        let to_light = light.position.xyz - origin;
        let along = dot(to_light, dir);
        if light.opacity > 0.0 && along > 0.0 && along < hit.t {
            let miss = length(to_light - dir * along);
            color += light.color * clamp(1.0 - miss / light.opacity, 0.0, 1.0);
        }
    }
    return color;
}
"#;

const KERNEL_ENTRY: &str = r#"fn main(@builtin(global_invocation_id) id: vec3<u32>) {
    let size = textureDimensions(output_image);
    let aspect = f32(size.x) / f32(size.y);
    let scale = tan(radians(params.fov) * 0.5);
    let ndc = vec2<f32>(
        (f32(id.x) + 0.5) / f32(size.x) * 2.0 - 1.0,
        1.0 - (f32(id.y) + 0.5) / f32(size.y) * 2.0,
    );
    let camera = params.camera;
    let dir = normalize(
        camera.forward.xyz
            + camera.right.xyz * (ndc.x * aspect * scale)
            + camera.up.xyz * (ndc.y * scale),
    );
    let color = shade(camera.position.xyz, dir);
    textureStore(output_image, vec2<i32>(id.xy), vec4<f32>(color, 1.0));
}
"#;

/// Full-screen quad sampling the kernel output.
pub const PRESENT_SHADER: &str = r#"
struct VertexOutput {
    @builtin(position) position: vec4<f32>,
    @location(0) uv: vec2<f32>,
}

@group(0) @binding(0)
var image: texture_2d<f32>;
@group(0) @binding(1)
var image_sampler: sampler;

// Triangle strip: (-1, 1), (-1, -1), (1, 1), (1, -1).
@vertex
fn vs_main(@builtin(vertex_index) index: u32) -> VertexOutput {
    let x = select(-1.0, 1.0, index >= 2u);
    let y = select(1.0, -1.0, (index & 1u) == 1u);
    var out: VertexOutput;
    out.position = vec4<f32>(x, y, 0.0, 1.0);
    out.uv = vec2<f32>(x * 0.5 + 0.5, 0.5 - y * 0.5);
    return out;
}

@fragment
fn fs_main(input: VertexOutput) -> @location(0) vec4<f32> {
    return textureSample(image, image_sampler, input.uv);
}
"#;
